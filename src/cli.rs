//! CLI parser for the web server binary
use clap::Parser;
use std::num::NonZeroU16;
use std::path::PathBuf;

#[derive(Parser, Debug)]
/// CLI Options
pub struct CliOptions {
    #[clap(long, help = "Enable debug logging", env = "MEMEGEN_DEBUG")]
    /// Enable debug logging. Env: MEMEGEN_DEBUG
    pub debug: bool,
    #[clap(long, short, default_value = "9000", env = "MEMEGEN_PORT")]
    /// http listener, defaults to `9000`.
    /// Env: MEMEGEN_PORT
    pub port: NonZeroU16,
    #[clap(
        long,
        short,
        default_value = "127.0.0.1",
        env = "MEMEGEN_LISTEN_ADDRESS"
    )]
    /// Listen address, defaults to `127.0.0.1`.
    /// Env: MEMEGEN_LISTEN_ADDRESS
    pub listen_address: String,

    #[clap(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    /// OpenAI API key; overrides the api_keys.ini value.
    /// Env: OPENAI_API_KEY
    pub openai_key: Option<String>,
    #[clap(long, env = "CLIPDROP_API_KEY", hide_env_values = true)]
    /// ClipDrop API key; overrides the api_keys.ini value.
    /// Env: CLIPDROP_API_KEY
    pub clipdrop_key: Option<String>,
    #[clap(long, env = "STABILITY_API_KEY", hide_env_values = true)]
    /// Stability AI API key; overrides the api_keys.ini value.
    /// Env: STABILITY_API_KEY
    pub stability_key: Option<String>,

    #[clap(long, env = "MEMEGEN_IMAGE_PROVIDER")]
    /// Image provider: openai, stability or clipdrop.
    /// Env: MEMEGEN_IMAGE_PROVIDER
    pub image_provider: Option<String>,
    #[clap(long, env = "MEMEGEN_OUTPUT_FOLDER")]
    /// Directory for generated memes and the log file.
    /// Env: MEMEGEN_OUTPUT_FOLDER
    pub output_folder: Option<PathBuf>,
    #[clap(long, env = "MEMEGEN_FONT_FILE")]
    /// Caption font file, resolved against system font folders.
    /// Env: MEMEGEN_FONT_FILE
    pub font_file: Option<String>,
}
