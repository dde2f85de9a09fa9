use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use memegen::config::{
    ApiCredentials, ConfigOverrides, Settings, resolve_config, setup_logging,
};
use memegen::constants::{API_KEYS_FILE_NAME, SETTINGS_FILE_NAME};
use memegen::pipeline::{MemeArtifact, MemePipeline};

/// Generate AI memes from the command line.
///
/// Minimal UX:
///   meme_generator --user-prompt "rust memes" --meme-count 3
#[derive(Parser, Debug)]
#[command(name = "meme_generator")]
#[command(version)]
#[command(about = "Generate AI memes: chat-model caption + provider image + caption band")]
struct Args {
    /// Meme subject or concept; prompted for interactively when omitted
    #[arg(long)]
    user_prompt: Option<String>,

    /// Number of memes to create; prompted for interactively when omitted
    #[arg(long)]
    meme_count: Option<u32>,

    /// OpenAI API key; overrides the api_keys.ini value
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_key: Option<String>,

    /// ClipDrop API key; overrides the api_keys.ini value
    #[arg(long, env = "CLIPDROP_API_KEY", hide_env_values = true)]
    clipdrop_key: Option<String>,

    /// Stability AI API key; overrides the api_keys.ini value
    #[arg(long, env = "STABILITY_API_KEY", hide_env_values = true)]
    stability_key: Option<String>,

    /// Image provider to use: openai, stability or clipdrop
    #[arg(long)]
    image_provider: Option<String>,

    /// Sampling temperature for the chat model
    #[arg(long)]
    temperature: Option<f32>,

    /// Overall approach instructions for the chat model
    #[arg(long)]
    basic_instructions: Option<String>,

    /// Style instructions for the image prompt
    #[arg(long)]
    image_special_instructions: Option<String>,

    /// Caption font file, resolved against system font folders
    #[arg(long)]
    font_file: Option<String>,

    /// Directory for generated memes and the log file
    #[arg(long)]
    output_folder: Option<PathBuf>,

    /// Never prompt on stdin; use defaults or other arguments instead
    #[arg(long)]
    no_user_input: bool,

    /// Keep memes in memory only; skip file saving and the log
    #[arg(long)]
    no_file_save: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

/// Prints a prompt and reads one trimmed line from stdin.
fn prompt_line(message: &str) -> Result<String> {
    let mut stdout = io::stdout();
    write!(stdout, "{message}")?;
    stdout.flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

/// Interactive pause so the terminal window stays readable before exit.
fn wait_for_enter(no_user_input: bool) {
    if !no_user_input {
        let _ = prompt_line("\nPress Enter to exit...");
    }
}

fn resolve_topic(args: &Args) -> Result<String> {
    if let Some(topic) = &args.user_prompt {
        return Ok(topic.clone());
    }
    if args.no_user_input {
        return Ok("anything".to_string());
    }
    let entered =
        prompt_line("\nEnter a meme subject or concept (Or just hit enter to let the AI decide)\n >  ")?;
    Ok(if entered.is_empty() {
        "anything".to_string()
    } else {
        entered
    })
}

fn resolve_meme_count(args: &Args) -> Result<u32> {
    if let Some(count) = args.meme_count {
        return Ok(count);
    }
    if args.no_user_input {
        return Ok(1);
    }
    let entered = prompt_line("\nEnter the number of memes to create (Or just hit Enter for 1)\n >  ")?;
    if entered.is_empty() {
        return Ok(1);
    }
    entered
        .parse::<u32>()
        .with_context(|| format!("'{entered}' is not a valid meme count"))
}

async fn run(args: Args) -> Result<Vec<MemeArtifact>> {
    let settings = Settings::load(Path::new(SETTINGS_FILE_NAME))?;
    let keys = ApiCredentials::load(Path::new(API_KEYS_FILE_NAME))?.with_overrides(
        args.openai_key.clone(),
        args.clipdrop_key.clone(),
        args.stability_key.clone(),
    );

    let overrides = ConfigOverrides {
        temperature: args.temperature,
        basic_instructions: args.basic_instructions.clone(),
        image_special_instructions: args.image_special_instructions.clone(),
        image_provider: args.image_provider.clone(),
        font_file: args.font_file.clone(),
        output_folder: args.output_folder.clone(),
        no_file_save: args.no_file_save,
        ..Default::default()
    };
    let config = resolve_config(&settings, &overrides)?;

    // All fatal validation (keys, provider, font) happens here, before the
    // topic prompt and before any network call.
    let pipeline = MemePipeline::new(config, keys)?;

    let topic = resolve_topic(&args)?;
    let meme_count = resolve_meme_count(&args)?;

    println!(
        "\n==================== AI Meme Generator {} ====================",
        env!("CARGO_PKG_VERSION")
    );
    let artifacts = pipeline.run(&topic, meme_count).await?;

    for artifact in &artifacts {
        println!("\n   Meme Text:  {}", artifact.caption_text);
        println!("   Image Prompt:  {}", artifact.image_prompt);
        match &artifact.file_path {
            Some(path) => println!("   Saved: {}", path.display()),
            None => println!("   (file saving disabled)"),
        }
    }

    Ok(artifacts)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let _ = setup_logging(args.debug);
    let no_user_input = args.no_user_input;

    match run(args).await {
        Ok(_) => {
            wait_for_enter(no_user_input);
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("\n  ERROR:  {err:#}");
            wait_for_enter(no_user_input);
            ExitCode::FAILURE
        }
    }
}
