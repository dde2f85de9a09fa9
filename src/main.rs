use std::path::Path;

use clap::Parser;
use memegen::config::{
    ApiCredentials, ConfigOverrides, Settings, resolve_config, setup_logging,
};
use memegen::constants::{API_KEYS_FILE_NAME, SETTINGS_FILE_NAME};
use memegen::pipeline::MemePipeline;
use tracing::error;

#[tokio::main(flavor = "multi_thread", worker_threads = 32)]
async fn main() {
    let cli = memegen::cli::CliOptions::parse();

    let _ = setup_logging(cli.debug);

    let settings = match Settings::load(Path::new(SETTINGS_FILE_NAME)) {
        Ok(settings) => settings,
        Err(err) => {
            error!("Failed to load settings: {}", err);
            return;
        }
    };

    let keys = match ApiCredentials::load(Path::new(API_KEYS_FILE_NAME)) {
        Ok(keys) => keys,
        Err(err) => {
            error!("Failed to load API keys: {}", err);
            return;
        }
    };
    let keys = keys.with_overrides(cli.openai_key, cli.clipdrop_key, cli.stability_key);

    let overrides = ConfigOverrides {
        image_provider: cli.image_provider,
        output_folder: cli.output_folder,
        font_file: cli.font_file,
        ..Default::default()
    };
    let config = match resolve_config(&settings, &overrides) {
        Ok(config) => config,
        Err(err) => {
            error!("Configuration error: {}", err);
            return;
        }
    };

    // Surface credential and font problems at startup rather than on the
    // first form post.
    if let Err(err) = MemePipeline::new(config.clone(), keys.clone()) {
        error!("Configuration error: {}", err);
        return;
    }

    if let Err(err) = memegen::web::setup_server(&cli.listen_address, cli.port, config, keys).await
    {
        error!("Application error: {}", err);
    }
}
