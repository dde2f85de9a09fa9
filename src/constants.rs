//! Shared constants and built-in defaults
//!

/// Default chat model used to write the meme text and image prompt.
pub const DEFAULT_TEXT_MODEL: &str = "gpt-4";

/// Default sampling temperature for the chat model.
pub const DEFAULT_TEMPERATURE: f32 = 1.0;

/// Default overall approach instructions for the chat model.
pub const DEFAULT_BASIC_INSTRUCTIONS: &str =
    "You will create funny memes that are clever and original, and not cliche or lame.";

/// Default style instructions applied to the image prompt.
pub const DEFAULT_IMAGE_SPECIAL_INSTRUCTIONS: &str = "The images should be photographic.";

/// Default font file used for the caption band.
pub const DEFAULT_FONT_FILE: &str = "arial.ttf";

/// Default base name for generated meme files.
pub const DEFAULT_BASE_FILE_NAME: &str = "meme";

/// Default output directory for generated memes and the log file.
pub const DEFAULT_OUTPUT_FOLDER: &str = "Outputs";

/// Name of the shared append-only log file in the output directory.
pub const LOG_FILE_NAME: &str = "log.txt";

/// Timestamp format used in generated file names.
pub const FILE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M";

/// OpenAI Chat Completions endpoint.
pub const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI Images endpoint.
pub const OPENAI_IMAGES_URL: &str = "https://api.openai.com/v1/images/generations";

/// Stability AI text-to-image endpoint for the pinned engine.
pub const STABILITY_TEXT_TO_IMAGE_URL: &str =
    "https://api.stability.ai/v1/generation/stable-diffusion-xl-1024-v0-9/text-to-image";

/// ClipDrop text-to-image endpoint.
pub const CLIPDROP_TEXT_TO_IMAGE_URL: &str = "https://clipdrop-api.co/text-to-image/v1";

/// Floor for the caption font size, as a fraction of image width.
pub const DEFAULT_MIN_SCALE: f32 = 0.05;

/// Caption band buffer, as a fraction of image width.
pub const DEFAULT_BUFFER_SCALE: f32 = 0.03;

/// Starting caption font size, as a fraction of image width.
pub const DEFAULT_FONT_SCALE: f32 = 1.0;

/// Cache-Control value for generated meme responses. Files are immutable
/// once written, so clients may cache them for a day.
pub const MEME_CACHE_CONTROL: &str = "public, max-age=86400";

/// Settings file consulted next to the working directory.
pub const SETTINGS_FILE_NAME: &str = "settings.ini";

/// API key file consulted next to the working directory.
pub const API_KEYS_FILE_NAME: &str = "api_keys.ini";
