//! Config handling: logging setup, the key-value settings and API key files,
//! and assembly of the immutable per-run pipeline configuration.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::log::LevelFilter;
use tracing::{info, warn};

use crate::constants::{
    DEFAULT_BASE_FILE_NAME, DEFAULT_BASIC_INSTRUCTIONS, DEFAULT_FONT_FILE,
    DEFAULT_IMAGE_SPECIAL_INSTRUCTIONS, DEFAULT_OUTPUT_FOLDER, DEFAULT_TEMPERATURE,
    DEFAULT_TEXT_MODEL,
};
use crate::error::MemeError;
use crate::providers::ImageProvider;

/// Bundled template written out when no settings file exists yet.
const DEFAULT_SETTINGS_TEMPLATE: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/assets/settings_default.ini"));

/// Bundled template written out when no API key file exists yet.
const EMPTY_API_KEYS_TEMPLATE: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/assets/api_keys_empty.ini"));

/// Sets up logging based on the debug flag
pub fn setup_logging(debug: bool) -> Result<(), Box<std::io::Error>> {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut logger = simple_logger::SimpleLogger::new().with_level(level);
    if !debug {
        logger = logger
            .with_module_level("tracing", LevelFilter::Warn)
            .with_module_level("rustls", LevelFilter::Info)
            .with_module_level("hyper_util", LevelFilter::Info)
            .with_module_level("h2", LevelFilter::Info);
    }
    logger.init().map_err(|err| {
        eprintln!("Failed to initialize logger: {}", err);
        Box::new(std::io::Error::other(err))
    })
}

/// One value from a key-value config file.
///
/// `"true"`/`"false"` (case-insensitive, optionally quoted) are coerced to
/// booleans; everything else stays a string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SettingValue {
    /// A coerced boolean value.
    Bool(bool),
    /// Any other value, quotes stripped.
    Text(String),
}

impl SettingValue {
    fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            Self::Text(_) => None,
        }
    }

    fn as_text(&self) -> Option<&str> {
        match self {
            Self::Bool(_) => None,
            Self::Text(value) => Some(value.as_str()),
        }
    }
}

/// Parses an ini-style key-value file: section headers and comment lines are
/// skipped, surrounding quotes are stripped, boolean-looking values coerced.
pub fn parse_key_values(contents: &str) -> HashMap<String, SettingValue> {
    let mut values = HashMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') || line.starts_with('[')
        {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim().to_string();
        let value = strip_quotes(value.trim());
        let parsed = if value.eq_ignore_ascii_case("true") {
            SettingValue::Bool(true)
        } else if value.eq_ignore_ascii_case("false") {
            SettingValue::Bool(false)
        } else {
            SettingValue::Text(value.to_string())
        };
        values.insert(key, parsed);
    }
    values
}

fn strip_quotes(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .or_else(|| {
            value
                .strip_prefix('\'')
                .and_then(|rest| rest.strip_suffix('\''))
        })
        .unwrap_or(value)
}

/// Typed view over the recognized settings file options.
#[derive(Clone, Debug, Default)]
pub struct Settings {
    /// Master toggle; the other options only apply when this is true.
    pub use_this_config: bool,
    /// Chat model id.
    pub text_model: Option<String>,
    /// Chat sampling temperature.
    pub temperature: Option<f32>,
    /// Overall approach instructions for the chat model.
    pub basic_instructions: Option<String>,
    /// Style instructions for the image prompt.
    pub image_special_instructions: Option<String>,
    /// Image provider id.
    pub image_platform: Option<String>,
    /// Caption font file name.
    pub font_file: Option<String>,
    /// Base name for generated files.
    pub base_file_name: Option<String>,
    /// Output directory for memes and the log file.
    pub output_folder: Option<String>,
    /// Release channel; parsed and retained, drives no behavior.
    pub release_channel: Option<String>,
}

impl Settings {
    /// Builds settings from file contents.
    pub fn from_contents(contents: &str) -> Self {
        let values = parse_key_values(contents);
        let text = |key: &str| {
            values
                .get(key)
                .and_then(SettingValue::as_text)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        let temperature = values.get("Temperature").and_then(|value| match value {
            SettingValue::Text(raw) => match raw.parse::<f32>() {
                Ok(parsed) => Some(parsed),
                Err(_) => {
                    warn!("Ignoring unparsable Temperature setting: {raw:?}");
                    None
                }
            },
            SettingValue::Bool(_) => None,
        });

        Self {
            use_this_config: values
                .get("Use_This_Config")
                .and_then(SettingValue::as_bool)
                .unwrap_or(false),
            text_model: text("Text_Model"),
            temperature,
            basic_instructions: text("Basic_Instructions"),
            image_special_instructions: text("Image_Special_Instructions"),
            image_platform: text("Image_Platform"),
            font_file: text("Font_File"),
            base_file_name: text("Base_File_Name"),
            output_folder: text("Output_Folder"),
            release_channel: text("Release_Channel"),
        }
    }

    /// Loads the settings file, creating it from the bundled template on
    /// first run. An unreadable file falls back to the bundled defaults.
    pub fn load(path: &Path) -> Result<Self, MemeError> {
        if ensure_file_from_template(path, DEFAULT_SETTINGS_TEMPLATE)? {
            info!(
                "Settings file not found, so a default {} was created",
                path.display()
            );
        }
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(Self::from_contents(&contents)),
            Err(err) => {
                warn!(
                    "Could not read {}: {}. Using default settings instead.",
                    path.display(),
                    err
                );
                Ok(Self::from_contents(DEFAULT_SETTINGS_TEMPLATE))
            }
        }
    }
}

/// API keys for the chat model provider and the image providers.
///
/// Values are secrets; the `Debug` impl only reports whether each is set.
#[derive(Clone, Default)]
pub struct ApiCredentials {
    /// OpenAI key, required for every run.
    pub openai: Option<String>,
    /// ClipDrop key, required when ClipDrop is the image provider.
    pub clipdrop: Option<String>,
    /// Stability AI key, required when Stability is the image provider.
    pub stability: Option<String>,
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn mask(value: &Option<String>) -> &'static str {
            match value {
                Some(_) => "<set>",
                None => "<unset>",
            }
        }
        f.debug_struct("ApiCredentials")
            .field("openai", &mask(&self.openai))
            .field("clipdrop", &mask(&self.clipdrop))
            .field("stability", &mask(&self.stability))
            .finish()
    }
}

impl ApiCredentials {
    /// Builds credentials from key file contents; empty values count as unset.
    pub fn from_contents(contents: &str) -> Self {
        let values = parse_key_values(contents);
        let key = |name: &str| {
            values
                .get(name)
                .and_then(SettingValue::as_text)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        Self {
            openai: key("OpenAI"),
            clipdrop: key("ClipDrop"),
            stability: key("StabilityAI"),
        }
    }

    /// Loads the API key file, creating an empty template on first run.
    pub fn load(path: &Path) -> Result<Self, MemeError> {
        if ensure_file_from_template(path, EMPTY_API_KEYS_TEMPLATE)? {
            info!(
                "Because this is the first run, {} was created. Add your API keys to it.",
                path.display()
            );
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(Self::from_contents(&contents))
    }

    /// Applies explicit key arguments, which take precedence over the file.
    pub fn with_overrides(
        self,
        openai: Option<String>,
        clipdrop: Option<String>,
        stability: Option<String>,
    ) -> Self {
        Self {
            openai: openai.filter(|key| !key.is_empty()).or(self.openai),
            clipdrop: clipdrop.filter(|key| !key.is_empty()).or(self.clipdrop),
            stability: stability.filter(|key| !key.is_empty()).or(self.stability),
        }
    }
}

/// Immutable configuration for one pipeline run.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Chat model id used to write the caption and image prompt.
    pub text_model: String,
    /// Chat sampling temperature.
    pub temperature: f32,
    /// Overall approach instructions for the chat model.
    pub basic_instructions: String,
    /// Style instructions for the image prompt.
    pub image_special_instructions: String,
    /// Which image provider to use.
    pub image_provider: ImageProvider,
    /// Caption font file reference, resolved at pipeline construction.
    pub font_file: String,
    /// Base name for generated files.
    pub base_file_name: String,
    /// Output directory for memes and the log file.
    pub output_folder: PathBuf,
    /// When set, artifacts are only returned in memory and nothing is logged.
    pub no_file_save: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            basic_instructions: DEFAULT_BASIC_INSTRUCTIONS.to_string(),
            image_special_instructions: DEFAULT_IMAGE_SPECIAL_INSTRUCTIONS.to_string(),
            image_provider: ImageProvider::OpenAi,
            font_file: DEFAULT_FONT_FILE.to_string(),
            base_file_name: DEFAULT_BASE_FILE_NAME.to_string(),
            output_folder: PathBuf::from(DEFAULT_OUTPUT_FOLDER),
            no_file_save: false,
        }
    }
}

/// Caller-supplied overrides, applied on top of settings-derived values.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Chat model id.
    pub text_model: Option<String>,
    /// Chat sampling temperature.
    pub temperature: Option<f32>,
    /// Overall approach instructions.
    pub basic_instructions: Option<String>,
    /// Image style instructions.
    pub image_special_instructions: Option<String>,
    /// Image provider id, validated during resolution.
    pub image_provider: Option<String>,
    /// Caption font file reference.
    pub font_file: Option<String>,
    /// Base name for generated files.
    pub base_file_name: Option<String>,
    /// Output directory.
    pub output_folder: Option<PathBuf>,
    /// Disable file saving and logging.
    pub no_file_save: bool,
}

/// Assembles the pipeline configuration through the precedence chain:
/// caller overrides beat the settings file (which only applies when its
/// master toggle is on), which beats the built-in defaults.
///
/// An unrecognized provider id is rejected here so it can never reach
/// request time.
pub fn resolve_config(
    settings: &Settings,
    overrides: &ConfigOverrides,
) -> Result<PipelineConfig, MemeError> {
    let mut config = PipelineConfig::default();

    if settings.use_this_config {
        let s = settings;
        apply_text(&mut config.text_model, &s.text_model);
        if let Some(temperature) = s.temperature {
            config.temperature = temperature;
        }
        apply_text(&mut config.basic_instructions, &s.basic_instructions);
        apply_text(
            &mut config.image_special_instructions,
            &s.image_special_instructions,
        );
        if let Some(platform) = &s.image_platform {
            config.image_provider = ImageProvider::from_str(platform)?;
        }
        apply_text(&mut config.font_file, &s.font_file);
        apply_text(&mut config.base_file_name, &s.base_file_name);
        if let Some(folder) = &s.output_folder {
            config.output_folder = PathBuf::from(folder);
        }
    }

    let o = overrides;
    apply_text(&mut config.text_model, &o.text_model);
    if let Some(temperature) = o.temperature {
        config.temperature = temperature;
    }
    apply_text(&mut config.basic_instructions, &o.basic_instructions);
    apply_text(
        &mut config.image_special_instructions,
        &o.image_special_instructions,
    );
    if let Some(platform) = &o.image_provider {
        config.image_provider = ImageProvider::from_str(platform)?;
    }
    apply_text(&mut config.font_file, &o.font_file);
    apply_text(&mut config.base_file_name, &o.base_file_name);
    if let Some(folder) = &o.output_folder {
        config.output_folder = folder.clone();
    }
    if o.no_file_save {
        config.no_file_save = true;
    }

    Ok(config)
}

fn apply_text(target: &mut String, source: &Option<String>) {
    if let Some(value) = source {
        *target = value.clone();
    }
}

/// Writes the template to `path` if nothing exists there yet.
///
/// Returns true when the file was created.
fn ensure_file_from_template(path: &Path, template: &str) -> Result<bool, MemeError> {
    if path.is_file() {
        return Ok(false);
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, template)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_values_coerce_booleans_and_strip_quotes() {
        let values = parse_key_values(
            "[Settings]\n# comment\n; other comment\nUse_This_Config = TRUE\n\
             Font_File = \"impact.ttf\"\nBase_File_Name = 'meme'\nTemperature = 0.7\n",
        );
        assert_eq!(
            values.get("Use_This_Config"),
            Some(&SettingValue::Bool(true))
        );
        assert_eq!(
            values.get("Font_File"),
            Some(&SettingValue::Text("impact.ttf".to_string()))
        );
        assert_eq!(
            values.get("Base_File_Name"),
            Some(&SettingValue::Text("meme".to_string()))
        );
        assert_eq!(
            values.get("Temperature"),
            Some(&SettingValue::Text("0.7".to_string()))
        );
        assert!(!values.contains_key("# comment"));
    }

    #[test]
    fn quoted_false_still_coerces() {
        let values = parse_key_values("NoFileSave = \"False\"\n");
        assert_eq!(values.get("NoFileSave"), Some(&SettingValue::Bool(false)));
    }

    #[test]
    fn settings_ignore_unparsable_temperature() {
        let settings = Settings::from_contents("Use_This_Config = true\nTemperature = warm\n");
        assert!(settings.use_this_config);
        assert_eq!(settings.temperature, None);
    }

    #[test]
    fn settings_file_is_ignored_without_master_toggle() {
        let settings = Settings::from_contents("Text_Model = gpt-oss\n");
        let config = resolve_config(&settings, &ConfigOverrides::default()).expect("resolve");
        assert_eq!(config.text_model, DEFAULT_TEXT_MODEL);
    }

    #[test]
    fn overrides_beat_settings_beat_defaults() {
        let settings = Settings::from_contents(
            "Use_This_Config = true\nText_Model = settings-model\nBase_File_Name = from_settings\n",
        );
        let overrides = ConfigOverrides {
            text_model: Some("override-model".to_string()),
            ..Default::default()
        };
        let config = resolve_config(&settings, &overrides).expect("resolve");
        assert_eq!(config.text_model, "override-model");
        assert_eq!(config.base_file_name, "from_settings");
        assert_eq!(config.font_file, DEFAULT_FONT_FILE);
    }

    #[test]
    fn unknown_provider_is_rejected_during_resolution() {
        let overrides = ConfigOverrides {
            image_provider: Some("dalle".to_string()),
            ..Default::default()
        };
        let err = resolve_config(&Settings::default(), &overrides).unwrap_err();
        assert!(matches!(err, MemeError::InvalidImageProvider(_)));
    }

    #[test]
    fn credentials_treat_empty_values_as_unset() {
        let keys = ApiCredentials::from_contents("OpenAI = sk-123\nClipDrop =\nStabilityAI = ''\n");
        assert_eq!(keys.openai.as_deref(), Some("sk-123"));
        assert_eq!(keys.clipdrop, None);
        assert_eq!(keys.stability, None);
    }

    #[test]
    fn credential_overrides_take_precedence() {
        let keys = ApiCredentials::from_contents("OpenAI = from-file\n")
            .with_overrides(Some("from-arg".to_string()), None, Some(String::new()));
        assert_eq!(keys.openai.as_deref(), Some("from-arg"));
        assert_eq!(keys.stability, None);
    }

    #[test]
    fn credentials_debug_never_prints_key_material() {
        let keys = ApiCredentials::from_contents("OpenAI = sk-secret-123\n");
        let debug = format!("{keys:?}");
        assert!(!debug.contains("sk-secret-123"));
        assert!(debug.contains("<set>"));
    }

    #[test]
    fn missing_settings_file_is_created_from_template() {
        let dir = tempfile::tempdir().expect("create tempdir");
        let path = dir.path().join("settings.ini");
        let settings = Settings::load(&path).expect("load settings");
        assert!(path.is_file());
        // The bundled template ships with the config toggle off.
        assert!(!settings.use_this_config);
    }

    #[test]
    fn missing_key_file_is_created_from_template() {
        let dir = tempfile::tempdir().expect("create tempdir");
        let path = dir.path().join("api_keys.ini");
        let keys = ApiCredentials::load(&path).expect("load keys");
        assert!(path.is_file());
        assert_eq!(keys.openai, None);
    }
}
