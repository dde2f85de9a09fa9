//! The meme pipeline: startup validation, then a sequential generation loop.
//!
//! Iterations are strictly sequential; no iteration starts until the previous
//! artifact is finalized. File-name selection and log appends rely on that
//! sequencing, so parallelizing the loop would need explicit mutual exclusion
//! around both.

use std::io::Write;
use std::path::{Path, PathBuf};

use ab_glyph::FontVec;
use chrono::Local;
use tracing::info;

use crate::compositor::{self, CompositorOptions};
use crate::config::{ApiCredentials, PipelineConfig};
use crate::constants::{FILE_TIMESTAMP_FORMAT, LOG_FILE_NAME};
use crate::error::MemeError;
use crate::fonts;
use crate::llm::{self, ChatMessage};
use crate::parser;
use crate::providers::{self, ImageProvider};

/// One fully generated meme: image bytes plus the metadata that produced it.
#[derive(Clone, Debug)]
pub struct MemeArtifact {
    /// Caption rendered into the band.
    pub caption_text: String,
    /// Prompt that generated the source image.
    pub image_prompt: String,
    /// Collision-free file name chosen for the artifact.
    pub file_name: String,
    /// On-disk location; `None` when file saving is disabled.
    pub file_path: Option<PathBuf>,
    /// The composited meme, PNG-encoded.
    pub image_bytes: Vec<u8>,
}

/// Assembles the fixed system instruction from the format contract and the
/// two configurable instruction strings.
pub fn build_system_prompt(basic_instructions: &str, image_special_instructions: &str) -> String {
    let format_instructions = "You are a meme generator with the following formatting \
        instructions. Each meme will consist of text that will appear at the top, and an image \
        to go along with it. The user will send you a message with a general theme or concept \
        on which you will base the meme. The user may choose to send you a text saying \
        something like \"anything\" or \"whatever you want\", or even no text at all, which \
        you should not take literally, but take to mean they wish for you to come up with \
        something yourself. The memes don't necessarily need to start with \"when\", but they \
        can. In any case, you will respond with two things: First, the text of the meme that \
        will be displayed in the final meme. Second, some text that will be used as an image \
        prompt for an AI image generator to generate an image to also be used as part of the \
        meme. You must respond only in the format as described next, because your response \
        will be parsed, so it is important it conforms to the format. The first line of your \
        response should be: \"Meme Text: \" followed by the meme text. The second line of \
        your response should be: \"Image Prompt: \" followed by the image prompt text. --- \
        Now here are additional instructions... ";
    let basic_append = format!(
        "Next are instructions for the overall approach you should take to creating the memes. \
         Interpret as best as possible: {basic_instructions} | "
    );
    let special_append = format!(
        "Next are any special instructions for the image prompt. For example, if the \
         instructions are \"the images should be photographic style\", your prompt may append \
         \", photograph\" at the end, or begin with \"photograph of\". It does not have to \
         literally match the instruction but interpret as best as possible: \
         {image_special_instructions}"
    );

    format!("{format_instructions}{basic_append}{special_append}")
}

/// Rejects credential combinations that cannot complete a run.
///
/// The OpenAI key is always required; providers that need their own key fail
/// here, before any network call.
fn validate_credentials(keys: &ApiCredentials, provider: ImageProvider) -> Result<(), MemeError> {
    if keys.openai.is_none() {
        return Err(MemeError::MissingOpenAiKey);
    }
    match provider {
        ImageProvider::Stability if keys.stability.is_none() => {
            Err(MemeError::MissingProviderKey(provider.display_name()))
        }
        ImageProvider::Clipdrop if keys.clipdrop.is_none() => {
            Err(MemeError::MissingProviderKey(provider.display_name()))
        }
        _ => Ok(()),
    }
}

/// A validated pipeline, ready to generate memes.
///
/// Construction performs every fatal configuration check, font resolution
/// and loading included, so `run` only fails on upstream or I/O errors.
pub struct MemePipeline {
    config: PipelineConfig,
    keys: ApiCredentials,
    font: FontVec,
    system_prompt: String,
    client: reqwest::Client,
}

impl MemePipeline {
    /// Validates credentials and resolves the caption font.
    pub fn new(config: PipelineConfig, keys: ApiCredentials) -> Result<Self, MemeError> {
        validate_credentials(&keys, config.image_provider)?;
        let font = fonts::load_font(&config.font_file)?;
        let system_prompt =
            build_system_prompt(&config.basic_instructions, &config.image_special_instructions);
        Ok(Self {
            config,
            keys,
            font,
            system_prompt,
            client: reqwest::Client::new(),
        })
    }

    /// The configuration this pipeline was validated against.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Generates `meme_count` memes for the topic, sequentially.
    ///
    /// The first failed iteration aborts the whole run; completed artifacts
    /// are not returned in that case.
    pub async fn run(&self, topic: &str, meme_count: u32) -> Result<Vec<MemeArtifact>, MemeError> {
        let mut artifacts = Vec::with_capacity(meme_count as usize);
        for n in 1..=meme_count {
            info!("Generating meme {n} of {meme_count}");
            artifacts.push(self.generate_one(topic).await?);
        }
        if !self.config.no_file_save {
            info!(
                "Finished. Output directory: {}",
                self.config.output_folder.display()
            );
        }
        Ok(artifacts)
    }

    async fn generate_one(&self, topic: &str) -> Result<MemeArtifact, MemeError> {
        let messages = [
            ChatMessage {
                role: "system",
                content: self.system_prompt.clone(),
            },
            ChatMessage {
                role: "user",
                content: topic.to_string(),
            },
        ];

        info!("Sending request to write meme...");
        let api_key = self.keys.openai.as_deref().ok_or(MemeError::MissingOpenAiKey)?;
        let reply = llm::request_chat_reply(
            &self.client,
            api_key,
            &self.config.text_model,
            &messages,
            self.config.temperature,
        )
        .await?;

        let caption = parser::parse_reply(&reply)?;
        info!("Meme text: {}", caption.caption_text);
        info!("Image prompt: {}", caption.image_prompt);

        info!("Sending image creation request...");
        let generated = providers::generate_image(
            &self.client,
            &self.keys,
            self.config.image_provider,
            &caption.image_prompt,
        )
        .await?;

        let meme = compositor::compose_meme(
            &generated.bytes,
            &caption.caption_text,
            &self.font,
            &CompositorOptions::default(),
        )?;

        let timestamp = Local::now().format(FILE_TIMESTAMP_FORMAT).to_string();
        let file_name = next_file_name(
            &self.config.output_folder,
            &self.config.base_file_name,
            &timestamp,
        )?;

        let file_path = if self.config.no_file_save {
            None
        } else {
            std::fs::create_dir_all(&self.config.output_folder)?;
            let path = self.config.output_folder.join(&file_name);
            std::fs::write(&path, &meme.png_bytes)?;
            append_log_record(
                &self.config.output_folder,
                &file_name,
                &self.config,
                topic,
                &caption.caption_text,
                &caption.image_prompt,
            )?;
            info!("Saved: {}", path.display());
            Some(path)
        };

        Ok(MemeArtifact {
            caption_text: caption.caption_text,
            image_prompt: caption.image_prompt,
            file_name,
            file_path,
            image_bytes: meme.png_bytes,
        })
    }
}

/// Chooses `{base}_{timestamp}_{n}.png` where `n` is the smallest positive
/// counter not already used for that base name and timestamp in the
/// directory.
fn next_file_name(
    output_dir: &Path,
    base_name: &str,
    timestamp: &str,
) -> Result<String, MemeError> {
    let prefix = format!("{base_name}_{timestamp}_");
    let mut used = std::collections::HashSet::new();
    match std::fs::read_dir(output_dir) {
        Ok(entries) => {
            for entry in entries.flatten() {
                let name = entry.file_name();
                let Some(name) = name.to_str() else { continue };
                if let Some(rest) = name.strip_prefix(&prefix)
                    && let Some(counter) = rest.strip_suffix(".png")
                    && let Ok(counter) = counter.parse::<u32>()
                {
                    used.insert(counter);
                }
            }
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(err.into()),
    }
    let counter = (1..).find(|n| !used.contains(n)).unwrap_or(1);
    Ok(format!("{prefix}{counter}.png"))
}

/// Appends one human-readable multi-field record to the shared log file.
fn append_log_record(
    output_dir: &Path,
    file_name: &str,
    config: &PipelineConfig,
    topic: &str,
    caption_text: &str,
    image_prompt: &str,
) -> Result<(), MemeError> {
    let record = format!(
        "\nMeme File Name: {file_name}\n\
         AI Basic Instructions: {}\n\
         AI Special Image Instructions: {}\n\
         User Prompt: '{topic}'\n\
         Chat Bot Meme Text: {caption_text}\n\
         Chat Bot Image Prompt: {image_prompt}\n\
         Image Generation Platform: {}\n\n",
        config.basic_instructions,
        config.image_special_instructions,
        config.image_provider,
    );
    let mut log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(output_dir.join(LOG_FILE_NAME))?;
    log_file.write_all(record.as_bytes())?;
    Ok(())
}
