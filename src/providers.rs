//! Image provider gateway.
//!
//! One uniform entry point maps `{provider, prompt}` to raw generated-image
//! bytes; each provider arm owns its own request/response decoding, so adding
//! a provider means adding one arm without touching callers.

use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::ApiCredentials;
use crate::constants::{
    CLIPDROP_TEXT_TO_IMAGE_URL, OPENAI_IMAGES_URL, STABILITY_TEXT_TO_IMAGE_URL,
};
use crate::error::MemeError;

/// The supported image generation providers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ImageProvider {
    /// OpenAI Images API (dall-e-3).
    OpenAi,
    /// Stability AI text-to-image (SDXL engine).
    Stability,
    /// ClipDrop text-to-image.
    Clipdrop,
}

impl ImageProvider {
    /// The lowercase identifier used in settings, CLI flags, and the log.
    pub fn id(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Stability => "stability",
            Self::Clipdrop => "clipdrop",
        }
    }

    /// Human-readable provider name, used in error messages.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::Stability => "Stability AI",
            Self::Clipdrop => "ClipDrop",
        }
    }
}

impl std::fmt::Display for ImageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ImageProvider {
    type Err = MemeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "stability" => Ok(Self::Stability),
            "clipdrop" => Ok(Self::Clipdrop),
            other => Err(MemeError::InvalidImageProvider(other.to_string())),
        }
    }
}

/// An encoded raster image returned by a provider.
#[derive(Clone, Debug)]
pub struct GeneratedImage {
    /// Encoded image bytes, exactly as returned (or decoded from base64).
    pub bytes: Vec<u8>,
    /// Format the provider declares for the bytes.
    pub format: image::ImageFormat,
}

/// Requests an image for the prompt from the selected provider.
///
/// The provider choice has already been validated; a missing key here still
/// fails safe with the matching configuration error.
pub async fn generate_image(
    client: &reqwest::Client,
    keys: &ApiCredentials,
    provider: ImageProvider,
    prompt: &str,
) -> Result<GeneratedImage, MemeError> {
    match provider {
        ImageProvider::OpenAi => {
            let key = keys.openai.as_deref().ok_or(MemeError::MissingOpenAiKey)?;
            openai_image(client, key, prompt).await
        }
        ImageProvider::Stability => {
            let key = keys
                .stability
                .as_deref()
                .ok_or(MemeError::MissingProviderKey(provider.display_name()))?;
            stability_image(client, key, prompt).await
        }
        ImageProvider::Clipdrop => {
            let key = keys
                .clipdrop
                .as_deref()
                .ok_or(MemeError::MissingProviderKey(provider.display_name()))?;
            clipdrop_image(client, key, prompt).await
        }
    }
}

// -----------------------------
// OpenAI Images API
// -----------------------------

/// Request body for POST /v1/images/generations.
#[derive(Serialize, Debug)]
struct OpenAiImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: &'a str,
    response_format: &'a str,
}

#[derive(Deserialize, Debug)]
struct OpenAiImageResponse {
    data: Vec<OpenAiImageData>,
}

#[derive(Deserialize, Debug)]
struct OpenAiImageData {
    b64_json: Option<String>,
}

async fn openai_image(
    client: &reqwest::Client,
    api_key: &str,
    prompt: &str,
) -> Result<GeneratedImage, MemeError> {
    let req_body = OpenAiImageRequest {
        model: "dall-e-3",
        prompt,
        n: 1,
        size: "1024x1024",
        response_format: "b64_json",
    };

    let resp = client
        .post(OPENAI_IMAGES_URL)
        .bearer_auth(api_key)
        .json(&req_body)
        .send()
        .await?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(MemeError::ImageApi {
            status: status.as_u16(),
            body,
        });
    }

    let parsed: OpenAiImageResponse = resp
        .json()
        .await
        .map_err(|err| MemeError::ImageResponse(format!("invalid images JSON: {err}")))?;

    let b64_json = parsed
        .data
        .into_iter()
        .next()
        .and_then(|entry| entry.b64_json)
        .ok_or_else(|| MemeError::ImageResponse("no image data returned".to_string()))?;

    let bytes = general_purpose::STANDARD
        .decode(b64_json)
        .map_err(|err| MemeError::ImageResponse(format!("invalid base64 image data: {err}")))?;

    Ok(GeneratedImage {
        bytes,
        format: image::ImageFormat::Png,
    })
}

// -----------------------------
// Stability AI text-to-image
// -----------------------------

/// Request body for the SDXL text-to-image endpoint. Sampling parameters are
/// fixed; only the prompt varies per request.
#[derive(Serialize, Debug)]
struct StabilityRequest<'a> {
    text_prompts: Vec<StabilityTextPrompt<'a>>,
    cfg_scale: f32,
    steps: u32,
    width: u32,
    height: u32,
    samples: u32,
    sampler: &'a str,
}

#[derive(Serialize, Debug)]
struct StabilityTextPrompt<'a> {
    text: &'a str,
}

#[derive(Deserialize, Debug)]
struct StabilityResponse {
    artifacts: Vec<StabilityArtifact>,
}

#[derive(Deserialize, Debug, Default)]
struct StabilityArtifact {
    #[serde(default)]
    base64: Option<String>,
    #[serde(rename = "finishReason", default)]
    finish_reason: String,
}

async fn stability_image(
    client: &reqwest::Client,
    api_key: &str,
    prompt: &str,
) -> Result<GeneratedImage, MemeError> {
    let req_body = StabilityRequest {
        text_prompts: vec![StabilityTextPrompt { text: prompt }],
        cfg_scale: 7.0,
        steps: 30,
        width: 1024,
        height: 1024,
        samples: 1,
        sampler: "K_DPMPP_2M",
    };

    let resp = client
        .post(STABILITY_TEXT_TO_IMAGE_URL)
        .bearer_auth(api_key)
        .header(reqwest::header::ACCEPT, "application/json")
        .json(&req_body)
        .send()
        .await?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(MemeError::ImageApi {
            status: status.as_u16(),
            body,
        });
    }

    let parsed: StabilityResponse = resp
        .json()
        .await
        .map_err(|err| MemeError::ImageResponse(format!("invalid artifacts JSON: {err}")))?;

    let b64 = select_artifact(parsed.artifacts)?;
    let bytes = general_purpose::STANDARD
        .decode(b64)
        .map_err(|err| MemeError::ImageResponse(format!("invalid base64 artifact: {err}")))?;

    Ok(GeneratedImage {
        bytes,
        format: image::ImageFormat::Png,
    })
}

/// Picks the first artifact that was not stopped by the safety filter.
///
/// All-filtered result sets surface [`MemeError::ContentFiltered`] so the
/// caller treats the iteration as failed.
fn select_artifact(artifacts: Vec<StabilityArtifact>) -> Result<String, MemeError> {
    let mut saw_filtered = false;
    for artifact in artifacts {
        if artifact.finish_reason == "CONTENT_FILTERED" {
            warn!(
                "The image request activated the API's safety filters and could not be processed"
            );
            saw_filtered = true;
            continue;
        }
        if let Some(b64) = artifact.base64 {
            return Ok(b64);
        }
    }
    if saw_filtered {
        Err(MemeError::ContentFiltered)
    } else {
        Err(MemeError::ImageResponse(
            "no image artifacts returned".to_string(),
        ))
    }
}

// -----------------------------
// ClipDrop text-to-image
// -----------------------------

async fn clipdrop_image(
    client: &reqwest::Client,
    api_key: &str,
    prompt: &str,
) -> Result<GeneratedImage, MemeError> {
    let form = reqwest::multipart::Form::new().text("prompt", prompt.to_string());

    let resp = client
        .post(CLIPDROP_TEXT_TO_IMAGE_URL)
        .header("x-api-key", api_key)
        .multipart(form)
        .send()
        .await?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(MemeError::ImageApi {
            status: status.as_u16(),
            body,
        });
    }

    let bytes = resp.bytes().await?;
    Ok(GeneratedImage {
        bytes: bytes.to_vec(),
        format: image::ImageFormat::Png,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_ids_round_trip() {
        for provider in [
            ImageProvider::OpenAi,
            ImageProvider::Stability,
            ImageProvider::Clipdrop,
        ] {
            assert_eq!(ImageProvider::from_str(provider.id()).unwrap(), provider);
        }
        assert_eq!(
            ImageProvider::from_str("OpenAI").unwrap(),
            ImageProvider::OpenAi
        );
    }

    #[test]
    fn unknown_provider_id_is_invalid() {
        let err = ImageProvider::from_str("dalle").unwrap_err();
        assert!(matches!(err, MemeError::InvalidImageProvider(_)));
    }

    #[test]
    fn openai_request_body_shape() {
        let body = OpenAiImageRequest {
            model: "dall-e-3",
            prompt: "a crab",
            n: 1,
            size: "1024x1024",
            response_format: "b64_json",
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["model"], "dall-e-3");
        assert_eq!(value["n"], 1);
        assert_eq!(value["size"], "1024x1024");
        assert_eq!(value["response_format"], "b64_json");
    }

    #[test]
    fn stability_request_uses_fixed_sampling() {
        let body = StabilityRequest {
            text_prompts: vec![StabilityTextPrompt { text: "a crab" }],
            cfg_scale: 7.0,
            steps: 30,
            width: 1024,
            height: 1024,
            samples: 1,
            sampler: "K_DPMPP_2M",
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["text_prompts"][0]["text"], "a crab");
        assert_eq!(value["steps"], 30);
        assert_eq!(value["cfg_scale"], 7.0);
        assert_eq!(value["sampler"], "K_DPMPP_2M");
    }

    #[test]
    fn artifact_selection_skips_filtered_entries() {
        let artifacts = vec![
            StabilityArtifact {
                base64: None,
                finish_reason: "CONTENT_FILTERED".to_string(),
            },
            StabilityArtifact {
                base64: Some("aGVsbG8=".to_string()),
                finish_reason: "SUCCESS".to_string(),
            },
        ];
        assert_eq!(select_artifact(artifacts).unwrap(), "aGVsbG8=");
    }

    #[test]
    fn all_filtered_artifacts_surface_content_filtered() {
        let artifacts = vec![StabilityArtifact {
            base64: Some("aGVsbG8=".to_string()),
            finish_reason: "CONTENT_FILTERED".to_string(),
        }];
        let err = select_artifact(artifacts).unwrap_err();
        assert!(matches!(err, MemeError::ContentFiltered));
    }

    #[test]
    fn empty_artifact_list_is_an_unusable_response() {
        let err = select_artifact(Vec::new()).unwrap_err();
        assert!(matches!(err, MemeError::ImageResponse(_)));
    }
}
