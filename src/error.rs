//! Error handling

use axum::response::IntoResponse;
use tracing::error;

/// Definitions for everything that can go wrong while generating memes.
#[derive(Debug)]
pub enum MemeError {
    /// No OpenAI API key was configured; it is required for every run.
    MissingOpenAiKey,
    /// The selected image provider needs a key that was not configured.
    MissingProviderKey(&'static str),
    /// The configured image provider id is not one of the supported set.
    InvalidImageProvider(String),
    /// The caption font file could not be found locally or in system font dirs.
    FontNotFound(String),
    /// The font file was found but could not be parsed as a font.
    InvalidFont(String),
    /// The chat model reply did not contain the two required labeled fields.
    MalformedReply,
    /// Every artifact returned by the image provider was content-filtered.
    ContentFiltered,
    /// The chat completion call failed or returned an unusable shape.
    ChatApi(String),
    /// An image provider returned a non-success HTTP status.
    ImageApi {
        /// HTTP status code returned by the provider.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },
    /// An image provider responded with a shape we could not decode.
    ImageResponse(String),
    /// A network request could not be sent or read.
    Request(reqwest::Error),
    /// Encoding or decoding an image failed.
    Image(image::ImageError),
    /// Filesystem operations on the output directory or log file failed.
    Io(std::io::Error),
}

impl std::fmt::Display for MemeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingOpenAiKey => write!(
                f,
                "No OpenAI API key found. An OpenAI API key is required to generate the meme \
                 text and image prompt. Add your key to the api_keys.ini file."
            ),
            Self::MissingProviderKey(platform) => write!(
                f,
                "{platform} was set as the image provider, but no {platform} API key was found \
                 in the api_keys.ini file."
            ),
            Self::InvalidImageProvider(given) => write!(
                f,
                "Invalid image provider '{given}'. Valid image providers are: openai, stability, \
                 clipdrop"
            ),
            Self::FontNotFound(font_file) => write!(
                f,
                "Font file \"{font_file}\" not found. Add the font file to the working \
                 directory, or set the font setting to the name of a font file in the system \
                 font folder."
            ),
            Self::InvalidFont(font_file) => {
                write!(f, "Font file \"{font_file}\" could not be parsed as a font")
            }
            Self::MalformedReply => write!(
                f,
                "The chat model reply did not match the expected 'Meme Text:' / 'Image Prompt:' \
                 format"
            ),
            Self::ContentFiltered => write!(
                f,
                "The image request activated the provider's safety filters and could not be \
                 processed. Modify the prompt and try again."
            ),
            Self::ChatApi(message) => write!(f, "Chat completion failed: {message}"),
            Self::ImageApi { status, body } => {
                write!(f, "Image provider returned HTTP {status}: {body}")
            }
            Self::ImageResponse(message) => {
                write!(f, "Image provider returned an unusable response: {message}")
            }
            Self::Request(err) => write!(f, "Request failed: {err}"),
            Self::Image(err) => write!(f, "Image processing failed: {err}"),
            Self::Io(err) => write!(f, "File operation failed: {err}"),
        }
    }
}

impl std::error::Error for MemeError {}

impl From<reqwest::Error> for MemeError {
    fn from(err: reqwest::Error) -> Self {
        MemeError::Request(err)
    }
}

impl From<image::ImageError> for MemeError {
    fn from(err: image::ImageError) -> Self {
        MemeError::Image(err)
    }
}

impl From<std::io::Error> for MemeError {
    fn from(err: std::io::Error) -> Self {
        MemeError::Io(err)
    }
}

impl IntoResponse for MemeError {
    fn into_response(self) -> axum::response::Response {
        error!("Meme generation failed: {}", self);
        let status = match self {
            MemeError::MissingOpenAiKey
            | MemeError::MissingProviderKey(_)
            | MemeError::InvalidImageProvider(_)
            | MemeError::FontNotFound(_)
            | MemeError::InvalidFont(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            _ => axum::http::StatusCode::BAD_GATEWAY,
        };
        let mut response =
            axum::response::Response::new(axum::body::Body::from(format!("ERROR: {}", self)));
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_carry_remediation_hints() {
        assert!(
            MemeError::MissingOpenAiKey
                .to_string()
                .contains("api_keys.ini")
        );
        assert!(
            MemeError::MissingProviderKey("ClipDrop")
                .to_string()
                .contains("ClipDrop")
        );
        let display = MemeError::InvalidImageProvider("dalle".to_string()).to_string();
        assert!(display.contains("dalle"));
        assert!(display.contains("openai, stability, clipdrop"));
        assert!(
            MemeError::FontNotFound("arial.ttf".to_string())
                .to_string()
                .contains("arial.ttf")
        );
    }
}
