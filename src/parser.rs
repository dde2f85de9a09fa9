//! Parsing of chat model replies into caption text and image prompt.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::MemeError;

/// The two fields extracted from one chat model reply.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CaptionResult {
    /// Text displayed in the caption band at the top of the meme.
    pub caption_text: String,
    /// Prompt handed to the image generation provider.
    pub image_prompt: String,
}

/// The reply must carry a "Meme Text:" line followed by an "Image Prompt:"
/// field which consumes the rest of the reply, newlines included. The caption
/// may be quoted, and any number of blank lines may separate the two fields.
#[allow(clippy::expect_used)] // static pattern, exercised by every test below
static REPLY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)Meme Text: ("(.*?)"|(.*?))\n*\s*Image Prompt: (.*?)$"#)
        .expect("reply pattern is valid")
});

/// Extracts the caption and image prompt from a free-form model reply.
///
/// Returns [`MemeError::MalformedReply`] when the two-field structure is not
/// present; no partial extraction is attempted.
pub fn parse_reply(message: &str) -> Result<CaptionResult, MemeError> {
    let caps = REPLY_PATTERN
        .captures(message)
        .ok_or(MemeError::MalformedReply)?;

    let caption = caps
        .get(2)
        .or_else(|| caps.get(3))
        .map(|m| m.as_str())
        .unwrap_or_default();
    let prompt = caps.get(4).map(|m| m.as_str()).unwrap_or_default();

    Ok(CaptionResult {
        caption_text: caption.to_string(),
        image_prompt: prompt.trim_end().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unquoted_caption() {
        let result =
            parse_reply("Meme Text: when it compiles\nImage Prompt: a happy crab").unwrap();
        assert_eq!(result.caption_text, "when it compiles");
        assert_eq!(result.image_prompt, "a happy crab");
    }

    #[test]
    fn parses_quoted_caption_without_quotes() {
        let result =
            parse_reply("Meme Text: \"when it compiles\"\nImage Prompt: a happy crab").unwrap();
        assert_eq!(result.caption_text, "when it compiles");
        assert_eq!(result.image_prompt, "a happy crab");
    }

    #[test]
    fn tolerates_blank_lines_between_fields() {
        for blanks in ["\n", "\n\n", "\n\n\n", "\n  \n\n"] {
            let message = format!("Meme Text: caption{blanks}Image Prompt: prompt");
            let result = parse_reply(&message).unwrap();
            assert_eq!(result.caption_text, "caption", "separator {blanks:?}");
            assert_eq!(result.image_prompt, "prompt", "separator {blanks:?}");
        }
    }

    #[test]
    fn image_prompt_keeps_embedded_line_breaks() {
        let result = parse_reply(
            "Meme Text: caption\nImage Prompt: a crab,\nphotographed at sunset,\nwide angle",
        )
        .unwrap();
        assert_eq!(
            result.image_prompt,
            "a crab,\nphotographed at sunset,\nwide angle"
        );
    }

    #[test]
    fn ignores_preamble_before_the_fields() {
        let result =
            parse_reply("Sure! Here you go:\nMeme Text: caption\nImage Prompt: prompt").unwrap();
        assert_eq!(result.caption_text, "caption");
    }

    #[test]
    fn missing_image_prompt_is_malformed() {
        let err = parse_reply("Meme Text: caption only").unwrap_err();
        assert!(matches!(err, MemeError::MalformedReply));
    }

    #[test]
    fn missing_meme_text_is_malformed() {
        let err = parse_reply("Image Prompt: prompt only").unwrap_err();
        assert!(matches!(err, MemeError::MalformedReply));
    }

    #[test]
    fn empty_reply_is_malformed() {
        assert!(matches!(parse_reply(""), Err(MemeError::MalformedReply)));
    }
}
