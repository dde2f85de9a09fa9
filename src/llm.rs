//! Chat Completions call that writes the meme text and image prompt.

use serde::{Deserialize, Serialize};

use crate::constants::OPENAI_CHAT_URL;
use crate::error::MemeError;

/// One turn in the conversation sent to the chat model.
#[derive(Serialize, Debug, Clone)]
pub struct ChatMessage {
    /// Message role: "system" or "user".
    pub role: &'static str,
    /// Message text.
    pub content: String,
}

#[derive(Serialize, Debug)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize, Debug)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize, Debug)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Sends the conversation to the chat model and returns the reply text.
pub async fn request_chat_reply(
    client: &reqwest::Client,
    api_key: &str,
    model: &str,
    messages: &[ChatMessage],
    temperature: f32,
) -> Result<String, MemeError> {
    let req_body = ChatRequest {
        model,
        messages,
        temperature,
    };

    let resp = client
        .post(OPENAI_CHAT_URL)
        .bearer_auth(api_key)
        .json(&req_body)
        .send()
        .await?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(MemeError::ChatApi(format!("HTTP {status}: {body}")));
    }

    let parsed: ChatResponse = resp
        .json()
        .await
        .map_err(|err| MemeError::ChatApi(format!("invalid completion JSON: {err}")))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| MemeError::ChatApi("completion contained no message content".to_string()))
}
