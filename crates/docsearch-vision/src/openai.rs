//! OpenAI-compatible vision client using the `/v1/chat/completions` endpoint.
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use docsearch_core::config::VisionSettings;
use docsearch_core::traits::ImageDescriber;

use crate::VisionError;

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

pub struct OpenAiDescriber {
    client: reqwest::Client,
    api_key: Secret<String>,
    base_url: String,
    model: String,
    prompt: String,
    max_tokens: u32,
}

fn normalize_base_url(url: &str) -> String { url.trim_end_matches('/').to_string() }

fn has_version_suffix(base_url: &str) -> bool {
    let Some(last_segment) = base_url.rsplit('/').next() else {
        return false;
    };
    let Some(rest) = last_segment.strip_prefix('v') else {
        return false;
    };
    !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
}

pub(crate) fn chat_completions_endpoint(base_url: &str) -> String {
    let normalized = normalize_base_url(base_url);
    if normalized.ends_with("/chat/completions") {
        return normalized;
    }
    if has_version_suffix(&normalized) {
        return format!("{normalized}/chat/completions");
    }
    format!("{normalized}/v1/chat/completions")
}

impl OpenAiDescriber {
    pub fn new(api_key: String, settings: &VisionSettings) -> Result<Self, VisionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key: Secret::new(api_key),
            base_url: normalize_base_url(&settings.base_url),
            model: settings.model.clone(),
            prompt: settings.prompt.clone(),
            max_tokens: settings.max_tokens,
        })
    }

    /// Reads the API key from `OPENAI_API_KEY`.
    pub fn from_env(settings: &VisionSettings) -> Result<Self, VisionError> {
        let key = std::env::var(API_KEY_ENV).ok().filter(|k| !k.trim().is_empty()).ok_or(VisionError::MissingApiKey)?;
        Self::new(key, settings)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    ImageUrl { image_url: ImageUrl },
    Text { text: &'a str },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
    detail: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

fn build_request<'a>(model: &'a str, prompt: &'a str, max_tokens: u32, image: &[u8], mime_type: &str) -> ChatRequest<'a> {
    let data_url = format!("data:{mime_type};base64,{}", STANDARD.encode(image));
    ChatRequest {
        model,
        messages: vec![ChatMessage {
            role: "user",
            content: vec![
                ContentPart::ImageUrl { image_url: ImageUrl { url: data_url, detail: "high" } },
                ContentPart::Text { text: prompt },
            ],
        }],
        max_tokens,
    }
}

#[async_trait]
impl ImageDescriber for OpenAiDescriber {
    async fn describe(&self, image: &[u8], mime_type: &str) -> anyhow::Result<String> {
        let req = build_request(&self.model, &self.prompt, self.max_tokens, image, mime_type);
        let resp = self
            .client
            .post(chat_completions_endpoint(&self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&req)
            .send()
            .await?
            .error_for_status()?
            .json::<ChatResponse>()
            .await?;
        resp.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("vision response has no message content"))
    }
}
