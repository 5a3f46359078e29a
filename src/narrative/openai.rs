//! OpenAI-compatible chat completion client

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::json;

use super::cost::Usage;
use super::{Generation, TextGenerator};
use crate::config::Settings;
use crate::fetch::http::{build_client, endpoint, read_json};
use crate::AuditError;

const SERVICE: &str = "OpenAI";

pub const TEMPERATURE: f64 = 0.2;

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        if settings.openai_api_key.trim().is_empty() {
            return Err(AuditError::Config("OPENAI_API_KEY is not set".to_string()).into());
        }
        Ok(Self {
            client: build_client(settings.http_timeout_secs)?,
            base_url: settings.openai_base_url.trim().to_string(),
            api_key: settings.openai_api_key.trim().to_string(),
        })
    }
}

impl TextGenerator for OpenAiClient {
    fn generate(&self, model: &str, system: &str, user: &str, max_tokens: u32) -> Result<Generation> {
        let url = endpoint(&self.base_url, &["chat", "completions"])?;
        let body = json!({
            "model": model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "temperature": TEMPERATURE,
            "max_tokens": max_tokens,
        });
        let response = self
            .client
            .post(url.as_str())
            .bearer_auth(&self.api_key)
            .header(CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(&body)?)
            .send()
            .context("chat completion request failed")?;
        let parsed: ChatResponse = read_json(SERVICE, response)?;
        Ok(generation_from(parsed))
    }
}

fn generation_from(response: ChatResponse) -> Generation {
    let text = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .unwrap_or_default();
    Generation { text, usage: response.usage }
}
