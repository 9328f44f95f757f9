use async_trait::async_trait;
use chatmux_core::config::NamingConfig;
use chatmux_core::{Error, Result, TitleNamer};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

const SYSTEM_PROMPT: &str = "You name chat conversations. Reply with a title of at most six \
words for the conversation below. Reply with the title only.";

/// Titles from any OpenAI-compatible chat completions endpoint.
pub struct HttpTitleNamer {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl HttpTitleNamer {
    pub fn new(config: &NamingConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(Error::Config("naming.apiKey is not set".into()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Naming(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

fn parse_title(raw_body: &str) -> Result<String> {
    let parsed: ChatResponse = serde_json::from_str(raw_body)?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| Error::Naming("no title in response".to_string()))
}

#[async_trait]
impl TitleNamer for HttpTitleNamer {
    async fn name(&self, excerpt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.api_base);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Message {
                    role: "user",
                    content: excerpt,
                },
            ],
            max_tokens: 24,
            temperature: 0.2,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Naming(format!("Request failed: {}", e)))?;

        let status = response.status();
        let raw_body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            error!(status = %status, body = %raw_body, "Naming API error");
            return Err(Error::Naming(format!("API error {}: {}", status, raw_body)));
        }
        debug!(chars = excerpt.chars().count(), "Naming response received");
        parse_title(&raw_body)
    }
}
