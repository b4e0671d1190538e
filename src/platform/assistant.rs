use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{traits::Assistant, PlatformError};

const SYSTEM_PROMPT: &str = "You are the chat bot of a hackerspace. Someone sent a command you do not know. \
Answer briefly and with humour, in the language of the question.";

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatAnswer,
}

#[derive(Deserialize)]
struct ChatAnswer {
    content: String,
}

/// OpenAI-compatible chat completions client.
#[derive(Clone)]
pub struct AssistantClient {
    client: Client,
    endpoint: Url,
    token: Option<String>,
    model: String,
}

impl AssistantClient {
    pub fn new(client: Client, api_url: &str, token: Option<String>, model: &str) -> Result<Self, PlatformError> {
        info!("Initializing assistant client with model {}", model);

        let base = Url::parse(&format!("{}/", api_url.trim_end_matches('/')))?;

        Ok(Self {
            client,
            endpoint: base.join("chat/completions")?,
            token,
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl Assistant for AssistantClient {
    async fn ask(&self, prompt: &str) -> Result<String, PlatformError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        let mut builder = self.client.post(self.endpoint.clone()).json(&request);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?.error_for_status()?;
        let answer = response
            .json::<ChatResponse>()
            .await
            .map_err(|e| PlatformError::InvalidResponse(e.to_string()))?;

        answer
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| PlatformError::InvalidResponse("Assistant returned no answer".to_string()))
    }
}
