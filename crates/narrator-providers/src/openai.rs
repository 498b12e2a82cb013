//! OpenAI Chat Completions vision provider.
//!
//! Sends the photo inline as a base64 `image_url` part to
//! `{base_url}/chat/completions`. Works with any OpenAI-compatible gateway.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use narrator_core::config::Config;
use narrator_core::error::{NarratorError, Result};

use crate::VisionAnalyzer;

const SERVICE: &str = "vision";
const USER_INSTRUCTION: &str = "Narrate this photo.";

pub struct OpenAiVision {
    pub base_url: String,
    model: String,
    max_tokens: u32,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiVision {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            max_tokens,
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Build from the `vision` config section; fails if no API key resolves.
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config
            .vision
            .clone()
            .unwrap_or_default()
            .resolve_api_key()
            .ok_or_else(|| {
                NarratorError::Config(
                    "No vision API key. Set vision.api_key in config or OPENAI_API_KEY.".into(),
                )
            })?;

        Ok(Self::new(
            &config.vision_base_url(),
            api_key,
            config.vision_model(),
            config.vision_max_tokens(),
        ))
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

// --- OpenAI request/response types ---

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<serde_json::Value>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
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

/// Assemble the chat messages: persona as system, prior narrations as
/// assistant turns, then the photo.
fn build_messages(persona: &str, image_b64: &str, history: &[String]) -> Vec<serde_json::Value> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(json!({ "role": "system", "content": persona }));

    for narration in history {
        messages.push(json!({ "role": "assistant", "content": narration }));
    }

    messages.push(json!({
        "role": "user",
        "content": [
            { "type": "text", "text": USER_INSTRUCTION },
            {
                "type": "image_url",
                "image_url": { "url": format!("data:image/png;base64,{image_b64}") }
            }
        ]
    }));
    messages
}

fn extract_text(response: ChatResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| NarratorError::remote(SERVICE, "response contained no text"))
}

#[async_trait]
impl VisionAnalyzer for OpenAiVision {
    fn id(&self) -> &str {
        "openai"
    }

    async fn analyze(
        &self,
        image_png: &[u8],
        persona: &str,
        history: &[String],
    ) -> Result<String> {
        let body = ChatRequest {
            model: self.model.clone(),
            messages: build_messages(persona, &STANDARD.encode(image_png), history),
            max_tokens: self.max_tokens,
        };

        debug!(
            model = %body.model,
            base_url = %self.base_url,
            image_bytes = image_png.len(),
            history = history.len(),
            "Requesting narration"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| NarratorError::remote(SERVICE, e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NarratorError::remote(
                SERVICE,
                format!("OpenAI API error {status}: {body}"),
            ));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| NarratorError::remote(SERVICE, format!("malformed response: {e}")))?;

        extract_text(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn analyze_against(server: &MockServer, response: ResponseTemplate) -> Result<String> {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({ "model": "gpt-4o", "max_tokens": 300 })))
            .respond_with(response)
            .expect(1)
            .mount(server)
            .await;

        let base_url = format!("{}/v1", server.uri());
        let provider = OpenAiVision::new(&base_url, "sk-test", "gpt-4o", 300);
        provider.analyze(b"\x89PNG", "be snarky", &[]).await
    }

    #[tokio::test]
    async fn test_analyze_returns_first_choice() {
        let server = MockServer::start().await;
        let text = analyze_against(
            &server,
            ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "Behold, a mug." } }]
            })),
        )
        .await
        .unwrap();
        assert_eq!(text, "Behold, a mug.");
    }

    #[tokio::test]
    async fn test_api_error_is_remote_error() {
        let server = MockServer::start().await;
        let err = analyze_against(
            &server,
            ResponseTemplate::new(429).set_body_string("rate limit exceeded"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "remote_service");
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("rate limit exceeded"));
    }

    #[tokio::test]
    async fn test_malformed_body_is_remote_error() {
        let server = MockServer::start().await;
        let err = analyze_against(
            &server,
            ResponseTemplate::new(200).set_body_string("<html>gateway timeout</html>"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "remote_service");
        assert!(err.to_string().contains("malformed response"));
    }

    #[test]
    fn test_messages_without_history() {
        let messages = build_messages("be snarky", "AAAA", &[]);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "be snarky");

        let parts = messages[1]["content"].as_array().unwrap();
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(parts[1]["image_url"]["url"], "data:image/png;base64,AAAA");
    }

    #[test]
    fn test_messages_with_history_in_order() {
        let history = vec!["first".to_string(), "second".to_string()];
        let messages = build_messages("p", "AAAA", &history);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[1]["content"], "first");
        assert_eq!(messages[2]["content"], "second");
        assert_eq!(messages[3]["role"], "user");
    }

    #[test]
    fn test_extract_text() {
        let response: ChatResponse = serde_json::from_value(json!({
            "choices": [{ "message": { "role": "assistant", "content": "A wild intern appears." } }]
        }))
        .unwrap();
        assert_eq!(extract_text(response).unwrap(), "A wild intern appears.");
    }

    #[test]
    fn test_extract_text_empty_is_remote_error() {
        let response: ChatResponse = serde_json::from_value(json!({ "choices": [] })).unwrap();
        let err = extract_text(response).unwrap_err();
        assert_eq!(err.kind(), "remote_service");

        let response: ChatResponse = serde_json::from_value(json!({
            "choices": [{ "message": { "content": null } }]
        }))
        .unwrap();
        assert!(extract_text(response).is_err());
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let provider = OpenAiVision::new("https://api.openai.com/v1/", "k", "gpt-4o", 300);
        assert_eq!(provider.base_url, "https://api.openai.com/v1");
        assert_eq!(provider.model(), "gpt-4o");
    }

    #[test]
    fn test_from_config_uses_defaults() {
        let config = Config {
            vision: Some(narrator_core::config::VisionConfig {
                api_key: Some("sk-test".into()),
                ..Default::default()
            }),
            ..Config::default()
        };
        let provider = OpenAiVision::from_config(&config).unwrap();
        assert_eq!(provider.base_url, "https://api.openai.com/v1");
        assert_eq!(provider.model(), "gpt-4o");
        assert_eq!(provider.max_tokens, 300);
    }
}
