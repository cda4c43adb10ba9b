//! Anthropic Messages API client.
//!
//! Images travel as base64 `source` blocks inside the single user turn; the
//! instruction prompt goes in the top-level `system` field. Only the first
//! text block of the reply is used — the models in play return exactly one.

use super::{
    classify_status, classify_transport, retry_after_secs, ProviderError, VisionProvider,
    VisionReply, VisionRequest,
};
use crate::error::ExtractError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-5-haiku-20241022";

#[derive(Debug)]
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl AnthropicProvider {
    pub fn new(
        api_key: String,
        model: Option<&str>,
        timeout_secs: u64,
    ) -> Result<Self, ExtractError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ExtractError::Internal(format!("http client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            model: model.unwrap_or(DEFAULT_MODEL).to_string(),
        })
    }

    fn request_body(&self, request: &VisionRequest<'_>) -> serde_json::Value {
        json!({
            "model": self.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "system": request.system_prompt,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": request.image.mime_type,
                            "data": request.image.data,
                        },
                    },
                    { "type": "text", "text": request.user_text },
                ],
            }],
        })
    }
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize, Default)]
struct Usage {
    #[serde(default)]
    input_tokens: usize,
    #[serde(default)]
    output_tokens: usize,
}

#[async_trait]
impl VisionProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: VisionRequest<'_>) -> Result<VisionReply, ProviderError> {
        let response = self
            .client
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&self.request_body(&request))
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_secs(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, retry_after, body));
        }

        let parsed: MessagesResponse = response.json().await.map_err(|e| ProviderError::Api {
            detail: format!("unexpected response shape: {e}"),
        })?;

        let text = parsed
            .content
            .iter()
            .find(|block| block.kind == "text")
            .map(|block| block.text.clone())
            .ok_or_else(|| ProviderError::Api {
                detail: "response contains no text block".into(),
            })?;

        Ok(VisionReply {
            text,
            input_tokens: parsed.usage.input_tokens,
            output_tokens: parsed.usage.output_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::encode::EncodedPage;

    fn provider() -> AnthropicProvider {
        AnthropicProvider::new("sk-test".into(), None, 60).unwrap()
    }

    #[test]
    fn default_model_applied() {
        assert_eq!(provider().model(), DEFAULT_MODEL);
        let custom = AnthropicProvider::new("k".into(), Some("claude-sonnet-4-20250514"), 60).unwrap();
        assert_eq!(custom.model(), "claude-sonnet-4-20250514");
    }

    #[test]
    fn request_body_shape() {
        let page = EncodedPage {
            data: "QUJD".into(),
            mime_type: "image/png",
        };
        let body = provider().request_body(&VisionRequest {
            system_prompt: "extract",
            user_text: "go",
            image: &page,
            temperature: 0.0,
            max_tokens: 512,
        });

        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["system"], "extract");
        assert_eq!(body["max_tokens"], 512);
        let content = &body["messages"][0]["content"];
        assert_eq!(content[0]["type"], "image");
        assert_eq!(content[0]["source"]["media_type"], "image/png");
        assert_eq!(content[0]["source"]["data"], "QUJD");
        assert_eq!(content[1]["text"], "go");
    }

    #[test]
    fn response_parses_text_and_usage() {
        let raw = r#"{
            "content": [{"type": "text", "text": "{\"issuer\": \"A\"}"}],
            "usage": {"input_tokens": 1200, "output_tokens": 80}
        }"#;
        let parsed: MessagesResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.content[0].text, "{\"issuer\": \"A\"}");
        assert_eq!(parsed.usage.input_tokens, 1200);
    }
}
