//! OpenAI-compatible chat-completions client.
//!
//! One implementation serves every endpoint speaking the OpenAI wire format —
//! OpenAI itself, Groq, and self-hosted gateways. Images travel as base64
//! data URLs in the user turn, and `response_format: json_object` nudges the
//! model towards bare JSON (the parser still tolerates fenced output from
//! endpoints that ignore it).

use super::{
    classify_status, classify_transport, retry_after_secs, ProviderError, VisionProvider,
    VisionReply, VisionRequest,
};
use crate::error::ExtractError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";

const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
const GROQ_DEFAULT_MODEL: &str = "meta-llama/llama-4-maverick-17b-128e-instruct";

#[derive(Debug)]
pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    name: String,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiCompatProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: String,
        model: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, ExtractError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ExtractError::Internal(format!("http client: {e}")))?;

        Ok(Self {
            client,
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        })
    }

    pub fn openai(
        api_key: String,
        model: Option<&str>,
        timeout_secs: u64,
    ) -> Result<Self, ExtractError> {
        Self::new(
            "openai",
            OPENAI_BASE_URL,
            api_key,
            model.unwrap_or(OPENAI_DEFAULT_MODEL),
            timeout_secs,
        )
    }

    pub fn groq(
        api_key: String,
        model: Option<&str>,
        timeout_secs: u64,
    ) -> Result<Self, ExtractError> {
        Self::new(
            "groq",
            GROQ_BASE_URL,
            api_key,
            model.unwrap_or(GROQ_DEFAULT_MODEL),
            timeout_secs,
        )
    }

    fn request_body(&self, request: &VisionRequest<'_>) -> serde_json::Value {
        json!({
            "model": self.model,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": request.system_prompt },
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": request.user_text },
                        {
                            "type": "image_url",
                            "image_url": { "url": request.image.data_url() },
                        },
                    ],
                },
            ],
        })
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize, Default)]
struct Usage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

#[async_trait]
impl VisionProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: VisionRequest<'_>) -> Result<VisionReply, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
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

        let parsed: ChatResponse = response.json().await.map_err(|e| ProviderError::Api {
            detail: format!("unexpected response shape: {e}"),
        })?;

        let choice = parsed.choices.into_iter().next().ok_or_else(|| {
            ProviderError::Api {
                detail: "response contains no choices".into(),
            }
        })?;

        Ok(VisionReply {
            text: choice.message.content,
            input_tokens: parsed.usage.prompt_tokens,
            output_tokens: parsed.usage.completion_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::encode::EncodedPage;

    #[test]
    fn groq_defaults() {
        let p = OpenAiCompatProvider::groq("gsk-test".into(), None, 60).unwrap();
        assert_eq!(p.name(), "groq");
        assert_eq!(p.model(), GROQ_DEFAULT_MODEL);
        assert_eq!(p.base_url, GROQ_BASE_URL);
    }

    #[test]
    fn trailing_slash_trimmed_from_base_url() {
        let p = OpenAiCompatProvider::new(
            "local",
            "http://localhost:8080/v1/",
            "k".into(),
            "llava",
            60,
        )
        .unwrap();
        assert_eq!(p.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn request_body_shape() {
        let p = OpenAiCompatProvider::openai("k".into(), None, 60).unwrap();
        let page = EncodedPage {
            data: "QUJD".into(),
            mime_type: "image/png",
        };
        let body = p.request_body(&VisionRequest {
            system_prompt: "extract",
            user_text: "go",
            image: &page,
            temperature: 0.0,
            max_tokens: 512,
        });

        assert_eq!(body["model"], OPENAI_DEFAULT_MODEL);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "system");
        let user = &body["messages"][1]["content"];
        assert_eq!(user[0]["text"], "go");
        assert_eq!(
            user[1]["image_url"]["url"],
            "data:image/png;base64,QUJD"
        );
    }

    #[test]
    fn response_parses_content_and_usage() {
        let raw = r#"{
            "choices": [{"message": {"role": "assistant", "content": "{}"}}],
            "usage": {"prompt_tokens": 900, "completion_tokens": 40}
        }"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content, "{}");
        assert_eq!(parsed.usage.completion_tokens, 40);
    }
}
