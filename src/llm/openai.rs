//! OpenAI-compatible `/chat/completions` client.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::types::{CompletionRequest, LlmChat, LlmError, Message};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const CONNECT_TIMEOUT_SECS: u64 = 10;

pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(
        api_key: String,
        base_url: Option<&str>,
        model: &str,
        request_timeout: Duration,
    ) -> Result<Self, LlmError> {
        let base_url = base_url
            .unwrap_or(DEFAULT_OPENAI_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| LlmError::HttpClientBuild(e.to_string()))?;
        Ok(Self {
            http,
            api_key,
            base_url,
            model: model.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn send_json(&self, path: &str, body: &impl Serialize) -> Result<String, LlmError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::ApiRequest(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::ApiRequest(e.to_string()))?;
        if status != 200 {
            return Err(LlmError::ApiResponse { status, body: text });
        }
        Ok(text)
    }
}

#[async_trait::async_trait]
impl LlmChat for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let body = build_request(&self.model, &request);
        let started = std::time::Instant::now();
        let text = self.send_json("/chat/completions", &body).await?;
        let reply = parse_response(&text)?;
        tracing::debug!(
            model = %self.model,
            json_mode = request.json_mode,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "language model call completed"
        );
        Ok(reply)
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Debug, Serialize)]
struct CcRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct CcResponse {
    #[serde(default)]
    choices: Vec<CcChoice>,
}

#[derive(Debug, Deserialize)]
struct CcChoice {
    message: CcChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct CcChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn build_request<'a>(model: &'a str, request: &'a CompletionRequest) -> CcRequest<'a> {
    CcRequest {
        model,
        messages: &request.messages,
        max_tokens: request.max_tokens,
        response_format: request.json_mode.then_some(ResponseFormat {
            format_type: "json_object",
        }),
    }
}

fn parse_response(text: &str) -> Result<String, LlmError> {
    let response: CcResponse =
        serde_json::from_str(text).map_err(|e| LlmError::ApiParse(e.to_string()))?;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::ApiParse("response contained no choices".to_string()))?;
    choice
        .message
        .content
        .ok_or_else(|| LlmError::ApiParse("first choice has no text content".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_includes_response_format_only_in_json_mode() {
        let request = CompletionRequest::new(vec![Message::system("sys"), Message::user("hi")]);
        let body = serde_json::to_value(build_request("gpt-4o", &request)).unwrap();
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert!(body.get("response_format").is_none());
        assert!(body.get("max_tokens").is_none());

        let request = request.json().max_tokens(400);
        let body = serde_json::to_value(build_request("gpt-4o", &request)).unwrap();
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["max_tokens"], 400);
    }

    #[test]
    fn parse_text_response() {
        let json = serde_json::json!({
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "Hello!" },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 5 }
        })
        .to_string();
        assert_eq!(parse_response(&json).unwrap(), "Hello!");
    }

    #[test]
    fn parse_missing_choices() {
        let json = serde_json::json!({ "model": "gpt-4o", "choices": [] }).to_string();
        assert!(matches!(parse_response(&json), Err(LlmError::ApiParse(_))));
    }

    #[test]
    fn parse_null_content() {
        let json = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": null } }]
        })
        .to_string();
        assert!(parse_response(&json).is_err());
    }

    #[test]
    fn parse_invalid_json() {
        assert!(matches!(parse_response("<html>"), Err(LlmError::ApiParse(_))));
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let client = OpenAiClient::new(
            "sk-test".into(),
            Some("http://localhost:11434/v1/"),
            "llama3",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(client.base_url, "http://localhost:11434/v1");
        assert_eq!(client.model(), "llama3");
    }
}
