//! Decision Router.
//!
//! Classifies a chat message as a code change or a general question by
//! asking the language model, and writes the non-technical change summary
//! after a code change. The router holds no NLP of its own: it assembles
//! context, parses the model's JSON, and fails open to "needs code" when the
//! reply cannot be parsed.

pub mod prompts;

use std::sync::Arc;

use serde::Deserialize;

use crate::llm::{CompletionRequest, Content, LlmChat, LlmError, Message};
use crate::util::{extract_json_object, truncate_chars};

const DECISION_MAX_TOKENS: u32 = 1200;
const SUMMARY_MAX_TOKENS: u32 = 300;
const HISTORY_MESSAGE_CHARS: usize = 2000;

/// Outcome of routing one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    pub should_code: bool,
    /// Rewritten instruction for the coding assistant, if the model gave one.
    pub coding_instruction: Option<String>,
    /// Ready-to-display answer when no code change is needed.
    pub response: Option<String>,
    /// The model reply could not be parsed and the router failed open.
    pub fell_back: bool,
}

impl RouteDecision {
    fn fail_open() -> Self {
        Self {
            should_code: true,
            coding_instruction: None,
            response: None,
            fell_back: true,
        }
    }

    /// Answer text for a general question.
    pub fn answer(&self) -> &str {
        self.response.as_deref().unwrap_or(prompts::FALLBACK_ANSWER)
    }
}

#[derive(Debug, Deserialize)]
struct RawDecision {
    should_code: Option<serde_json::Value>,
    #[serde(default)]
    aider_prompt: Option<String>,
    #[serde(default)]
    response: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn as_bool(value: &serde_json::Value) -> Option<bool> {
    match value {
        serde_json::Value::Bool(b) => Some(*b),
        serde_json::Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Parse the model's reply. Anything without a usable `should_code` fails
/// open to a code change.
pub fn parse_decision(text: &str) -> RouteDecision {
    let Some(json) = extract_json_object(text) else {
        return RouteDecision::fail_open();
    };
    let Ok(raw) = serde_json::from_str::<RawDecision>(json) else {
        return RouteDecision::fail_open();
    };
    let Some(should_code) = raw.should_code.as_ref().and_then(as_bool) else {
        return RouteDecision::fail_open();
    };
    RouteDecision {
        should_code,
        coding_instruction: if should_code { non_blank(raw.aider_prompt) } else { None },
        response: if should_code { None } else { non_blank(raw.response) },
        fell_back: false,
    }
}

pub struct DecisionRouter {
    llm: Arc<dyn LlmChat>,
    history_limit: usize,
}

impl DecisionRouter {
    pub fn new(llm: Arc<dyn LlmChat>, history_limit: usize) -> Self {
        Self { llm, history_limit }
    }

    /// Message list for the routing call: instructions, site files, the most
    /// recent history (each entry truncated), then the new message.
    pub fn build_messages(&self, site_files: &str, history: &[Message], message: &Content) -> Vec<Message> {
        let mut messages = vec![
            Message::system(prompts::DECISION_SYSTEM_PROMPT),
            Message::system(prompts::build_context_message(site_files)),
        ];
        let start = history.len().saturating_sub(self.history_limit);
        for past in &history[start..] {
            let content = match &past.content {
                Content::Text(text) => Content::Text(truncate_chars(text, HISTORY_MESSAGE_CHARS)),
                parts => parts.clone(),
            };
            messages.push(Message {
                role: past.role,
                content,
            });
        }
        messages.push(Message::user(message.clone()));
        messages
    }

    /// Classify `message`. A failed model call is an error; an unparseable
    /// reply is not.
    pub async fn route(
        &self,
        site_files: &str,
        history: &[Message],
        message: &Content,
    ) -> Result<RouteDecision, LlmError> {
        let request = CompletionRequest::new(self.build_messages(site_files, history, message))
            .json()
            .max_tokens(DECISION_MAX_TOKENS);
        let reply = self.llm.complete(request).await?;
        let decision = parse_decision(&reply);
        if decision.fell_back {
            tracing::warn!(
                reply = %truncate_chars(&reply, 500),
                "router reply unparseable, treating as code change"
            );
        } else {
            tracing::debug!(should_code = decision.should_code, "routed message");
        }
        Ok(decision)
    }

    /// Plain-language summary of a completed change. Falls back to the
    /// assistant's own notes on any failure.
    pub async fn summarize_change(&self, instruction: &str, assistant_notes: &str, changed: &[String]) -> String {
        let request = CompletionRequest::new(vec![
            Message::system(prompts::SUMMARY_SYSTEM_PROMPT),
            Message::user(prompts::build_summary_request(instruction, assistant_notes, changed)),
        ])
        .max_tokens(SUMMARY_MAX_TOKENS);
        match self.llm.complete(request).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => assistant_notes.to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "change summary failed, using assistant notes");
                assistant_notes.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use std::sync::Mutex;

    /// Answers like a model that follows the routing instructions: edits
    /// for imperative change requests, answers for questions.
    struct KeywordModel {
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl KeywordModel {
        fn new() -> Self {
            Self { seen: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait::async_trait]
    impl LlmChat for KeywordModel {
        async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
            let last = request
                .messages
                .last()
                .map(|m| m.content.as_text().to_lowercase())
                .unwrap_or_default();
            self.seen.lock().unwrap().push(request);
            let is_change = ["change", "make", "add", "remove"].iter().any(|w| last.starts_with(w));
            Ok(if is_change {
                format!(
                    "```json\n{{\"should_code\": true, \"aider_prompt\": \"In styles.css: {}\", \"response\": null}}\n```",
                    last
                )
            } else {
                "{\"should_code\": false, \"aider_prompt\": null, \"response\": \"The pricing section lists three plans.\"}".to_string()
            })
        }
    }

    struct FixedModel(Result<String, u16>);

    #[async_trait::async_trait]
    impl LlmChat for FixedModel {
        async fn complete(&self, _request: CompletionRequest) -> Result<String, LlmError> {
            self.0.clone().map_err(|status| LlmError::ApiResponse { status, body: String::new() })
        }
    }

    #[tokio::test]
    async fn button_color_change_routes_to_code() {
        let router = DecisionRouter::new(Arc::new(KeywordModel::new()), 10);
        let decision = router
            .route("File: index.html\n<button>Buy</button>", &[], &Content::from("change the button color to blue"))
            .await
            .unwrap();
        assert!(decision.should_code);
        assert!(!decision.fell_back);
        assert_eq!(
            decision.coding_instruction.as_deref(),
            Some("In styles.css: change the button color to blue")
        );
    }

    #[tokio::test]
    async fn pricing_question_routes_to_answer() {
        let router = DecisionRouter::new(Arc::new(KeywordModel::new()), 10);
        let decision = router
            .route("", &[], &Content::from("what does this page say about pricing"))
            .await
            .unwrap();
        assert!(!decision.should_code);
        assert_eq!(decision.answer(), "The pricing section lists three plans.");
    }

    #[tokio::test]
    async fn unparseable_reply_fails_open() {
        let router = DecisionRouter::new(Arc::new(FixedModel(Ok("Sure, I can help!".into()))), 10);
        let decision = router.route("", &[], &Content::from("hi")).await.unwrap();
        assert!(decision.should_code);
        assert!(decision.fell_back);
        assert_eq!(decision.coding_instruction, None);
    }

    #[tokio::test]
    async fn model_failure_is_an_error() {
        let router = DecisionRouter::new(Arc::new(FixedModel(Err(503))), 10);
        assert!(router.route("", &[], &Content::from("hi")).await.is_err());
    }

    #[tokio::test]
    async fn history_is_trimmed_to_limit() {
        let model = Arc::new(KeywordModel::new());
        let router = DecisionRouter::new(model.clone(), 2);
        let history = vec![
            Message::user("first"),
            Message::assistant("second"),
            Message::user("third"),
        ];
        router.route("", &history, &Content::from("what now")).await.unwrap();

        let seen = model.seen.lock().unwrap();
        let request = &seen[0];
        assert!(request.json_mode);
        // 2 system messages + 2 history + the new message
        assert_eq!(request.messages.len(), 5);
        assert_eq!(request.messages[2].content.as_text(), "second");
        assert_eq!(request.messages[2].role, Role::Assistant);
        assert_eq!(request.messages[4].content.as_text(), "what now");
    }

    #[tokio::test]
    async fn summary_falls_back_to_assistant_notes() {
        let router = DecisionRouter::new(Arc::new(FixedModel(Err(500))), 10);
        let summary = router.summarize_change("make it blue", "Changed the button color.", &[]).await;
        assert_eq!(summary, "Changed the button color.");

        let router = DecisionRouter::new(Arc::new(FixedModel(Ok("Your button is now blue.".into()))), 10);
        let summary = router.summarize_change("make it blue", "notes", &[]).await;
        assert_eq!(summary, "Your button is now blue.");
    }

    #[test]
    fn parse_decision_variants() {
        let d = parse_decision(r#"{"should_code": "false", "response": "  Hello  "}"#);
        assert!(!d.should_code);
        assert_eq!(d.response.as_deref(), Some("Hello"));

        let d = parse_decision(r#"{"should_code": false, "response": ""}"#);
        assert_eq!(d.answer(), prompts::FALLBACK_ANSWER);

        let d = parse_decision(r#"{"aider_prompt": "x"}"#);
        assert!(d.should_code && d.fell_back);

        let d = parse_decision(r#"{"should_code": true, "aider_prompt": "  ", "response": "ignored"}"#);
        assert!(d.should_code);
        assert_eq!(d.coding_instruction, None);
        assert_eq!(d.response, None);
    }
}
