//! The chat request handler: route a message, then either answer it or run
//! the coding assistant and commit the result.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{ChatMessage, ChatStore};
use crate::assistant::{AssistantPool, AssistantRequest, CodingAssistant};
use crate::errors::{AssistantError, ChatError};
use crate::llm::{Content, Message};
use crate::router::DecisionRouter;
use crate::site::{Site, SiteStatusStore, files};
use crate::util::one_line;
use crate::workflow::SiteWorkflow;

const COMMIT_SUBJECT_CHARS: usize = 72;

const ROUTER_FAILED_REPLY: &str =
    "Sorry, I couldn't process your request right now. Please try again in a moment.";
const CHANGE_FAILED_REPLY: &str =
    "Sorry, I wasn't able to make that change. Nothing on your site was modified.";
const SAVE_FAILED_REPLY: &str =
    "Sorry, I made the change but couldn't save it, so it has been discarded. Please try again.";
const EMPTY_MESSAGE_REPLY: &str = "Please type a message first.";
const SITE_UNAVAILABLE_REPLY: &str = "Sorry, I can't find this site's files right now.";
const HISTORY_FAILED_REPLY: &str =
    "Sorry, I couldn't save our conversation. Please try again.";

/// What the UI receives for one chat request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    /// Always an assistant-role message, also on failure.
    pub message: ChatMessage,
    pub code_changed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
}

impl ChatReply {
    fn text(text: impl Into<String>) -> Self {
        Self {
            message: ChatMessage::assistant(text),
            code_changed: false,
            commit_hash: None,
        }
    }

    /// The assistant message shown when `handle` itself fails.
    pub fn failure(err: &ChatError) -> Self {
        Self::text(match err {
            ChatError::EmptyMessage => EMPTY_MESSAGE_REPLY,
            ChatError::Site(_) => SITE_UNAVAILABLE_REPLY,
            ChatError::Store(_) => HISTORY_FAILED_REPLY,
        })
    }
}

pub struct ChatService {
    workflow: Arc<SiteWorkflow>,
    status: SiteStatusStore,
    store: Arc<dyn ChatStore>,
    router: DecisionRouter,
    assistant: Arc<dyn CodingAssistant>,
    pool: Arc<AssistantPool>,
    max_context_chars: usize,
}

impl ChatService {
    pub fn new(
        workflow: Arc<SiteWorkflow>,
        status: SiteStatusStore,
        store: Arc<dyn ChatStore>,
        router: DecisionRouter,
        assistant: Arc<dyn CodingAssistant>,
        pool: Arc<AssistantPool>,
        max_context_chars: usize,
    ) -> Self {
        Self {
            workflow,
            status,
            store,
            router,
            assistant,
            pool,
            max_context_chars,
        }
    }

    pub fn store(&self) -> &Arc<dyn ChatStore> {
        &self.store
    }

    pub fn status(&self) -> &SiteStatusStore {
        &self.status
    }

    /// Handle one user message for `site_id`.
    ///
    /// The site is UNDER_DEV for the duration of the call and READY again on
    /// every exit path. Only invalid input and history store failures are
    /// errors; everything else becomes an assistant message.
    pub async fn handle(&self, site_id: &str, content: Content) -> Result<ChatReply, ChatError> {
        let _status = self.status.begin(site_id);

        if content.is_blank() {
            return Err(ChatError::EmptyMessage);
        }
        let site = self.workflow.resolve(site_id)?;
        site.ensure_repository()?;

        let history = self.store.load(site_id).await.map_err(ChatError::Store)?;
        let user_message = ChatMessage::user(content.clone());
        self.store
            .append(site_id, std::slice::from_ref(&user_message))
            .await
            .map_err(ChatError::Store)?;

        let reply = self.respond(&site, &history, &content).await;

        if let Err(e) = self
            .store
            .append(site_id, std::slice::from_ref(&reply.message))
            .await
        {
            tracing::error!(site_id, error = %e, "failed to store assistant reply");
        }
        Ok(reply)
    }

    async fn respond(&self, site: &Site, history: &[ChatMessage], content: &Content) -> ChatReply {
        let lease = self.pool.checkout(&site.id);
        let edit_dir = files::edit_target(&site.working_dir);
        let file_list = match lease.cached_files() {
            Some(list) => list,
            None => {
                let list = files::find_web_files(&edit_dir);
                lease.cache_files(list.clone());
                list
            }
        };
        let site_files = files::render_file_context(&edit_dir, &file_list, self.max_context_chars);
        let past: Vec<Message> = history.iter().map(ChatMessage::to_llm_message).collect();

        let decision = match self.router.route(&site_files, &past, content).await {
            Ok(decision) => decision,
            Err(e) => {
                tracing::error!(site_id = %site.id, error = %e, "decision routing failed");
                return ChatReply::text(ROUTER_FAILED_REPLY);
            }
        };

        if !decision.should_code {
            return ChatReply::text(decision.answer());
        }

        let instruction = decision
            .coding_instruction
            .clone()
            .unwrap_or_else(|| content.as_text());
        let request = AssistantRequest {
            site_id: site.id.clone(),
            working_dir: site.working_dir.clone(),
            instruction: instruction.clone(),
            files: file_list,
        };

        let result = self.assistant.run(&request, lease.cancel_token()).await;
        // The assistant may have created or removed files.
        lease.invalidate_files();
        let result = match result {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(site_id = %site.id, error = %e, "coding assistant failed");
                self.discard(site).await;
                return ChatReply::text(assistant_failure_reply(&e));
            }
        };

        let subject = format!("AI: {}", one_line(&instruction, COMMIT_SUBJECT_CHARS));
        match self.workflow.commit_site(site, &subject).await {
            Ok(commit) if commit.is_noop() => ChatReply::text(result.summary),
            Ok(commit) => {
                let summary = self
                    .router
                    .summarize_change(&instruction, &result.summary, &result.changed_files)
                    .await;
                ChatReply {
                    message: ChatMessage::assistant(summary),
                    code_changed: true,
                    commit_hash: Some(commit.commit_hash),
                }
            }
            Err(e) => {
                tracing::error!(site_id = %site.id, error = %e, "commit after assistant run failed");
                self.discard(site).await;
                ChatReply::text(SAVE_FAILED_REPLY)
            }
        }
    }

    async fn discard(&self, site: &Site) {
        if let Err(e) = self.workflow.discard_uncommitted(site).await {
            tracing::warn!(site_id = %site.id, error = %e, "failed to discard partial changes");
        }
    }
}

fn assistant_failure_reply(err: &AssistantError) -> String {
    match err {
        AssistantError::Timeout { .. } => format!(
            "Sorry, that change took too long and was stopped ({}). Nothing on your site was modified.",
            err
        ),
        AssistantError::NoEditableFiles(_) => {
            "Sorry, I couldn't find any pages to edit for this site.".to_string()
        }
        _ => CHANGE_FAILED_REPLY.to_string(),
    }
}
