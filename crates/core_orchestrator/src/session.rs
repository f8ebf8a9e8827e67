use std::sync::Arc;

use chrono::{DateTime, Utc};
use core_types::{
    ChatProvider, ConversationMessage, ConversationRole, ErrorCategory, ProviderError, UiLanguage,
};
use i18n::I18n;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::registry::ProviderRegistry;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Message,
    Notice,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptEntry {
    pub id: Uuid,
    pub role: ConversationRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub kind: EntryKind,
}

impl TranscriptEntry {
    fn new(role: ConversationRole, content: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            created_at: Utc::now(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Ignored,
    Replied { reply: String, truncated: bool },
    Failed(ProviderError),
}

pub struct ChatSession {
    registry: Arc<ProviderRegistry>,
    provider: Arc<dyn ChatProvider>,
    transcript: Vec<TranscriptEntry>,
    i18n: I18n,
}

impl ChatSession {
    pub async fn start(registry: Arc<ProviderRegistry>, lang: UiLanguage) -> Self {
        let provider = registry.select_default().await;
        Self::with_provider(registry, provider, lang)
    }

    pub fn with_provider(
        registry: Arc<ProviderRegistry>,
        provider: Arc<dyn ChatProvider>,
        lang: UiLanguage,
    ) -> Self {
        let mut session = Self {
            registry,
            provider,
            transcript: Vec::new(),
            i18n: I18n::new(lang),
        };
        session.push_welcome();
        session
    }

    pub fn provider(&self) -> &Arc<dyn ChatProvider> {
        &self.provider
    }

    pub fn switch_provider(&mut self, provider: Arc<dyn ChatProvider>) {
        info!(from = %self.provider.name(), to = %provider.name(), "switching chat provider");
        self.provider = provider;
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    /// Prior exchange as sent upstream; notices and errors stay local.
    pub fn history(&self) -> Vec<ConversationMessage> {
        self.transcript
            .iter()
            .filter(|entry| entry.kind == EntryKind::Message)
            .map(|entry| ConversationMessage {
                role: entry.role,
                content: entry.content.clone(),
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.transcript.clear();
        self.push_welcome();
    }

    pub async fn send(&mut self, text: &str) -> TurnOutcome {
        let text = text.trim();
        if text.is_empty() {
            return TurnOutcome::Ignored;
        }

        let history = self.history();
        self.transcript.push(TranscriptEntry::new(
            ConversationRole::User,
            text,
            EntryKind::Message,
        ));

        match self
            .registry
            .send_message(self.provider.as_ref(), text, &history)
            .await
        {
            Ok(reply) => {
                let truncated = looks_truncated(&reply);
                self.transcript.push(TranscriptEntry::new(
                    ConversationRole::Assistant,
                    reply.clone(),
                    EntryKind::Message,
                ));
                if truncated {
                    self.transcript.push(TranscriptEntry::new(
                        ConversationRole::Assistant,
                        self.i18n.t("chat.truncated"),
                        EntryKind::Notice,
                    ));
                }
                TurnOutcome::Replied { reply, truncated }
            }
            Err(err) => {
                let message = self.describe_error(&err);
                self.transcript.push(TranscriptEntry::new(
                    ConversationRole::Assistant,
                    message,
                    EntryKind::Error,
                ));
                TurnOutcome::Failed(err)
            }
        }
    }

    fn describe_error(&self, err: &ProviderError) -> String {
        let key = match err.category() {
            ErrorCategory::NotConfigured => "error.not_configured",
            ErrorCategory::Timeout => "error.timeout",
            ErrorCategory::Transport => "error.transport",
            ErrorCategory::Upstream => "error.upstream",
            ErrorCategory::MalformedResponse => "error.malformed_response",
        };
        let summary = self.i18n.t(key);
        match err.category() {
            ErrorCategory::Upstream | ErrorCategory::MalformedResponse => {
                format!("{summary}\n\n({})", err.kind)
            }
            _ => summary.to_string(),
        }
    }

    fn push_welcome(&mut self) {
        self.transcript.push(TranscriptEntry::new(
            ConversationRole::Assistant,
            self.i18n.t("chat.welcome"),
            EntryKind::Notice,
        ));
    }
}

const TRAILING_MARKERS: [&str; 4] = ["...", "…", "---", "==="];
const TERMINATORS: &[char] = &[
    '。', '！', '？', '.', '!', '?', ')', '）', ']', '」', '』', '"', '”', '\'', '’', '\n',
];

/// Heuristic for replies that hit the model's token limit mid-sentence.
pub fn looks_truncated(reply: &str) -> bool {
    if TRAILING_MARKERS.iter().any(|marker| reply.ends_with(marker)) {
        return true;
    }
    if reply.contains("未完待續") {
        return true;
    }
    reply
        .chars()
        .last()
        .is_some_and(|last| !TERMINATORS.contains(&last))
}
