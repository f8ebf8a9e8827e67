use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

mod settings;

pub use settings::{
    HuggingFaceSettings, OfflineSettings, OllamaSettings, OpenAiSettings, ProviderMatcher,
    SelectionPolicy,
};

/// Reply substituted when an upstream payload carries no usable text.
pub const APOLOGY_REPLY: &str = "抱歉，我無法生成回應。";

pub const TEST_PROBE_MESSAGE: &str = "測試訊息";

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UiLanguage {
    ZhTw,
    EnUs,
}

impl UiLanguage {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "zh-tw" | "zh" | "zh-hant" => Some(Self::ZhTw),
            "en-us" | "en" => Some(Self::EnUs),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Ollama,
    HuggingFace,
    OpenAi,
    Offline,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::HuggingFace => "hugging_face",
            Self::OpenAi => "open_ai",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Locality {
    Local,
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ProviderDescriptor {
    pub name: String,
    pub kind: ProviderKind,
    pub locality: Locality,
}

impl ProviderDescriptor {
    pub fn new(name: impl Into<String>, kind: ProviderKind, locality: Locality) -> Self {
        Self {
            name: name.into(),
            kind,
            locality,
        }
    }

    pub fn is_local(&self) -> bool {
        self.locality == Locality::Local
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConversationRole {
    System,
    User,
    Assistant,
}

impl ConversationRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ConversationMessage {
    pub role: ConversationRole,
    pub content: String,
}

impl ConversationMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ConversationRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ConversationRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ConversationRole::Assistant,
            content: content.into(),
        }
    }
}

pub fn compose_exchange(
    system_prompt: &str,
    history: &[ConversationMessage],
    text: &str,
) -> Vec<ConversationMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ConversationMessage::system(system_prompt));
    messages.extend(history.iter().cloned());
    messages.push(ConversationMessage::user(text));
    messages
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub struct SecretRef {
    pub namespace: String,
    pub key: String,
}

impl SecretRef {
    pub fn new(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            key: key.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    NotConfigured,
    Timeout,
    Transport,
    Upstream,
    MalformedResponse,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotConfigured => "not_configured",
            Self::Timeout => "timeout",
            Self::Transport => "transport",
            Self::Upstream => "upstream",
            Self::MalformedResponse => "malformed_response",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderErrorKind {
    #[error("provider is not configured")]
    NotConfigured,
    #[error("request timed out after {}s", .0.as_secs_f32())]
    Timeout(Duration),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{provider}: {kind}")]
pub struct ProviderError {
    pub provider: String,
    pub kind: ProviderErrorKind,
}

impl ProviderError {
    pub fn new(provider: impl Into<String>, kind: ProviderErrorKind) -> Self {
        Self {
            provider: provider.into(),
            kind,
        }
    }

    pub fn not_configured(provider: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::NotConfigured)
    }

    pub fn category(&self) -> ErrorCategory {
        match self.kind {
            ProviderErrorKind::NotConfigured => ErrorCategory::NotConfigured,
            ProviderErrorKind::Timeout(_) => ErrorCategory::Timeout,
            ProviderErrorKind::Transport(_) => ErrorCategory::Transport,
            ProviderErrorKind::Upstream { .. } => ErrorCategory::Upstream,
            ProviderErrorKind::MalformedResponse(_) => ErrorCategory::MalformedResponse,
        }
    }
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn descriptor(&self) -> &ProviderDescriptor;

    fn is_configured(&self) -> bool;

    async fn send_message(
        &self,
        text: &str,
        history: &[ConversationMessage],
    ) -> Result<String, ProviderError>;

    fn availability(&self) -> Option<&dyn AvailabilityProbe> {
        None
    }

    fn model_listing(&self) -> Option<&dyn ModelListing> {
        None
    }

    fn name(&self) -> &str {
        &self.descriptor().name
    }
}

#[async_trait]
pub trait AvailabilityProbe: Send + Sync {
    async fn probe(&self) -> Result<bool, ProviderError>;
}

#[async_trait]
pub trait ModelListing: Send + Sync {
    async fn list_models(&self) -> Vec<String>;
}

pub async fn with_deadline<T, F>(
    provider: &str,
    deadline: Duration,
    call: F,
) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::new(
            provider,
            ProviderErrorKind::Timeout(deadline),
        )),
    }
}

pub async fn probe_availability(provider: &dyn ChatProvider, deadline: Duration) -> bool {
    if !provider.is_configured() {
        return false;
    }
    let Some(probe) = provider.availability() else {
        return true;
    };

    match with_deadline(provider.name(), deadline, probe.probe()).await {
        Ok(available) => available,
        Err(err) => {
            debug!(provider = %provider.name(), category = err.category().as_str(), "availability probe failed: {err}");
            false
        }
    }
}
