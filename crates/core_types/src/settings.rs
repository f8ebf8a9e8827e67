use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Locality, ProviderDescriptor, ProviderKind, SecretRef};

const fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    #[serde(default = "default_enabled")]
    pub preload_local: bool,
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://localhost:11434".to_string(),
            cloud_url: None,
            model: "llama2:7b".to_string(),
            timeout_secs: 120,
            preload_local: true,
        }
    }
}

impl OllamaSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HuggingFaceSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub base_url: String,
    pub model: String,
    pub api_key_ref: SecretRef,
    pub timeout_secs: u64,
}

impl Default for HuggingFaceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api-inference.huggingface.co".to_string(),
            model: "Qwen/Qwen2.5-7B-Instruct".to_string(),
            api_key_ref: SecretRef::new("provider", "hugging_face_api_key"),
            timeout_secs: 60,
        }
    }
}

impl HuggingFaceSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub base_url: String,
    pub model: String,
    pub api_key_ref: SecretRef,
    pub timeout_secs: u64,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            api_key_ref: SecretRef::new("provider", "open_ai_api_key"),
            timeout_secs: 30,
        }
    }
}

impl OpenAiSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineSettings {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for OfflineSettings {
    fn default() -> Self {
        Self {
            min_delay_ms: 1000,
            max_delay_ms: 3000,
        }
    }
}

/// One step of the selection cascade. `None` fields match anything.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct ProviderMatcher {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ProviderKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<Locality>,
}

impl ProviderMatcher {
    pub const ANY: Self = Self {
        kind: None,
        locality: None,
    };

    pub fn new(kind: Option<ProviderKind>, locality: Option<Locality>) -> Self {
        Self { kind, locality }
    }

    pub fn matches(&self, descriptor: &ProviderDescriptor) -> bool {
        self.kind.is_none_or(|kind| kind == descriptor.kind)
            && self
                .locality
                .is_none_or(|locality| locality == descriptor.locality)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionPolicy {
    pub preference: Vec<ProviderMatcher>,
    pub probe_timeout_ms: u64,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            preference: vec![
                ProviderMatcher::new(Some(ProviderKind::Ollama), Some(Locality::Remote)),
                ProviderMatcher::new(Some(ProviderKind::Ollama), Some(Locality::Local)),
                ProviderMatcher::ANY,
            ],
            probe_timeout_ms: 5_000,
        }
    }
}

impl SelectionPolicy {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}
