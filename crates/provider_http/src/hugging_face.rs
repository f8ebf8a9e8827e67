use std::time::Duration;

use async_trait::async_trait;
use core_types::{
    AvailabilityProbe, ChatProvider, ConversationMessage, ConversationRole,
    DEFAULT_PROBE_TIMEOUT, HuggingFaceSettings, Locality, ProviderDescriptor, ProviderError,
    ProviderKind,
};
use reqwest::Method;
use serde_json::{Value, json};

use crate::{HttpTransport, has_text, join_url, reply_or_apology};

const HISTORY_WINDOW: usize = 4;

#[derive(Debug, Clone)]
pub struct HuggingFaceProvider {
    descriptor: ProviderDescriptor,
    base_url: String,
    model: String,
    api_key: Option<String>,
    system_prompt: String,
    timeout: Duration,
    probe_timeout: Duration,
    http: HttpTransport,
}

impl HuggingFaceProvider {
    pub fn new(
        settings: &HuggingFaceSettings,
        api_key: Option<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            descriptor: ProviderDescriptor::new(
                format!("Hugging Face ({})", settings.model),
                ProviderKind::HuggingFace,
                Locality::Remote,
            ),
            base_url: settings.base_url.clone(),
            model: settings.model.clone(),
            api_key,
            system_prompt: system_prompt.into(),
            timeout: settings.timeout(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            http: HttpTransport::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    fn model_url(&self) -> String {
        join_url(&self.base_url, &format!("/models/{}", self.model))
    }

    fn build_prompt(&self, text: &str, history: &[ConversationMessage]) -> String {
        let recent = &history[history.len().saturating_sub(HISTORY_WINDOW)..];
        let mut prompt = format!("{}\n\n", self.system_prompt);
        for msg in recent {
            let label = match msg.role {
                ConversationRole::User => "用戶",
                _ => "助手",
            };
            prompt.push_str(&format!("{label}: {}\n", msg.content));
        }
        prompt.push_str(&format!("用戶: {text}\n助手:"));
        prompt
    }

    fn generation_parameters(&self) -> Value {
        let qwen = self.model.contains("Qwen");
        let max_new_tokens = if qwen { 6000 } else { 4000 };
        let mut params = json!({
            "max_new_tokens": max_new_tokens,
            "temperature": 0.7,
            "do_sample": true,
            "return_full_text": false
        });
        if qwen && let Some(map) = params.as_object_mut() {
            map.insert("top_p".into(), json!(0.9));
            map.insert("top_k".into(), json!(40));
            map.insert("repetition_penalty".into(), json!(1.1));
            map.insert("pad_token_id".into(), json!(151_643));
            map.insert("eos_token_id".into(), json!(151_645));
        }
        params
    }
}

#[async_trait]
impl ChatProvider for HuggingFaceProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn is_configured(&self) -> bool {
        has_text(self.api_key.as_deref())
    }

    async fn send_message(
        &self,
        text: &str,
        history: &[ConversationMessage],
    ) -> Result<String, ProviderError> {
        let Some(api_key) = self.api_key.as_deref().filter(|k| !k.trim().is_empty()) else {
            return Err(ProviderError::not_configured(self.name()));
        };

        let body = json!({
            "inputs": self.build_prompt(text, history),
            "parameters": self.generation_parameters()
        });
        let payload = self
            .http
            .post_json(
                self.name(),
                &self.model_url(),
                Some(api_key),
                &body,
                self.timeout,
            )
            .await?;
        Ok(generated_text(&payload))
    }

    fn availability(&self) -> Option<&dyn AvailabilityProbe> {
        Some(self)
    }
}

#[async_trait]
impl AvailabilityProbe for HuggingFaceProvider {
    async fn probe(&self) -> Result<bool, ProviderError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Ok(false);
        };
        self.http
            .reachable(
                self.name(),
                Method::HEAD,
                &self.model_url(),
                Some(api_key),
                self.probe_timeout,
            )
            .await
    }
}

/// The inference API answers either `[{generated_text}]` or `{generated_text}`.
fn generated_text(payload: &Value) -> String {
    let field = match payload {
        Value::Array(items) => items.first().and_then(|item| item.get("generated_text")),
        other => other.get("generated_text"),
    };
    reply_or_apology(field)
}
