use std::time::Duration;

use async_trait::async_trait;
use core_types::{
    ChatProvider, ConversationMessage, Locality, ModelListing, OpenAiSettings,
    ProviderDescriptor, ProviderError, ProviderKind, compose_exchange,
};
use serde_json::{Value, json};
use tracing::warn;

use crate::{HttpTransport, has_text, join_url, reply_or_apology, to_wire_messages};

const MODELS_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    descriptor: ProviderDescriptor,
    base_url: String,
    model: String,
    api_key: Option<String>,
    system_prompt: String,
    timeout: Duration,
    http: HttpTransport,
}

impl OpenAiProvider {
    pub fn new(
        settings: &OpenAiSettings,
        api_key: Option<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            descriptor: ProviderDescriptor::new(
                format!("OpenAI ({})", settings.model),
                ProviderKind::OpenAi,
                Locality::Remote,
            ),
            base_url: settings.base_url.clone(),
            model: settings.model.clone(),
            api_key,
            system_prompt: system_prompt.into(),
            timeout: settings.timeout(),
            http: HttpTransport::new(),
        }
    }

    fn key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
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
        let Some(api_key) = self.key() else {
            return Err(ProviderError::not_configured(self.name()));
        };

        let messages = compose_exchange(&self.system_prompt, history, text);
        let body = json!({
            "model": self.model,
            "messages": to_wire_messages(&messages),
            "max_tokens": 1000,
            "temperature": 0.7
        });
        let url = join_url(&self.base_url, "/v1/chat/completions");
        let payload = self
            .http
            .post_json(self.name(), &url, Some(api_key), &body, self.timeout)
            .await?;
        Ok(reply_or_apology(payload.pointer("/choices/0/message/content")))
    }

    fn model_listing(&self) -> Option<&dyn ModelListing> {
        Some(self)
    }
}

#[async_trait]
impl ModelListing for OpenAiProvider {
    async fn list_models(&self) -> Vec<String> {
        let Some(api_key) = self.key() else {
            return Vec::new();
        };
        let url = join_url(&self.base_url, "/v1/models");
        match self
            .http
            .get_json(self.name(), &url, Some(api_key), MODELS_TIMEOUT)
            .await
        {
            Ok(payload) => payload
                .get("data")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|item| item.get("id").and_then(Value::as_str))
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            Err(err) => {
                warn!(provider = %self.name(), "failed to list models: {err}");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use core_types::{APOLOGY_REPLY, ErrorCategory, probe_availability};
    use mockito::Matcher;

    use super::*;

    fn provider(base_url: &str, key: Option<&str>) -> OpenAiProvider {
        let settings = OpenAiSettings {
            base_url: base_url.to_string(),
            ..OpenAiSettings::default()
        };
        OpenAiProvider::new(&settings, key.map(str::to_string), "sys")
    }

    #[tokio::test]
    async fn availability_follows_configuration() {
        let deadline = Duration::from_millis(100);
        assert!(provider("http://h", Some("sk")).availability().is_none());
        assert!(probe_availability(&provider("http://h", Some("sk")), deadline).await);
        assert!(!probe_availability(&provider("http://h", None), deadline).await);
    }

    #[tokio::test]
    async fn reads_first_choice() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::PartialJson(json!({"model": "gpt-3.5-turbo", "max_tokens": 1000})))
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"去九份"}}]}"#)
            .create_async()
            .await;

        let reply = provider(&server.url(), Some("sk-test"))
            .send_message("週末去哪？", &[])
            .await
            .expect("reply");
        assert_eq!(reply, "去九份");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn empty_choices_yield_apology() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let reply = provider(&server.url(), Some("sk"))
            .send_message("hi", &[])
            .await
            .expect("reply");
        assert_eq!(reply, APOLOGY_REPLY);
    }

    #[tokio::test]
    async fn unauthorized_is_upstream_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(401)
            .with_body(r#"{"error":{"message":"bad key"}}"#)
            .create_async()
            .await;

        let err = provider(&server.url(), Some("sk"))
            .send_message("hi", &[])
            .await
            .expect_err("401");
        assert_eq!(err.category(), ErrorCategory::Upstream);
    }

    #[tokio::test]
    async fn lists_models_best_effort() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/models")
            .with_status(200)
            .with_body(r#"{"data":[{"id":"gpt-4o-mini"},{"id":"gpt-3.5-turbo"}]}"#)
            .create_async()
            .await;

        let p = provider(&server.url(), Some("sk"));
        assert_eq!(p.list_models().await, vec!["gpt-4o-mini", "gpt-3.5-turbo"]);
        assert!(provider(&server.url(), None).list_models().await.is_empty());
    }
}
