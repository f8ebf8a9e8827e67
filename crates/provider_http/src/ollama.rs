use std::time::Duration;

use async_trait::async_trait;
use core_types::{
    AvailabilityProbe, ChatProvider, ConversationMessage, DEFAULT_PROBE_TIMEOUT, Locality,
    ModelListing, OllamaSettings, ProviderDescriptor, ProviderError, ProviderKind,
    compose_exchange, with_deadline,
};
use reqwest::Method;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::{HttpTransport, has_text, join_url, reply_or_apology, to_wire_messages};

const PRELOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct OllamaProvider {
    descriptor: ProviderDescriptor,
    base_url: Option<String>,
    model: String,
    system_prompt: String,
    timeout: Duration,
    probe_timeout: Duration,
    preload: bool,
    http: HttpTransport,
}

impl OllamaProvider {
    pub fn local(settings: &OllamaSettings, system_prompt: impl Into<String>) -> Self {
        Self {
            descriptor: ProviderDescriptor::new(
                format!("Ollama Local ({})", settings.model),
                ProviderKind::Ollama,
                Locality::Local,
            ),
            base_url: Some(settings.base_url.clone()),
            model: settings.model.clone(),
            system_prompt: system_prompt.into(),
            timeout: settings.timeout(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            preload: settings.preload_local,
            http: HttpTransport::new(),
        }
    }

    pub fn cloud(settings: &OllamaSettings, system_prompt: impl Into<String>) -> Self {
        Self {
            descriptor: ProviderDescriptor::new(
                format!("Ollama Cloud ({})", settings.model),
                ProviderKind::Ollama,
                Locality::Remote,
            ),
            base_url: settings.cloud_url.clone(),
            model: settings.model.clone(),
            system_prompt: system_prompt.into(),
            timeout: settings.timeout(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            preload: false,
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

    fn endpoint(&self, path: &str) -> Option<String> {
        self.base_url
            .as_deref()
            .filter(|base| !base.trim().is_empty())
            .map(|base| join_url(base.trim(), path))
    }

    async fn preload_model(&self, url: &str) {
        let body = json!({
            "model": self.model,
            "prompt": "hi",
            "stream": false,
            "options": { "num_predict": 1 }
        });
        let deadline = self.timeout.min(PRELOAD_TIMEOUT);
        match self
            .http
            .post_json(self.name(), url, None, &body, deadline)
            .await
        {
            Ok(_) => debug!(provider = %self.name(), model = %self.model, "model preloaded"),
            Err(err) => debug!(provider = %self.name(), "model preload skipped: {err}"),
        }
    }
}

#[async_trait]
impl ChatProvider for OllamaProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn is_configured(&self) -> bool {
        has_text(self.base_url.as_deref())
    }

    async fn send_message(
        &self,
        text: &str,
        history: &[ConversationMessage],
    ) -> Result<String, ProviderError> {
        let (Some(chat_url), Some(generate_url)) =
            (self.endpoint("/api/chat"), self.endpoint("/api/generate"))
        else {
            return Err(ProviderError::not_configured(self.name()));
        };

        // preload and chat share one deadline
        with_deadline(self.name(), self.timeout, async {
            if self.preload {
                self.preload_model(&generate_url).await;
            }
            self.chat(&chat_url, text, history).await
        })
        .await
    }

    fn availability(&self) -> Option<&dyn AvailabilityProbe> {
        Some(self)
    }

    fn model_listing(&self) -> Option<&dyn ModelListing> {
        Some(self)
    }
}

impl OllamaProvider {
    async fn chat(
        &self,
        chat_url: &str,
        text: &str,
        history: &[ConversationMessage],
    ) -> Result<String, ProviderError> {
        let messages = compose_exchange(&self.system_prompt, history, text);
        let body = json!({
            "model": self.model,
            "messages": to_wire_messages(&messages),
            "stream": false,
            "options": {
                "temperature": 0.7,
                "top_p": 0.9,
                "top_k": 40,
                "repeat_penalty": 1.1,
                "num_predict": 8192,
                "num_ctx": 8192,
                "seed": 42
            }
        });

        let payload = self
            .http
            .post_json(self.name(), chat_url, None, &body, self.timeout)
            .await?;
        Ok(reply_or_apology(payload.pointer("/message/content")))
    }
}

#[async_trait]
impl AvailabilityProbe for OllamaProvider {
    async fn probe(&self) -> Result<bool, ProviderError> {
        let Some(url) = self.endpoint("/api/tags") else {
            return Ok(false);
        };
        self.http
            .reachable(self.name(), Method::GET, &url, None, self.probe_timeout)
            .await
    }
}

#[async_trait]
impl ModelListing for OllamaProvider {
    async fn list_models(&self) -> Vec<String> {
        let Some(url) = self.endpoint("/api/tags") else {
            return Vec::new();
        };
        match self
            .http
            .get_json(self.name(), &url, None, self.probe_timeout)
            .await
        {
            Ok(payload) => model_names(&payload),
            Err(err) => {
                warn!(provider = %self.name(), "failed to list models: {err}");
                Vec::new()
            }
        }
    }
}

fn model_names(payload: &Value) -> Vec<String> {
    payload
        .get("models")
        .and_then(Value::as_array)
        .map(|models| {
            models
                .iter()
                .filter_map(|model| model.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use core_types::{APOLOGY_REPLY, ErrorCategory, probe_availability};
    use mockito::Matcher;

    use super::*;

    fn settings(base_url: &str) -> OllamaSettings {
        OllamaSettings {
            base_url: base_url.to_string(),
            preload_local: false,
            ..OllamaSettings::default()
        }
    }

    async fn silent_endpoint() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        format!("http://{addr}")
    }

    #[test]
    fn cloud_variant_needs_a_url() {
        let mut settings = OllamaSettings::default();
        let cloud = OllamaProvider::cloud(&settings, "sys");
        assert!(!cloud.is_configured());
        assert!(!cloud.is_configured());
        assert_eq!(cloud.descriptor().locality, Locality::Remote);

        settings.cloud_url = Some("https://ollama.example.com".to_string());
        assert!(OllamaProvider::cloud(&settings, "sys").is_configured());
        assert!(OllamaProvider::local(&settings, "sys").is_configured());
    }

    #[tokio::test]
    async fn sends_full_exchange_and_reads_reply() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/chat")
            .match_body(Matcher::PartialJson(json!({
                "model": "llama2:7b",
                "stream": false,
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "去花蓮"},
                    {"role": "assistant", "content": "好"},
                    {"role": "user", "content": "幾天？"}
                ]
            })))
            .with_status(200)
            .with_body(r#"{"message":{"role":"assistant","content":"三天兩夜"}}"#)
            .create_async()
            .await;

        let provider = OllamaProvider::local(&settings(&server.url()), "sys");
        let history = [
            ConversationMessage::user("去花蓮"),
            ConversationMessage::assistant("好"),
        ];
        let reply = provider.send_message("幾天？", &history).await.expect("reply");

        assert_eq!(reply, "三天兩夜");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_content_yields_apology() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/chat")
            .with_status(200)
            .with_body(r#"{"done":true}"#)
            .create_async()
            .await;

        let provider = OllamaProvider::local(&settings(&server.url()), "sys");
        let reply = provider.send_message("hi", &[]).await.expect("reply");
        assert_eq!(reply, APOLOGY_REPLY);
    }

    #[tokio::test]
    async fn server_error_is_upstream_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/chat")
            .with_status(500)
            .create_async()
            .await;

        let mut cfg = settings("http://unused");
        cfg.cloud_url = Some(server.url());
        let provider = OllamaProvider::cloud(&cfg, "sys");
        let err = provider.send_message("hi", &[]).await.expect_err("500");

        assert_eq!(err.category(), ErrorCategory::Upstream);
        assert_eq!(err.provider, provider.name());
    }

    #[tokio::test]
    async fn preloads_model_before_chat() {
        let mut server = mockito::Server::new_async().await;
        let preload = server
            .mock("POST", "/api/generate")
            .match_body(Matcher::PartialJson(json!({"prompt": "hi", "options": {"num_predict": 1}})))
            .with_status(200)
            .with_body(r#"{"response":"h"}"#)
            .create_async()
            .await;
        let _chat = server
            .mock("POST", "/api/chat")
            .with_status(200)
            .with_body(r#"{"message":{"content":"ok"}}"#)
            .create_async()
            .await;

        let mut cfg = settings(&server.url());
        cfg.preload_local = true;
        let reply = OllamaProvider::local(&cfg, "sys")
            .send_message("hi", &[])
            .await
            .expect("reply");

        assert_eq!(reply, "ok");
        preload.assert_async().await;
    }

    #[tokio::test]
    async fn failed_preload_does_not_block_chat() {
        let mut server = mockito::Server::new_async().await;
        let _preload = server
            .mock("POST", "/api/generate")
            .with_status(404)
            .create_async()
            .await;
        let _chat = server
            .mock("POST", "/api/chat")
            .with_status(200)
            .with_body(r#"{"message":{"content":"ok"}}"#)
            .create_async()
            .await;

        let mut cfg = settings(&server.url());
        cfg.preload_local = true;
        let reply = OllamaProvider::local(&cfg, "sys")
            .send_message("hi", &[])
            .await
            .expect("reply");
        assert_eq!(reply, "ok");
    }

    #[tokio::test]
    async fn stalled_server_times_out_within_deadline() {
        let url = silent_endpoint().await;
        let deadline = Duration::from_millis(300);
        let provider = OllamaProvider::local(&settings(&url), "sys").with_timeout(deadline);

        let started = std::time::Instant::now();
        let err = provider.send_message("hi", &[]).await.expect_err("no answer");

        assert_eq!(err.category(), ErrorCategory::Timeout);
        assert!(started.elapsed() < deadline + Duration::from_secs(1));
    }

    #[tokio::test]
    async fn preload_counts_against_the_same_deadline() {
        let url = silent_endpoint().await;
        let deadline = Duration::from_millis(400);
        let settings = OllamaSettings {
            base_url: url,
            ..OllamaSettings::default()
        };
        assert!(settings.preload_local);
        let provider = OllamaProvider::local(&settings, "sys").with_timeout(deadline);

        let started = std::time::Instant::now();
        let err = provider.send_message("hi", &[]).await.expect_err("no answer");

        assert_eq!(err.category(), ErrorCategory::Timeout);
        assert!(started.elapsed() < deadline + Duration::from_secs(1));
    }

    #[tokio::test]
    async fn probe_and_models_use_tags_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/tags")
            .with_status(200)
            .with_body(r#"{"models":[{"name":"llama2:7b"},{"name":"qwen:7b"}]}"#)
            .expect(2)
            .create_async()
            .await;

        let provider = OllamaProvider::local(&settings(&server.url()), "sys");
        assert!(probe_availability(&provider, Duration::from_secs(5)).await);
        assert_eq!(provider.list_models().await, vec!["llama2:7b", "qwen:7b"]);
    }

    #[tokio::test]
    async fn probe_reports_down_server_as_unavailable() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/tags")
            .with_status(503)
            .create_async()
            .await;

        let provider = OllamaProvider::local(&settings(&server.url()), "sys");
        assert!(!probe_availability(&provider, Duration::from_secs(5)).await);
        assert!(provider.list_models().await.is_empty());
    }

    #[tokio::test]
    async fn stalled_probe_is_unavailable() {
        let url = silent_endpoint().await;
        let provider = OllamaProvider::local(&settings(&url), "sys")
            .with_probe_timeout(Duration::from_millis(200));

        let started = std::time::Instant::now();
        assert!(!probe_availability(&provider, Duration::from_millis(200)).await);
        assert!(started.elapsed() < Duration::from_millis(1200));
    }
}
