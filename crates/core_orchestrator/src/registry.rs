use std::sync::Arc;

use core_types::{
    ChatProvider, ConversationMessage, ProviderError, SelectionPolicy, TEST_PROBE_MESSAGE,
    probe_availability,
};
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct ProviderStatus {
    pub provider: Arc<dyn ChatProvider>,
    pub available: bool,
}

pub struct ProviderRegistry {
    providers: Vec<Arc<dyn ChatProvider>>,
    fallback: Arc<dyn ChatProvider>,
    policy: SelectionPolicy,
}

impl ProviderRegistry {
    pub fn new(providers: Vec<Arc<dyn ChatProvider>>, fallback: Arc<dyn ChatProvider>) -> Self {
        Self {
            providers,
            fallback,
            policy: SelectionPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: SelectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &SelectionPolicy {
        &self.policy
    }

    pub fn fallback(&self) -> Arc<dyn ChatProvider> {
        Arc::clone(&self.fallback)
    }

    /// Configured providers in registration order, fallback last.
    pub fn available_providers(&self) -> Vec<Arc<dyn ChatProvider>> {
        self.providers
            .iter()
            .filter(|provider| provider.is_configured())
            .chain(std::iter::once(&self.fallback))
            .cloned()
            .collect()
    }

    pub fn registered(&self) -> Vec<Arc<dyn ChatProvider>> {
        self.providers
            .iter()
            .chain(std::iter::once(&self.fallback))
            .cloned()
            .collect()
    }

    pub fn provider_by_name(&self, name: &str) -> Option<Arc<dyn ChatProvider>> {
        self.registered()
            .into_iter()
            .find(|provider| provider.name() == name)
    }

    pub fn local_providers(&self) -> Vec<Arc<dyn ChatProvider>> {
        self.available_providers()
            .into_iter()
            .filter(|provider| provider.descriptor().is_local())
            .collect()
    }

    pub fn remote_providers(&self) -> Vec<Arc<dyn ChatProvider>> {
        self.available_providers()
            .into_iter()
            .filter(|provider| !provider.descriptor().is_local())
            .collect()
    }

    /// Never fails; ends at the fallback.
    pub async fn select_default(&self) -> Arc<dyn ChatProvider> {
        let deadline = self.policy.probe_timeout();
        let candidates: Vec<&Arc<dyn ChatProvider>> = self
            .providers
            .iter()
            .filter(|provider| provider.is_configured())
            .collect();
        let mut tried = vec![false; candidates.len()];

        for matcher in &self.policy.preference {
            for (idx, &provider) in candidates.iter().enumerate() {
                if tried[idx] || !matcher.matches(provider.descriptor()) {
                    continue;
                }
                tried[idx] = true;

                if probe_availability(provider.as_ref(), deadline).await {
                    info!(provider = %provider.name(), kind = %provider.descriptor().kind, "selected chat provider");
                    return Arc::clone(provider);
                }
                warn!(provider = %provider.name(), "chat provider unavailable, trying next candidate");
            }
        }

        info!(provider = %self.fallback.name(), "no chat provider reachable, using offline fallback");
        self.fallback()
    }

    pub async fn send_message(
        &self,
        provider: &dyn ChatProvider,
        text: &str,
        history: &[ConversationMessage],
    ) -> Result<String, ProviderError> {
        if !provider.is_configured() {
            return Err(ProviderError::not_configured(provider.name()));
        }
        match provider.send_message(text, history).await {
            Ok(reply) => {
                debug!(provider = %provider.name(), chars = reply.chars().count(), "chat reply received");
                Ok(reply)
            }
            Err(err) => {
                warn!(provider = %err.provider, category = err.category().as_str(), "chat request failed: {err}");
                Err(err)
            }
        }
    }

    pub async fn test_provider(&self, provider: &dyn ChatProvider) -> bool {
        match self.send_message(provider, TEST_PROBE_MESSAGE, &[]).await {
            Ok(_) => {
                info!(provider = %provider.name(), "provider test succeeded");
                true
            }
            Err(_) => false,
        }
    }

    pub async fn check_all(&self) -> Vec<ProviderStatus> {
        let deadline = self.policy.probe_timeout();
        let mut statuses = Vec::new();
        for provider in self.available_providers() {
            let available = probe_availability(provider.as_ref(), deadline).await;
            statuses.push(ProviderStatus {
                provider,
                available,
            });
        }
        statuses
    }
}
