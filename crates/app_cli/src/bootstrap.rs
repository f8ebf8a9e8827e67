use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use config::{AppConfig, ConfigStore, EnvApiKeys};
use core_orchestrator::ProviderRegistry;
use core_types::{ChatProvider, Locality, ProviderKind, UiLanguage};
use provider_http::{HuggingFaceProvider, OllamaProvider, OpenAiProvider};
use provider_offline::OfflineProvider;
use secrets::SecretStore;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

pub const SECRETS_PASSWORD_VAR: &str = "TRIPMATE_SECRETS_PASSWORD";

pub struct App {
    pub config: AppConfig,
    pub secrets: SecretStore,
    pub registry: Arc<ProviderRegistry>,
}

impl App {
    pub fn load(data_dir: &Path, lang: Option<&str>) -> Self {
        let store = ConfigStore::from_dir(data_dir);
        let mut config = match store.load_or_init() {
            Ok(cfg) => cfg,
            Err(err) => {
                error!("failed to load config: {err:#}");
                AppConfig::default()
            }
        };
        let env_keys = config.apply_env_overrides(|name| std::env::var(name).ok());
        if let Some(raw) = lang {
            match UiLanguage::parse(raw) {
                Some(parsed) => config.language = parsed,
                None => warn!(value = %raw, "ignoring unknown --lang"),
            }
        }

        let password = if config.security.local_encryption_enabled {
            let password = std::env::var(SECRETS_PASSWORD_VAR).ok();
            if password.is_none() {
                warn!("local encryption is enabled but {SECRETS_PASSWORD_VAR} is not set");
            }
            password
        } else {
            None
        };
        let secrets = SecretStore::new(data_dir).with_password(password);

        let registry = Arc::new(build_registry(&config, &secrets, env_keys));
        Self {
            config,
            secrets,
            registry,
        }
    }
}

/// Registers providers in fixed order: Ollama local, Ollama cloud, OpenAI,
/// Hugging Face, with the offline assistant as fallback.
pub fn build_registry(
    config: &AppConfig,
    secrets: &SecretStore,
    env_keys: EnvApiKeys,
) -> ProviderRegistry {
    let prompt = config.system_prompt.as_str();
    let probe_timeout = config.selection.probe_timeout();
    let settings = &config.providers;
    let mut providers: Vec<Arc<dyn ChatProvider>> = Vec::new();

    if settings.ollama.enabled {
        providers.push(Arc::new(
            OllamaProvider::local(&settings.ollama, prompt).with_probe_timeout(probe_timeout),
        ));
        providers.push(Arc::new(
            OllamaProvider::cloud(&settings.ollama, prompt).with_probe_timeout(probe_timeout),
        ));
    }
    if settings.open_ai.enabled {
        let key = secrets.resolve_api_key(&settings.open_ai.api_key_ref, env_keys.open_ai);
        providers.push(Arc::new(OpenAiProvider::new(&settings.open_ai, key, prompt)));
    }
    if settings.hugging_face.enabled {
        let key =
            secrets.resolve_api_key(&settings.hugging_face.api_key_ref, env_keys.hugging_face);
        providers.push(Arc::new(
            HuggingFaceProvider::new(&settings.hugging_face, key, prompt)
                .with_probe_timeout(probe_timeout),
        ));
    }

    let configured = providers.iter().filter(|p| p.is_configured()).count();
    info!(
        registered = providers.len(),
        configured, "provider registry assembled"
    );
    ProviderRegistry::new(providers, Arc::new(OfflineProvider::new(&config.offline)))
        .with_policy(config.selection.clone())
}

pub fn alias(provider: &dyn ChatProvider) -> &'static str {
    let descriptor = provider.descriptor();
    match (descriptor.kind, descriptor.locality) {
        (ProviderKind::Ollama, Locality::Local) => "ollama-local",
        (ProviderKind::Ollama, Locality::Remote) => "ollama-cloud",
        (ProviderKind::OpenAi, _) => "openai",
        (ProviderKind::HuggingFace, _) => "huggingface",
        (ProviderKind::Offline, _) => "offline",
    }
}

pub fn find_provider(registry: &ProviderRegistry, query: &str) -> Option<Arc<dyn ChatProvider>> {
    let query = query.trim();
    registry.provider_by_name(query).or_else(|| {
        registry.registered().into_iter().find(|provider| {
            provider.name().eq_ignore_ascii_case(query)
                || alias(provider.as_ref()).eq_ignore_ascii_case(query)
        })
    })
}

pub fn resolve_data_dir(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| config::default_data_dir().ok())
        .unwrap_or_else(|| PathBuf::from(".tripmate"))
}

pub fn init_local_logger(log_dir: &Path) -> tracing_appender::non_blocking::WorkerGuard {
    if let Err(err) = fs::create_dir_all(log_dir) {
        eprintln!("failed to create log dir `{}`: {err}", log_dir.display());
    }
    let file_appender = tracing_appender::rolling::daily(log_dir, "tripmate.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tripmate=debug"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .json()
        .with_writer(writer)
        .init();

    guard
}

pub fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    Ok(())
}
