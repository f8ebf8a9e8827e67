use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use core_types::{
    HuggingFaceSettings, OfflineSettings, OllamaSettings, OpenAiSettings, SelectionPolicy,
    UiLanguage,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const CURRENT_SCHEMA_VERSION: u32 = 2;

pub const ENV_PREFIX: &str = "TRIPMATE_";

pub const DEFAULT_SYSTEM_PROMPT: &str = "你是一位專業的台灣旅遊顧問，熟悉行程規劃。請協助使用者：

1. 規劃合理的旅遊路線與每日行程
2. 分配預算並提供省錢技巧
3. 推薦景點與活動
4. 建議交通方式與大約費用
5. 推薦住宿選擇
6. 說明季節與天氣注意事項

請使用繁體中文，以條列與表情符號整理內容，回答要完整具體，不要中途截斷。
若問題與旅遊無關，請禮貌地把話題帶回旅遊規劃。";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub local_encryption_enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub ollama: OllamaSettings,
    #[serde(default)]
    pub hugging_face: HuggingFaceSettings,
    #[serde(default)]
    pub open_ai: OpenAiSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub schema_version: u32,
    pub language: UiLanguage,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub offline: OfflineSettings,
    #[serde(default)]
    pub selection: SelectionPolicy,
    #[serde(default)]
    pub security: SecurityConfig,
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            language: UiLanguage::ZhTw,
            system_prompt: default_system_prompt(),
            providers: ProvidersConfig::default(),
            offline: OfflineSettings::default(),
            selection: SelectionPolicy::default(),
            security: SecurityConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvApiKeys {
    pub hugging_face: Option<String>,
    pub open_ai: Option<String>,
}

impl AppConfig {
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> EnvApiKeys
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(url) = var("OLLAMA_BASE_URL") {
            debug!(%url, "ollama base url overridden from environment");
            self.providers.ollama.base_url = url;
        }
        if let Some(model) = var("OLLAMA_MODEL") {
            self.providers.ollama.model = model;
        }
        if let Some(url) = var("OLLAMA_CLOUD_URL") {
            self.providers.ollama.cloud_url = Some(url);
        }
        if let Some(model) = var("HUGGINGFACE_MODEL") {
            self.providers.hugging_face.model = model;
        }
        if let Some(model) = var("OPENAI_MODEL") {
            self.providers.open_ai.model = model;
        }
        if let Some(raw) = var("LANG") {
            match UiLanguage::parse(&raw) {
                Some(lang) => self.language = lang,
                None => warn!(value = %raw, "ignoring unknown TRIPMATE_LANG"),
            }
        }

        EnvApiKeys {
            hugging_face: var("HUGGINGFACE_API_KEY"),
            open_ai: var("OPENAI_API_KEY"),
        }
    }
}

pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            path: dir.into().join("config.json"),
        }
    }

    pub fn from_default_location() -> Result<Self> {
        Ok(Self::from_dir(default_data_dir()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_or_init(&self) -> Result<AppConfig> {
        if !self.path.exists() {
            let config = AppConfig::default();
            self.save(&config)?;
            return Ok(config);
        }

        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let mut config: AppConfig =
            serde_json::from_str(&raw).context("failed to parse app config json")?;
        if self.migrate(&mut config) {
            self.save(&config)?;
        }
        Ok(config)
    }

    pub fn save(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let text = serde_json::to_string_pretty(config).context("failed to serialize config")?;
        fs::write(&self.path, text)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }

    fn migrate(&self, config: &mut AppConfig) -> bool {
        if config.schema_version >= CURRENT_SCHEMA_VERSION {
            return false;
        }

        warn!(
            from = config.schema_version,
            to = CURRENT_SCHEMA_VERSION,
            "migrating app config schema"
        );

        // v1 had no cascade; an empty list would skip straight to offline
        if config.selection.preference.is_empty() {
            config.selection = SelectionPolicy::default();
        }
        if config.system_prompt.trim().is_empty() {
            config.system_prompt = default_system_prompt();
        }
        config.schema_version = CURRENT_SCHEMA_VERSION;
        true
    }
}

pub fn default_data_dir() -> Result<PathBuf> {
    let mut dir = dirs::config_dir().context("failed to resolve config_dir")?;
    dir.push("tripmate");
    Ok(dir)
}
