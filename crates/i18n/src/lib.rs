use std::collections::BTreeMap;

use core_types::UiLanguage;

#[derive(Debug, Clone)]
pub struct I18n {
    lang: UiLanguage,
    zh_tw: BTreeMap<&'static str, &'static str>,
    en_us: BTreeMap<&'static str, &'static str>,
}

impl I18n {
    pub fn new(lang: UiLanguage) -> Self {
        Self {
            lang,
            zh_tw: zh_tw_map(),
            en_us: en_us_map(),
        }
    }

    pub fn t<'a>(&'a self, key: &'a str) -> &'a str {
        let (primary, secondary) = match self.lang {
            UiLanguage::ZhTw => (&self.zh_tw, &self.en_us),
            UiLanguage::EnUs => (&self.en_us, &self.zh_tw),
        };
        primary
            .get(key)
            .or_else(|| secondary.get(key))
            .copied()
            .unwrap_or(key)
    }
}

fn zh_tw_map() -> BTreeMap<&'static str, &'static str> {
    BTreeMap::from([
        (
            "chat.welcome",
            "🎉 歡迎使用 AI 旅遊顧問！\n\n我可以幫您規劃路線、估算預算、推薦景點、安排交通與住宿。\n\n💬 請告訴我您的旅遊需求，例如：「我想去東京五天，預算三萬台幣，請幫我規劃」。",
        ),
        (
            "chat.truncated",
            "⚠️ **回應可能被截斷**\n\n您可以用更簡潔的方式重新提問、把問題拆成幾個小問題，或直接告訴我最關心的部分。",
        ),
        ("chat.cleared", "對話已清除"),
        ("chat.prompt", "您"),
        ("chat.assistant", "顧問"),
        ("chat.using", "目前使用"),
        ("chat.unknown_provider", "找不到這個服務"),
        (
            "error.not_configured",
            "這個 AI 服務尚未設定，請先設定 API Key 或服務網址。",
        ),
        (
            "error.timeout",
            "AI 回應超時，請稍後再試。可能是模型正在載入或網路較慢。",
        ),
        (
            "error.transport",
            "無法連線到 AI 服務，請確認網路連線或服務是否正在運行。",
        ),
        (
            "error.upstream",
            "AI 服務暫時不可用，請檢查 API Key 是否正確以及模型是否可用。",
        ),
        ("error.malformed_response", "AI 服務回傳了無法解析的內容，請稍後再試。"),
        ("providers.header", "可用的 AI 服務"),
        ("providers.available", "可用"),
        ("providers.unavailable", "無法連線"),
        ("providers.no_models", "這個服務不支援列出模型"),
        ("test.ok", "連線成功！"),
        ("test.failed", "連線失敗，請檢查設定。"),
        ("key.saved", "API Key 已儲存"),
        ("key.removed", "API Key 已移除"),
        ("key.not_found", "沒有儲存這個服務的 API Key"),
    ])
}

fn en_us_map() -> BTreeMap<&'static str, &'static str> {
    BTreeMap::from([
        (
            "chat.welcome",
            "🎉 Welcome to the AI travel assistant!\n\nI can plan routes, estimate budgets, recommend sights, and suggest transport and lodging.\n\n💬 Tell me about your trip, e.g. \"Five days in Tokyo on a 30,000 TWD budget, please plan it\".",
        ),
        (
            "chat.truncated",
            "⚠️ **The reply may have been cut off**\n\nTry asking more briefly, split the question into smaller ones, or tell me which part matters most.",
        ),
        ("chat.cleared", "Conversation cleared"),
        ("chat.prompt", "You"),
        ("chat.assistant", "Assistant"),
        ("chat.using", "Using"),
        ("chat.unknown_provider", "No such provider"),
        (
            "error.not_configured",
            "This AI provider is not configured yet. Set its API key or URL first.",
        ),
        (
            "error.timeout",
            "The AI took too long to answer. The model may still be loading or the network is slow.",
        ),
        (
            "error.transport",
            "Could not reach the AI service. Check your connection or whether the service is running.",
        ),
        (
            "error.upstream",
            "The AI service is temporarily unavailable. Check the API key and that the model exists.",
        ),
        (
            "error.malformed_response",
            "The AI service sent a reply that could not be read. Please try again later.",
        ),
        ("providers.header", "Configured AI providers"),
        ("providers.available", "available"),
        ("providers.unavailable", "unreachable"),
        ("providers.no_models", "This provider cannot list models"),
        ("test.ok", "Connection succeeded!"),
        ("test.failed", "Connection failed, check the configuration."),
        ("key.saved", "API key saved"),
        ("key.removed", "API key removed"),
        ("key.not_found", "No API key stored for this provider"),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_traditional_chinese_translation() {
        let i18n = I18n::new(UiLanguage::ZhTw);
        assert_eq!(i18n.t("test.ok"), "連線成功！");
    }

    #[test]
    fn falls_back_to_key_when_missing() {
        let i18n = I18n::new(UiLanguage::EnUs);
        assert_eq!(i18n.t("not.exists"), "not.exists");
    }

    #[test]
    fn both_languages_cover_the_same_keys() {
        let zh: Vec<_> = zh_tw_map().into_keys().collect();
        let en: Vec<_> = en_us_map().into_keys().collect();
        assert_eq!(zh, en);
    }

    #[test]
    fn english_lookup_uses_english_table() {
        let i18n = I18n::new(UiLanguage::EnUs);
        assert_eq!(i18n.t("chat.prompt"), "You");
        assert_eq!(i18n.t("key.not_found"), "No API key stored for this provider");
    }
}
