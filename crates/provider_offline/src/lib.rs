use std::time::Duration;

use async_trait::async_trait;
use core_types::{
    AvailabilityProbe, ChatProvider, ConversationMessage, Locality, OfflineSettings,
    ProviderDescriptor, ProviderError, ProviderKind,
};
use rand::Rng;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Budget,
    Routing,
    Attractions,
    Transport,
    Lodging,
    Season,
    General,
}

#[derive(Debug, Clone, Copy)]
pub struct CannedReply {
    pub topic: Topic,
    /// Lowercase.
    pub keywords: &'static [&'static str],
    pub reply: &'static str,
}

pub const CANNED_REPLIES: &[CannedReply] = &[
    CannedReply {
        topic: Topic::Budget,
        keywords: &["預算", "經費", "花費", "budget", "cost"],
        reply: "關於預算管理，我建議您：\n\n💰 **預算分配原則：**\n• 住宿：30-40%\n• 交通：20-25%\n• 餐飲：20-25%\n• 景點門票：10-15%\n• 購物娛樂：5-10%\n\n💡 **節省技巧：**\n• 提前預訂機票和住宿\n• 選擇當地特色小吃\n• 使用公共交通\n• 尋找免費景點\n\n需要我幫您計算具體預算嗎？",
    },
    CannedReply {
        topic: Topic::Routing,
        keywords: &["路線", "行程", "規劃", "itinerary", "route"],
        reply: "旅遊路線規劃建議：\n\n🗺️ **規劃步驟：**\n1. 確定目的地和天數\n2. 列出必訪景點\n3. 按地理位置分組\n4. 考慮交通時間\n5. 預留彈性時間\n\n⏰ **時間安排：**\n• 上午：戶外景點\n• 下午：室內景點或休息\n• 晚上：美食、夜景\n\n📍 **熱門路線推薦：**\n• 台北3日遊\n• 花東縱谷5日遊\n• 環島7日遊\n\n您想去哪裡呢？我可以為您量身定制行程！",
    },
    CannedReply {
        topic: Topic::Attractions,
        keywords: &["景點", "推薦", "好玩", "attraction", "sightseeing"],
        reply: "根據您的需求，我推薦以下景點類型：\n\n🏛️ **文化景點：**\n• 故宮博物院\n• 中正紀念堂\n• 龍山寺\n\n🏞️ **自然景觀：**\n• 阿里山\n• 日月潭\n• 太魯閣峽谷\n\n🎡 **娛樂景點：**\n• 九份老街\n• 淡水漁人碼頭\n• 西門町\n\n🍜 **美食景點：**\n• 士林夜市\n• 永康街\n• 迪化街\n\n您比較喜歡哪種類型的景點呢？",
    },
    CannedReply {
        topic: Topic::Transport,
        keywords: &["交通", "怎麼去", "到達", "transport", "train"],
        reply: "台灣交通方式指南：\n\n🚄 **大眾運輸：**\n• 高鐵：城市間快速移動\n• 台鐵：經濟實惠的選擇\n• 捷運：台北、高雄市區交通\n• 公車：連接各景點\n\n🚗 **自駕遊：**\n• 優點：靈活自由\n• 注意：左駕、國際駕照\n• 建議：提前租車預訂\n\n🚲 **其他選擇：**\n• 計程車：短程便利\n• 腳踏車：市區觀光\n• 步行：深度體驗\n\n您計劃去哪裡？我可以提供具體的交通建議！",
    },
    CannedReply {
        topic: Topic::Lodging,
        keywords: &["住宿", "飯店", "住哪裡", "hotel", "hostel"],
        reply: "住宿選擇建議：\n\n🏨 **住宿類型：**\n• 星級飯店：舒適豪華\n• 精品旅館：特色體驗\n• 民宿：在地文化\n• 青年旅館：經濟實惠\n\n📍 **位置考量：**\n• 市中心：交通便利\n• 景區附近：節省時間\n• 機場附近：早班機首選\n\n💰 **價格區間：**\n• 經濟型：$800-2000/晚\n• 中檔：$2000-5000/晚\n• 高檔：$5000+/晚\n\n🔍 **預訂建議：**\n• 旺季提前3-6個月\n• 淡季提前1-2個月\n• 使用比價網站\n\n需要我推薦特定地區的住宿嗎？",
    },
    CannedReply {
        topic: Topic::Season,
        keywords: &["天氣", "季節", "什麼時候去", "weather", "season"],
        reply: "台灣最佳旅遊季節：\n\n🌸 **春季 (3-5月)：**\n• 櫻花盛開\n• 氣候宜人\n• 適合賞花\n\n☀️ **夏季 (6-8月)：**\n• 海灘活動\n• 高山避暑\n• 注意颱風\n\n🍂 **秋季 (9-11月)：**\n• 天氣穩定\n• 楓葉美景\n• 最佳旅遊季節\n\n❄️ **冬季 (12-2月)：**\n• 溫泉季節\n• 賞雪機會\n• 較少降雨\n\n🌦️ **天氣提醒：**\n• 北部：多雨潮濕\n• 中部：四季分明\n• 南部：溫暖少雨\n• 東部：地形影響大\n\n您計劃什麼時候出發？我可以根據季節推薦適合的行程！",
    },
];

pub const GENERAL_REPLY: &str = "感謝您的提問！作為您的智能旅遊顧問，我可以幫助您：

📋 **主要服務：**
• 旅遊路線規劃
• 預算管理建議
• 景點推薦
• 交通安排
• 住宿選擇
• 季節性建議

💬 **請具體描述：**
• 想去哪裡旅遊？
• 預算大概多少？
• 喜歡什麼類型的景點？
• 計劃旅遊幾天？

我會根據您的需求提供個性化建議！";

fn matching_entry(text: &str) -> Option<&'static CannedReply> {
    let lowered = text.to_lowercase();
    CANNED_REPLIES.iter().find(|entry| {
        entry
            .keywords
            .iter()
            .any(|keyword| lowered.contains(keyword))
    })
}

pub fn classify(text: &str) -> Topic {
    matching_entry(text).map_or(Topic::General, |entry| entry.topic)
}

pub fn canned_reply(text: &str) -> &'static str {
    matching_entry(text).map_or(GENERAL_REPLY, |entry| entry.reply)
}

#[derive(Debug, Clone)]
pub struct OfflineProvider {
    descriptor: ProviderDescriptor,
    min_delay: Duration,
    max_delay: Duration,
}

impl Default for OfflineProvider {
    fn default() -> Self {
        Self::new(&OfflineSettings::default())
    }
}

impl OfflineProvider {
    pub fn new(settings: &OfflineSettings) -> Self {
        Self {
            descriptor: ProviderDescriptor::new(
                "Offline Assistant",
                ProviderKind::Offline,
                Locality::Local,
            ),
            min_delay: Duration::from_millis(settings.min_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
        }
    }

    pub fn instant() -> Self {
        Self::new(&OfflineSettings {
            min_delay_ms: 0,
            max_delay_ms: 0,
        })
    }

    fn pick_delay(&self) -> Duration {
        if self.max_delay <= self.min_delay {
            return self.min_delay;
        }
        let min = self.min_delay.as_millis() as u64;
        let max = self.max_delay.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

#[async_trait]
impl ChatProvider for OfflineProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn send_message(
        &self,
        text: &str,
        _history: &[ConversationMessage],
    ) -> Result<String, ProviderError> {
        let delay = self.pick_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let topic = classify(text);
        debug!(?topic, "offline reply");
        Ok(canned_reply(text).to_string())
    }

    fn availability(&self) -> Option<&dyn AvailabilityProbe> {
        Some(self)
    }
}

#[async_trait]
impl AvailabilityProbe for OfflineProvider {
    async fn probe(&self) -> Result<bool, ProviderError> {
        Ok(true)
    }
}
