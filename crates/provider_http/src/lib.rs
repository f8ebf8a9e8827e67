mod hugging_face;
mod ollama;
mod open_ai;
mod transport;

use core_types::{APOLOGY_REPLY, ConversationMessage};
use serde_json::{Value, json};

pub use hugging_face::HuggingFaceProvider;
pub use ollama::OllamaProvider;
pub use open_ai::OpenAiProvider;
pub use transport::HttpTransport;

fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

fn to_wire_messages(messages: &[ConversationMessage]) -> Vec<Value> {
    messages
        .iter()
        .map(|msg| json!({"role": msg.role.as_str(), "content": msg.content}))
        .collect()
}

/// Text at `field`, or the fixed apology when it is missing or blank.
fn reply_or_apology(field: Option<&Value>) -> String {
    field
        .and_then(Value::as_str)
        .filter(|text| !text.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| APOLOGY_REPLY.to_string())
}

fn has_text(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}
