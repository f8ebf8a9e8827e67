mod registry;
mod session;

pub use registry::{ProviderRegistry, ProviderStatus};
pub use session::{ChatSession, EntryKind, TranscriptEntry, TurnOutcome, looks_truncated};
