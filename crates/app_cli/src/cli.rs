use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Travel-planning assistant backed by local or hosted chat models.
#[derive(Parser, Debug)]
#[command(name = "tripmate", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Directory holding config.json, api keys and logs.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Interface language (zh-TW or en-US).
    #[arg(long, global = true)]
    pub lang: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List configured providers and whether they answer.
    Providers,
    /// Ask a single question.
    Ask {
        text: String,
        /// Provider name or alias; default selection when omitted.
        #[arg(long)]
        provider: Option<String>,
    },
    /// Start an interactive chat.
    Chat {
        #[arg(long)]
        provider: Option<String>,
    },
    /// Send a test message through one provider.
    Test { name: String },
    /// List the models a provider offers.
    Models { name: String },
    /// Manage stored API keys.
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum KeyAction {
    Set { provider: KeyTarget, value: String },
    Remove { provider: KeyTarget },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTarget {
    #[value(name = "openai")]
    OpenAi,
    #[value(name = "huggingface")]
    HuggingFace,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ask_with_provider() {
        let cli = Cli::parse_from(["tripmate", "ask", "東京三天", "--provider", "offline"]);
        match cli.command {
            Command::Ask { text, provider } => {
                assert_eq!(text, "東京三天");
                assert_eq!(provider.as_deref(), Some("offline"));
            }
            other => panic!("expected Ask, got {other:?}"),
        }
    }

    #[test]
    fn global_flags_work_after_subcommand() {
        let cli = Cli::parse_from(["tripmate", "providers", "--lang", "en-US", "--data-dir", "/tmp/t"]);
        assert!(matches!(cli.command, Command::Providers));
        assert_eq!(cli.lang.as_deref(), Some("en-US"));
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/t")));
    }

    #[test]
    fn parses_key_set() {
        let cli = Cli::parse_from(["tripmate", "key", "set", "openai", "sk-1"]);
        match cli.command {
            Command::Key {
                action: KeyAction::Set { provider, value },
            } => {
                assert_eq!(provider, KeyTarget::OpenAi);
                assert_eq!(value, "sk-1");
            }
            other => panic!("expected key set, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_key_target() {
        assert!(Cli::try_parse_from(["tripmate", "key", "remove", "gemini"]).is_err());
    }
}
