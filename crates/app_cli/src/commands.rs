use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use core_orchestrator::{ChatSession, EntryKind, TranscriptEntry, TurnOutcome};
use core_types::{ChatProvider, ConversationRole, SecretRef};
use i18n::I18n;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use crate::bootstrap::{App, alias, find_provider};
use crate::cli::{Command, KeyAction, KeyTarget};

pub async fn run(app: App, command: Command) -> Result<()> {
    let i18n = I18n::new(app.config.language);
    match command {
        Command::Providers => list_providers(&app, &i18n).await,
        Command::Ask { text, provider } => {
            let mut session = open_session(&app, provider.as_deref()).await?;
            match session.send(&text).await {
                TurnOutcome::Ignored => {}
                TurnOutcome::Replied { reply, truncated } => {
                    println!("{reply}");
                    if truncated {
                        print_truncation_notice(&session);
                    }
                }
                TurnOutcome::Failed(err) => {
                    print_trailing_entries(&session, 1, &i18n);
                    bail!(err);
                }
            }
            Ok(())
        }
        Command::Chat { provider } => {
            let session = open_session(&app, provider.as_deref()).await?;
            chat_loop(&app, session, &i18n).await
        }
        Command::Test { name } => {
            let provider = lookup(&app, &name, &i18n)?;
            if app.registry.test_provider(provider.as_ref()).await {
                println!("{} {}", provider.name(), i18n.t("test.ok"));
                Ok(())
            } else {
                bail!("{} {}", provider.name(), i18n.t("test.failed"))
            }
        }
        Command::Models { name } => {
            let provider = lookup(&app, &name, &i18n)?;
            let Some(listing) = provider.model_listing() else {
                println!("{}", i18n.t("providers.no_models"));
                return Ok(());
            };
            for model in listing.list_models().await {
                println!("{model}");
            }
            Ok(())
        }
        Command::Key { action } => {
            println!("{}", i18n.t(manage_key(&app, action)?));
            Ok(())
        }
    }
}

async fn open_session(app: &App, provider: Option<&str>) -> Result<ChatSession> {
    let registry = Arc::clone(&app.registry);
    match provider {
        Some(name) => {
            let i18n = I18n::new(app.config.language);
            let chosen = lookup(app, name, &i18n)?;
            Ok(ChatSession::with_provider(registry, chosen, app.config.language))
        }
        None => Ok(ChatSession::start(registry, app.config.language).await),
    }
}

fn lookup(app: &App, name: &str, i18n: &I18n) -> Result<Arc<dyn ChatProvider>> {
    find_provider(&app.registry, name)
        .with_context(|| format!("{}: {name}", i18n.t("chat.unknown_provider")))
}

async fn list_providers(app: &App, i18n: &I18n) -> Result<()> {
    println!("{}", i18n.t("providers.header"));
    for status in app.registry.check_all().await {
        let state = if status.available {
            i18n.t("providers.available")
        } else {
            i18n.t("providers.unavailable")
        };
        println!(
            "  {:<14} {:<40} {state}",
            alias(status.provider.as_ref()),
            status.provider.name()
        );
    }
    Ok(())
}

/// Returns the i18n key of the message to show.
fn manage_key(app: &App, action: KeyAction) -> Result<&'static str> {
    match action {
        KeyAction::Set { provider, value } => {
            app.secrets.put(key_slot(app, provider), value.trim())?;
            info!(target_provider = ?provider, "api key stored");
            Ok("key.saved")
        }
        KeyAction::Remove { provider } => {
            if app.secrets.remove(key_slot(app, provider))? {
                info!(target_provider = ?provider, "api key removed");
                Ok("key.removed")
            } else {
                Ok("key.not_found")
            }
        }
    }
}

fn key_slot(app: &App, target: KeyTarget) -> &SecretRef {
    match target {
        KeyTarget::OpenAi => &app.config.providers.open_ai.api_key_ref,
        KeyTarget::HuggingFace => &app.config.providers.hugging_face.api_key_ref,
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ReplInput<'a> {
    Quit,
    Clear,
    Providers,
    Use(&'a str),
    Message(&'a str),
}

fn parse_repl_line(line: &str) -> ReplInput<'_> {
    let line = line.trim();
    match line.split_once(' ') {
        _ if line == "/quit" || line == "/exit" => ReplInput::Quit,
        _ if line == "/clear" => ReplInput::Clear,
        _ if line == "/providers" => ReplInput::Providers,
        Some(("/use", name)) => ReplInput::Use(name.trim()),
        _ => ReplInput::Message(line),
    }
}

async fn chat_loop(app: &App, mut session: ChatSession, i18n: &I18n) -> Result<()> {
    print_trailing_entries(&session, 1, i18n);
    println!("{}: {}", i18n.t("chat.using"), session.provider().name());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{}> ", i18n.t("chat.prompt"));
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        match parse_repl_line(&line) {
            ReplInput::Quit => break,
            ReplInput::Clear => {
                session.clear();
                println!("{}", i18n.t("chat.cleared"));
            }
            ReplInput::Providers => list_providers(app, i18n).await?,
            ReplInput::Use(name) => match find_provider(&app.registry, name) {
                Some(provider) => {
                    session.switch_provider(provider);
                    println!("{}: {}", i18n.t("chat.using"), session.provider().name());
                }
                None => println!("{}: {name}", i18n.t("chat.unknown_provider")),
            },
            ReplInput::Message(text) => {
                let before = session.transcript().len();
                if session.send(text).await == TurnOutcome::Ignored {
                    continue;
                }
                // skip the echoed user entry
                print_trailing_entries(&session, session.transcript().len() - before - 1, i18n);
            }
        }
    }
    Ok(())
}

fn print_trailing_entries(session: &ChatSession, count: usize, i18n: &I18n) {
    let transcript = session.transcript();
    for entry in &transcript[transcript.len().saturating_sub(count)..] {
        match entry.kind {
            EntryKind::Error => eprintln!("{}", entry.content),
            EntryKind::Message | EntryKind::Notice => println!("{}", render_entry(entry, i18n)),
        }
    }
}

fn render_entry(entry: &TranscriptEntry, i18n: &I18n) -> String {
    match (entry.kind, entry.role) {
        (EntryKind::Message, ConversationRole::Assistant) => {
            format!("{}: {}", i18n.t("chat.assistant"), entry.content)
        }
        _ => entry.content.clone(),
    }
}

fn print_truncation_notice(session: &ChatSession) {
    if let Some(entry) = session.transcript().last()
        && entry.kind == EntryKind::Notice
    {
        eprintln!("{}", entry.content);
    }
}

#[cfg(test)]
mod tests {
    use core_types::UiLanguage;
    use provider_offline::OfflineProvider;

    use super::*;

    #[test]
    fn repl_commands_are_recognised() {
        assert_eq!(parse_repl_line("/quit"), ReplInput::Quit);
        assert_eq!(parse_repl_line(" /clear "), ReplInput::Clear);
        assert_eq!(parse_repl_line("/providers"), ReplInput::Providers);
        assert_eq!(parse_repl_line("/use  offline"), ReplInput::Use("offline"));
        assert_eq!(
            parse_repl_line("京都三天怎麼玩"),
            ReplInput::Message("京都三天怎麼玩")
        );
    }

    #[test]
    fn removing_a_missing_key_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = App::load(dir.path(), None);
        let remove = || KeyAction::Remove {
            provider: KeyTarget::HuggingFace,
        };

        assert_eq!(manage_key(&app, remove()).expect("remove"), "key.not_found");
        let set = KeyAction::Set {
            provider: KeyTarget::HuggingFace,
            value: " hf_123 ".into(),
        };
        assert_eq!(manage_key(&app, set).expect("set"), "key.saved");
        assert_eq!(manage_key(&app, remove()).expect("remove"), "key.removed");
        assert_eq!(manage_key(&app, remove()).expect("remove"), "key.not_found");
    }

    #[tokio::test]
    async fn assistant_replies_are_labelled() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = App::load(dir.path(), Some("en-US"));
        let mut session = ChatSession::with_provider(
            Arc::clone(&app.registry),
            Arc::new(OfflineProvider::instant()),
            UiLanguage::EnUs,
        );
        let i18n = I18n::new(UiLanguage::EnUs);

        assert!(!render_entry(&session.transcript()[0], &i18n).starts_with("Assistant: "));
        session.send("hotel").await;
        let reply = session.transcript().last().expect("reply");
        assert!(render_entry(reply, &i18n).starts_with("Assistant: 住宿選擇建議"));
    }

    #[test]
    fn unknown_slash_text_is_sent_as_message() {
        assert_eq!(parse_repl_line("/usefoo"), ReplInput::Message("/usefoo"));
    }
}
