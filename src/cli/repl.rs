//! Line-oriented REPL for ddas-cli.
//!
//! Intake events and consent decisions both arrive on stdin, so the REPL
//! never blocks on a prompt: consent requests are printed by the output
//! task and answered later with `/accept` or `/skip`.
//!
//! Commands:
//! - `/intake <path> [id]` - queue a file (a bare path does the same)
//! - `{"id": ..., "filepath": ..., "filename": ...}` - queue a raw intake event
//! - `/accept [id]`, `/skip [id]` - answer a consent request
//! - `/dismiss <id>` - drop an entry in any state
//! - `/pending`, `/history`, `/health`
//! - `/quit`, `/exit`, `/q` - exit

use std::io::{self, Write};

use anyhow::Result;
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::orchestrator::IntakeEvent;
use crate::runtime::Decision;

use super::bootstrap::CliContext;
use super::output::{print_history, print_pending};

const HELP: &str = "Available: /intake <path> [id], /accept [id], /skip [id], /dismiss <id>, \
                    /pending, /history, /health, /quit";

/// REPL command variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    /// Queue a file
    Intake(IntakeEvent),
    /// Answer a consent request; `None` means the only outstanding one
    Decide(Decision, Option<String>),
    Dismiss(String),
    Pending,
    History,
    Health,
    Help,
    /// Exit the REPL
    Quit,
    /// Unknown command or bad arguments (will show help)
    Unknown(String),
    /// Empty input (skip)
    Empty,
}

impl ReplCommand {
    /// Parse user input into a REPL command.
    ///
    /// `next_id` supplies an id for `/intake` lines that don't carry one.
    pub fn parse(input: &str, next_id: impl FnOnce() -> String) -> Self {
        let trimmed = input.trim();

        if trimmed.is_empty() {
            return ReplCommand::Empty;
        }

        if trimmed.starts_with('{') {
            return match serde_json::from_str::<IntakeEvent>(trimmed) {
                Ok(event) => ReplCommand::Intake(event),
                Err(e) => ReplCommand::Unknown(format!("Invalid intake event: {}", e)),
            };
        }

        if !trimmed.starts_with('/') {
            return ReplCommand::Intake(IntakeEvent::new(next_id(), trimmed));
        }

        let mut parts = trimmed.split_whitespace();
        let command = parts.next().unwrap_or_default().to_lowercase();
        let first = parts.next().map(str::to_string);
        let second = parts.next().map(str::to_string);

        match (command.as_str(), first) {
            ("/quit" | "/exit" | "/q", _) => ReplCommand::Quit,
            ("/help" | "/h" | "/?", _) => ReplCommand::Help,
            ("/pending" | "/p", _) => ReplCommand::Pending,
            ("/history", _) => ReplCommand::History,
            ("/health", _) => ReplCommand::Health,
            ("/accept" | "/a", id) => ReplCommand::Decide(Decision::Accept, id),
            ("/skip" | "/s", id) => ReplCommand::Decide(Decision::Skip, id),
            ("/dismiss", Some(id)) => ReplCommand::Dismiss(id),
            ("/intake" | "/i", Some(path)) => {
                let id = second.unwrap_or_else(next_id);
                ReplCommand::Intake(IntakeEvent::new(id, path))
            }
            // An absolute path rather than a command
            _ if command[1..].contains('/') => {
                ReplCommand::Intake(IntakeEvent::new(next_id(), trimmed))
            }
            _ => ReplCommand::Unknown(trimmed.to_string()),
        }
    }
}

/// Run an interactive REPL session.
///
/// Returns when the user exits or on EOF (Ctrl+D).
pub async fn run_repl(ctx: &mut CliContext) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let json = ctx.args.json;

    if !json {
        eprintln!("ddas-cli interactive mode");
        eprintln!("{}\n", HELP);
    }

    loop {
        if !json {
            print!("> ");
            io::stdout().flush()?;
        }

        let Some(input) = lines.next_line().await? else {
            eprintln!("\nGoodbye!");
            break;
        };

        let command = ReplCommand::parse(&input, || Utc::now().timestamp_millis().to_string());
        match command {
            ReplCommand::Empty => continue,
            ReplCommand::Quit => {
                eprintln!("Goodbye!");
                break;
            }
            ReplCommand::Help => eprintln!("{}", HELP),
            ReplCommand::Unknown(cmd) => {
                eprintln!("Unknown command: {}", cmd);
                eprintln!("{}", HELP);
            }
            ReplCommand::Intake(event) => match ctx.orchestrator.intake(event).await {
                Ok(Some(entry)) => eprintln!("Queued {} as {}", entry.filename, entry.id),
                Ok(None) => eprintln!("Already pending"),
                Err(e) => eprintln!("Error: {}", e),
            },
            ReplCommand::Decide(decision, id) => {
                let id = match id {
                    Some(id) => Some(id),
                    None => {
                        let waiting = ctx.runtime.awaiting_consent();
                        match waiting.as_slice() {
                            [only] => Some(only.clone()),
                            [] => {
                                eprintln!("Nothing is waiting for a decision");
                                None
                            }
                            _ => {
                                eprintln!("Several files are waiting: {}", waiting.join(", "));
                                None
                            }
                        }
                    }
                };
                if let Some(id) = id {
                    if !ctx.runtime.respond_to_consent(&id, decision) {
                        eprintln!("No consent request for {}", id);
                    }
                }
            }
            ReplCommand::Dismiss(id) => match ctx.orchestrator.dismiss(&id).await {
                Ok(true) => {}
                Ok(false) => eprintln!("Nothing pending for {}", id),
                Err(e) => eprintln!("Error: {}", e),
            },
            ReplCommand::Pending => print_pending(&ctx.orchestrator.pending().await, json)?,
            ReplCommand::History => print_history(&ctx.orchestrator.history().await, json)?,
            ReplCommand::Health => {
                let connected = ctx.orchestrator.probe().await;
                eprintln!(
                    "Processing service is {}",
                    if connected { "reachable" } else { "unreachable" }
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> ReplCommand {
        ReplCommand::parse(input, || "auto".to_string())
    }

    // ────────────────────────────────────────────────────────────────────────────────
    // Tests for ReplCommand::parse
    // ────────────────────────────────────────────────────────────────────────────────

    mod parse_tests {
        use super::*;

        #[test]
        fn parses_quit_aliases_case_insensitive() {
            assert_eq!(parse("/quit"), ReplCommand::Quit);
            assert_eq!(parse("/EXIT"), ReplCommand::Quit);
            assert_eq!(parse("  /q  "), ReplCommand::Quit);
        }

        #[test]
        fn parses_intake_with_and_without_id() {
            assert_eq!(
                parse("/intake /tmp/a.pdf 42"),
                ReplCommand::Intake(IntakeEvent::new("42", "/tmp/a.pdf"))
            );
            assert_eq!(
                parse("/intake /tmp/a.pdf"),
                ReplCommand::Intake(IntakeEvent::new("auto", "/tmp/a.pdf"))
            );
        }

        #[test]
        fn bare_path_is_intake() {
            assert_eq!(
                parse("/home/me/Downloads/b.zip\n"),
                ReplCommand::Intake(IntakeEvent::new("auto", "/home/me/Downloads/b.zip"))
            );
            assert_eq!(
                parse("Downloads/b.zip"),
                ReplCommand::Intake(IntakeEvent::new("auto", "Downloads/b.zip"))
            );
        }

        #[test]
        fn parses_raw_json_intake() {
            assert_eq!(
                parse(r#"{"id": "7", "filename": "b.zip", "filepath": "/tmp/b.zip"}"#),
                ReplCommand::Intake(IntakeEvent::new("7", "/tmp/b.zip").with_filename("b.zip"))
            );
            assert!(matches!(parse(r#"{"id": "7"}"#), ReplCommand::Unknown(_)));
        }

        #[test]
        fn parses_decisions() {
            assert_eq!(
                parse("/accept 42"),
                ReplCommand::Decide(Decision::Accept, Some("42".to_string()))
            );
            assert_eq!(parse("/skip"), ReplCommand::Decide(Decision::Skip, None));
        }

        #[test]
        fn dismiss_requires_id() {
            assert_eq!(parse("/dismiss 3"), ReplCommand::Dismiss("3".to_string()));
            assert_eq!(
                parse("/dismiss"),
                ReplCommand::Unknown("/dismiss".to_string())
            );
        }

        #[test]
        fn parses_listings() {
            assert_eq!(parse("/pending"), ReplCommand::Pending);
            assert_eq!(parse("/history"), ReplCommand::History);
            assert_eq!(parse("/health"), ReplCommand::Health);
            assert_eq!(parse("/help"), ReplCommand::Help);
        }

        #[test]
        fn parses_empty_input() {
            assert_eq!(parse(""), ReplCommand::Empty);
            assert_eq!(parse("   "), ReplCommand::Empty);
            assert_eq!(parse("\t\n"), ReplCommand::Empty);
        }
    }
}
