// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parley chat` command implementation.
//!
//! Runs an interactive REPL against the session engine. The terminal stands
//! in for the host page: outbound control messages are printed, and
//! `/host <origin> <json>` injects inbound ones.

use std::io::Write;

use colored::Colorize;
use parley_config::ParleyConfig;
use parley_core::ParleyError;
use parley_gate::{BlockReason, GateDecision};
use parley_session::{SessionShell, TranscriptEvent, TurnOutcome};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::engine::{self, Engine};

const HELP: &str = "\
/retry                 resend the last message after a failure
/clear                 clear the conversation
/upgrade               ask the host to open the subscription page
/close                 ask the host to close the widget
/host <origin> <json>  deliver a control message as the host page
/quit, /exit           leave";

/// One line of REPL input.
#[derive(Debug, Clone, PartialEq)]
enum Input {
    Quit,
    Help,
    Retry,
    Clear,
    Upgrade,
    Close,
    Host {
        origin: String,
        payload: serde_json::Value,
    },
    Message(String),
    Empty,
    Invalid(String),
}

fn parse_input(line: &str) -> Input {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Input::Empty;
    }
    let Some(command) = trimmed.strip_prefix('/') else {
        return Input::Message(trimmed.to_string());
    };

    let (name, rest) = command.split_once(char::is_whitespace).unwrap_or((command, ""));
    match name {
        "quit" | "exit" => Input::Quit,
        "help" => Input::Help,
        "retry" => Input::Retry,
        "clear" => Input::Clear,
        "upgrade" => Input::Upgrade,
        "close" => Input::Close,
        "host" => {
            let Some((origin, json)) = rest.trim().split_once(char::is_whitespace) else {
                return Input::Invalid("usage: /host <origin> <json>".into());
            };
            match serde_json::from_str(json.trim()) {
                Ok(payload) => Input::Host {
                    origin: origin.to_string(),
                    payload,
                },
                Err(e) => Input::Invalid(format!("invalid JSON: {e}")),
            }
        }
        other => Input::Invalid(format!("unknown command /{other}; try /help")),
    }
}

/// Runs the `parley chat` interactive REPL.
pub async fn run_chat(config: ParleyConfig) -> Result<(), ParleyError> {
    let Engine {
        shell,
        events,
        mut outbound,
    } = engine::build(&config).await?;

    let cancel = CancellationToken::new();
    let runner = tokio::spawn(shell.clone().run(events, cancel.clone()));

    let host = tokio::spawn(async move {
        while let Some((message, target)) = outbound.recv().await {
            let body = serde_json::to_string(&message).unwrap_or_else(|_| message.kind.clone());
            eprintln!("{}", format!("[to host {target}] {body}").dimmed());
        }
    });

    let mut updates = shell.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(TranscriptEvent::Delta { text, .. }) => {
                    print!("{text}");
                    let _ = std::io::stdout().flush();
                }
                Ok(TranscriptEvent::Discarded { .. }) => {
                    println!(" {}", "[discarded]".dimmed());
                }
                Ok(TranscriptEvent::Cleared) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "transcript renderer fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut rl = DefaultEditor::new()
        .map_err(|e| ParleyError::Internal(format!("failed to initialize readline: {e}")))?;

    println!("{}", "parley chat".bold().green());
    println!("session {}", shell.session_id().to_string().dimmed());
    println!("Type {} for commands, {} to exit.\n", "/help".yellow(), "/quit".yellow());

    let prompt = format!("{}> ", "you".green());
    loop {
        match rl.readline(&prompt) {
            Ok(line) => {
                let input = parse_input(&line);
                if !matches!(input, Input::Empty) {
                    let _ = rl.add_history_entry(&line);
                }
                match input {
                    Input::Quit => break,
                    Input::Empty => {}
                    Input::Help => println!("{HELP}"),
                    Input::Invalid(message) => eprintln!("{}", message.yellow()),
                    Input::Message(text) => {
                        let outcome = run_turn(&shell, Turn::Send(&text)).await;
                        report(&shell, outcome);
                    }
                    Input::Retry => {
                        let outcome = run_turn(&shell, Turn::Retry).await;
                        report(&shell, outcome);
                    }
                    Input::Clear => {
                        if let Err(e) = shell.clear_history() {
                            eprintln!("{}: {e}", "error".red());
                        } else {
                            println!("{}", "conversation cleared".dimmed());
                        }
                    }
                    Input::Upgrade => {
                        if let Err(e) = shell.request_upgrade() {
                            eprintln!("{}: {e}", "error".red());
                        }
                    }
                    Input::Close => {
                        if let Err(e) = shell.close() {
                            eprintln!("{}: {e}", "error".red());
                        }
                    }
                    Input::Host { origin, payload } => {
                        let outcome = shell.bridge().handle_inbound(&origin, payload);
                        println!("{}", format!("[from host {origin}] {outcome:?}").dimmed());
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C
                break;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl+D
                break;
            }
            Err(e) => {
                eprintln!("{}: {e}", "error".red());
                break;
            }
        }
    }

    cancel.cancel();
    if let Err(e) = runner.await {
        warn!(error = %e, "session loop ended abnormally");
    }
    printer.abort();
    host.abort();
    debug!(messages = shell.messages().len(), "chat session closed");

    println!("{}", "goodbye".dimmed());
    Ok(())
}

enum Turn<'a> {
    Send(&'a str),
    Retry,
}

/// Runs one turn to completion. Ctrl+C cancels the turn, not the REPL.
async fn run_turn(shell: &SessionShell, turn: Turn<'_>) -> Result<TurnOutcome, ParleyError> {
    let pending = async {
        match turn {
            Turn::Send(text) => shell.send_message(text).await,
            Turn::Retry => shell.retry_last().await,
        }
    };
    tokio::pin!(pending);

    tokio::select! {
        outcome = &mut pending => outcome,
        _ = tokio::signal::ctrl_c() => {
            shell.cancel();
            pending.await
        }
    }
}

fn report(shell: &SessionShell, outcome: Result<TurnOutcome, ParleyError>) {
    match outcome {
        Ok(TurnOutcome::Completed { .. }) => println!(),
        Ok(TurnOutcome::Cancelled) => {}
        Ok(TurnOutcome::Failed { error, .. }) => {
            println!();
            eprintln!("{}: {}", "error".red(), error.message);
            eprintln!("{}", "type /retry to try again".yellow());
        }
        Ok(TurnOutcome::Blocked(decision)) => eprintln!("{}", blocked_message(&decision).yellow()),
        Err(e) => eprintln!("{}: {e}", "error".red()),
    }
    debug!(messages = shell.messages().len(), "turn reported");
}

fn blocked_message(decision: &GateDecision) -> String {
    match decision {
        GateDecision::Loading => "still checking your subscription, try again shortly".into(),
        GateDecision::Blocked(BlockReason::NoSubscription) => {
            "a subscription is required; type /upgrade to subscribe".into()
        }
        GateDecision::Blocked(BlockReason::Inactive(status)) => {
            format!("your subscription is {status}; type /upgrade to renew")
        }
        GateDecision::Blocked(BlockReason::CheckFailed(error)) => {
            format!("could not verify your subscription: {error}")
        }
        GateDecision::Allowed => "allowed".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_gate::SubscriptionStatus;

    #[test]
    fn plain_text_is_a_message() {
        assert_eq!(parse_input("  hello there "), Input::Message("hello there".into()));
        assert_eq!(parse_input("   "), Input::Empty);
    }

    #[test]
    fn slash_commands_parse() {
        assert_eq!(parse_input("/quit"), Input::Quit);
        assert_eq!(parse_input("/exit"), Input::Quit);
        assert_eq!(parse_input("/retry"), Input::Retry);
        assert_eq!(parse_input("/clear"), Input::Clear);
        assert!(matches!(parse_input("/nope"), Input::Invalid(m) if m.contains("/nope")));
    }

    #[test]
    fn host_command_carries_origin_and_payload() {
        let input = parse_input(r#"/host https://shop.example {"type":"FOCUS_REQUEST"}"#);
        assert_eq!(
            input,
            Input::Host {
                origin: "https://shop.example".into(),
                payload: serde_json::json!({"type": "FOCUS_REQUEST"}),
            }
        );
    }

    #[test]
    fn host_command_rejects_bad_json() {
        assert!(matches!(parse_input("/host https://a.example {oops"), Input::Invalid(_)));
        assert!(matches!(parse_input("/host"), Input::Invalid(_)));
    }

    #[test]
    fn blocked_messages_name_the_reason() {
        let inactive = GateDecision::Blocked(BlockReason::Inactive(SubscriptionStatus::Canceled));
        assert!(blocked_message(&inactive).contains("canceled"));
        let failed = GateDecision::Blocked(BlockReason::CheckFailed("timeout".into()));
        assert!(blocked_message(&failed).contains("timeout"));
    }
}
