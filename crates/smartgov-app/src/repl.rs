//! Line-oriented front end over the turn controller.
//!
//! Plain lines are sent as turns. Lines starting with `/` are commands.

use std::io::Write;

use smartgov_chat::{ChatError, ListenOutcome, SendOutcome, TurnController};
use smartgov_core::{Category, FailureKind, Language, Role};

pub const HELP: &str = "\
Commands:
  <text>          ask a question in the current session
  (empty line)    send the current draft, e.g. after /listen
  /new            start a new session
  /sessions       list sessions
  /switch <n>     switch to session number n
  /history        show the current session
  /lang [en|hi]   show or set the reply language
  /category [tag] show or set the scheme category
  /rate <1-5>     rate the last reply
  /listen         dictate a question
  /help           show this help
  /quit           exit";

/// One parsed input line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Say(String),
    SendDraft,
    New,
    Sessions,
    Switch(usize),
    History,
    Lang(Option<Language>),
    Category(Option<Category>),
    Rate(u8),
    Listen,
    Help,
    Quit,
}

/// Parse one input line. Errors are user-facing usage messages.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Command::SendDraft);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Command::Say(line.to_string()));
    };

    let mut parts = rest.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or_default();
    let arg = parts.next().map(str::trim).filter(|a| !a.is_empty());

    match (name, arg) {
        ("new", None) => Ok(Command::New),
        ("sessions", None) => Ok(Command::Sessions),
        ("switch", Some(n)) => n
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .map(Command::Switch)
            .ok_or_else(|| format!("not a session number: {n}")),
        ("history", None) => Ok(Command::History),
        ("lang", None) => Ok(Command::Lang(None)),
        ("lang", Some(code)) => code
            .parse()
            .map(|l| Command::Lang(Some(l)))
            .map_err(|_| format!("unknown language: {code} (use en or hi)")),
        ("category", None) => Ok(Command::Category(None)),
        ("category", Some(tag)) => tag
            .parse()
            .map(|c| Command::Category(Some(c)))
            .map_err(|e| e.to_string()),
        ("rate", Some(n)) => n
            .parse::<u8>()
            .ok()
            .filter(|n| (1..=5).contains(n))
            .map(Command::Rate)
            .ok_or_else(|| format!("rating must be 1-5, got {n}")),
        ("listen", None) => Ok(Command::Listen),
        ("help", None) => Ok(Command::Help),
        ("quit" | "exit", None) => Ok(Command::Quit),
        _ => Err(format!("unknown command: /{rest} (try /help)")),
    }
}

/// One-line message for a failed operation.
pub fn failure_line(err: &ChatError) -> String {
    match err.kind() {
        FailureKind::InvalidInput => format!("Not sent: {err}"),
        FailureKind::NetworkFailure => {
            "Could not reach the server. Your message is kept; send again to retry.".to_string()
        }
        FailureKind::BackendRejected => format!("The server refused the request: {err}"),
        FailureKind::BackendUnavailable => {
            "Sessions are unavailable right now. Try /new again shortly.".to_string()
        }
        FailureKind::ListenFailed => format!("Voice input failed: {err}"),
        FailureKind::AlreadyListening => "Already listening.".to_string(),
        FailureKind::SpeechUnavailable => "Voice input is not available here.".to_string(),
        FailureKind::NotFound => "That session no longer exists.".to_string(),
        FailureKind::NoCurrentSession => "No session selected. Use /new first.".to_string(),
        FailureKind::InvalidTransition => format!("Internal error: {err}"),
    }
}

/// Execute one command against the controller, printing results to `out`.
///
/// Returns `false` when the session loop should end.
pub async fn run_command<W: Write>(
    controller: &TurnController,
    command: Command,
    out: &mut W,
) -> std::io::Result<bool> {
    match command {
        Command::Quit => return Ok(false),
        Command::Help => writeln!(out, "{HELP}")?,
        Command::Say(text) => match controller.set_draft(text) {
            Ok(true) => send(controller, out).await?,
            Ok(false) => writeln!(out, "A message is already being sent.")?,
            Err(e) => writeln!(out, "{}", failure_line(&e))?,
        },
        Command::SendDraft => {
            if !controller.draft().trim().is_empty() {
                send(controller, out).await?;
            }
        }
        Command::New => match controller.new_session().await {
            Ok(session) => writeln!(out, "Started session {}.", session.id)?,
            Err(e) => writeln!(out, "{}", failure_line(&e))?,
        },
        Command::Sessions => {
            let current = controller.store().current_id();
            let sessions = controller.store().list_sessions();
            if sessions.is_empty() {
                writeln!(out, "No sessions yet.")?;
            }
            for (i, session) in sessions.iter().enumerate() {
                let marker = if current.as_deref() == Some(session.id.as_str()) {
                    '*'
                } else {
                    ' '
                };
                writeln!(
                    out,
                    "{marker} {:>2}. {} ({} turns, {})",
                    i + 1,
                    session.display_title(),
                    session.turn_count(),
                    session.created_at.format("%Y-%m-%d %H:%M")
                )?;
            }
        }
        Command::Switch(n) => {
            let sessions = controller.store().list_sessions();
            match n.checked_sub(1).and_then(|i| sessions.get(i)) {
                Some(session) => match controller.switch_session(&session.id) {
                    Ok(session) => {
                        writeln!(out, "Switched to \"{}\".", session.display_title())?;
                        print_history(&session.messages, out)?;
                    }
                    Err(e) => writeln!(out, "{}", failure_line(&e))?,
                },
                None => writeln!(out, "No session number {n}.")?,
            }
        }
        Command::History => match controller.store().current() {
            Some(session) => print_history(&session.messages, out)?,
            None => writeln!(out, "{}", failure_line(&ChatError::NoCurrentSession))?,
        },
        Command::Lang(None) => writeln!(out, "Language: {}", controller.language())?,
        Command::Lang(Some(language)) => {
            controller.set_language(language);
            writeln!(out, "Language set to {language}.")?;
        }
        Command::Category(None) => writeln!(out, "Category: {}", controller.category())?,
        Command::Category(Some(category)) => {
            writeln!(out, "Category set to {category}.")?;
            controller.set_category(category);
        }
        Command::Rate(rating) => match controller.rate_last_reply(rating).await {
            Ok(()) => writeln!(out, "Thanks for the feedback.")?,
            Err(e) => writeln!(out, "{}", failure_line(&e))?,
        },
        Command::Listen => {
            writeln!(out, "Listening...")?;
            match controller.listen().await {
                Ok(ListenOutcome::Transcribed(text)) => {
                    writeln!(out, "Heard: {text}")?;
                    writeln!(out, "Press enter to send it.")?;
                }
                Ok(ListenOutcome::Discarded) => {}
                Err(e) => writeln!(out, "{}", failure_line(&e))?,
            }
        }
    }
    Ok(true)
}

async fn send<W: Write>(controller: &TurnController, out: &mut W) -> std::io::Result<()> {
    match controller.send().await {
        Ok(SendOutcome::Delivered { assistant, .. }) => {
            writeln!(out, "{}", assistant.text)?;
            // Terminal output is the whole playback here.
            controller.finish_speaking();
        }
        Ok(SendOutcome::Ignored) => writeln!(out, "A message is already being sent.")?,
        Err(e) => writeln!(out, "{}", failure_line(&e))?,
    }
    Ok(())
}

fn print_history<W: Write>(messages: &[smartgov_chat::Message], out: &mut W) -> std::io::Result<()> {
    for message in messages {
        let who = match message.role {
            Role::User => "you",
            Role::Assistant => "assistant",
        };
        writeln!(out, "{who}: {}", message.text)?;
    }
    Ok(())
}
