//! Command Front-end
//!
//! Parses the owner's slash commands (`/setmessage ...`, `/stats`, ...) into
//! a typed [`Command`], runs it against the engine and renders the reply.

use crate::autoreply::{
    ActiveMessage, AutoreplyError, AutoresponderConfig, FrequencyPolicy, ResponseEngine,
    StatsSummary, TypeFilter,
};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;

/// Prefix on every reply so the owner can tell it apart from their own text
pub const REPLY_HEADER: &str = "[Autoresponder]";

/// Accepted `/activate` timestamp layout, interpreted as UTC
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

pub const HELP_TEXT: &str = "\
Available commands:
/autoresponder on|off - turn the autoresponder on or off
/activate from <YYYY-MM-DD HH:MM> - respond only from this time (UTC)
/activate until <YYYY-MM-DD HH:MM> - stop responding after this time (UTC)
/activate reset - remove the activation window
/setmessage <message> - set the response message
/settemplate <name>:<message> - save a template
/usetemplate <name> - respond with a saved template
/listtemplates - list saved templates
/deletetemplate <name> - delete a template
/setdelay <seconds> - wait before responding
/setfrequency every message|daily|weekly|monthly - limit responses per chat
/types personal|group|all - choose which chats get responses
/stats - show response statistics
/showconfig - show the current configuration
/reset - reset all settings (asks for confirmation)
/confirmreset - confirm a pending reset
/help - show this help";

/// Command parsing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Commands start with '/'. Send /help for the list.")]
    NotACommand,

    #[error("Unknown command '{0}'. Send /help for the list.")]
    Unknown(String),

    #[error("Missing argument. Usage: {0}")]
    MissingArgument(&'static str),

    #[error("{0}")]
    InvalidArgument(String),
}

/// A parsed owner command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Autoresponder(bool),
    ActivateFrom(DateTime<Utc>),
    ActivateUntil(DateTime<Utc>),
    ActivateReset,
    SetMessage(String),
    SetTemplate { name: String, body: String },
    UseTemplate(String),
    ListTemplates,
    DeleteTemplate(String),
    SetDelay(u64),
    SetFrequency(FrequencyPolicy),
    Types(TypeFilter),
    Stats,
    ShowConfig,
    Reset,
    ConfirmReset,
    Help,
}

fn required<'a>(rest: &'a str, usage: &'static str) -> Result<&'a str, ParseError> {
    if rest.is_empty() {
        Err(ParseError::MissingArgument(usage))
    } else {
        Ok(rest)
    }
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    s.strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(s)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, ParseError> {
    let naive = NaiveDateTime::parse_from_str(unquote(s), TIMESTAMP_FORMAT).map_err(|_| {
        ParseError::InvalidArgument("Invalid date/time format. Use YYYY-MM-DD HH:MM.".to_string())
    })?;
    Ok(Utc.from_utc_datetime(&naive))
}

/// Parse one line of owner input
pub fn parse(text: &str) -> Result<Command, ParseError> {
    let text = text.trim();
    if !text.starts_with('/') {
        return Err(ParseError::NotACommand);
    }

    let (head, rest) = match text.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (text, ""),
    };

    match head.to_lowercase().as_str() {
        "/autoresponder" => match required(rest, "/autoresponder on|off")?
            .to_lowercase()
            .as_str()
        {
            "on" => Ok(Command::Autoresponder(true)),
            "off" => Ok(Command::Autoresponder(false)),
            _ => Err(ParseError::InvalidArgument(
                "Use /autoresponder on or /autoresponder off.".to_string(),
            )),
        },
        "/activate" => {
            let rest = required(rest, "/activate from|until <YYYY-MM-DD HH:MM> or /activate reset")?;
            let (mode, value) = match rest.split_once(char::is_whitespace) {
                Some((mode, value)) => (mode.to_lowercase(), value.trim()),
                None => (rest.to_lowercase(), ""),
            };
            match mode.as_str() {
                "from" => Ok(Command::ActivateFrom(parse_timestamp(required(
                    value,
                    "/activate from <YYYY-MM-DD HH:MM>",
                )?)?)),
                "until" => Ok(Command::ActivateUntil(parse_timestamp(required(
                    value,
                    "/activate until <YYYY-MM-DD HH:MM>",
                )?)?)),
                "reset" => Ok(Command::ActivateReset),
                _ => Err(ParseError::InvalidArgument(
                    "Use /activate from, /activate until or /activate reset.".to_string(),
                )),
            }
        }
        "/setmessage" => Ok(Command::SetMessage(
            required(rest, "/setmessage <message>")?.to_string(),
        )),
        "/settemplate" => {
            let rest = required(rest, "/settemplate <name>:<message>")?;
            let (name, body) = rest
                .split_once(':')
                .ok_or(ParseError::MissingArgument("/settemplate <name>:<message>"))?;
            let (name, body) = (name.trim(), body.trim());
            if name.is_empty() || body.is_empty() {
                return Err(ParseError::MissingArgument("/settemplate <name>:<message>"));
            }
            Ok(Command::SetTemplate {
                name: name.to_string(),
                body: body.to_string(),
            })
        }
        "/usetemplate" => Ok(Command::UseTemplate(
            required(rest, "/usetemplate <name>")?.to_string(),
        )),
        "/listtemplates" => Ok(Command::ListTemplates),
        "/deletetemplate" => Ok(Command::DeleteTemplate(
            required(rest, "/deletetemplate <name>")?.to_string(),
        )),
        "/setdelay" => {
            let seconds = required(rest, "/setdelay <seconds>")?
                .parse::<u64>()
                .map_err(|_| {
                    ParseError::InvalidArgument(
                        "Delay must be a whole number of seconds.".to_string(),
                    )
                })?;
            Ok(Command::SetDelay(seconds))
        }
        "/setfrequency" => required(rest, "/setfrequency every message|daily|weekly|monthly")?
            .parse::<FrequencyPolicy>()
            .map(Command::SetFrequency)
            .map_err(|e| ParseError::InvalidArgument(e.to_string())),
        "/types" => required(rest, "/types personal|group|all")?
            .parse::<TypeFilter>()
            .map(Command::Types)
            .map_err(|e| ParseError::InvalidArgument(e.to_string())),
        "/stats" => Ok(Command::Stats),
        "/showconfig" => Ok(Command::ShowConfig),
        "/reset" => Ok(Command::Reset),
        "/confirmreset" => Ok(Command::ConfirmReset),
        "/help" | "/start" => Ok(Command::Help),
        other => Err(ParseError::Unknown(other.to_string())),
    }
}

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

/// Render the `/showconfig` body
pub fn format_config(
    config: &AutoresponderConfig,
    engine: &ResponseEngine,
    now: DateTime<Utc>,
) -> String {
    let window = match &config.activation_window {
        None => "always".to_string(),
        Some(window) if window.is_unbounded() => "always".to_string(),
        Some(window) => {
            let start = window
                .start
                .map(|t| format!("from {} UTC", format_ts(&t)));
            let end = window.end.map(|t| format!("until {} UTC", format_ts(&t)));
            [start, end].into_iter().flatten().collect::<Vec<_>>().join(" ")
        }
    };

    let message = match &config.active_message {
        None => "(none)".to_string(),
        Some(ActiveMessage::Literal { text }) => text.clone(),
        Some(ActiveMessage::Template { name }) => {
            let missing = !engine.has_template(name);
            format!(
                "template '{}'{}",
                name,
                if missing { " (missing, not responding)" } else { "" }
            )
        }
    };

    format!(
        "Current configuration:\n\
         enabled: {}\n\
         active now: {}\n\
         activation window: {}\n\
         message: {}\n\
         delay: {} seconds\n\
         frequency: {}\n\
         types: {}",
        yes_no(config.enabled),
        yes_no(crate::autoreply::schedule::is_active(now, config)),
        window,
        message,
        config.delay_seconds,
        config.frequency_policy,
        config.type_filter,
    )
}

/// Render the `/stats` body
pub fn format_stats(summary: &StatsSummary) -> String {
    let period = |label: &str| summary.by_period.get(label).copied().unwrap_or(0);
    let mut out = format!(
        "Total auto-responses sent: {}\n\
         Unique chats responded to: {}\n\
         Last 24 hours: {}\n\
         Last 7 days: {}\n\
         Last 30 days: {}",
        summary.total,
        summary.unique_scopes,
        period("last_24h"),
        period("last_7d"),
        period("last_30d"),
    );
    if !summary.by_source.is_empty() {
        out.push_str("\nBy message:");
        for (label, count) in &summary.by_source {
            out.push_str(&format!("\n- {}: {}", label, count));
        }
    }
    out
}

/// Run a parsed command and return the reply body
pub fn execute(
    engine: &ResponseEngine,
    command: &Command,
    now: DateTime<Utc>,
) -> Result<String, AutoreplyError> {
    let reply = match command {
        Command::Autoresponder(enabled) => {
            engine.set_enabled(*enabled)?;
            format!("Autoresponder {}.", if *enabled { "on" } else { "off" })
        }
        Command::ActivateFrom(start) => {
            engine.set_activation_start(*start)?;
            format!(
                "Autoresponder scheduled to activate from {} UTC.",
                format_ts(start)
            )
        }
        Command::ActivateUntil(end) => {
            engine.set_activation_end(*end)?;
            format!(
                "Autoresponder scheduled to deactivate at {} UTC.",
                format_ts(end)
            )
        }
        Command::ActivateReset => {
            engine.clear_activation_window()?;
            "Activation window cleared.".to_string()
        }
        Command::SetMessage(text) => {
            engine.set_message(text)?;
            format!("Default response message set to: {}", text.trim())
        }
        Command::SetTemplate { name, body } => {
            if engine.set_template(name, body)? {
                format!("Template '{}' saved.", name.trim())
            } else {
                format!("Template '{}' updated.", name.trim())
            }
        }
        Command::UseTemplate(name) => {
            engine.use_template(name)?;
            format!("Using template '{}' as the response message.", name.trim())
        }
        Command::ListTemplates => {
            let templates = engine.list_templates();
            if templates.is_empty() {
                "No templates found.".to_string()
            } else {
                let lines: Vec<String> = templates
                    .iter()
                    .map(|t| format!("- {}: {}", t.name, t.body))
                    .collect();
                format!("Saved templates:\n{}", lines.join("\n"))
            }
        }
        Command::DeleteTemplate(name) => {
            let name = name.trim();
            if engine.delete_template(name)? {
                let still_active = matches!(
                    &engine.snapshot().active_message,
                    Some(ActiveMessage::Template { name: active }) if active == name
                );
                if still_active {
                    format!(
                        "Template '{}' deleted. It was the active message, so no responses \
                         will be sent until you use /setmessage or /usetemplate.",
                        name
                    )
                } else {
                    format!("Template '{}' deleted.", name)
                }
            } else {
                format!("Template '{}' not found.", name)
            }
        }
        Command::SetDelay(seconds) => {
            engine.set_delay(*seconds)?;
            format!("Response delay set to {} seconds.", seconds)
        }
        Command::SetFrequency(policy) => {
            engine.set_frequency(*policy)?;
            format!("Response frequency set to: {}.", policy)
        }
        Command::Types(filter) => {
            engine.set_type_filter(*filter)?;
            format!("Response type set to: {}.", filter)
        }
        Command::Stats => format_stats(&engine.stats(now)),
        Command::ShowConfig => {
            let config = engine.show_config();
            format_config(&config, engine, now)
        }
        Command::Reset => {
            let deadline = engine.reset(now);
            format!(
                "Are you sure you want to reset all settings? Reply with /confirmreset \
                 within {} seconds to proceed.",
                (deadline - now).num_seconds()
            )
        }
        Command::ConfirmReset => {
            let outcome = engine.confirm_reset(now)?;
            let mut reply = "All settings have been reset to default.".to_string();
            if outcome.templates_cleared {
                reply.push_str(" Templates were deleted.");
            }
            if outcome.statistics_cleared {
                reply.push_str(" Statistics were cleared.");
            }
            reply
        }
        Command::Help => {
            engine.cancel_pending_reset();
            HELP_TEXT.to_string()
        }
    };
    Ok(reply)
}

/// Result of handling one line of owner input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    /// The parsed command, if parsing succeeded
    pub command: Option<Command>,
    /// Reply text including the header
    pub reply: String,
    /// The command ran without error
    pub ok: bool,
}

/// Parse, execute and render one line of owner input
pub fn handle(engine: &ResponseEngine, text: &str, now: DateTime<Utc>) -> CommandOutcome {
    let command = match parse(text) {
        Ok(command) => command,
        Err(e) => {
            tracing::debug!(error = %e, "could not parse owner command");
            // a malformed command still counts as a command
            if !matches!(e, ParseError::NotACommand) {
                engine.cancel_pending_reset();
            }
            return CommandOutcome {
                command: None,
                reply: format!("{}\n{}", REPLY_HEADER, e),
                ok: false,
            };
        }
    };

    match execute(engine, &command, now) {
        Ok(body) => CommandOutcome {
            command: Some(command),
            reply: format!("{}\n{}", REPLY_HEADER, body),
            ok: true,
        },
        Err(e) => {
            tracing::info!(error = %e, ?command, "owner command rejected");
            CommandOutcome {
                command: Some(command),
                reply: format!("{}\n{}", REPLY_HEADER, e),
                ok: false,
            }
        }
    }
}
