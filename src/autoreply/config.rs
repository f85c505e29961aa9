//! Auto-reply Configuration
//!
//! The user-editable autoresponder record: on/off flag, activation window,
//! active message, delay, frequency cap and chat-type filter.

use super::AutoreplyError;
use crate::channels::ChatKind;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Body sent when the user never configured one
pub const DEFAULT_MESSAGE: &str = "I'm on vacation right now and don't check my messages regularly. If it's important, please call me.";

/// Upper bound for `delay_seconds` (one day)
pub const MAX_DELAY_SECONDS: u64 = 86_400;

/// How often a single conversation may receive an automatic reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyPolicy {
    /// Reply to every message
    EveryMessage,
    /// At most once per day
    Daily,
    /// At most once per week
    #[default]
    Weekly,
    /// At most once per 30 days
    Monthly,
}

impl FrequencyPolicy {
    /// Cooldown length for this policy.
    ///
    /// Weekly and monthly are fixed 7 and 30 day windows, not calendar weeks
    /// or months.
    pub fn window(&self) -> Duration {
        match self {
            FrequencyPolicy::EveryMessage => Duration::zero(),
            FrequencyPolicy::Daily => Duration::days(1),
            FrequencyPolicy::Weekly => Duration::days(7),
            FrequencyPolicy::Monthly => Duration::days(30),
        }
    }
}

impl fmt::Display for FrequencyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FrequencyPolicy::EveryMessage => "every message",
            FrequencyPolicy::Daily => "daily",
            FrequencyPolicy::Weekly => "weekly",
            FrequencyPolicy::Monthly => "monthly",
        };
        f.write_str(label)
    }
}

impl FromStr for FrequencyPolicy {
    type Err = AutoreplyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s
            .trim()
            .to_lowercase()
            .replace(['_', '-'], " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        match normalized.as_str() {
            "every message" | "always" => Ok(FrequencyPolicy::EveryMessage),
            "daily" | "once a day" => Ok(FrequencyPolicy::Daily),
            "weekly" | "once a week" => Ok(FrequencyPolicy::Weekly),
            "monthly" | "once a month" => Ok(FrequencyPolicy::Monthly),
            _ => Err(AutoreplyError::config(format!(
                "unknown frequency '{}'; use 'every message', 'daily', 'weekly' or 'monthly'",
                s.trim()
            ))),
        }
    }
}

/// Which chats the autoresponder answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeFilter {
    /// One-to-one chats only
    #[default]
    Personal,
    /// Group chats only
    Group,
    /// Every chat
    All,
}

impl TypeFilter {
    /// Check if the filter admits a chat kind
    pub fn matches(&self, kind: ChatKind) -> bool {
        match self {
            TypeFilter::All => true,
            TypeFilter::Personal => kind == ChatKind::Personal,
            TypeFilter::Group => kind == ChatKind::Group,
        }
    }
}

impl fmt::Display for TypeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TypeFilter::Personal => "personal",
            TypeFilter::Group => "group",
            TypeFilter::All => "all",
        };
        f.write_str(label)
    }
}

impl FromStr for TypeFilter {
    type Err = AutoreplyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "personal" => Ok(TypeFilter::Personal),
            "group" => Ok(TypeFilter::Group),
            "all" => Ok(TypeFilter::All),
            other => Err(AutoreplyError::config(format!(
                "unknown message type '{}'; use 'personal', 'group' or 'all'",
                other
            ))),
        }
    }
}

/// Optional time range during which an enabled autoresponder is active.
///
/// Both bounds are inclusive; a missing bound is open-ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActivationWindow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
}

impl ActivationWindow {
    /// Create a window with the given bounds
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    /// Check if `now` falls inside the window
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        let started = self.start.map_or(true, |start| now >= start);
        let not_ended = self.end.map_or(true, |end| now <= end);
        started && not_ended
    }

    /// Neither bound is set
    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Reject windows that end before they start
    pub fn validate(&self) -> Result<(), AutoreplyError> {
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if end < start {
                return Err(AutoreplyError::config(format!(
                    "activation window ends ({}) before it starts ({})",
                    end.format("%Y-%m-%d %H:%M"),
                    start.format("%Y-%m-%d %H:%M")
                )));
            }
        }
        Ok(())
    }
}

/// What the autoresponder sends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActiveMessage {
    /// A literal body
    Literal { text: String },
    /// A reference to a named template, resolved at decision time
    Template { name: String },
}

impl ActiveMessage {
    /// Literal message body
    pub fn literal(text: impl Into<String>) -> Self {
        ActiveMessage::Literal { text: text.into() }
    }

    /// Reference to a template by name
    pub fn template(name: impl Into<String>) -> Self {
        ActiveMessage::Template { name: name.into() }
    }
}

/// Autoresponder configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoresponderConfig {
    /// Manual on/off switch; off overrides the activation window
    #[serde(default)]
    pub enabled: bool,
    /// Optional activation window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation_window: Option<ActivationWindow>,
    /// Body to send (literal or template reference)
    #[serde(default = "default_active_message")]
    pub active_message: Option<ActiveMessage>,
    /// Delay between receiving a message and replying
    #[serde(default)]
    pub delay_seconds: u64,
    /// Per-conversation reply cap
    #[serde(default)]
    pub frequency_policy: FrequencyPolicy,
    /// Which chats get replies
    #[serde(default)]
    pub type_filter: TypeFilter,
}

fn default_active_message() -> Option<ActiveMessage> {
    Some(ActiveMessage::literal(DEFAULT_MESSAGE))
}

impl Default for AutoresponderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            activation_window: None,
            active_message: default_active_message(),
            delay_seconds: 0,
            frequency_policy: FrequencyPolicy::default(),
            type_filter: TypeFilter::default(),
        }
    }
}

impl AutoresponderConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Turn the autoresponder on
    pub fn enabled(mut self) -> Self {
        self.enabled = true;
        self
    }

    /// Set a literal message
    pub fn with_message(mut self, text: impl Into<String>) -> Self {
        self.active_message = Some(ActiveMessage::literal(text));
        self
    }

    /// Set the activation window
    pub fn with_window(mut self, window: ActivationWindow) -> Self {
        self.activation_window = Some(window);
        self
    }

    /// Set the response delay
    pub fn with_delay(mut self, seconds: u64) -> Self {
        self.delay_seconds = seconds;
        self
    }

    /// Set the frequency policy
    pub fn with_frequency(mut self, policy: FrequencyPolicy) -> Self {
        self.frequency_policy = policy;
        self
    }

    /// Set the chat-type filter
    pub fn with_type_filter(mut self, filter: TypeFilter) -> Self {
        self.type_filter = filter;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), AutoreplyError> {
        if let Some(window) = &self.activation_window {
            window.validate()?;
        }

        match &self.active_message {
            Some(ActiveMessage::Literal { text }) if text.trim().is_empty() => {
                return Err(AutoreplyError::config("message must not be empty"));
            }
            Some(ActiveMessage::Template { name }) if name.trim().is_empty() => {
                return Err(AutoreplyError::config("template name must not be empty"));
            }
            _ => {}
        }

        if self.delay_seconds > MAX_DELAY_SECONDS {
            return Err(AutoreplyError::config(format!(
                "delay must be at most {} seconds",
                MAX_DELAY_SECONDS
            )));
        }

        Ok(())
    }
}
