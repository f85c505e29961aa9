//! Auto-reply Module
//!
//! Decides whether an incoming message gets an automatic reply, with which
//! body and at what time. Combines the on/off schedule, the chat-type filter,
//! template resolution and per-scope frequency caps.

pub mod config;
pub mod engine;
pub mod frequency;
pub mod schedule;
pub mod stats;
pub mod templates;

pub use config::{
    ActivationWindow, ActiveMessage, AutoresponderConfig, FrequencyPolicy, TypeFilter,
    DEFAULT_MESSAGE,
};
pub use engine::{Decision, DecisionReason, EngineOptions, ResetOutcome, ResetScope, ResponseEngine};
pub use frequency::FrequencyLimiter;
pub use stats::{ResponseSource, StatRecord, StatsAggregator, StatsSummary};
pub use templates::{Template, TemplateStore};

use crate::store::StoreError;

/// Errors surfaced by the auto-reply engine's command API
#[derive(Debug, thiserror::Error)]
pub enum AutoreplyError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Template \"{0}\" not found")]
    TemplateNotFound(String),

    #[error("No reset pending. Send /reset first.")]
    NoPendingReset,

    #[error("Reset confirmation expired. Send /reset again.")]
    ResetExpired,

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl AutoreplyError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        AutoreplyError::Configuration(message.into())
    }
}
