//! Auto-reply Engine
//!
//! Response policy evaluation plus the mutation/query API the command
//! front-end drives. Decisions read a single configuration snapshot; writes
//! are serialized, validated and persisted before the new snapshot is
//! published.

use super::config::{
    ActiveMessage, AutoresponderConfig, FrequencyPolicy, TypeFilter, MAX_DELAY_SECONDS,
};
use super::frequency::FrequencyLimiter;
use super::schedule::is_active;
use super::stats::{ResponseSource, StatRecord, StatsAggregator, StatsSummary};
use super::templates::{Template, TemplateStore};
use super::AutoreplyError;
use crate::channels::IncomingMessage;
use crate::store::StateStore;
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What `confirm_reset` wipes besides the configuration record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetScope {
    pub clear_templates: bool,
    pub clear_statistics: bool,
}

/// Operator-level engine tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Floor for every frequency window, including `EveryMessage`
    pub min_reply_interval: Duration,
    /// How long a `/reset` waits for `/confirmreset`
    pub reset_confirm_window: Duration,
    pub reset_scope: ResetScope,
    /// Drop queued sends when the autoresponder is switched off
    pub cancel_pending_on_disable: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            min_reply_interval: Duration::seconds(10),
            reset_confirm_window: Duration::seconds(60),
            reset_scope: ResetScope::default(),
            cancel_pending_on_disable: false,
        }
    }
}

impl EngineOptions {
    pub fn with_min_reply_interval(mut self, interval: Duration) -> Self {
        self.min_reply_interval = interval;
        self
    }

    pub fn with_reset_scope(mut self, scope: ResetScope) -> Self {
        self.reset_scope = scope;
        self
    }

    pub fn with_reset_confirm_window(mut self, window: Duration) -> Self {
        self.reset_confirm_window = window;
        self
    }

    pub fn with_cancel_pending_on_disable(mut self, cancel: bool) -> Self {
        self.cancel_pending_on_disable = cancel;
        self
    }
}

/// Why a decision came out the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    Respond,
    Inactive,
    FilteredOut,
    NoMessage,
    TemplateMissing,
    Cooldown,
    /// `fire_at` would overflow the supported date range
    TimestampOutOfRange,
}

/// Outcome of evaluating one incoming message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub send: bool,
    /// Resolved body; empty when `send` is false
    pub body: String,
    pub fire_at: DateTime<Utc>,
    pub reason: DecisionReason,
    pub source: Option<ResponseSource>,
}

impl Decision {
    fn skip(reason: DecisionReason, now: DateTime<Utc>) -> Self {
        Self {
            send: false,
            body: String::new(),
            fire_at: now,
            reason,
            source: None,
        }
    }
}

/// Result of an applied reset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetOutcome {
    pub templates_cleared: bool,
    pub statistics_cleared: bool,
}

/// The response policy engine
pub struct ResponseEngine {
    config: RwLock<Arc<AutoresponderConfig>>,
    /// Serializes configuration and template writers
    write_lock: Mutex<()>,
    templates: TemplateStore,
    limiter: FrequencyLimiter,
    stats: StatsAggregator,
    /// Deadline for a pending `/reset`
    pending_reset: Mutex<Option<DateTime<Utc>>>,
    store: Arc<dyn StateStore>,
    options: EngineOptions,
}

impl std::fmt::Debug for ResponseEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseEngine")
            .field("config", &*self.config.read())
            .field("templates", &self.templates.len())
            .field("limiter", &self.limiter)
            .field("options", &self.options)
            .finish()
    }
}

impl ResponseEngine {
    /// Build an engine from whatever `store` already holds
    pub fn open(store: Arc<dyn StateStore>, options: EngineOptions) -> Result<Self, AutoreplyError> {
        let config = match store.load_config()? {
            Some(config) => match config.validate() {
                Ok(()) => config,
                Err(e) => {
                    tracing::warn!(error = %e, "persisted configuration is invalid, using defaults");
                    AutoresponderConfig::default()
                }
            },
            None => AutoresponderConfig::default(),
        };
        let templates = TemplateStore::from_templates(store.load_templates()?);
        let limiter = FrequencyLimiter::restore(store.clone(), options.min_reply_interval)?;
        let stats = StatsAggregator::from_records(store.load_stats()?);

        tracing::info!(
            enabled = config.enabled,
            templates = templates.len(),
            cooldowns = limiter.tracked_scopes(),
            responses = stats.len(),
            "autoresponder state loaded"
        );

        Ok(Self {
            config: RwLock::new(Arc::new(config)),
            write_lock: Mutex::new(()),
            templates,
            limiter,
            stats,
            pending_reset: Mutex::new(None),
            store,
            options,
        })
    }

    /// Current configuration snapshot
    pub fn snapshot(&self) -> Arc<AutoresponderConfig> {
        self.config.read().clone()
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Decide whether `message` gets an automatic reply.
    ///
    /// On a positive decision the scope's cooldown is recorded before this
    /// returns, so messages arriving during the delay are suppressed.
    pub fn decide(&self, message: &IncomingMessage, now: DateTime<Utc>) -> Decision {
        let config = self.snapshot();
        let scope_id = message.scope_id.as_str();

        if !is_active(now, &config) {
            return Decision::skip(DecisionReason::Inactive, now);
        }

        if !config.type_filter.matches(message.chat_kind) {
            return Decision::skip(DecisionReason::FilteredOut, now);
        }

        let (body, source) = match &config.active_message {
            None => return Decision::skip(DecisionReason::NoMessage, now),
            Some(ActiveMessage::Literal { text }) => {
                if text.trim().is_empty() {
                    return Decision::skip(DecisionReason::NoMessage, now);
                }
                (text.clone(), ResponseSource::Literal)
            }
            Some(ActiveMessage::Template { name }) => match self.templates.get(name) {
                Some(body) if !body.trim().is_empty() => (
                    body,
                    ResponseSource::Template { name: name.clone() },
                ),
                _ => {
                    tracing::warn!(
                        template = %name,
                        scope_id,
                        "active message refers to a missing template, not responding"
                    );
                    return Decision::skip(DecisionReason::TemplateMissing, now);
                }
            },
        };

        let delay = config.delay_seconds.min(MAX_DELAY_SECONDS) as i64;
        let Some(fire_at) = now.checked_add_signed(Duration::seconds(delay)) else {
            tracing::warn!(scope_id, received_at = %now, "message timestamp out of range");
            return Decision::skip(DecisionReason::TimestampOutOfRange, now);
        };

        if !self
            .limiter
            .try_acquire(scope_id, now, config.frequency_policy)
        {
            tracing::debug!(scope_id, "scope still cooling down");
            return Decision::skip(DecisionReason::Cooldown, now);
        }

        tracing::debug!(scope_id, %fire_at, "auto-response decided");

        Decision {
            send: true,
            body,
            fire_at,
            reason: DecisionReason::Respond,
            source: Some(source),
        }
    }

    /// Record a response that is actually being dispatched
    pub fn record_dispatch(
        &self,
        scope_id: &str,
        source: ResponseSource,
        body: &str,
        now: DateTime<Utc>,
    ) -> StatRecord {
        let record = self.stats.record(scope_id, now, source, body);
        if let Err(e) = self.store.append_stat(&record) {
            tracing::warn!(scope_id, error = %e, "failed to persist statistics record");
        }
        record
    }

    /// Check whether a template exists, without counting as a command
    pub fn has_template(&self, name: &str) -> bool {
        self.templates.contains(name)
    }

    /// Drop a pending `/reset`, if any
    pub fn cancel_pending_reset(&self) {
        if self.pending_reset.lock().take().is_some() {
            tracing::info!("pending reset cancelled by another command");
        }
    }

    fn update_config<F>(&self, mutate: F) -> Result<Arc<AutoresponderConfig>, AutoreplyError>
    where
        F: FnOnce(&mut AutoresponderConfig) -> Result<(), AutoreplyError>,
    {
        let _guard = self.write_lock.lock();
        let mut next = (**self.config.read()).clone();
        mutate(&mut next)?;
        next.validate()?;
        self.store.save_config(&next)?;
        let next = Arc::new(next);
        *self.config.write() = next.clone();
        Ok(next)
    }

    /// Turn the autoresponder on or off
    pub fn set_enabled(&self, enabled: bool) -> Result<Arc<AutoresponderConfig>, AutoreplyError> {
        self.cancel_pending_reset();
        let config = self.update_config(|c| {
            c.enabled = enabled;
            Ok(())
        })?;
        tracing::info!(enabled, "autoresponder toggled");
        Ok(config)
    }

    pub fn set_activation_start(
        &self,
        start: DateTime<Utc>,
    ) -> Result<Arc<AutoresponderConfig>, AutoreplyError> {
        self.cancel_pending_reset();
        self.update_config(|c| {
            let mut window = c.activation_window.unwrap_or_default();
            window.start = Some(start);
            c.activation_window = Some(window);
            Ok(())
        })
    }

    pub fn set_activation_end(
        &self,
        end: DateTime<Utc>,
    ) -> Result<Arc<AutoresponderConfig>, AutoreplyError> {
        self.cancel_pending_reset();
        self.update_config(|c| {
            let mut window = c.activation_window.unwrap_or_default();
            window.end = Some(end);
            c.activation_window = Some(window);
            Ok(())
        })
    }

    pub fn clear_activation_window(&self) -> Result<Arc<AutoresponderConfig>, AutoreplyError> {
        self.cancel_pending_reset();
        self.update_config(|c| {
            c.activation_window = None;
            Ok(())
        })
    }

    /// Use a literal message body
    pub fn set_message(&self, text: &str) -> Result<Arc<AutoresponderConfig>, AutoreplyError> {
        self.cancel_pending_reset();
        let text = text.trim();
        if text.is_empty() {
            return Err(AutoreplyError::config("message must not be empty"));
        }
        self.update_config(|c| {
            c.active_message = Some(ActiveMessage::literal(text));
            Ok(())
        })
    }

    /// Create or overwrite a template. Returns `true` if it was new.
    pub fn set_template(&self, name: &str, body: &str) -> Result<bool, AutoreplyError> {
        self.cancel_pending_reset();
        let name = name.trim();
        let body = body.trim();
        if name.is_empty() {
            return Err(AutoreplyError::config("template name must not be empty"));
        }
        if body.is_empty() {
            return Err(AutoreplyError::config("template message must not be empty"));
        }

        let _guard = self.write_lock.lock();
        self.store.put_template(&Template::new(name, body))?;
        let created = self.templates.set(name, body);
        tracing::info!(template = name, created, "template saved");
        Ok(created)
    }

    /// Point the active message at a template
    pub fn use_template(&self, name: &str) -> Result<Arc<AutoresponderConfig>, AutoreplyError> {
        self.cancel_pending_reset();
        let name = name.trim();
        self.update_config(|c| {
            if !self.templates.contains(name) {
                return Err(AutoreplyError::TemplateNotFound(name.to_string()));
            }
            c.active_message = Some(ActiveMessage::template(name));
            Ok(())
        })
    }

    /// Delete a template. Returns `false` if it did not exist.
    ///
    /// An active message referring to the deleted template is left as is and
    /// fails closed at decision time.
    pub fn delete_template(&self, name: &str) -> Result<bool, AutoreplyError> {
        self.cancel_pending_reset();
        let name = name.trim();
        let _guard = self.write_lock.lock();
        if !self.templates.contains(name) {
            return Ok(false);
        }
        self.store.delete_template(name)?;
        self.templates.delete(name);
        tracing::info!(template = name, "template deleted");
        Ok(true)
    }

    pub fn list_templates(&self) -> Vec<Template> {
        self.cancel_pending_reset();
        self.templates.list()
    }

    pub fn set_delay(&self, seconds: u64) -> Result<Arc<AutoresponderConfig>, AutoreplyError> {
        self.cancel_pending_reset();
        self.update_config(|c| {
            c.delay_seconds = seconds;
            Ok(())
        })
    }

    pub fn set_frequency(
        &self,
        policy: FrequencyPolicy,
    ) -> Result<Arc<AutoresponderConfig>, AutoreplyError> {
        self.cancel_pending_reset();
        self.update_config(|c| {
            c.frequency_policy = policy;
            Ok(())
        })
    }

    pub fn set_type_filter(
        &self,
        filter: TypeFilter,
    ) -> Result<Arc<AutoresponderConfig>, AutoreplyError> {
        self.cancel_pending_reset();
        self.update_config(|c| {
            c.type_filter = filter;
            Ok(())
        })
    }

    pub fn stats(&self, now: DateTime<Utc>) -> StatsSummary {
        self.cancel_pending_reset();
        self.stats.summary(now)
    }

    pub fn show_config(&self) -> Arc<AutoresponderConfig> {
        self.cancel_pending_reset();
        self.snapshot()
    }

    /// Forget every cooldown record
    pub fn clear_cooldowns(&self) -> Result<(), AutoreplyError> {
        self.cancel_pending_reset();
        self.limiter.clear()?;
        tracing::info!("cooldown records cleared");
        Ok(())
    }

    /// Last response time recorded for a scope
    pub fn last_response_at(&self, scope_id: &str) -> Option<DateTime<Utc>> {
        self.limiter.last_response_at(scope_id)
    }

    /// Flag a pending reset and return the confirmation deadline
    pub fn reset(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let deadline = now
            .checked_add_signed(self.options.reset_confirm_window)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        *self.pending_reset.lock() = Some(deadline);
        tracing::info!(%deadline, "reset requested, awaiting confirmation");
        deadline
    }

    /// Apply a pending reset if it is still within its confirmation window
    pub fn confirm_reset(&self, now: DateTime<Utc>) -> Result<ResetOutcome, AutoreplyError> {
        let deadline = self
            .pending_reset
            .lock()
            .take()
            .ok_or(AutoreplyError::NoPendingReset)?;
        if now > deadline {
            return Err(AutoreplyError::ResetExpired);
        }

        let scope = self.options.reset_scope;
        let _guard = self.write_lock.lock();

        let defaults = AutoresponderConfig::default();
        self.store.save_config(&defaults)?;
        *self.config.write() = Arc::new(defaults);

        if scope.clear_templates {
            self.store.clear_templates()?;
            self.templates.clear();
        }
        if scope.clear_statistics {
            self.store.clear_stats()?;
            self.stats.clear();
        }

        tracing::info!(
            templates_cleared = scope.clear_templates,
            statistics_cleared = scope.clear_statistics,
            "autoresponder reset to defaults"
        );

        Ok(ResetOutcome {
            templates_cleared: scope.clear_templates,
            statistics_cleared: scope.clear_statistics,
        })
    }
}
