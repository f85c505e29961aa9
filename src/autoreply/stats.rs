//! Statistics Aggregator
//!
//! Append-only log of dispatched auto-responses with a reporting summary.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Where a sent body came from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseSource {
    Literal,
    Template { name: String },
}

impl ResponseSource {
    /// Label used in the per-source breakdown
    pub fn label(&self) -> String {
        match self {
            ResponseSource::Literal => "custom message".to_string(),
            ResponseSource::Template { name } => format!("template:{}", name),
        }
    }
}

/// One dispatched response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatRecord {
    pub timestamp: DateTime<Utc>,
    pub scope_id: String,
    pub source: ResponseSource,
    pub body: String,
}

/// Aggregated view over the log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSummary {
    /// Every response ever recorded
    pub total: usize,
    /// Distinct scopes that received at least one response
    pub unique_scopes: usize,
    /// Counts for the trailing periods `last_24h`, `last_7d` and `last_30d`
    pub by_period: BTreeMap<String, usize>,
    /// Counts per response source label
    pub by_source: BTreeMap<String, usize>,
}

const PERIODS: [(&str, i64); 3] = [("last_24h", 1), ("last_7d", 7), ("last_30d", 30)];

/// In-memory statistics log
#[derive(Debug, Default)]
pub struct StatsAggregator {
    records: RwLock<Vec<StatRecord>>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted records
    pub fn from_records(records: Vec<StatRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    /// Append a response to the log and return the stored record
    pub fn record(
        &self,
        scope_id: impl Into<String>,
        now: DateTime<Utc>,
        source: ResponseSource,
        body: impl Into<String>,
    ) -> StatRecord {
        let record = StatRecord {
            timestamp: now,
            scope_id: scope_id.into(),
            source,
            body: body.into(),
        };
        self.records.write().push(record.clone());
        record
    }

    /// Summarize the log relative to `now`
    pub fn summary(&self, now: DateTime<Utc>) -> StatsSummary {
        let records = self.records.read();

        let mut by_period: BTreeMap<String, usize> =
            PERIODS.iter().map(|(label, _)| (label.to_string(), 0)).collect();
        let mut by_source = BTreeMap::new();
        let mut scopes = HashSet::new();

        for record in records.iter() {
            scopes.insert(record.scope_id.as_str());
            *by_source.entry(record.source.label()).or_insert(0) += 1;

            let age = now - record.timestamp;
            for (label, days) in PERIODS {
                if age >= Duration::zero() && age < Duration::days(days) {
                    *by_period.entry(label.to_string()).or_insert(0) += 1;
                }
            }
        }

        StatsSummary {
            total: records.len(),
            unique_scopes: scopes.len(),
            by_period,
            by_source,
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn clear(&self) {
        self.records.write().clear();
    }
}
