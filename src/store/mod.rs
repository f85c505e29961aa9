//! State Persistence
//!
//! Storage boundary for everything the engine must survive a restart with:
//! the configuration record, templates, cooldown records and the statistics
//! log.

pub mod file;

pub use file::JsonFileStore;

use crate::autoreply::{AutoresponderConfig, StatRecord, Template};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Storage error types
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("state directory {} is in use by another autoresponder process", .0.display())]
    Locked(PathBuf),
}

/// Key-value and append-log operations the engine needs from a backend
pub trait StateStore: Send + Sync {
    /// Load the persisted configuration, if any
    fn load_config(&self) -> Result<Option<AutoresponderConfig>, StoreError>;
    fn save_config(&self, config: &AutoresponderConfig) -> Result<(), StoreError>;

    /// Templates in insertion order
    fn load_templates(&self) -> Result<Vec<Template>, StoreError>;
    fn put_template(&self, template: &Template) -> Result<(), StoreError>;
    fn delete_template(&self, name: &str) -> Result<(), StoreError>;
    fn clear_templates(&self) -> Result<(), StoreError>;

    fn load_cooldowns(&self) -> Result<HashMap<String, DateTime<Utc>>, StoreError>;
    fn put_cooldown(&self, scope_id: &str, at: DateTime<Utc>) -> Result<(), StoreError>;
    fn clear_cooldowns(&self) -> Result<(), StoreError>;

    fn append_stat(&self, record: &StatRecord) -> Result<(), StoreError>;
    fn load_stats(&self) -> Result<Vec<StatRecord>, StoreError>;
    fn clear_stats(&self) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    config: Option<AutoresponderConfig>,
    templates: Vec<Template>,
    cooldowns: HashMap<String, DateTime<Utc>>,
    stats: Vec<StatRecord>,
}

/// Volatile store for tests and throwaway sessions
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn load_config(&self) -> Result<Option<AutoresponderConfig>, StoreError> {
        Ok(self.state.lock().config.clone())
    }

    fn save_config(&self, config: &AutoresponderConfig) -> Result<(), StoreError> {
        self.state.lock().config = Some(config.clone());
        Ok(())
    }

    fn load_templates(&self) -> Result<Vec<Template>, StoreError> {
        Ok(self.state.lock().templates.clone())
    }

    fn put_template(&self, template: &Template) -> Result<(), StoreError> {
        upsert_template(&mut self.state.lock().templates, template);
        Ok(())
    }

    fn delete_template(&self, name: &str) -> Result<(), StoreError> {
        self.state.lock().templates.retain(|t| t.name != name);
        Ok(())
    }

    fn clear_templates(&self) -> Result<(), StoreError> {
        self.state.lock().templates.clear();
        Ok(())
    }

    fn load_cooldowns(&self) -> Result<HashMap<String, DateTime<Utc>>, StoreError> {
        Ok(self.state.lock().cooldowns.clone())
    }

    fn put_cooldown(&self, scope_id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.state.lock().cooldowns.insert(scope_id.to_string(), at);
        Ok(())
    }

    fn clear_cooldowns(&self) -> Result<(), StoreError> {
        self.state.lock().cooldowns.clear();
        Ok(())
    }

    fn append_stat(&self, record: &StatRecord) -> Result<(), StoreError> {
        self.state.lock().stats.push(record.clone());
        Ok(())
    }

    fn load_stats(&self) -> Result<Vec<StatRecord>, StoreError> {
        Ok(self.state.lock().stats.clone())
    }

    fn clear_stats(&self) -> Result<(), StoreError> {
        self.state.lock().stats.clear();
        Ok(())
    }
}

pub(crate) fn upsert_template(templates: &mut Vec<Template>, template: &Template) {
    match templates.iter_mut().find(|t| t.name == template.name) {
        Some(existing) => existing.body = template.body.clone(),
        None => templates.push(template.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_memory_store_templates_keep_order() {
        let store = MemoryStore::new();
        store.put_template(&Template::new("b", "one")).unwrap();
        store.put_template(&Template::new("a", "two")).unwrap();
        store.put_template(&Template::new("b", "three")).unwrap();

        let templates = store.load_templates().unwrap();
        assert_eq!(templates.len(), 2);
        assert_eq!(templates[0], Template::new("b", "three"));

        store.delete_template("b").unwrap();
        assert_eq!(store.load_templates().unwrap(), vec![Template::new("a", "two")]);
    }

    #[test]
    fn test_memory_store_cooldowns() {
        let store = MemoryStore::new();
        let at = Utc.timestamp_opt(100, 0).unwrap();
        store.put_cooldown("alice", at).unwrap();
        assert_eq!(store.load_cooldowns().unwrap().get("alice"), Some(&at));
        store.clear_cooldowns().unwrap();
        assert!(store.load_cooldowns().unwrap().is_empty());
    }

    #[test]
    fn test_memory_store_config_starts_empty() {
        let store = MemoryStore::new();
        assert!(store.load_config().unwrap().is_none());
        store.save_config(&AutoresponderConfig::default()).unwrap();
        assert!(store.load_config().unwrap().is_some());
    }
}
