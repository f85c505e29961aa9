//! JSON file store
//!
//! Layout of the state directory:
//!
//! - `config.json`, `templates.json`: whole-file documents replaced
//!   atomically (write to `*.json.tmp`, then rename)
//! - `cooldowns.jsonl`: append-only upsert log of cooldown records, the last
//!   line for a scope wins; compacted on open
//! - `stats.jsonl`: append-only statistics log, one record per line
//! - `.lock`: held exclusively for as long as the store is open, so only one
//!   process works on a state directory at a time

use super::{upsert_template, StateStore, StoreError};
use crate::autoreply::{AutoresponderConfig, StatRecord, Template};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.json";
const TEMPLATES_FILE: &str = "templates.json";
const COOLDOWN_LOG: &str = "cooldowns.jsonl";
const STATS_FILE: &str = "stats.jsonl";
const LOCK_FILE: &str = ".lock";

#[derive(Debug, Serialize, Deserialize)]
struct CooldownEntry {
    scope_id: String,
    at: DateTime<Utc>,
}

/// File-backed `StateStore`.
///
/// Templates are cached in memory so each mutation rewrites its document
/// from the cache without re-reading the disk. The directory lock keeps that
/// cache authoritative.
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    templates: Mutex<Vec<Template>>,
    /// Append handle; shared for appends, exclusive only to truncate
    cooldown_log: RwLock<fs::File>,
    stats_lock: Mutex<()>,
    _dir_lock: fs::File,
}

impl JsonFileStore {
    /// Open (creating if needed) a state directory.
    ///
    /// Fails with [`StoreError::Locked`] while another store, in this or any
    /// other process, has the directory open.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let dir_lock = lock_dir(&dir)?;

        let templates: Vec<Template> =
            read_document(&dir.join(TEMPLATES_FILE))?.unwrap_or_default();

        let log_path = dir.join(COOLDOWN_LOG);
        let cooldowns = read_cooldown_log(&log_path)?;
        compact_cooldown_log(&log_path, &cooldowns)?;
        let cooldown_log = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        tracing::debug!(
            dir = %dir.display(),
            templates = templates.len(),
            cooldowns = cooldowns.len(),
            "opened state directory"
        );

        Ok(Self {
            dir,
            templates: Mutex::new(templates),
            cooldown_log: RwLock::new(cooldown_log),
            stats_lock: Mutex::new(()),
            _dir_lock: dir_lock,
        })
    }

    /// State directory path
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }
}

fn lock_dir(dir: &Path) -> Result<fs::File, StoreError> {
    let file = fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(dir.join(LOCK_FILE))?;
    match file.try_lock() {
        Ok(()) => Ok(file),
        Err(fs::TryLockError::WouldBlock) => Err(StoreError::Locked(dir.to_path_buf())),
        Err(fs::TryLockError::Error(e)) => Err(e.into()),
    }
}

fn read_document<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_document<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let content = serde_json::to_string_pretty(value)?;
    let tmp_path = path.with_extension("json.tmp");
    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(content.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Fold the cooldown log into one record per scope
fn read_cooldown_log(path: &Path) -> Result<BTreeMap<String, DateTime<Utc>>, StoreError> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(e.into()),
    };

    let mut cooldowns = BTreeMap::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<CooldownEntry>(&line) {
            Ok(entry) => {
                cooldowns.insert(entry.scope_id, entry.at);
            }
            Err(e) => {
                tracing::warn!(line = index + 1, error = %e, "skipping corrupt cooldown record");
            }
        }
    }
    Ok(cooldowns)
}

fn compact_cooldown_log(
    path: &Path,
    cooldowns: &BTreeMap<String, DateTime<Utc>>,
) -> Result<(), StoreError> {
    let tmp_path = path.with_extension("jsonl.tmp");
    {
        let mut file = fs::File::create(&tmp_path)?;
        for (scope_id, at) in cooldowns {
            let entry = CooldownEntry {
                scope_id: scope_id.clone(),
                at: *at,
            };
            writeln!(file, "{}", serde_json::to_string(&entry)?)?;
        }
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

impl StateStore for JsonFileStore {
    fn load_config(&self) -> Result<Option<AutoresponderConfig>, StoreError> {
        read_document(&self.path(CONFIG_FILE))
    }

    fn save_config(&self, config: &AutoresponderConfig) -> Result<(), StoreError> {
        write_document(&self.path(CONFIG_FILE), config)
    }

    fn load_templates(&self) -> Result<Vec<Template>, StoreError> {
        Ok(self.templates.lock().clone())
    }

    fn put_template(&self, template: &Template) -> Result<(), StoreError> {
        let mut templates = self.templates.lock();
        upsert_template(&mut templates, template);
        write_document(&self.path(TEMPLATES_FILE), templates.as_slice())
    }

    fn delete_template(&self, name: &str) -> Result<(), StoreError> {
        let mut templates = self.templates.lock();
        templates.retain(|t| t.name != name);
        write_document(&self.path(TEMPLATES_FILE), templates.as_slice())
    }

    fn clear_templates(&self) -> Result<(), StoreError> {
        let mut templates = self.templates.lock();
        templates.clear();
        write_document(&self.path(TEMPLATES_FILE), templates.as_slice())
    }

    fn load_cooldowns(&self) -> Result<HashMap<String, DateTime<Utc>>, StoreError> {
        let _log = self.cooldown_log.read();
        Ok(read_cooldown_log(&self.path(COOLDOWN_LOG))?
            .into_iter()
            .collect())
    }

    fn put_cooldown(&self, scope_id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(&CooldownEntry {
            scope_id: scope_id.to_string(),
            at,
        })?;
        line.push(b'\n');

        // one append per record; O_APPEND keeps concurrent lines whole
        let log = self.cooldown_log.read();
        let mut writer: &fs::File = &log;
        writer.write_all(&line)?;
        Ok(())
    }

    fn clear_cooldowns(&self) -> Result<(), StoreError> {
        let log = self.cooldown_log.write();
        log.set_len(0)?;
        log.sync_all()?;
        Ok(())
    }

    fn append_stat(&self, record: &StatRecord) -> Result<(), StoreError> {
        let line = serde_json::to_string(record)?;
        let _guard = self.stats_lock.lock();
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(STATS_FILE))?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    fn load_stats(&self) -> Result<Vec<StatRecord>, StoreError> {
        let _guard = self.stats_lock.lock();
        let file = match fs::File::open(self.path(STATS_FILE)) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<StatRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(line = index + 1, error = %e, "skipping corrupt stats record");
                }
            }
        }
        Ok(records)
    }

    fn clear_stats(&self) -> Result<(), StoreError> {
        let _guard = self.stats_lock.lock();
        match fs::remove_file(self.path(STATS_FILE)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
