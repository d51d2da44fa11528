//! Append-only record of answered queries.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::TokenUsage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryLogEntry {
    pub query_id: String,
    pub query_text: String,
    pub document_id: Option<String>,
    pub domain: Option<String>,
    /// The full response object as returned to the caller.
    pub response: serde_json::Value,
    pub processing_time_ms: u64,
    pub token_usage: Option<TokenUsage>,
    pub timestamp: DateTime<Utc>,
}

pub trait QueryLog: Send + Sync {
    fn record(&self, entry: &QueryLogEntry) -> Result<()>;
}

/// One JSON object per line.
pub struct JsonlQueryLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlQueryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }
}

impl QueryLog for JsonlQueryLog {
    fn record(&self, entry: &QueryLogEntry) -> Result<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        let _guard = self.lock.lock().map_err(|_| Error::Operation("query log lock poisoned".into()))?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(&line)?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryQueryLog {
    entries: Mutex<Vec<QueryLogEntry>>,
}

impl MemoryQueryLog {
    pub fn entries(&self) -> Vec<QueryLogEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl QueryLog for MemoryQueryLog {
    fn record(&self, entry: &QueryLogEntry) -> Result<()> {
        self.entries
            .lock()
            .map_err(|_| Error::Operation("query log lock poisoned".into()))?
            .push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn entry(id: &str) -> QueryLogEntry {
        QueryLogEntry {
            query_id: id.into(),
            query_text: "Is flood damage covered?".into(),
            document_id: None,
            domain: Some("insurance".into()),
            response: serde_json::json!({ "answer": "insufficient information" }),
            processing_time_ms: 12,
            token_usage: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn jsonl_appends_one_line_per_entry() {
        let tmp = TempDir::new().unwrap();
        let log = JsonlQueryLog::new(tmp.path().join("logs").join("q.jsonl"));
        log.record(&entry("q1")).unwrap();
        log.record(&entry("q2")).unwrap();

        let body = std::fs::read_to_string(tmp.path().join("logs").join("q.jsonl")).unwrap();
        let ids: Vec<String> = body
            .lines()
            .map(|l| serde_json::from_str::<QueryLogEntry>(l).unwrap().query_id)
            .collect();
        assert_eq!(ids, vec!["q1", "q2"]);
    }

    #[test]
    fn memory_log_keeps_entries() {
        let log = MemoryQueryLog::default();
        log.record(&entry("q1")).unwrap();
        assert_eq!(log.entries().len(), 1);
    }
}
