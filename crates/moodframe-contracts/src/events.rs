use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type Fields = Map<String, Value>;

/// JSONL incident sink.
///
/// Every record starts with `type`, `service` and `ts`; caller fields are
/// merged afterwards and win on conflict. The file is opened lazily and kept
/// open for the lifetime of the log.
#[derive(Debug)]
pub struct IncidentLog {
    path: PathBuf,
    service: String,
    file: Mutex<Option<File>>,
}

impl IncidentLog {
    pub fn new(path: impl Into<PathBuf>, service: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            service: service.into(),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, kind: &str, fields: Fields) -> Value {
        let mut record = Fields::new();
        record.insert("type".into(), kind.into());
        record.insert("service".into(), self.service.as_str().into());
        record.insert(
            "ts".into(),
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true).into(),
        );
        record.extend(fields);
        Value::Object(record)
    }

    pub fn append(&self, kind: &str, fields: Fields) -> anyhow::Result<Value> {
        let record = self.record(kind, fields);
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let mut slot = self
            .file
            .lock()
            .map_err(|_| anyhow::anyhow!("incident log lock poisoned"))?;
        if slot.is_none() {
            *slot = Some(self.open()?);
        }
        if let Some(file) = slot.as_mut() {
            file.write_all(&line)
                .with_context(|| format!("append to {}", self.path.display()))?;
        }
        Ok(record)
    }

    fn open(&self) -> anyhow::Result<File> {
        if let Some(dir) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create {}", dir.display()))?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))
    }
}
