use std::path::PathBuf;
use std::sync::Arc;

use moodframe_contracts::events::{Fields, IncidentLog};
use serde_json::json;

/// One failed request, as seen by the handler before it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub endpoint: &'static str,
    pub status: u16,
    pub code: String,
    pub label: String,
    pub details: Option<String>,
}

impl ErrorReport {
    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }
}

pub trait ErrorReporter: Send + Sync {
    fn report(&self, report: &ErrorReport);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, report: &ErrorReport) {
        let details = report.details.as_deref().unwrap_or_default();
        if report.is_server_error() {
            tracing::error!(
                endpoint = report.endpoint,
                status = report.status,
                code = %report.code,
                details,
                "{}",
                report.label
            );
        } else {
            tracing::warn!(
                endpoint = report.endpoint,
                status = report.status,
                code = %report.code,
                "{}",
                report.label
            );
        }
    }
}

/// Traces every report and appends server-side failures to a JSONL file.
///
/// Inside a Tokio runtime the append runs on the blocking pool, so handlers
/// never wait on disk.
pub struct IncidentLogReporter {
    log: Arc<IncidentLog>,
}

impl IncidentLogReporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            log: Arc::new(IncidentLog::new(path, "moodframe")),
        }
    }
}

fn append_incident(log: &IncidentLog, fields: Fields) {
    if let Err(err) = log.append("request_failed", fields) {
        tracing::warn!(
            path = %log.path().display(),
            "failed to append incident log: {err:#}"
        );
    }
}

impl ErrorReporter for IncidentLogReporter {
    fn report(&self, report: &ErrorReport) {
        TracingReporter.report(report);
        if !report.is_server_error() {
            return;
        }
        let mut fields = Fields::new();
        fields.insert("endpoint".into(), json!(report.endpoint));
        fields.insert("status".into(), json!(report.status));
        fields.insert("code".into(), json!(report.code));
        fields.insert("error".into(), json!(report.label));
        fields.insert("details".into(), json!(report.details));
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let log = Arc::clone(&self.log);
                runtime.spawn_blocking(move || append_incident(&log, fields));
            }
            Err(_) => append_incident(&self.log, fields),
        }
    }
}

#[cfg(test)]
pub mod recording {
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Default)]
    pub struct RecordingReporter {
        reports: Mutex<Vec<ErrorReport>>,
    }

    impl RecordingReporter {
        pub fn reports(&self) -> Vec<ErrorReport> {
            self.reports
                .lock()
                .map(|reports| reports.clone())
                .unwrap_or_default()
        }
    }

    impl ErrorReporter for RecordingReporter {
        fn report(&self, report: &ErrorReport) {
            if let Ok(mut reports) = self.reports.lock() {
                reports.push(report.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;

    fn report(status: u16) -> ErrorReport {
        ErrorReport {
            endpoint: "/api/img2img",
            status,
            code: if status >= 500 { "VendorError" } else { "InvalidRequest" }.to_string(),
            label: "Failed to generate image".to_string(),
            details: Some("Replicate request failed (502): bad gateway".to_string()),
        }
    }

    #[test]
    fn incident_log_records_server_errors_only() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("logs").join("incidents.jsonl");
        let reporter = IncidentLogReporter::new(&path);

        reporter.report(&report(400));
        reporter.report(&report(500));

        let raw = std::fs::read_to_string(&path)?;
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 1);
        let event: Value = serde_json::from_str(lines[0])?;
        assert_eq!(event["type"], "request_failed");
        assert_eq!(event["service"], "moodframe");
        assert_eq!(event["endpoint"], "/api/img2img");
        assert_eq!(event["status"], 500);
        assert_eq!(event["code"], "VendorError");
        assert!(event["ts"].as_str().is_some());
        Ok(())
    }

    #[tokio::test]
    async fn incident_log_append_leaves_the_async_caller() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("incidents.jsonl");
        let reporter = IncidentLogReporter::new(&path);

        reporter.report(&report(502));

        let mut raw = String::new();
        for _ in 0..200 {
            raw = std::fs::read_to_string(&path).unwrap_or_default();
            if raw.ends_with('\n') {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let event: Value = serde_json::from_str(raw.trim_end())?;
        assert_eq!(event["status"], 502);
        assert_eq!(event["type"], "request_failed");
        Ok(())
    }

    #[test]
    fn unwritable_incident_log_does_not_panic() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let blocker = temp.path().join("not-a-dir");
        std::fs::write(&blocker, b"x")?;
        let reporter = IncidentLogReporter::new(blocker.join("incidents.jsonl"));
        reporter.report(&report(500));
        Ok(())
    }
}
