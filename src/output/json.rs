//! JSON output formatting
//!
//! Replies are rendered as their payload only (no protocol envelope), so the
//! JSON for a job report has the same shape whether it came from a local
//! standalone run or a remote node.

use crate::distributed::protocol::Message;
use crate::Result;
use anyhow::Context;
use serde::Serialize;
use serde_json::{json, Value};
use std::fs::File;
use std::path::Path;

/// Pretty-printed JSON for any serializable value
pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("Failed to serialize JSON output")
}

/// JSON payload of a service reply
pub fn reply_to_value(reply: &Message) -> Result<Value> {
    let value = match reply {
        Message::StatusReply(status) => serde_json::to_value(status)?,
        Message::JobAccepted(accepted) => serde_json::to_value(accepted)?,
        Message::JobResults(report) => serde_json::to_value(report)?,
        Message::Host(host) => serde_json::to_value(host)?,
        Message::Hosts(hosts) => serde_json::to_value(hosts)?,
        Message::Ack => json!({ "ok": true }),
        Message::BatchCreated(created) => serde_json::to_value(created)?,
        Message::BatchResults(results) => serde_json::to_value(results)?,
        Message::Error(error) => serde_json::to_value(error)?,
        other => anyhow::bail!("'{}' is not a reply", other.name()),
    };
    Ok(value)
}

/// Pretty-printed JSON payload of a service reply
pub fn format_reply(reply: &Message) -> Result<String> {
    to_json(&reply_to_value(reply)?)
}

/// Write a value as pretty JSON to `path`
pub fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create JSON output file: {}", path.display()))?;
    serde_json::to_writer_pretty(file, value)
        .with_context(|| format!("Failed to write JSON output: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributed::protocol::{ErrorKind, ErrorMessage};
    use crate::job::{JobReport, JobStatus};

    #[test]
    fn test_error_payload() {
        let value = reply_to_value(&Message::Error(ErrorMessage::new(
            ErrorKind::UpstreamUnavailable,
            "upstream unavailable: 10.0.0.2:9999: connection refused",
        )))
        .unwrap();

        assert_eq!(value["kind"], "upstream_unavailable");
        assert!(value["error"].as_str().unwrap().contains("10.0.0.2"));
    }

    #[test]
    fn test_ack_payload() {
        assert_eq!(reply_to_value(&Message::Ack).unwrap(), json!({ "ok": true }));
    }

    #[test]
    fn test_request_is_not_a_reply() {
        assert!(reply_to_value(&Message::Status).is_err());
    }

    #[test]
    fn test_write_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let report = JobReport {
            id: 1,
            host_label: "edge-1".to_string(),
            target_url: "http://img.example/a.png".to_string(),
            iteration_count: 1,
            status: JobStatus::Pending,
            success_evaluation: None,
            metrics: None,
            condition: None,
            trials: Vec::new(),
        };

        write_json_file(&path, &report).unwrap();

        let value: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["status"], "pending");
        assert!(value["success_evaluation"].is_null());
        assert!(value["metrics"].is_null());
    }
}
