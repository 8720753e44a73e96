//! Human-readable text output

use crate::distributed::protocol::{ErrorMessage, Message, StatusMessage};
use crate::distributed::{BatchCreated, BatchResults, FailedHost};
use crate::job::JobReport;
use crate::registry::HostRecord;
use crate::util::time::{format_duration, format_percent};
use std::fmt::Write;

const RULE: &str = "═══════════════════════════════════════════════════════════";

/// Format a benchmark job report
///
/// Shows:
/// - Job identity and status
/// - Success evaluation (counts and error rate)
/// - Duration metrics, or the reason they are absent
/// - The returned trials, one line each
pub fn format_job_report(report: &JobReport) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "  Job {} on {}", report.id, report.host_label);
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "Target:     {}", report.target_url);
    let _ = writeln!(out, "Iterations: {}", format_number(report.iteration_count as u64));
    let _ = writeln!(out, "Status:     {}", report.status);
    let _ = writeln!(out);

    let Some(eval) = report.success_evaluation else {
        let _ = writeln!(out, "Job still running; results appear once all trials finish");
        return out;
    };

    let _ = writeln!(out, "Success Evaluation:");
    let _ = writeln!(out, "  Completed:  {}", format_number(eval.completed_count as u64));
    let _ = writeln!(out, "  Failed:     {}", format_number(eval.failed_count as u64));
    let _ = writeln!(out, "  Error rate: {}", format_percent(eval.error_rate));
    let _ = writeln!(out);

    let _ = writeln!(out, "Duration (successful trials):");
    match (&report.metrics, &report.condition) {
        (Some(m), _) => {
            let _ = writeln!(out, "  Min:    {}", format_duration(m.min_duration));
            let _ = writeln!(out, "  Mean:   {}", format_duration(m.mean_duration));
            let _ = writeln!(out, "  Max:    {}", format_duration(m.max_duration));
            let _ = writeln!(out, "  Stdev:  {}", format_duration(m.stdev_duration));
        }
        (None, Some(condition)) => {
            let _ = writeln!(out, "  Not available: {}", condition);
        }
        (None, None) => {
            let _ = writeln!(out, "  Not available");
        }
    }

    if !report.trials.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Trials (showing {} of {}):",
            report.trials.len(),
            report.iteration_count
        );
        for (i, trial) in report.trials.iter().enumerate() {
            let _ = write!(
                out,
                "  {:>4}  {:<8} {:>10}  {}",
                i + 1,
                format!("{:?}", trial.outcome()).to_lowercase(),
                format_duration(trial.duration()),
                trial.started_at().format("%H:%M:%S%.3f")
            );
            if let Some(error) = trial.error() {
                let _ = write!(out, "  {}", error);
            }
            let _ = writeln!(out);
        }
    }

    out
}

/// Format a batch creation reply
pub fn format_batch_created(created: &BatchCreated) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "✅ Batch {} created", created.batch_id);
    if let Some(advisory) = &created.advisory {
        let _ = writeln!(out, "⚠️  {}", advisory);
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Assignments:");
    for a in &created.assignments {
        let _ = writeln!(out, "  {:<20} {:<24} job {}", a.label, a.address, a.job_id);
    }

    if !created.failed_hosts.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Hosts that did not accept:");
        write_failed_hosts(&mut out, &created.failed_hosts);
    }

    out
}

/// Format a merged batch read
pub fn format_batch_results(results: &BatchResults) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "Batch {} ({} host reports)",
        results.batch_id,
        results.reports.len()
    );
    let _ = writeln!(out, "Target:    {}", results.target_url);
    let _ = writeln!(out, "Created:   {}", results.created_at.to_rfc3339());
    let _ = writeln!(out, "Read mode: {}", results.read_mode);
    let _ = writeln!(out);

    for report in &results.reports {
        out.push_str(&format_job_report(report));
        let _ = writeln!(out);
    }

    if !results.unavailable.is_empty() {
        let _ = writeln!(out, "Unavailable hosts:");
        write_failed_hosts(&mut out, &results.unavailable);
    }

    out
}

fn write_failed_hosts(out: &mut String, hosts: &[FailedHost]) {
    for h in hosts {
        let _ = writeln!(out, "  {:<20} {:<24} {}", h.label, h.address, h.reason);
    }
}

/// Format a host list
pub fn format_hosts(hosts: &[HostRecord]) -> String {
    if hosts.is_empty() {
        return "No hosts registered\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(out, "{:<20} {:<24} DESCRIPTION", "LABEL", "ADDRESS");
    for h in hosts {
        let _ = writeln!(
            out,
            "{:<20} {:<24} {}",
            h.label,
            h.address,
            h.description.as_deref().unwrap_or("-")
        );
    }
    out
}

fn format_status(status: &StatusMessage) -> String {
    format!(
        "Status:      {}\nHostname:    {}\nHost label:  {}\nProtocol:    v{}\nActive jobs: {}\n",
        status.status, status.hostname, status.host_label, status.protocol_version, status.active_jobs
    )
}

fn format_error(error: &ErrorMessage) -> String {
    let mut out = format!("❌ {} ({})\n", error.error, error.kind);
    if !error.failed_hosts.is_empty() {
        let _ = writeln!(out, "Hosts that did not accept:");
        write_failed_hosts(&mut out, &error.failed_hosts);
    }
    out
}

/// Format any service reply
pub fn format_reply(reply: &Message) -> String {
    match reply {
        Message::StatusReply(status) => format_status(status),
        Message::JobAccepted(accepted) => {
            format!("✅ Job {} accepted by {}\n", accepted.job_id, accepted.host_label)
        }
        Message::JobResults(report) => format_job_report(report),
        Message::Host(host) => format_hosts(std::slice::from_ref(host)),
        Message::Hosts(hosts) => format_hosts(hosts),
        Message::Ack => "✅ OK\n".to_string(),
        Message::BatchCreated(created) => format_batch_created(created),
        Message::BatchResults(results) => format_batch_results(results),
        Message::Error(error) => format_error(error),
        other => format!("Unexpected reply: {}\n", other.name()),
    }
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();

    for (count, c) in s.chars().rev().enumerate() {
        if count > 0 && count % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }

    result.chars().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributed::protocol::ErrorKind;
    use crate::distributed::{Assignment, ReadMode};
    use crate::job::JobStatus;
    use crate::stats::{DurationSummary, StatsError, SuccessEvaluation};
    use crate::trial::{Trial, TrialOutcome};
    use chrono::Utc;
    use std::time::Duration;

    fn report(status: JobStatus) -> JobReport {
        JobReport {
            id: 12,
            host_label: "edge-1".to_string(),
            target_url: "http://img.example/a.png".to_string(),
            iteration_count: 2,
            status,
            success_evaluation: None,
            metrics: None,
            condition: None,
            trials: Vec::new(),
        }
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1_000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn test_pending_report() {
        let text = format_job_report(&report(JobStatus::Pending));
        assert!(text.contains("Job 12 on edge-1"));
        assert!(text.contains("Status:     pending"));
        assert!(text.contains("still running"));
    }

    #[test]
    fn test_finished_report() {
        let mut r = report(JobStatus::PartialError);
        r.success_evaluation = Some(SuccessEvaluation {
            completed_count: 1,
            failed_count: 1,
            error_rate: 0.5,
        });
        r.metrics = Some(DurationSummary {
            min_duration: Duration::from_millis(10),
            max_duration: Duration::from_millis(10),
            mean_duration: Duration::from_millis(10),
            stdev_duration: Duration::ZERO,
        });
        r.trials = vec![
            Trial::from_parts(&r.target_url, TrialOutcome::Success, Utc::now(), Duration::from_millis(10), None),
            Trial::from_parts(
                &r.target_url,
                TrialOutcome::Failure,
                Utc::now(),
                Duration::from_millis(3),
                Some("HTTP 503".to_string()),
            ),
        ];

        let text = format_job_report(&r);
        assert!(text.contains("Error rate: 50.00%"));
        assert!(text.contains("Mean:   10.00ms"));
        assert!(text.contains("Trials (showing 2 of 2)"));
        assert!(text.contains("HTTP 503"));
    }

    #[test]
    fn test_no_successful_trials_report() {
        let mut r = report(JobStatus::Error);
        r.success_evaluation = Some(SuccessEvaluation {
            completed_count: 0,
            failed_count: 2,
            error_rate: 1.0,
        });
        r.condition = Some(StatsError::NoSuccessfulTrials);

        let text = format_job_report(&r);
        assert!(text.contains("Not available: no successful trials"));
    }

    #[test]
    fn test_batch_created_with_advisory() {
        let created = BatchCreated {
            batch_id: 3,
            advisory: Some("only one host registered".to_string()),
            assignments: vec![Assignment {
                address: "10.0.0.1:9999".to_string(),
                label: "edge-1".to_string(),
                job_id: 8,
            }],
            failed_hosts: Vec::new(),
        };

        let text = format_batch_created(&created);
        assert!(text.contains("Batch 3 created"));
        assert!(text.contains("only one host registered"));
        assert!(text.contains("job 8"));
        assert!(!text.contains("did not accept"));
    }

    #[test]
    fn test_batch_results_header() {
        let results = BatchResults {
            batch_id: 5,
            target_url: "http://img.example/a.png".to_string(),
            created_at: chrono::Utc::now(),
            read_mode: ReadMode::BestEffort,
            reports: Vec::new(),
            unavailable: vec![FailedHost {
                address: "10.0.0.2:9999".to_string(),
                label: "edge-2".to_string(),
                reason: "connection refused".to_string(),
            }],
        };

        let text = format_batch_results(&results);
        assert!(text.contains("Batch 5"));
        assert!(text.contains("Target:    http://img.example/a.png"));
        assert!(text.contains("Read mode: best_effort"));
        assert!(text.contains("Unavailable hosts:"));
        assert!(text.contains("edge-2"));
    }

    #[test]
    fn test_no_host_accepted_lists_hosts() {
        let mut error = ErrorMessage::new(ErrorKind::NoHostAccepted, "no host accepted the benchmark job (1 failed)");
        error.failed_hosts.push(FailedHost {
            address: "10.0.0.3:9999".to_string(),
            label: "edge-3".to_string(),
            reason: "rejected: too many active jobs".to_string(),
        });

        let text = format_reply(&Message::Error(error));
        assert!(text.contains("no_host_accepted"));
        assert!(text.contains("Hosts that did not accept:"));
        assert!(text.contains("edge-3"));
        assert!(text.contains("too many active jobs"));
    }

    #[test]
    fn test_error_reply() {
        let text = format_reply(&Message::Error(ErrorMessage::new(ErrorKind::NotFound, "job 4 not found")));
        assert!(text.contains("job 4 not found"));
        assert!(text.contains("not_found"));
    }
}
