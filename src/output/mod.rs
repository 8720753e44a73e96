//! Report rendering
//!
//! - `text`: Human-readable console output
//! - `json`: Pretty-printed JSON payloads

pub mod json;
pub mod text;

use crate::config::OutputFormat;
use crate::distributed::protocol::Message;
use crate::job::JobReport;
use crate::Result;

/// Render a job report in the requested format
pub fn render_report(report: &JobReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(text::format_job_report(report)),
        OutputFormat::Json => json::to_json(report),
    }
}

/// Render a service reply in the requested format
pub fn render_reply(reply: &Message, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(text::format_reply(reply)),
        OutputFormat::Json => json::format_reply(reply),
    }
}
