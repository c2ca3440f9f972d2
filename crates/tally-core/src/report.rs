//! CSV serialization of reconciled results.
//!
//! The column set and order are a compatibility contract with downstream
//! dashboards; absent optional numerics render as empty cells and rows
//! use CRLF terminators. An empty result sequence produces no output at
//! all, not even a header.

use std::fs;
use std::path::Path;

use crate::errors::ReportError;
use crate::model::SuiteResult;

pub const CSV_FIELDNAMES: [&str; 22] = [
    "Repository",
    "Workflow",
    "Test Suite",
    "Date",
    "Timestamp",
    "Job Number",
    "Status",
    "Execution Time",
    "Job Execution Time",
    "Run Time",
    "Success",
    "Failure",
    "Skipped",
    "Fixme",
    "Unknown",
    "Retry Count",
    "Total",
    "Success Rate (%)",
    "Failure Rate (%)",
    "Skipped Rate (%)",
    "Fixme Rate (%)",
    "Unknown Rate (%)",
];

/// Render the results as a CSV document. Empty input yields an empty
/// string.
pub fn csv_string(results: &[SuiteResult]) -> Result<String, ReportError> {
    if results.is_empty() {
        return Ok(String::new());
    }
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(Vec::new());
    writer.write_record(CSV_FIELDNAMES)?;
    for result in results {
        writer.write_record(row(result))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|error| ReportError::Io(error.into_error()))?;
    Ok(String::from_utf8(bytes)?)
}

/// Write the CSV report to `path`, creating parent directories. Writes
/// nothing when there are no results.
pub fn write_csv(path: &Path, results: &[SuiteResult]) -> Result<(), ReportError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(ReportError::CreateDir)?;
        }
    }
    if results.is_empty() {
        tracing::info!("no data to write to the CSV file");
        return Ok(());
    }
    fs::write(path, csv_string(results)?).map_err(ReportError::Io)
}

fn row(result: &SuiteResult) -> [String; 22] {
    [
        result.repository.clone(),
        result.workflow.clone(),
        result.test_suite.clone(),
        result.date.clone().unwrap_or_default(),
        result.timestamp.clone().unwrap_or_default(),
        result.job.to_string(),
        result.status().as_str().to_string(),
        opt_seconds(result.execution_time),
        opt_seconds(result.job_execution_time),
        format_seconds(result.run_time),
        result.success.to_string(),
        result.failure.to_string(),
        result.skipped.to_string(),
        result.fixme.to_string(),
        result.unknown.to_string(),
        result.retry.to_string(),
        result.total().to_string(),
        opt_rate(result.success_rate()),
        opt_rate(result.failure_rate()),
        opt_rate(result.skipped_rate()),
        opt_rate(result.fixme_rate()),
        opt_rate(result.unknown_rate()),
    ]
}

fn opt_seconds(value: Option<f64>) -> String {
    value.map(format_seconds).unwrap_or_default()
}

fn opt_rate(value: Option<f64>) -> String {
    value.map(format_rate).unwrap_or_default()
}

/// Seconds cell: up to 3 decimals, trailing zeros trimmed, always at
/// least one decimal place (`3600.0`, `1.1`, `0.042`).
pub fn format_seconds(value: f64) -> String {
    trim_float(format!("{value:.3}"))
}

/// Rate cell: up to 2 decimals, same trimming (`100.0`, `33.33`).
pub fn format_rate(value: f64) -> String {
    trim_float(format!("{value:.2}"))
}

fn trim_float(rendered: String) -> String {
    let trimmed = rendered.trim_end_matches('0');
    if trimmed.ends_with('.') {
        format!("{trimmed}0")
    } else {
        trimmed.to_string()
    }
}
