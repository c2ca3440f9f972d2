//! Per-job reconciliation of the two telemetry sources.
//!
//! Each source is folded into canonical [`SuiteResult`] records keyed by
//! job number, then merged: the artifact (XML) view is authoritative for
//! everything except `job_execution_time`, which only the CI metadata
//! knows. Cross-source disagreements are reported through an injected
//! [`WarningSink`] and never block emission.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::errors::{ParseError, ParseResult};
use crate::model::{round3, SuiteResult, DATE_FORMAT, DATETIME_FORMAT};
use crate::parsers::junit::{JobReports, TestCase};
use crate::parsers::metadata::JobTestMetadata;

/// Result labels the CI provider classifies as a pass. `system-out` is a
/// provider quirk: tests that only emitted output are recorded as such.
pub const SUCCESS_RESULTS: [&str; 2] = ["success", "system-out"];
pub const FAILURE_RESULT: &str = "failure";
pub const SKIPPED_RESULT: &str = "skipped";
pub const CANCELED_JOB_STATUS: &str = "canceled";

/// One field that disagrees between the artifact and metadata views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMismatch {
    pub field: &'static str,
    pub artifact: String,
    pub metadata: String,
}

/// A cross-source disagreement report for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub repository: String,
    pub workflow: String,
    pub test_suite: String,
    pub job: u64,
    pub timestamp: Option<String>,
    pub fields: Vec<FieldMismatch>,
}

/// Receiver for advisory reconciliation warnings. Injected so the
/// engine stays testable without process-wide logger state.
pub trait WarningSink {
    fn mismatch(&mut self, report: &Mismatch);
}

/// Default sink: logs each mismatch through `tracing`.
#[derive(Debug, Default)]
pub struct TracingSink;

impl WarningSink for TracingSink {
    fn mismatch(&mut self, report: &Mismatch) {
        let detail: Vec<String> = report
            .fields
            .iter()
            .map(|field| {
                format!(
                    "{}: artifact={}, metadata={}",
                    field.field, field.artifact, field.metadata
                )
            })
            .collect();
        tracing::warn!(
            job = report.job,
            timestamp = report.timestamp.as_deref().unwrap_or(""),
            "mismatches detected for {}/{}/{}/{}: {}",
            report.repository,
            report.workflow,
            report.test_suite,
            report.job,
            detail.join("; ")
        );
    }
}

/// The heuristic retry signal: a system-out text referencing a
/// `trace.zip` attachment marks a Playwright re-execution. Kept as a
/// named standalone predicate so the convention can be swapped without
/// touching the fold.
pub fn is_retry_signal(case: &TestCase) -> bool {
    case.system_out
        .as_ref()
        .and_then(|out| out.text.as_deref())
        .is_some_and(|text| text.contains("trace.zip"))
}

/// Reconciles both telemetry views for one repository/workflow/test_suite
/// triple into the final sorted result sequence.
pub struct Reconciler {
    repository: String,
    workflow: String,
    test_suite: String,
}

impl Reconciler {
    pub fn new(
        repository: impl Into<String>,
        workflow: impl Into<String>,
        test_suite: impl Into<String>,
    ) -> Self {
        Self {
            repository: repository.into(),
            workflow: workflow.into(),
            test_suite: test_suite.into(),
        }
    }

    /// Merge the two parsed views, preferring artifact results but
    /// taking `job_execution_time` from the metadata when available.
    /// Output is ordered ascending by (timestamp, job number).
    pub fn reconcile(
        &self,
        metadata: &[JobTestMetadata],
        reports: &[JobReports],
        sink: &mut dyn WarningSink,
    ) -> ParseResult<Vec<SuiteResult>> {
        let mut metadata_results = self.fold_metadata(metadata)?;
        let artifact_results = self.fold_reports(reports);

        let mut results: Vec<SuiteResult> = Vec::new();
        for (job, mut artifact) in artifact_results {
            if let Some(metadata_result) = metadata_results.remove(&job) {
                let fields = compare_results(&artifact, &metadata_result);
                if !fields.is_empty() {
                    sink.mismatch(&Mismatch {
                        repository: self.repository.clone(),
                        workflow: self.workflow.clone(),
                        test_suite: self.test_suite.clone(),
                        job,
                        timestamp: artifact.timestamp.clone(),
                        fields,
                    });
                }
                artifact.job_execution_time = metadata_result.job_execution_time;
                // Backfill when no suite carried a timestamp, so the
                // final ordering never sees an absent key.
                if artifact.timestamp.is_none() {
                    artifact.timestamp = metadata_result.timestamp;
                    artifact.date = metadata_result.date;
                }
            }
            results.push(artifact);
        }
        results.extend(metadata_results.into_values());

        results.sort_by(|a, b| {
            (a.timestamp.as_deref(), a.job).cmp(&(b.timestamp.as_deref(), b.job))
        });
        Ok(results)
    }

    fn fold_metadata(
        &self,
        metadata: &[JobTestMetadata],
    ) -> ParseResult<BTreeMap<u64, SuiteResult>> {
        let mut results = BTreeMap::new();
        for job_metadata in metadata {
            // Canceled jobs and jobs that ran nothing contribute no data
            if job_metadata.test_metadata.is_empty()
                || job_metadata.job.status == CANCELED_JOB_STATUS
            {
                continue;
            }
            let job = job_metadata.job.job_number;
            let started_at = parse_timestamp(&job_metadata.job.started_at, job)?;
            let stopped_at = parse_timestamp(&job_metadata.job.stopped_at, job)?;

            let mut result = SuiteResult::new(
                self.repository.clone(),
                self.workflow.clone(),
                self.test_suite.clone(),
                job,
            );
            result.timestamp = Some(job_metadata.job.started_at.clone());
            result.date = Some(started_at.format(DATE_FORMAT).to_string());
            result.job_execution_time =
                Some((stopped_at - started_at).num_milliseconds() as f64 / 1000.0);

            let mut run_time = 0.0;
            for test in &job_metadata.test_metadata {
                run_time += test.run_time;
                if SUCCESS_RESULTS.contains(&test.result.as_str()) {
                    result.success += 1;
                } else if test.result == FAILURE_RESULT {
                    result.failure += 1;
                } else if test.result == SKIPPED_RESULT {
                    result.skipped += 1;
                } else {
                    result.unknown += 1;
                }
            }
            result.run_time = round3(run_time);

            results.insert(job, result);
        }
        Ok(results)
    }

    fn fold_reports(&self, reports: &[JobReports]) -> BTreeMap<u64, SuiteResult> {
        let mut results = BTreeMap::new();
        for job_reports in reports {
            // A job directory with no report files yields no artifact
            // view; the job may still surface through the metadata.
            if job_reports.reports.is_empty() {
                continue;
            }

            let mut result = SuiteResult::new(
                self.repository.clone(),
                self.workflow.clone(),
                self.test_suite.clone(),
                job_reports.job,
            );

            let mut run_times: Vec<f64> = Vec::new();
            let mut execution_times: Vec<f64> = Vec::new();
            for report in &job_reports.reports {
                let mut run_time = 0.0;
                // Jest and Playwright carry a meaningful top-level time
                // that differs from the case sum when workers run in
                // parallel. Zero means "not recorded" and is not trusted.
                let declared_time = report.time.filter(|time| *time > 0.0);

                for suite in &report.suites {
                    // First-seen suite timestamp wins for the whole job
                    if result.date.is_none()
                        && suite.timestamp.as_deref().is_some_and(|t| !t.is_empty())
                    {
                        let timestamp = suite.timestamp.clone().unwrap_or_default();
                        result.date = timestamp.split('T').next().map(str::to_owned);
                        result.timestamp = Some(timestamp);
                    }

                    // Mocha is known to mistotal its declared `tests`
                    // attribute, so count the case elements instead
                    let tests = suite.test_cases.len() as u64;
                    let skipped = suite.skipped.unwrap_or(0);
                    result.failure += suite.failures;
                    result.skipped += skipped;
                    result.success += tests.saturating_sub(suite.failures + skipped);

                    for case in &suite.test_cases {
                        if let Some(time) = case.time {
                            run_time += time;
                        }
                        if case
                            .properties
                            .as_ref()
                            .is_some_and(|props| props.iter().any(|p| p.name == "fixme"))
                        {
                            result.fixme += 1;
                        }
                        if is_retry_signal(case) {
                            result.retry += 1;
                        }
                    }
                }
                run_times.push(run_time);
                execution_times.push(declared_time.unwrap_or(run_time));
            }
            result.run_time = round3(run_times.iter().sum());
            // Report files within a job are parallel shards: the wall
            // time is bounded by the slowest shard, not their sum
            result.execution_time = execution_times
                .iter()
                .copied()
                .fold(None, |max: Option<f64>, time| {
                    Some(max.map_or(time, |m| m.max(time)))
                })
                .map(round3);

            results.insert(job_reports.job, result);
        }
        results
    }
}

fn parse_timestamp(value: &str, job: u64) -> ParseResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, DATETIME_FORMAT).map_err(|_| ParseError::Timestamp {
        job,
        value: value.to_string(),
    })
}

/// Compare every stored field except identity, timing and the
/// artifact-only counters, which only one source can know.
fn compare_results(artifact: &SuiteResult, metadata: &SuiteResult) -> Vec<FieldMismatch> {
    let mut fields = Vec::new();
    let mut check = |field: &'static str, artifact_value: String, metadata_value: String| {
        if artifact_value != metadata_value {
            fields.push(FieldMismatch {
                field,
                artifact: artifact_value,
                metadata: metadata_value,
            });
        }
    };
    check(
        "date",
        artifact.date.clone().unwrap_or_default(),
        metadata.date.clone().unwrap_or_default(),
    );
    check(
        "run_time",
        artifact.run_time.to_string(),
        metadata.run_time.to_string(),
    );
    check(
        "success",
        artifact.success.to_string(),
        metadata.success.to_string(),
    );
    check(
        "failure",
        artifact.failure.to_string(),
        metadata.failure.to_string(),
    );
    check(
        "skipped",
        artifact.skipped.to_string(),
        metadata.skipped.to_string(),
    );
    check(
        "unknown",
        artifact.unknown.to_string(),
        metadata.unknown.to_string(),
    );
    fields
}
