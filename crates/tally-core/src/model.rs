//! Canonical per-job result record and its derived metrics.

use serde::Serialize;

/// Render format for the derived `date` field.
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// Timestamp format used by the CI metadata (`started_at`/`stopped_at`).
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Overall status of one job's test run.
///
/// Derived from counts, not from the CI job status: a CI job may fail
/// for reasons other than test failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Failed,
    Unknown,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Failed => "failed",
            Status::Unknown => "unknown",
        }
    }
}

/// The reconciled result of one CI job, one per
/// repository/workflow/test_suite/job number.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuiteResult {
    pub repository: String,
    pub workflow: String,
    pub test_suite: String,

    /// First-seen test start time. The artifact and metadata timestamps
    /// are expected to differ since they mark test start and job start
    /// respectively.
    pub timestamp: Option<String>,
    /// `YYYY-MM-DD`, derived from `timestamp`.
    pub date: Option<String>,
    pub job: u64,

    /// Summation of individual test run times in seconds. Does not
    /// account for parallel execution.
    pub run_time: f64,

    /// Artifact only. Wall-clock time in seconds: report files within
    /// one job are parallel shards, so this is the slowest shard.
    pub execution_time: Option<f64>,

    /// Metadata only. Duration of the CI job itself in seconds.
    pub job_execution_time: Option<f64>,

    pub success: u64,
    pub failure: u64,
    pub skipped: u64,

    /// Artifact only. Tests annotated as pending a fix (Playwright
    /// property). Subset of `skipped`.
    pub fixme: u64,

    /// Metadata only. Tests whose result label the CI provider did not
    /// classify as success, failure or skipped.
    pub unknown: u64,

    /// Artifact only. Number of detected re-executions; the same test
    /// may be re-executed more than once.
    pub retry: u64,
}

impl SuiteResult {
    pub fn new(
        repository: impl Into<String>,
        workflow: impl Into<String>,
        test_suite: impl Into<String>,
        job: u64,
    ) -> Self {
        Self {
            repository: repository.into(),
            workflow: workflow.into(),
            test_suite: test_suite.into(),
            timestamp: None,
            date: None,
            job,
            run_time: 0.0,
            execution_time: None,
            job_execution_time: None,
            success: 0,
            failure: 0,
            skipped: 0,
            fixme: 0,
            unknown: 0,
            retry: 0,
        }
    }

    /// Status priority: failure > unknown > success.
    pub fn status(&self) -> Status {
        if self.failure > 0 {
            Status::Failed
        } else if self.unknown > 0 {
            Status::Unknown
        } else {
            Status::Success
        }
    }

    /// Total number of tests. `fixme` is a subset of `skipped` and
    /// `retry` counts re-executions, so neither contributes here.
    pub fn total(&self) -> u64 {
        self.success + self.failure + self.skipped + self.unknown
    }

    pub fn success_rate(&self) -> Option<f64> {
        rate(self.success, self.total())
    }

    pub fn failure_rate(&self) -> Option<f64> {
        rate(self.failure, self.total())
    }

    pub fn skipped_rate(&self) -> Option<f64> {
        rate(self.skipped, self.total())
    }

    pub fn fixme_rate(&self) -> Option<f64> {
        rate(self.fixme, self.total())
    }

    pub fn unknown_rate(&self) -> Option<f64> {
        rate(self.unknown, self.total())
    }
}

/// Percentage of `value` over `total`, rounded to 2 decimals.
/// Undefined (not zero) when `total` is 0.
fn rate(value: u64, total: u64) -> Option<f64> {
    if total > 0 {
        Some(round2(value as f64 / total as f64 * 100.0))
    } else {
        None
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_is_sum_of_base_counts() {
        let mut result = SuiteResult::new("repo", "main", "suite", 1);
        result.success = 3;
        result.failure = 1;
        result.skipped = 2;
        result.unknown = 1;
        result.fixme = 2;
        result.retry = 4;
        assert_eq!(result.total(), 7);
    }

    #[test]
    fn rates_are_absent_when_total_is_zero() {
        let result = SuiteResult::new("repo", "main", "suite", 1);
        assert_eq!(result.total(), 0);
        assert_eq!(result.success_rate(), None);
        assert_eq!(result.failure_rate(), None);
        assert_eq!(result.skipped_rate(), None);
        assert_eq!(result.fixme_rate(), None);
        assert_eq!(result.unknown_rate(), None);
    }

    #[test]
    fn rates_are_rounded_percentages() {
        let mut result = SuiteResult::new("repo", "main", "suite", 1);
        result.success = 1;
        result.failure = 2;
        assert_eq!(result.success_rate(), Some(33.33));
        assert_eq!(result.failure_rate(), Some(66.67));
        assert_eq!(result.skipped_rate(), Some(0.0));
    }

    #[test]
    fn status_priority_failure_then_unknown_then_success() {
        let mut result = SuiteResult::new("repo", "main", "suite", 1);
        assert_eq!(result.status(), Status::Success);
        result.unknown = 1;
        assert_eq!(result.status(), Status::Unknown);
        result.failure = 1;
        assert_eq!(result.status(), Status::Failed);
    }

    #[test]
    fn skipped_only_job_is_a_success() {
        let mut result = SuiteResult::new("repo", "main", "suite", 1);
        result.skipped = 1;
        assert_eq!(result.status(), Status::Success);
        assert_eq!(result.total(), 1);
    }
}
