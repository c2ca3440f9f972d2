//! Reconciles two views of a CI test run, the provider's structured job
//! metadata and the JUnit XML artifacts the test runners upload, into
//! canonical per-job result records and CSV reports.

pub mod errors;
pub mod model;
pub mod parsers;
pub mod reconcile;
pub mod report;

// Convenience re-exports
pub use errors::{ParseError, ParseResult, ReportError};
pub use model::{Status, SuiteResult};
pub use parsers::junit::{parse_artifact_directory, JobReports, ReportFile, TestCase, TestSuite};
pub use parsers::metadata::{parse_metadata_directory, JobRecord, JobTestMetadata, TestRecord};
pub use reconcile::{Mismatch, Reconciler, TracingSink, WarningSink};
pub use report::write_csv;
