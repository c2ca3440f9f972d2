//! Parser for structured CI job metadata.
//!
//! The metadata directory holds one subdirectory per job number. Each
//! job directory contains a `job.json` descriptor plus one JSON file
//! per executed test.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::errors::{ParseError, ParseResult};

/// Descriptor of one CI job, as exported by the provider.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JobRecord {
    pub job_number: u64,
    pub id: String,
    pub started_at: String,
    pub stopped_at: String,
    pub status: String,
    pub name: String,
    pub project_slug: String,
    #[serde(rename = "type")]
    pub job_type: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// One executed test as recorded by the CI provider.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TestRecord {
    pub classname: String,
    pub name: String,
    pub result: String,
    pub message: String,
    pub run_time: f64,
    pub source: String,
}

/// The metadata view of one job: descriptor plus its test records.
#[derive(Debug, Clone, PartialEq)]
pub struct JobTestMetadata {
    pub job: JobRecord,
    pub test_metadata: Vec<TestRecord>,
}

/// Parse all job metadata under `dir`, ordered by job number.
///
/// An absent or empty directory is "no data from this source" and
/// yields an empty vec. Any malformed JSON or schema mismatch aborts
/// the whole parse with an error naming the offending file.
pub fn parse_metadata_directory(dir: &Path) -> ParseResult<Vec<JobTestMetadata>> {
    if dir.as_os_str().is_empty() || !dir.is_dir() {
        tracing::warn!(path = %dir.display(), "there is no test metadata to parse");
        return Ok(Vec::new());
    }

    let mut results = Vec::new();
    for job_dir in sorted_subdirectories(dir)? {
        let descriptor_path = job_dir.join("job.json");
        let job: JobRecord = read_json(&descriptor_path)?;

        let mut test_metadata = Vec::new();
        for file in sorted_json_files(&job_dir)? {
            if file.file_name().is_some_and(|name| name == "job.json") {
                continue;
            }
            tracing::info!(path = %file.display(), "parsing test metadata");
            test_metadata.push(read_json::<TestRecord>(&file)?);
        }

        results.push(JobTestMetadata { job, test_metadata });
    }

    results.sort_by_key(|metadata| metadata.job.job_number);
    Ok(results)
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> ParseResult<T> {
    let content = fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|error| ParseError::Schema {
        path: path.to_path_buf(),
        reason: error.to_string(),
    })
}

pub(crate) fn sorted_subdirectories(dir: &Path) -> ParseResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|source| ParseError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut directories: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    directories.sort();
    Ok(directories)
}

fn sorted_json_files(dir: &Path) -> ParseResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|source| ParseError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    Ok(files)
}
