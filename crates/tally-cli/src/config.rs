//! Configuration loading and discovery of per-suite result directories.
//!
//! The results tree is laid out as
//! `test_result_dir/<repository>/<workflow>/<test_suite>/` with the
//! artifact and metadata subdirectories named by the config. Discovery
//! walks that tree and produces one [`ReporterArgs`] per test-suite
//! directory that carries either source.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use walkdir::WalkDir;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Root of the per-repository results tree.
    pub test_result_dir: PathBuf,
    /// Name of the JUnit XML subdirectory within each test-suite dir.
    pub test_artifact_dir: String,
    /// Name of the CI metadata subdirectory within each test-suite dir.
    pub test_metadata_dir: String,
    /// Directory the CSV reports are written to.
    pub reports_dir: PathBuf,
}

/// Arguments for one reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReporterArgs {
    pub repository: String,
    pub workflow: String,
    pub test_suite: String,
    pub artifact_dir: PathBuf,
    pub metadata_dir: PathBuf,
    pub csv_report_path: PathBuf,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// Walk the results tree and build one [`ReporterArgs`] per
    /// test-suite directory containing an artifact or metadata
    /// subdirectory.
    pub fn discover(&self) -> Result<Vec<ReporterArgs>> {
        let non_alphanumeric = Regex::new(r"[^a-zA-Z0-9_]+")?;
        let mut args = Vec::new();

        for entry in WalkDir::new(&self.test_result_dir)
            .min_depth(3)
            .max_depth(3)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                // A vanished or unreadable subtree is "no data", not fatal
                Err(error) => {
                    tracing::warn!("skipping unreadable results entry: {error}");
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }
            let suite_path = entry.path();
            let artifact_dir = suite_path.join(&self.test_artifact_dir);
            let metadata_dir = suite_path.join(&self.test_metadata_dir);
            if !artifact_dir.exists() && !metadata_dir.exists() {
                continue;
            }

            let test_suite = dir_name(suite_path)?;
            let workflow_path = suite_path
                .parent()
                .context("test-suite directory has no workflow parent")?;
            let workflow = dir_name(workflow_path)?;
            let repository_path = workflow_path
                .parent()
                .context("workflow directory has no repository parent")?;
            let repository = normalize_name(&non_alphanumeric, &dir_name(repository_path)?, "");

            let suite_slug = normalize_name(&non_alphanumeric, &test_suite, "_");
            let csv_report_path = self
                .reports_dir
                .join(format!("{repository}_{suite_slug}_results.csv"));

            args.push(ReporterArgs {
                repository,
                workflow,
                test_suite,
                artifact_dir,
                metadata_dir,
                csv_report_path,
            });
        }
        Ok(args)
    }
}

fn dir_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_owned)
        .with_context(|| format!("directory {} has no UTF-8 name", path.display()))
}

fn normalize_name(non_alphanumeric: &Regex, name: &str, delimiter: &str) -> String {
    non_alphanumeric
        .replace_all(name, delimiter)
        .to_lowercase()
        .trim_matches('_')
        .to_string()
}
