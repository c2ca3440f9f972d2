//! Tolerant parser for JUnit-style XML test reports.
//!
//! Report dialects differ by producer (Jest, Mocha, Playwright, pytest,
//! TAP): aggregate attributes may be missing, `skipped`/`errors` counts
//! are optional, and some tools emit NUL bytes into the report body.
//! The parser normalizes all of them into one typed tree of
//! job → report file → suite → test case.
//!
//! Test-case children are a closed vocabulary. An unrecognized child tag
//! is a hard error: historically it means a new, unhandled dialect that
//! must be triaged rather than swallowed.

use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::errors::IllFormedError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::errors::{ParseError, ParseResult};
use crate::parsers::metadata::sorted_subdirectories;

/// A property of a test case, e.g. Playwright's `fixme` annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseProperty {
    pub name: String,
    pub value: String,
}

/// Marker that a test case was skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedNote {
    pub reason: Option<String>,
}

/// A test-case failure with its message and free-text detail.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureNote {
    pub message: String,
    pub kind: Option<String>,
    pub text: Option<String>,
}

/// Captured stdout of a test case.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemOut {
    pub text: Option<String>,
}

/// One test case within a suite.
#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    pub name: String,
    pub classname: Option<String>,
    pub time: Option<f64>,
    pub properties: Option<Vec<CaseProperty>>,
    pub skipped: Option<SkippedNote>,
    pub failure: Option<FailureNote>,
    pub system_out: Option<SystemOut>,
}

/// One suite of test cases with its declared aggregate counts.
#[derive(Debug, Clone, PartialEq)]
pub struct TestSuite {
    pub name: String,
    pub timestamp: Option<String>,
    pub hostname: Option<String>,
    pub tests: u64,
    pub failures: u64,
    pub skipped: Option<u64>,
    pub time: Option<f64>,
    pub errors: Option<u64>,
    pub test_cases: Vec<TestCase>,
}

/// One report file: the root element's optional aggregates plus its
/// suites. Jest and Playwright carry a meaningful top-level `time`;
/// pytest and TAP leave the root bare.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReportFile {
    pub id: Option<String>,
    pub name: Option<String>,
    pub tests: Option<u64>,
    pub failures: Option<u64>,
    pub skipped: Option<u64>,
    pub errors: Option<u64>,
    pub time: Option<f64>,
    pub timestamp: Option<String>,
    pub suites: Vec<TestSuite>,
}

/// All report files found for one job, in lexical filename order.
#[derive(Debug, Clone, PartialEq)]
pub struct JobReports {
    pub job: u64,
    pub reports: Vec<ReportFile>,
}

/// The closed vocabulary of test-case child elements.
#[derive(Debug, Clone, PartialEq)]
pub enum CaseChild {
    Properties(Vec<CaseProperty>),
    Skipped(SkippedNote),
    SystemOut(SystemOut),
    Failure(FailureNote),
}

/// Parse all JUnit XML reports under `dir`, one [`JobReports`] per
/// numeric job subdirectory.
///
/// An absent or non-directory path is "no data from this source" and
/// yields an empty vec. Unreadable files, malformed XML and schema
/// mismatches abort the whole parse with an error naming the failing
/// file.
pub fn parse_artifact_directory(dir: &Path) -> ParseResult<Vec<JobReports>> {
    if dir.as_os_str().is_empty() || !dir.is_dir() {
        tracing::warn!(path = %dir.display(), "there are no test artifacts to parse");
        return Ok(Vec::new());
    }

    let mut result = Vec::new();
    for job_dir in sorted_subdirectories(dir)? {
        let job = job_dir
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.parse::<u64>().ok())
            .ok_or_else(|| ParseError::JobDirectory {
                path: job_dir.clone(),
            })?;

        let mut reports = Vec::new();
        for xml_path in sorted_xml_files(&job_dir)? {
            tracing::info!(path = %xml_path.display(), "parsing report file");
            let content = fs::read_to_string(&xml_path).map_err(|source| ParseError::Io {
                path: xml_path.clone(),
                source,
            })?;
            let root = parse_document(&normalize_xml_content(&content), &xml_path)?;
            reports.push(report_file_from_element(&root, &xml_path)?);
        }
        result.push(JobReports { job, reports });
    }
    Ok(result)
}

/// Strip embedded NUL bytes. Some report producers emit binary garbage
/// that would otherwise abort parsing of the whole file.
fn normalize_xml_content(content: &str) -> String {
    if content.contains('\0') {
        content.replace('\0', "")
    } else {
        content.to_owned()
    }
}

// A minimal element tree. The report dialects are shallow and small,
// so the whole document is assembled before schema mapping.
#[derive(Debug)]
struct Element {
    tag: String,
    attrs: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

fn element_from_start(start: &BytesStart<'_>, path: &Path) -> ParseResult<Element> {
    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|source| ParseError::Xml {
            path: path.to_path_buf(),
            source: quick_xml::Error::from(source),
        })?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|source| ParseError::Xml {
                path: path.to_path_buf(),
                source,
            })?
            .into_owned();
        attrs.push((key, value));
    }
    Ok(Element {
        tag: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
        attrs,
        children: Vec::new(),
        text: String::new(),
    })
}

fn parse_document(content: &str, path: &Path) -> ParseResult<Element> {
    let mut reader = Reader::from_str(content);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => stack.push(element_from_start(&start, path)?),
            Ok(Event::Empty(start)) => {
                let element = element_from_start(&start, path)?;
                attach(&mut stack, &mut root, element);
            }
            Ok(Event::Text(text)) => {
                if let Some(top) = stack.last_mut() {
                    let unescaped = text.unescape().map_err(|source| ParseError::Xml {
                        path: path.to_path_buf(),
                        source,
                    })?;
                    top.text.push_str(&unescaped);
                }
            }
            Ok(Event::CData(data)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Ok(Event::End(_)) => {
                if let Some(element) = stack.pop() {
                    attach(&mut stack, &mut root, element);
                }
            }
            Ok(Event::Eof) => {
                // Elements still open at end of input make the document
                // ill-formed, not merely shaped wrong
                if let Some(open) = stack.pop() {
                    return Err(ParseError::Xml {
                        path: path.to_path_buf(),
                        source: quick_xml::Error::IllFormed(IllFormedError::MissingEndTag(
                            open.tag,
                        )),
                    });
                }
                break;
            }
            Ok(_) => {}
            Err(source) => {
                return Err(ParseError::Xml {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }
    }

    root.ok_or_else(|| ParseError::Schema {
        path: path.to_path_buf(),
        reason: "document has no root element".to_string(),
    })
}

fn attach(stack: &mut Vec<Element>, root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

fn attr_value<'a>(element: &'a Element, name: &str) -> Option<&'a str> {
    element
        .attrs
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

fn required_attr(element: &Element, name: &str, path: &Path) -> ParseResult<String> {
    attr_value(element, name)
        .map(str::to_owned)
        .ok_or_else(|| ParseError::Schema {
            path: path.to_path_buf(),
            reason: format!("<{}> is missing the {name:?} attribute", element.tag),
        })
}

fn optional_u64(element: &Element, name: &str, path: &Path) -> ParseResult<Option<u64>> {
    attr_value(element, name)
        .map(|value| {
            value.parse::<u64>().map_err(|_| ParseError::Schema {
                path: path.to_path_buf(),
                reason: format!(
                    "<{}> attribute {name}={value:?} is not a non-negative integer",
                    element.tag
                ),
            })
        })
        .transpose()
}

fn required_u64(element: &Element, name: &str, path: &Path) -> ParseResult<u64> {
    optional_u64(element, name, path)?.ok_or_else(|| ParseError::Schema {
        path: path.to_path_buf(),
        reason: format!("<{}> is missing the {name:?} attribute", element.tag),
    })
}

fn optional_f64(element: &Element, name: &str, path: &Path) -> ParseResult<Option<f64>> {
    attr_value(element, name)
        .map(|value| {
            value.parse::<f64>().map_err(|_| ParseError::Schema {
                path: path.to_path_buf(),
                reason: format!("<{}> attribute {name}={value:?} is not a number", element.tag),
            })
        })
        .transpose()
}

fn text_of(element: &Element) -> Option<String> {
    if element.text.is_empty() {
        None
    } else {
        Some(element.text.clone())
    }
}

// The root tag itself is not checked: every known dialect wraps suites
// in a <testsuites> element but the attribute set is what varies.
fn report_file_from_element(root: &Element, path: &Path) -> ParseResult<ReportFile> {
    Ok(ReportFile {
        id: attr_value(root, "id").map(str::to_owned),
        name: attr_value(root, "name").map(str::to_owned),
        tests: optional_u64(root, "tests", path)?,
        failures: optional_u64(root, "failures", path)?,
        skipped: optional_u64(root, "skipped", path)?,
        errors: optional_u64(root, "errors", path)?,
        time: optional_f64(root, "time", path)?,
        timestamp: attr_value(root, "timestamp").map(str::to_owned),
        suites: root
            .children
            .iter()
            .map(|suite| test_suite_from_element(suite, path))
            .collect::<ParseResult<_>>()?,
    })
}

fn test_suite_from_element(element: &Element, path: &Path) -> ParseResult<TestSuite> {
    Ok(TestSuite {
        name: required_attr(element, "name", path)?,
        timestamp: attr_value(element, "timestamp").map(str::to_owned),
        hostname: attr_value(element, "hostname").map(str::to_owned),
        tests: required_u64(element, "tests", path)?,
        failures: required_u64(element, "failures", path)?,
        skipped: optional_u64(element, "skipped", path)?,
        time: optional_f64(element, "time", path)?,
        errors: optional_u64(element, "errors", path)?,
        test_cases: element
            .children
            .iter()
            .map(|case| test_case_from_element(case, path))
            .collect::<ParseResult<_>>()?,
    })
}

fn test_case_from_element(element: &Element, path: &Path) -> ParseResult<TestCase> {
    let mut case = TestCase {
        name: required_attr(element, "name", path)?,
        classname: attr_value(element, "classname").map(str::to_owned),
        time: optional_f64(element, "time", path)?,
        properties: None,
        skipped: None,
        failure: None,
        system_out: None,
    };
    // At most one of each kind is expected; a repeated child overwrites
    // the earlier one, matching how loose producers are treated.
    for child in &element.children {
        match parse_case_child(child, path)? {
            CaseChild::Properties(properties) => case.properties = Some(properties),
            CaseChild::Skipped(skipped) => case.skipped = Some(skipped),
            CaseChild::SystemOut(system_out) => case.system_out = Some(system_out),
            CaseChild::Failure(failure) => case.failure = Some(failure),
        }
    }
    Ok(case)
}

fn parse_case_child(element: &Element, path: &Path) -> ParseResult<CaseChild> {
    match element.tag.as_str() {
        "properties" => {
            let mut properties = Vec::new();
            for property in &element.children {
                properties.push(CaseProperty {
                    name: required_attr(property, "name", path)?,
                    value: required_attr(property, "value", path)?,
                });
            }
            Ok(CaseChild::Properties(properties))
        }
        "skipped" => Ok(CaseChild::Skipped(SkippedNote {
            reason: attr_value(element, "reason").map(str::to_owned),
        })),
        "system-out" => Ok(CaseChild::SystemOut(SystemOut {
            text: text_of(element),
        })),
        "failure" => Ok(CaseChild::Failure(FailureNote {
            message: required_attr(element, "message", path)?,
            kind: attr_value(element, "type").map(str::to_owned),
            text: text_of(element),
        })),
        tag => Err(ParseError::UnexpectedTag {
            path: path.to_path_buf(),
            tag: tag.to_string(),
        }),
    }
}

fn sorted_xml_files(dir: &Path) -> ParseResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|source| ParseError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "xml"))
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_report(dir: &Path, job: u64, file_name: &str, content: &str) {
        let job_dir = dir.join(job.to_string());
        fs::create_dir_all(&job_dir).unwrap();
        fs::write(job_dir.join(file_name), content).unwrap();
    }

    const JEST_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<testsuites name="jest tests" tests="1" failures="0" errors="0" time="0.042">
  <testsuite name="lib/amplitude" errors="0" failures="0" skipped="0" timestamp="2024-07-19T00:18:01" time="0.042" tests="1">
    <testcase classname="lib/amplitude logs a correctly formatted message" name="lib/amplitude logs a correctly formatted message" time="0.042"/>
  </testsuite>
</testsuites>
"#;

    const MOCHA_XML: &str = r#"<testsuites name="Mocha Tests" time="0.002" tests="1" failures="1">
  <testsuite name="deleteUnverifiedAccounts" timestamp="2024-07-19T00:18:31" tests="1" failures="1" time="0.002">
    <testcase name="should call the handler" classname="should call the handler" time="0.002">
      <failure message="expected handler to be called once" type="AssertionError">AssertionError: expected handler to be called once</failure>
    </testcase>
  </testsuite>
</testsuites>
"#;

    const PLAYWRIGHT_XML: &str = r#"<testsuites id="" name="" tests="1" failures="0" skipped="1" errors="0" time="8.756">
<testsuite name="syncV3/signinCached.spec.ts" timestamp="2024-04-07T00:18:43.341Z" hostname="local" tests="1" failures="0" skipped="1" time="8.756" errors="0">
<testcase name="sign in on desktop" classname="syncV3/signinCached.spec.ts" time="8.756">
<properties>
<property name="fixme" value="test to be fixed, see FXA-9194"/>
</properties>
<skipped/>
</testcase>
</testsuite>
</testsuites>
"#;

    const PYTEST_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<testsuites>
  <testsuite name="pytest" errors="0" failures="0" skipped="1" tests="1" time="0.0" timestamp="2024-08-06T09:17:36.201378" hostname="ip-10-0-175-52">
    <testcase classname="tests.unit.providers.weather.test_provider" name="test_enabled_by_default" time="0.0">
      <skipped type="pytest.mark.skip" message="skipping"/>
    </testcase>
  </testsuite>
</testsuites>
"#;

    const TAP_XML: &str = r##"<testsuites>
  <testsuite name="Subtest: test/local/ban_tests.js" tests="1" failures="0" errors="0">
    <testcase name="#1 test/local/ban_tests.js"/>
  </testsuite>
</testsuites>
"##;

    #[test]
    fn missing_directory_yields_empty() {
        let results = parse_artifact_directory(Path::new("does/not/exist")).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn parses_jest_report() {
        let dir = tempfile::tempdir().unwrap();
        write_report(dir.path(), 1, "report.xml", JEST_XML);

        let results = parse_artifact_directory(dir.path()).unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].job, 1);
        let report = &results[0].reports[0];
        assert_eq!(report.name.as_deref(), Some("jest tests"));
        assert_eq!(report.time, Some(0.042));
        assert_eq!(report.suites.len(), 1);
        let suite = &report.suites[0];
        assert_eq!(suite.name, "lib/amplitude");
        assert_eq!(suite.timestamp.as_deref(), Some("2024-07-19T00:18:01"));
        assert_eq!(suite.tests, 1);
        assert_eq!(suite.skipped, Some(0));
        assert_eq!(suite.test_cases.len(), 1);
        assert_eq!(suite.test_cases[0].time, Some(0.042));
    }

    #[test]
    fn parses_mocha_failure_with_text() {
        let dir = tempfile::tempdir().unwrap();
        write_report(dir.path(), 1, "report.xml", MOCHA_XML);

        let results = parse_artifact_directory(dir.path()).unwrap();

        let case = &results[0].reports[0].suites[0].test_cases[0];
        let failure = case.failure.as_ref().unwrap();
        assert_eq!(failure.message, "expected handler to be called once");
        assert_eq!(failure.kind.as_deref(), Some("AssertionError"));
        assert_eq!(
            failure.text.as_deref(),
            Some("AssertionError: expected handler to be called once")
        );
        // Mocha omits skipped/errors entirely
        assert_eq!(results[0].reports[0].suites[0].skipped, None);
        assert_eq!(results[0].reports[0].suites[0].errors, None);
    }

    #[test]
    fn parses_playwright_properties_and_skip() {
        let dir = tempfile::tempdir().unwrap();
        write_report(dir.path(), 1, "report.xml", PLAYWRIGHT_XML);

        let results = parse_artifact_directory(dir.path()).unwrap();

        let report = &results[0].reports[0];
        assert_eq!(report.id.as_deref(), Some(""));
        assert_eq!(report.name.as_deref(), Some(""));
        let case = &report.suites[0].test_cases[0];
        let properties = case.properties.as_ref().unwrap();
        assert_eq!(properties.len(), 1);
        assert_eq!(properties[0].name, "fixme");
        assert_eq!(case.skipped, Some(SkippedNote { reason: None }));
    }

    #[test]
    fn parses_pytest_and_tap_with_bare_roots() {
        let dir = tempfile::tempdir().unwrap();
        write_report(dir.path(), 1, "pytest.xml", PYTEST_XML);
        write_report(dir.path(), 2, "tap.xml", TAP_XML);

        let results = parse_artifact_directory(dir.path()).unwrap();

        assert_eq!(results.len(), 2);
        let pytest = &results[0].reports[0];
        assert_eq!(pytest.tests, None);
        assert_eq!(pytest.time, None);
        assert_eq!(pytest.suites[0].hostname.as_deref(), Some("ip-10-0-175-52"));
        let tap = &results[1].reports[0];
        assert_eq!(tap.suites[0].time, None);
        assert_eq!(tap.suites[0].test_cases[0].time, None);
        assert_eq!(tap.suites[0].test_cases[0].classname, None);
    }

    #[test]
    fn report_files_are_ordered_by_filename() {
        let dir = tempfile::tempdir().unwrap();
        write_report(dir.path(), 1, "b.xml", TAP_XML);
        write_report(dir.path(), 1, "a.xml", JEST_XML);

        let results = parse_artifact_directory(dir.path()).unwrap();

        assert_eq!(results[0].reports.len(), 2);
        assert_eq!(results[0].reports[0].name.as_deref(), Some("jest tests"));
        assert_eq!(results[0].reports[1].name, None);
    }

    #[test]
    fn nul_bytes_are_stripped_before_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let with_nuls = JEST_XML.replace("jest tests", "jest\u{0} te\u{0}sts");
        write_report(dir.path(), 1, "clean.xml", JEST_XML);
        write_report(dir.path(), 2, "dirty.xml", &with_nuls);

        let results = parse_artifact_directory(dir.path()).unwrap();

        assert_eq!(results[0].reports[0], results[1].reports[0]);
    }

    #[test]
    fn unknown_case_child_tag_is_a_hard_error() {
        let dir = tempfile::tempdir().unwrap();
        let xml = r#"<testsuites>
  <testsuite name="s" tests="1" failures="0">
    <testcase name="t"><flake-report/></testcase>
  </testsuite>
</testsuites>
"#;
        write_report(dir.path(), 1, "report.xml", xml);

        let error = parse_artifact_directory(dir.path()).unwrap_err();

        assert!(error.is_unexpected_tag(), "got: {error}");
        assert!(error.to_string().contains("flake-report"));
    }

    #[test]
    fn missing_suite_attribute_is_a_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        let xml = r#"<testsuites><testsuite name="s" failures="0"/></testsuites>"#;
        write_report(dir.path(), 1, "report.xml", xml);

        let error = parse_artifact_directory(dir.path()).unwrap_err();

        assert!(error.is_schema(), "got: {error}");
        assert!(error.to_string().contains("tests"));
    }

    #[test]
    fn malformed_xml_is_an_xml_error() {
        let dir = tempfile::tempdir().unwrap();
        write_report(dir.path(), 1, "report.xml", "<testsuites><testsuite>");

        let error = parse_artifact_directory(dir.path()).unwrap_err();

        assert!(matches!(error, ParseError::Xml { .. }), "got: {error}");
        // The innermost unclosed element is named in the message
        assert!(error.to_string().contains("testsuite"), "got: {error}");
    }

    #[test]
    fn non_numeric_job_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("latest")).unwrap();

        let error = parse_artifact_directory(dir.path()).unwrap_err();

        assert!(matches!(error, ParseError::JobDirectory { .. }));
    }

    #[test]
    fn job_directory_without_reports_is_kept_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("3")).unwrap();

        let results = parse_artifact_directory(dir.path()).unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].job, 3);
        assert!(results[0].reports.is_empty());
    }
}
