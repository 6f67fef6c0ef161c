//! Test-result parsing adapters for xcreport.
//!
//! This crate turns the two incompatible result shapes produced by the Xcode
//! toolchain into the unified [`TestReport`]:
//!
//! - the modern flat `test-results summary` document (Xcode 16 and newer)
//! - the legacy object graph addressed by content-hash ids, whose nested
//!   suite/subtest tree is flattened into an indented listing
//!
//! It also classifies the toolchain version into a [`SchemaVersion`].

use std::path::Path;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use xcreport_ports::{ResultTool, ToolError};
use xcreport_types::{
    DeviceInfo, STATUS_SUCCESS, STATUS_UNKNOWN, SchemaVersion, SuiteHeading, TestEntry,
    TestFailure, TestListItem, TestReport,
};

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur while loading or parsing test results.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResultsError {
    /// The external tool failed.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// The document is not JSON or does not match the expected shape.
    #[error("invalid result JSON: {0}")]
    InvalidJson(String),

    /// The bundle info carries no `rootId` hash.
    #[error("no rootId hash found in bundle info")]
    MissingRootId,

    /// The root action record carries no `testsRef`.
    #[error("no testsRef found in the root action record")]
    MissingTestsRef,

    /// The tests document has an empty `summaries` list.
    #[error("tests document contains no summaries")]
    MissingSummary,
}

impl From<serde_json::Error> for ResultsError {
    fn from(e: serde_json::Error) -> Self {
        ResultsError::InvalidJson(e.to_string())
    }
}

// ============================================================================
// Version Detection
// ============================================================================

/// First Xcode major version that emits the modern result schema.
pub const MODERN_MAJOR_VERSION: u32 = 16;

static XCODE_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Xcode (\d+)\.(\d+)").expect("valid Xcode version pattern"));

/// Extract `(major, minor)` from toolchain version output.
///
/// # Examples
///
/// ```
/// use xcreport_adapters_results::parse_xcode_version;
///
/// assert_eq!(parse_xcode_version("Xcode 16.2\nBuild version 16C5032a"), Some((16, 2)));
/// assert_eq!(parse_xcode_version("Xcode sixteen"), None);
/// ```
pub fn parse_xcode_version(text: &str) -> Option<(u32, u32)> {
    let caps = XCODE_VERSION_RE.captures(text)?;
    let major = caps.get(1)?.as_str().parse().ok()?;
    let minor = caps.get(2)?.as_str().parse().ok()?;
    Some((major, minor))
}

/// Classify a version string into a schema version.
///
/// Anything that is not a recognizable Xcode 16+ version falls back to
/// [`SchemaVersion::Legacy`].
///
/// # Examples
///
/// ```
/// use xcreport_adapters_results::detect_schema;
/// use xcreport_types::SchemaVersion;
///
/// assert_eq!(detect_schema(Some("Xcode 16.3")), SchemaVersion::Modern);
/// assert_eq!(detect_schema(Some("Xcode 15.4")), SchemaVersion::Legacy);
/// assert_eq!(detect_schema(None), SchemaVersion::Legacy);
/// ```
pub fn detect_schema(version: Option<&str>) -> SchemaVersion {
    match version.and_then(parse_xcode_version) {
        Some((major, _)) if major >= MODERN_MAJOR_VERSION => SchemaVersion::Modern,
        _ => SchemaVersion::Legacy,
    }
}

/// Query the toolchain version through `tool` and classify it.
///
/// An invocation failure is logged and treated as [`SchemaVersion::Legacy`].
pub fn detect_schema_with<T: ResultTool + ?Sized>(tool: &T) -> SchemaVersion {
    match tool.version() {
        Ok(text) => {
            let schema = detect_schema(Some(text.as_str()));
            tracing::debug!(version = text.trim(), %schema, "detected toolchain schema");
            schema
        }
        Err(e) => {
            tracing::warn!(error = %e, "version query failed, assuming legacy schema");
            SchemaVersion::Legacy
        }
    }
}

// ============================================================================
// Modern Schema
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModernSummary {
    total_test_count: Option<u64>,
    passed_tests: Option<u64>,
    failed_tests: Option<u64>,
    skipped_tests: Option<u64>,
    expected_failures: Option<u64>,
    result: Option<String>,
    test_failures: Option<ModernFailures>,
    devices_and_configurations: Option<ModernConfigurations>,
}

/// `testFailures` is a keyed map in some toolchain releases and a list in others.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ModernFailures {
    Map(IndexMap<String, ModernFailure>),
    List(Vec<ModernFailure>),
}

impl ModernFailures {
    fn into_failures(self) -> Vec<TestFailure> {
        let values: Vec<ModernFailure> = match self {
            ModernFailures::Map(map) => map.into_values().collect(),
            ModernFailures::List(list) => list,
        };
        values
            .into_iter()
            .map(|f| TestFailure {
                test_name: f.test_name,
                target_name: f.target_name,
                failure_text: f.failure_text,
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModernFailure {
    #[serde(default)]
    test_name: String,
    #[serde(default)]
    target_name: String,
    #[serde(default)]
    failure_text: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ModernConfigurations {
    Many(Vec<ModernConfiguration>),
    One(ModernConfiguration),
}

impl ModernConfigurations {
    fn into_device(self) -> Option<DeviceInfo> {
        let configuration = match self {
            ModernConfigurations::One(one) => Some(one),
            ModernConfigurations::Many(many) => many.into_iter().next(),
        };
        configuration
            .and_then(|c| c.device)
            .map(|d| DeviceInfo {
                device_name: d.device_name,
                model_name: d.model_name,
                os_version: d.os_version,
                architecture: d.architecture,
                platform: d.platform,
            })
    }
}

#[derive(Debug, Deserialize)]
struct ModernConfiguration {
    device: Option<ModernDevice>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModernDevice {
    #[serde(default)]
    device_name: String,
    #[serde(default)]
    model_name: String,
    #[serde(default)]
    os_version: String,
    #[serde(default)]
    architecture: String,
    platform: Option<String>,
}

/// Parse a modern `test-results summary` JSON document.
///
/// Counts are copied verbatim, failures keep their source order, and the
/// listing stays empty because this schema enumerates no individual tests.
///
/// # Examples
///
/// ```
/// use xcreport_adapters_results::parse_modern_summary;
///
/// let json = r#"{"totalTestCount": 3, "passedTests": 2, "failedTests": 1, "result": "Failed"}"#;
/// let report = parse_modern_summary(json).unwrap();
/// assert_eq!(report.total_count, Some(3));
/// assert_eq!(report.result.as_deref(), Some("Failed"));
/// assert!(report.tests.is_empty());
/// ```
pub fn parse_modern_summary(json: &str) -> Result<TestReport, ResultsError> {
    let summary: ModernSummary = serde_json::from_str(json)?;

    let mut report = TestReport::new(SchemaVersion::Modern);
    report.total_count = summary.total_test_count;
    report.passed_count = summary.passed_tests;
    report.failed_count = summary.failed_tests;
    report.skipped_count = summary.skipped_tests;
    report.expected_failure_count = summary.expected_failures;
    report.result = summary.result;
    report.failures = summary
        .test_failures
        .map(ModernFailures::into_failures)
        .unwrap_or_default();
    report.device = summary
        .devices_and_configurations
        .and_then(ModernConfigurations::into_device);

    Ok(report)
}

// ============================================================================
// Legacy Wire Types
// ============================================================================

/// A legacy `{"_value": ...}` wrapper.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LegacyValue<T> {
    #[serde(rename = "_value")]
    pub value: T,
}

/// A legacy `{"_values": [...]}` wrapper.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LegacyValues<T> {
    #[serde(rename = "_values", default = "Vec::new")]
    pub values: Vec<T>,
}

/// A legacy scalar; numbers are usually encoded as strings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum LegacyScalar {
    Int(u64),
    Float(f64),
    Text(String),
}

impl LegacyScalar {
    /// Interpret the scalar as an unsigned count.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            LegacyScalar::Int(n) => Some(*n),
            LegacyScalar::Float(f) if *f >= 0.0 && f.fract() == 0.0 => Some(*f as u64),
            LegacyScalar::Float(_) => None,
            LegacyScalar::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Interpret the scalar as a floating-point number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            LegacyScalar::Int(n) => Some(*n as f64),
            LegacyScalar::Float(f) => Some(*f),
            LegacyScalar::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// A legacy reference to another object in the bundle.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LegacyReference {
    pub id: LegacyValue<String>,
}

/// A node of the legacy suite/subtest tree.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyTestNode {
    pub name: Option<LegacyValue<String>>,
    pub subtests: Option<LegacyValues<LegacyTestNode>>,
    pub test_status: Option<LegacyValue<String>>,
    pub duration: Option<LegacyValue<LegacyScalar>>,
    pub summary_ref: Option<LegacyReference>,
}

impl LegacyTestNode {
    fn display_name(&self) -> String {
        self.name
            .as_ref()
            .map(|n| n.value.clone())
            .unwrap_or_else(|| "(unnamed)".to_string())
    }
}

#[derive(Debug, Deserialize)]
struct LegacyRoot {
    actions: Option<LegacyValues<LegacyAction>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyAction {
    action_result: Option<LegacyActionResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyActionResult {
    status: Option<LegacyValue<String>>,
    tests_ref: Option<LegacyReference>,
    coverage: Option<LegacyCoverageInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyCoverageInfo {
    archive_ref: Option<LegacyReference>,
}

#[derive(Debug, Deserialize)]
struct LegacyTestsDocument {
    summaries: Option<LegacyValues<LegacySummary>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacySummary {
    totals: Option<LegacyTotals>,
    tests: Option<LegacyValues<LegacyTestNode>>,
    testable_summaries: Option<LegacyValues<LegacyTestableSummary>>,
}

#[derive(Debug, Deserialize)]
struct LegacyTestableSummary {
    tests: Option<LegacyValues<LegacyTestNode>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyTotals {
    tests_count: Option<LegacyValue<LegacyScalar>>,
    tests_failed_count: Option<LegacyValue<LegacyScalar>>,
    tests_unexpected_failure_count: Option<LegacyValue<LegacyScalar>>,
    duration: Option<LegacyValue<LegacyScalar>>,
}

// ============================================================================
// Legacy Schema
// ============================================================================

static ROOT_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""rootId"\s*=>\s*\{\s*"hash"\s*=>\s*"([^"]+)""#).expect("valid rootId pattern")
});

/// Ids referenced by the root action record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LegacyRootRefs {
    /// Id of the tests document.
    pub tests_ref: Option<String>,
    /// Id of the exported coverage archive.
    pub archive_ref: Option<String>,
    /// Action status, e.g. "succeeded" or "failed".
    pub status: Option<String>,
}

/// Extract the root object id from a plist dump of the bundle info.
///
/// # Examples
///
/// ```
/// use xcreport_adapters_results::parse_root_id;
///
/// let plist = r#"{
///   "rootId" => {
///     "hash" => "0~abc123"
///   }
/// }"#;
/// assert_eq!(parse_root_id(plist).unwrap(), "0~abc123");
/// assert!(parse_root_id("{}").is_err());
/// ```
pub fn parse_root_id(plist: &str) -> Result<String, ResultsError> {
    ROOT_ID_RE
        .captures(plist)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or(ResultsError::MissingRootId)
}

/// Parse the root action record and collect the ids it references.
///
/// The first action carrying each reference wins.
pub fn parse_root_object(json: &str) -> Result<LegacyRootRefs, ResultsError> {
    let root: LegacyRoot = serde_json::from_str(json)?;
    let mut refs = LegacyRootRefs::default();

    let actions = root.actions.map(|a| a.values).unwrap_or_default();
    for result in actions.into_iter().filter_map(|a| a.action_result) {
        if refs.status.is_none() {
            refs.status = result.status.map(|s| s.value);
        }
        if refs.tests_ref.is_none() {
            refs.tests_ref = result.tests_ref.map(|r| r.id.value);
        }
        if refs.archive_ref.is_none() {
            refs.archive_ref = result
                .coverage
                .and_then(|c| c.archive_ref)
                .map(|r| r.id.value);
        }
    }

    Ok(refs)
}

/// Parse the legacy tests document into a report.
///
/// Only the totals this schema reports (total, failed, unexpected failures,
/// duration) are populated; `status` becomes the free-text result.
pub fn parse_legacy_tests(json: &str, status: Option<String>) -> Result<TestReport, ResultsError> {
    let document: LegacyTestsDocument = from_nested_json(json)?;
    let summary = document
        .summaries
        .and_then(|s| s.values.into_iter().next())
        .ok_or(ResultsError::MissingSummary)?;

    let mut report = TestReport::new(SchemaVersion::Legacy);
    report.result = status;

    if let Some(totals) = &summary.totals {
        report.total_count = scalar_u64(&totals.tests_count);
        report.failed_count = scalar_u64(&totals.tests_failed_count);
        report.unexpected_failure_count = scalar_u64(&totals.tests_unexpected_failure_count);
        report.duration_seconds = totals.duration.as_ref().and_then(|d| d.value.as_f64());
    }

    let mut forest: Vec<LegacyTestNode> = summary.tests.map(|t| t.values).unwrap_or_default();
    for testable in summary
        .testable_summaries
        .map(|t| t.values)
        .unwrap_or_default()
    {
        forest.extend(testable.tests.map(|t| t.values).unwrap_or_default());
    }
    report.tests = flatten_tests(&forest);

    Ok(report)
}

/// Deserialize a document with no nesting limit.
///
/// Every suite level adds three levels of JSON nesting. The stack grows on
/// demand while deserializing.
fn from_nested_json<T: DeserializeOwned>(json: &str) -> Result<T, ResultsError> {
    let mut deserializer = serde_json::Deserializer::from_str(json);
    deserializer.disable_recursion_limit();
    let value = T::deserialize(serde_stacker::Deserializer::new(&mut deserializer))?;
    deserializer.end()?;
    Ok(value)
}

fn scalar_u64(value: &Option<LegacyValue<LegacyScalar>>) -> Option<u64> {
    value.as_ref().and_then(|v| v.value.as_u64())
}

// ============================================================================
// Tree Flattening
// ============================================================================

/// Flatten a legacy suite/subtest forest into an indented listing.
///
/// Depth-first pre-order in source order. A node with `subtests` (even an
/// empty list) is a suite heading whose children sit one level deeper; any
/// leaf fields it also carries are ignored. A node without `subtests` is a
/// test case.
pub fn flatten_tests(forest: &[LegacyTestNode]) -> Vec<TestListItem> {
    let mut items = Vec::new();
    let mut stack: Vec<(&LegacyTestNode, usize)> =
        forest.iter().rev().map(|node| (node, 0)).collect();

    while let Some((node, depth)) = stack.pop() {
        match &node.subtests {
            Some(subtests) => {
                items.push(TestListItem::Suite(SuiteHeading {
                    name: node.display_name(),
                    indent_depth: depth,
                }));
                stack.extend(subtests.values.iter().rev().map(|child| (child, depth + 1)));
            }
            None => items.push(TestListItem::Case(leaf_entry(node, depth))),
        }
    }

    items
}

fn leaf_entry(node: &LegacyTestNode, depth: usize) -> TestEntry {
    let status_text = node
        .test_status
        .as_ref()
        .map(|s| s.value.clone())
        .unwrap_or_else(|| STATUS_UNKNOWN.to_string());
    let has_failure_ref = status_text != STATUS_SUCCESS && node.summary_ref.is_some();

    TestEntry {
        name: node.display_name(),
        duration_seconds: node.duration.as_ref().and_then(|d| d.value.as_f64()),
        indent_depth: depth,
        has_failure_ref,
        status_text,
    }
}

// ============================================================================
// Loading Through the Tool Port
// ============================================================================

/// Resolve the legacy root id and the ids referenced by the root record.
///
/// Root-id resolution always precedes the id-addressed fetch.
pub fn load_root_refs<T: ResultTool + ?Sized>(
    tool: &T,
    bundle: &Path,
) -> Result<LegacyRootRefs, ResultsError> {
    let plist = tool.root_info(bundle)?;
    let root_id = parse_root_id(&plist)?;
    tracing::debug!(root_id = %root_id, "resolved legacy root id");
    let root_json = tool.object_json(bundle, &root_id)?;
    parse_root_object(&root_json)
}

/// Load a legacy report: root id, root record, then the tests document.
pub fn load_legacy_report<T: ResultTool + ?Sized>(
    tool: &T,
    bundle: &Path,
) -> Result<TestReport, ResultsError> {
    let refs = load_root_refs(tool, bundle)?;
    let tests_ref = refs.tests_ref.ok_or(ResultsError::MissingTestsRef)?;
    tracing::debug!(tests_ref = %tests_ref, "fetching legacy tests document");
    let tests_json = tool.object_json(bundle, &tests_ref)?;
    parse_legacy_tests(&tests_json, refs.status)
}

/// Load a modern report from the flat summary document.
pub fn load_modern_report<T: ResultTool + ?Sized>(
    tool: &T,
    bundle: &Path,
) -> Result<TestReport, ResultsError> {
    let json = tool.test_summary_json(bundle)?;
    parse_modern_summary(&json)
}

/// Load a report with the parser matching `schema`.
pub fn load_report<T: ResultTool + ?Sized>(
    tool: &T,
    bundle: &Path,
    schema: SchemaVersion,
) -> Result<TestReport, ResultsError> {
    match schema {
        SchemaVersion::Legacy => load_legacy_report(tool, bundle),
        SchemaVersion::Modern => load_modern_report(tool, bundle),
    }
}

// ============================================================================
// Tests
// ============================================================================
