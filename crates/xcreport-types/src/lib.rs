//! Core types and DTOs for xcreport.
//!
//! This crate defines the unified report model shared by both result parsers,
//! the coverage aggregator and the markdown renderer. Everything here is
//! created fresh per bundle and discarded after rendering.

use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Status text the toolchain uses for a passing test case.
pub const STATUS_SUCCESS: &str = "Success";

/// Status text used when a legacy test node carries no status.
pub const STATUS_UNKNOWN: &str = "unknown";

/// Header of the summary section.
pub const HEADER_SUMMARY: &str = "# Test Results Summary";

/// Header of the per-test detail section.
pub const HEADER_DETAILS: &str = "# Test Details";

/// Header of the coverage section.
pub const HEADER_COVERAGE: &str = "# Code Coverage Summary";

/// Sub-header listing failed tests.
pub const HEADER_FAILED_TESTS: &str = "## Failed Tests";

/// Sub-header describing the device/configuration.
pub const HEADER_ENVIRONMENT: &str = "## Test Environment";

/// Sub-header listing every flattened test case.
pub const HEADER_TEST_CASES: &str = "## Test Cases";

/// Sub-header for per-target coverage.
pub const HEADER_TARGET_COVERAGE: &str = "## Target Coverage Details";

// ============================================================================
// Enums
// ============================================================================

/// Which of the two incompatible result shapes the toolchain produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaVersion {
    /// Nested object graph addressed by content-hash ids (Xcode 15 and older).
    #[default]
    Legacy,
    /// Flat `test-results summary` document (Xcode 16 and newer).
    Modern,
}

impl SchemaVersion {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaVersion::Legacy => "legacy",
            SchemaVersion::Modern => "modern",
        }
    }
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Test Report
// ============================================================================

/// The unified test report produced by either result parser.
///
/// Counts are copied from the source as reported. A `None` count means the
/// active schema does not report that field; it is never guessed as zero and
/// the counts are never cross-checked against each other.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestReport {
    /// Schema the report was parsed from.
    pub schema: SchemaVersion,
    /// Total number of tests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
    /// Number of passed tests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passed_count: Option<u64>,
    /// Number of failed tests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_count: Option<u64>,
    /// Number of unexpected failures (legacy only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unexpected_failure_count: Option<u64>,
    /// Number of skipped tests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped_count: Option<u64>,
    /// Number of expected failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_failure_count: Option<u64>,
    /// Total duration in seconds (legacy only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    /// Free-text overall verdict, e.g. "Passed" or "Failed".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Failures in the order the source listed them.
    #[serde(default)]
    pub failures: Vec<TestFailure>,
    /// Device the tests ran on, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceInfo>,
    /// Flattened suite/test listing. Always empty for the modern schema.
    #[serde(default)]
    pub tests: Vec<TestListItem>,
}

impl TestReport {
    /// Create an empty report for `schema` with every field "not reported".
    pub fn new(schema: SchemaVersion) -> Self {
        Self {
            schema,
            ..Default::default()
        }
    }

    /// Iterate over the leaf test entries of the listing.
    pub fn entries(&self) -> impl Iterator<Item = &TestEntry> {
        self.tests.iter().filter_map(|item| match item {
            TestListItem::Case(entry) => Some(entry),
            TestListItem::Suite(_) => None,
        })
    }
}

/// A single failed test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFailure {
    /// Test identifier, e.g. `testLogin()`.
    pub test_name: String,
    /// Build target that owns the test.
    pub target_name: String,
    /// Failure message as reported.
    pub failure_text: String,
}

/// Device/configuration the tests ran on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device name, e.g. "iPhone 16 Pro".
    pub device_name: String,
    /// Hardware model name.
    pub model_name: String,
    /// OS version string.
    pub os_version: String,
    /// CPU architecture, e.g. "arm64".
    pub architecture: String,
    /// Platform, e.g. "iOS Simulator".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

/// One line of the flattened test listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TestListItem {
    /// A suite heading; its children follow at `indent_depth + 1`.
    Suite(SuiteHeading),
    /// A leaf test case.
    Case(TestEntry),
}

impl TestListItem {
    /// Indentation depth of this line.
    pub fn indent_depth(&self) -> usize {
        match self {
            TestListItem::Suite(suite) => suite.indent_depth,
            TestListItem::Case(entry) => entry.indent_depth,
        }
    }
}

/// A suite heading in the flattened listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteHeading {
    pub name: String,
    pub indent_depth: usize,
}

/// A leaf test outcome in the flattened listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestEntry {
    /// Test case name.
    pub name: String,
    /// Raw status string; anything other than [`STATUS_SUCCESS`] is failing.
    pub status_text: String,
    /// Duration in seconds, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    /// Nesting depth of the case within its suites.
    pub indent_depth: usize,
    /// Whether the case failed and points at a failure summary.
    pub has_failure_ref: bool,
}

impl TestEntry {
    /// Returns `true` when the status text is exactly [`STATUS_SUCCESS`].
    pub fn is_success(&self) -> bool {
        self.status_text == STATUS_SUCCESS
    }
}

// ============================================================================
// Coverage Report
// ============================================================================

/// Aggregated coverage text for one bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageReport {
    /// The whole-bundle report, verbatim.
    pub combined: String,
    /// One entry per target line that matched the target pattern.
    #[serde(default)]
    pub targets: Vec<TargetCoverage>,
}

/// Coverage for one build target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetCoverage {
    /// Target name, e.g. `MyApp.app`.
    pub target_name: String,
    /// The raw target summary line the name was parsed from.
    pub summary_line: String,
    /// Per-target detail, if it could be fetched.
    pub detail: TargetDetail,
}

/// Outcome of fetching a per-target coverage report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "text", rename_all = "lowercase")]
pub enum TargetDetail {
    /// The dedicated per-target report.
    Report(String),
    /// Fetching this target failed; the message is shown inline.
    Error(String),
    /// Per-target filtering is not supported by the toolchain.
    Unsupported,
}

// ============================================================================
// Render Options
// ============================================================================

/// Read-only rendering configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderOptions {
    /// Show passing test cases in the listing.
    pub show_passed_tests: bool,
    /// Render the coverage section.
    pub show_code_coverage: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            show_passed_tests: true,
            show_code_coverage: true,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
