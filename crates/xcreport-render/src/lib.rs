//! Markdown rendering for xcreport.
//!
//! Turns a normalized [`TestReport`] and optional [`CoverageReport`] into
//! markdown sections:
//! - `# Test Results Summary` with the counts the schema reported
//! - `# Test Details` with failures, the test environment and the test listing
//! - `# Code Coverage Summary` with the whole-bundle and per-target reports
//!
//! Rendering is pure. The same inputs always produce byte-identical output.
//!
//! # Example
//!
//! ```rust
//! use xcreport_render::{render_markdown, render_sections};
//! use xcreport_types::{RenderOptions, SchemaVersion, TestReport};
//!
//! let report = TestReport::new(SchemaVersion::Modern);
//! let sections = render_sections(&report, None, &RenderOptions::default());
//! let markdown = render_markdown(&sections);
//! assert!(markdown.starts_with("# Test Results Summary"));
//! ```

use xcreport_types::{
    CoverageReport, DeviceInfo, HEADER_COVERAGE, HEADER_DETAILS, HEADER_ENVIRONMENT,
    HEADER_FAILED_TESTS, HEADER_SUMMARY, HEADER_TARGET_COVERAGE, HEADER_TEST_CASES,
    RenderOptions, TargetCoverage, TargetDetail, TestEntry, TestFailure, TestListItem, TestReport,
};

/// Marker line appended under a failing case that points at a failure summary.
pub const FAILURE_MARKER: &str = "Test failed";

/// Indentation unit for one level of suite nesting.
const INDENT: &str = "  ";

/// The rendered markdown sections of one report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedSections {
    /// `# Test Results Summary` section.
    pub summary: String,
    /// `# Test Details` section.
    pub details: String,
    /// `# Code Coverage Summary` section; `None` when coverage is hidden or absent.
    pub coverage: Option<String>,
}

/// Returns the glyph for a test status.
///
/// # Examples
///
/// ```rust
/// use xcreport_render::status_glyph;
///
/// assert_eq!(status_glyph("Success"), "\u{2705}");
/// assert_eq!(status_glyph("Failure"), "\u{274C}");
/// ```
pub fn status_glyph(status_text: &str) -> &'static str {
    if status_text == xcreport_types::STATUS_SUCCESS {
        "\u{2705}"
    } else {
        "\u{274C}"
    }
}

/// Formats seconds with millisecond precision.
pub fn format_seconds(seconds: f64) -> String {
    format!("{:.3}s", seconds)
}

/// Wraps `text` in a fenced code block.
///
/// The fence is one backtick longer than the longest backtick run in `text`,
/// and never shorter than three. Only the final line break is dropped; all
/// other whitespace is kept.
pub fn fenced(text: &str) -> String {
    let mut longest = 0usize;
    let mut run = 0usize;
    for ch in text.chars() {
        if ch == '`' {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    let fence = "`".repeat((longest + 1).max(3));
    let body = text
        .strip_suffix('\n')
        .map(|rest| rest.strip_suffix('\r').unwrap_or(rest))
        .unwrap_or(text);
    format!("{fence}\n{body}\n{fence}\n")
}

// ============================================================================
// Summary Section
// ============================================================================

/// Renders `# Test Results Summary`.
///
/// Fields appear in a fixed order. Fields the schema did not report are
/// omitted rather than shown as zero.
pub fn render_summary(report: &TestReport) -> String {
    let mut output = String::new();
    output.push_str(HEADER_SUMMARY);
    output.push_str("\n\n");

    let mut fields: Vec<(&str, String)> = Vec::new();
    if let Some(result) = &report.result {
        fields.push(("Result", result.clone()));
    }
    let counts = [
        ("Total Tests", report.total_count),
        ("Passed", report.passed_count),
        ("Failed", report.failed_count),
        ("Unexpected Failures", report.unexpected_failure_count),
        ("Skipped", report.skipped_count),
        ("Expected Failures", report.expected_failure_count),
    ];
    for (label, value) in counts {
        if let Some(value) = value {
            fields.push((label, value.to_string()));
        }
    }
    if let Some(duration) = report.duration_seconds {
        fields.push(("Duration", format_seconds(duration)));
    }

    if fields.is_empty() {
        output.push_str("No summary fields were reported.\n");
    }
    for (label, value) in fields {
        output.push_str(&format!("- **{}**: {}\n", label, value));
    }

    output
}

// ============================================================================
// Details Section
// ============================================================================

/// Renders `# Test Details`.
///
/// Failures come first and are always shown. The environment block follows
/// when a device was reported, then the flattened test listing filtered by
/// `options.show_passed_tests`.
pub fn render_details(report: &TestReport, options: &RenderOptions) -> String {
    let mut output = String::new();
    output.push_str(HEADER_DETAILS);
    output.push_str("\n\n");

    output.push_str(&render_failures(&report.failures));

    if let Some(device) = &report.device {
        output.push('\n');
        output.push_str(&render_environment(device));
    }

    let listing = render_test_listing(&report.tests, options.show_passed_tests);
    if !listing.is_empty() {
        output.push('\n');
        output.push_str(HEADER_TEST_CASES);
        output.push_str("\n\n");
        output.push_str(&listing);
    }

    output
}

fn render_failures(failures: &[TestFailure]) -> String {
    let mut output = String::new();
    output.push_str(HEADER_FAILED_TESTS);
    output.push_str("\n\n");

    if failures.is_empty() {
        output.push_str("No test failures.\n");
        return output;
    }

    for (index, failure) in failures.iter().enumerate() {
        if index > 0 {
            output.push('\n');
        }
        output.push_str(&format!(
            "### \u{274C} {} ({})\n\n",
            failure.test_name,
            failure.target_name
        ));
        output.push_str(&fenced(&failure.failure_text));
    }

    output
}

fn render_environment(device: &DeviceInfo) -> String {
    let mut output = String::new();
    output.push_str(HEADER_ENVIRONMENT);
    output.push_str("\n\n");
    output.push_str(&format!("- **Device**: {}\n", device.device_name));
    output.push_str(&format!("- **Model**: {}\n", device.model_name));
    output.push_str(&format!("- **OS Version**: {}\n", device.os_version));
    output.push_str(&format!("- **Architecture**: {}\n", device.architecture));
    if let Some(platform) = &device.platform {
        output.push_str(&format!("- **Platform**: {}\n", platform));
    }
    output
}

/// Decide which listing lines are shown.
///
/// With passing tests shown, everything is visible. Otherwise failing cases
/// are visible, and so is every suite that has a failing case beneath it.
fn visible_lines(items: &[TestListItem], show_passed_tests: bool) -> Vec<bool> {
    if show_passed_tests {
        return vec![true; items.len()];
    }

    let mut visible = vec![false; items.len()];
    let mut open_suites: Vec<usize> = Vec::new();

    for (index, item) in items.iter().enumerate() {
        let depth = item.indent_depth();
        while let Some(&top) = open_suites.last() {
            if items[top].indent_depth() >= depth {
                open_suites.pop();
            } else {
                break;
            }
        }

        match item {
            TestListItem::Suite(_) => open_suites.push(index),
            TestListItem::Case(entry) => {
                if !entry.is_success() {
                    visible[index] = true;
                    for &suite in open_suites.iter().rev() {
                        if visible[suite] {
                            break;
                        }
                        visible[suite] = true;
                    }
                }
            }
        }
    }

    visible
}

fn render_entry(entry: &TestEntry) -> String {
    let indent = INDENT.repeat(entry.indent_depth);
    let duration = entry
        .duration_seconds
        .map(format_seconds)
        .unwrap_or_else(|| "?".to_string());
    let mut line = format!(
        "{}- {} {} ({})\n",
        indent,
        status_glyph(&entry.status_text),
        entry.name,
        duration
    );
    if entry.has_failure_ref {
        line.push_str(&format!("{}{}- {}\n", indent, INDENT, FAILURE_MARKER));
    }
    line
}

/// Renders the flattened listing as a nested markdown list.
///
/// Returns an empty string when no line is visible.
pub fn render_test_listing(items: &[TestListItem], show_passed_tests: bool) -> String {
    let visible = visible_lines(items, show_passed_tests);
    let mut output = String::new();

    for (item, shown) in items.iter().zip(visible) {
        if !shown {
            continue;
        }
        match item {
            TestListItem::Suite(suite) => {
                output.push_str(&format!(
                    "{}- {}\n",
                    INDENT.repeat(suite.indent_depth),
                    suite.name
                ));
            }
            TestListItem::Case(entry) => output.push_str(&render_entry(entry)),
        }
    }

    output
}

// ============================================================================
// Coverage Section
// ============================================================================

/// Renders `# Code Coverage Summary`.
pub fn render_coverage(coverage: &CoverageReport) -> String {
    let mut output = String::new();
    output.push_str(HEADER_COVERAGE);
    output.push_str("\n\n");
    output.push_str(&fenced(&coverage.combined));

    if !coverage.targets.is_empty() {
        output.push('\n');
        output.push_str(HEADER_TARGET_COVERAGE);
        output.push('\n');
        for target in &coverage.targets {
            output.push('\n');
            output.push_str(&render_target(target));
        }
    }

    output
}

fn render_target(target: &TargetCoverage) -> String {
    let mut output = format!("### {}\n\n", target.target_name);
    match &target.detail {
        TargetDetail::Report(text) => output.push_str(&fenced(text)),
        TargetDetail::Error(message) => {
            output.push_str("Failed to load coverage for this target:\n\n");
            output.push_str(&fenced(message));
        }
        TargetDetail::Unsupported => output.push_str(&fenced(&target.summary_line)),
    }
    output
}

// ============================================================================
// Assembly
// ============================================================================

/// Renders all sections of a report.
pub fn render_sections(
    report: &TestReport,
    coverage: Option<&CoverageReport>,
    options: &RenderOptions,
) -> RenderedSections {
    let coverage = if options.show_code_coverage {
        coverage.map(render_coverage)
    } else {
        None
    };

    RenderedSections {
        summary: render_summary(report),
        details: render_details(report, options),
        coverage,
    }
}

/// Renders a section-scoped error block, e.g. `# Error Processing Test Results`.
pub fn render_error_section(title: &str, message: &str) -> String {
    format!("# {}\n\n{}", title, fenced(message))
}

/// Joins rendered sections into one document, separated by blank lines.
pub fn render_markdown(sections: &RenderedSections) -> String {
    let mut parts: Vec<&str> = vec![sections.summary.as_str(), sections.details.as_str()];
    if let Some(coverage) = &sections.coverage {
        parts.push(coverage.as_str());
    }
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use xcreport_types::{SchemaVersion, SuiteHeading, TargetCoverage};

    fn suite(name: &str, depth: usize) -> TestListItem {
        TestListItem::Suite(SuiteHeading {
            name: name.to_string(),
            indent_depth: depth,
        })
    }

    fn case(name: &str, status: &str, duration: Option<f64>, depth: usize) -> TestListItem {
        TestListItem::Case(TestEntry {
            name: name.to_string(),
            status_text: status.to_string(),
            duration_seconds: duration,
            indent_depth: depth,
            has_failure_ref: status != "Success",
        })
    }

    fn legacy_report() -> TestReport {
        TestReport {
            schema: SchemaVersion::Legacy,
            total_count: Some(3),
            failed_count: Some(1),
            unexpected_failure_count: Some(0),
            duration_seconds: Some(1.5),
            result: Some("failed".to_string()),
            tests: vec![
                suite("AppTests.xctest", 0),
                suite("LoginTests", 1),
                case("testLogin()", "Success", Some(0.012), 2),
                case("testLogout()", "Failure", Some(0.34), 2),
                suite("EmptyTests", 1),
                suite("ProfileTests", 1),
                case("testAvatar()", "Success", None, 2),
            ],
            ..TestReport::new(SchemaVersion::Legacy)
        }
    }

    fn modern_report() -> TestReport {
        TestReport {
            schema: SchemaVersion::Modern,
            total_count: Some(10),
            passed_count: Some(8),
            failed_count: Some(1),
            skipped_count: Some(1),
            expected_failure_count: Some(0),
            result: Some("Failed".to_string()),
            failures: vec![TestFailure {
                test_name: "testCheckout()".to_string(),
                target_name: "ShopTests".to_string(),
                failure_text: "XCTAssertEqual failed: (\"1\") is not equal to (\"2\")".to_string(),
            }],
            device: Some(DeviceInfo {
                device_name: "iPhone 15".to_string(),
                model_name: "iPhone15,4".to_string(),
                os_version: "17.5".to_string(),
                architecture: "arm64".to_string(),
                platform: Some("iOS Simulator".to_string()),
            }),
            ..TestReport::new(SchemaVersion::Modern)
        }
    }

    fn coverage_report() -> CoverageReport {
        CoverageReport {
            combined: "MyApp.app    72.50% (290/400)\n".to_string(),
            targets: vec![
                TargetCoverage {
                    target_name: "MyApp.app".to_string(),
                    summary_line: "1 MyApp.app 12 72.50% (290/400)".to_string(),
                    detail: TargetDetail::Report("AppDelegate.swift 80.00%".to_string()),
                },
                TargetCoverage {
                    target_name: "Kit.framework".to_string(),
                    summary_line: "2 Kit.framework 3 10.00% (1/10)".to_string(),
                    detail: TargetDetail::Error("xccov exited with status 1".to_string()),
                },
            ],
        }
    }

    #[test]
    fn test_status_glyph() {
        assert_eq!(status_glyph("Success"), "\u{2705}");
        assert_eq!(status_glyph("success"), "\u{274C}");
        assert_eq!(status_glyph("Skipped"), "\u{274C}");
        assert_eq!(status_glyph(""), "\u{274C}");
    }

    #[test]
    fn test_fenced_plain() {
        assert_eq!(fenced("hello\n"), "```\nhello\n```\n");
        assert_eq!(fenced("hello"), "```\nhello\n```\n");
    }

    #[test]
    fn test_fenced_keeps_inner_and_trailing_whitespace() {
        assert_eq!(fenced("  indented  \n\n"), "```\n  indented  \n\n```\n");
        assert_eq!(fenced("a\r\n"), "```\na\n```\n");
        assert_eq!(fenced("a\n\n\tb\n"), "```\na\n\n\tb\n```\n");
    }

    #[test]
    fn test_fenced_grows_past_backticks() {
        assert_eq!(fenced("a ```b``` c"), "````\na ```b``` c\n````\n");
        assert_eq!(fenced("`x`"), "```\n`x`\n```\n");
    }

    #[test]
    fn test_summary_omits_unreported_fields() {
        let md = render_summary(&legacy_report());
        assert_eq!(
            md,
            "# Test Results Summary\n\n\
             - **Result**: failed\n\
             - **Total Tests**: 3\n\
             - **Failed**: 1\n\
             - **Unexpected Failures**: 0\n\
             - **Duration**: 1.500s\n"
        );
        assert!(!md.contains("Passed"));
        assert!(!md.contains("Skipped"));
    }

    #[test]
    fn test_summary_numbers_match_source() {
        let mut report = modern_report();
        report.total_count = Some(7);
        report.passed_count = Some(99);
        let md = render_summary(&report);
        assert!(md.contains("- **Total Tests**: 7\n"));
        assert!(md.contains("- **Passed**: 99\n"));
    }

    #[test]
    fn test_summary_empty_report() {
        let md = render_summary(&TestReport::default());
        assert_eq!(
            md,
            "# Test Results Summary\n\nNo summary fields were reported.\n"
        );
    }

    #[test]
    fn test_details_modern_has_no_listing() {
        let md = render_details(&modern_report(), &RenderOptions::default());
        assert!(md.contains("## Failed Tests"));
        assert!(md.contains("## Test Environment"));
        assert!(!md.contains("## Test Cases"));
    }

    #[test]
    fn test_details_without_failures() {
        let md = render_details(&legacy_report(), &RenderOptions::default());
        assert!(md.starts_with("# Test Details\n\n## Failed Tests\n\nNo test failures.\n"));
        assert!(!md.contains("## Test Environment"));
    }

    #[test]
    fn test_listing_shows_everything() {
        let listing = render_test_listing(&legacy_report().tests, true);
        assert_eq!(
            listing,
            "- AppTests.xctest\n\
             \x20 - LoginTests\n\
             \x20   - \u{2705} testLogin() (0.012s)\n\
             \x20   - \u{274C} testLogout() (0.340s)\n\
             \x20     - Test failed\n\
             \x20 - EmptyTests\n\
             \x20 - ProfileTests\n\
             \x20   - \u{2705} testAvatar() (?)\n"
        );
    }

    #[test]
    fn test_listing_hides_passing_but_keeps_failing() {
        let listing = render_test_listing(&legacy_report().tests, false);
        assert_eq!(
            listing,
            "- AppTests.xctest\n\
             \x20 - LoginTests\n\
             \x20   - \u{274C} testLogout() (0.340s)\n\
             \x20     - Test failed\n"
        );
        assert!(!listing.contains("testLogin()"));
        assert!(!listing.contains("ProfileTests"));
        assert!(!listing.contains("EmptyTests"));
    }

    #[test]
    fn test_listing_all_passing_hidden_is_empty() {
        let items = vec![suite("S", 0), case("a", "Success", Some(0.1), 1)];
        assert_eq!(render_test_listing(&items, false), "");
        let report = TestReport {
            tests: items,
            ..TestReport::default()
        };
        let options = RenderOptions {
            show_passed_tests: false,
            show_code_coverage: true,
        };
        assert!(!render_details(&report, &options).contains("## Test Cases"));
    }

    #[test]
    fn test_listing_sibling_suites_do_not_inherit_failures() {
        let items = vec![
            suite("A", 0),
            case("ok", "Success", None, 1),
            suite("B", 0),
            suite("B1", 1),
            case("bad", "Failure", None, 2),
            suite("C", 0),
        ];
        let listing = render_test_listing(&items, false);
        assert_eq!(
            listing,
            "- B\n  - B1\n    - \u{274C} bad (?)\n      - Test failed\n"
        );
    }

    #[test]
    fn test_failure_marker_requires_ref() {
        let mut entry = TestEntry {
            name: "t".to_string(),
            status_text: "Failure".to_string(),
            duration_seconds: Some(0.0),
            indent_depth: 0,
            has_failure_ref: false,
        };
        assert_eq!(render_entry(&entry), "- \u{274C} t (0.000s)\n");
        entry.has_failure_ref = true;
        assert_eq!(render_entry(&entry), "- \u{274C} t (0.000s)\n  - Test failed\n");
    }

    #[test]
    fn test_coverage_unsupported_uses_summary_line() {
        let coverage = CoverageReport {
            combined: "all".to_string(),
            targets: vec![TargetCoverage {
                target_name: "MyApp.app".to_string(),
                summary_line: "1 MyApp.app 12 72.50%".to_string(),
                detail: TargetDetail::Unsupported,
            }],
        };
        let md = render_coverage(&coverage);
        assert!(md.contains("### MyApp.app\n\n```\n1 MyApp.app 12 72.50%\n```\n"));
    }

    #[test]
    fn test_coverage_without_targets() {
        let coverage = CoverageReport {
            combined: "all".to_string(),
            targets: vec![],
        };
        assert_eq!(
            render_coverage(&coverage),
            "# Code Coverage Summary\n\n```\nall\n```\n"
        );
    }

    #[test]
    fn test_sections_respect_coverage_flag() {
        let coverage = coverage_report();
        let hidden = RenderOptions {
            show_passed_tests: true,
            show_code_coverage: false,
        };
        let sections = render_sections(&legacy_report(), Some(&coverage), &hidden);
        assert!(sections.coverage.is_none());

        let sections = render_sections(&legacy_report(), None, &RenderOptions::default());
        assert!(sections.coverage.is_none());

        let sections =
            render_sections(&legacy_report(), Some(&coverage), &RenderOptions::default());
        assert!(sections.coverage.is_some());
    }

    #[test]
    fn test_render_does_not_mutate_and_is_idempotent() {
        let report = legacy_report();
        let coverage = coverage_report();
        let before = report.clone();
        let first = render_markdown(&render_sections(
            &report,
            Some(&coverage),
            &RenderOptions::default(),
        ));
        let second = render_markdown(&render_sections(
            &report,
            Some(&coverage),
            &RenderOptions::default(),
        ));
        assert_eq!(first, second);
        assert_eq!(report, before);
    }

    #[test]
    fn test_error_section() {
        assert_eq!(
            render_error_section("Error Processing Test Results", "missing root id"),
            "# Error Processing Test Results\n\n```\nmissing root id\n```\n"
        );
    }

    // ========================================================================
    // Insta Snapshot Tests
    // ========================================================================

    #[test]
    fn test_snapshot_legacy_report() {
        let md = render_markdown(&render_sections(
            &legacy_report(),
            None,
            &RenderOptions::default(),
        ));
        insta::assert_snapshot!("legacy_report", md);
    }

    #[test]
    fn test_snapshot_modern_report_with_coverage() {
        let md = render_markdown(&render_sections(
            &modern_report(),
            Some(&coverage_report()),
            &RenderOptions::default(),
        ));
        insta::assert_snapshot!("modern_report_with_coverage", md);
    }
}
