//! Application orchestration for xcreport.
//!
//! This crate provides the high-level `run` function that drives the whole
//! report pipeline for one result bundle:
//!
//! 1. Detect the toolchain and pick the result schema
//! 2. Load and normalize the test results
//! 3. Collect coverage, independently of step 2
//! 4. Render markdown, replacing a failed stage with an error section
//!
//! # Example
//!
//! ```rust,ignore
//! use xcreport_app::{BuildRequest, run};
//!
//! let request = BuildRequest::new("Build/Test.xcresult");
//! let output = run(&request, xcreport_adapters_xcrun::DEFAULT_MAX_OUTPUT_BYTES);
//! println!("{}", output.markdown);
//! ```

use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use xcreport_adapters_coverage::{CoverageError, collect_for_schema};
use xcreport_adapters_results::{ResultsError, detect_schema, detect_schema_with, load_report};
use xcreport_adapters_xcrun::{ProcessRunner, XcrunTool, query_version};
use xcreport_ports::{CommandRunner, ResultTool};
use xcreport_render::{render_coverage, render_error_section, render_markdown, render_sections};
use xcreport_types::{CoverageReport, RenderOptions, SchemaVersion, TestReport};

/// Title of the section that replaces the results when they fail to load.
pub const RESULTS_ERROR_TITLE: &str = "Error Processing Test Results";

/// Title of the section that replaces coverage when it fails to load.
pub const COVERAGE_ERROR_TITLE: &str = "Error Processing Code Coverage";

// ============================================================================
// Request and Output Types
// ============================================================================

/// Request to build a report for one bundle.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Path to the `.xcresult` bundle.
    pub bundle: PathBuf,
    /// Rendering flags.
    pub options: RenderOptions,
    /// Forced schema; `None` detects it from the toolchain version.
    pub schema: Option<SchemaVersion>,
    /// Optional document title.
    pub title: Option<String>,
}

impl BuildRequest {
    /// A request with default options and schema detection.
    pub fn new(bundle: impl Into<PathBuf>) -> Self {
        Self {
            bundle: bundle.into(),
            options: RenderOptions::default(),
            schema: None,
            title: None,
        }
    }
}

/// Everything produced for one bundle.
#[derive(Debug)]
pub struct ReportOutput {
    /// The schema the results were read with.
    pub schema: SchemaVersion,
    /// Normalized test results, or why they could not be loaded.
    pub tests: Result<TestReport, AppError>,
    /// Coverage, or why it could not be collected; `None` when coverage is hidden.
    pub coverage: Option<Result<CoverageReport, AppError>>,
    /// The rendered markdown document.
    pub markdown: String,
}

impl ReportOutput {
    /// Whether the loaded results contain any failing test.
    ///
    /// Returns `false` when the results could not be loaded.
    pub fn has_test_failures(&self) -> bool {
        match &self.tests {
            Ok(report) => {
                report.failed_count.unwrap_or(0) > 0
                    || !report.failures.is_empty()
                    || report.entries().any(|entry| !entry.is_success())
            }
            Err(_) => false,
        }
    }

    /// The normalized model as pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let document = ReportDocument {
            schema: self.schema,
            tests: self.tests.as_ref().ok(),
            coverage: self.coverage.as_ref().and_then(|c| c.as_ref().ok()),
            tests_error: self.tests.as_ref().err().map(ToString::to_string),
            coverage_error: self
                .coverage
                .as_ref()
                .and_then(|c| c.as_ref().err())
                .map(ToString::to_string),
        };
        serde_json::to_string_pretty(&document)
    }
}

#[derive(Serialize)]
struct ReportDocument<'a> {
    schema: SchemaVersion,
    tests: Option<&'a TestReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    coverage: Option<&'a CoverageReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tests_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    coverage_error: Option<String>,
}

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur while building one section of the report.
#[derive(Debug, Error)]
pub enum AppError {
    /// Loading or parsing the test results failed.
    #[error("{0}")]
    Results(#[from] ResultsError),

    /// Collecting coverage failed.
    #[error("{0}")]
    Coverage(#[from] CoverageError),
}

// ============================================================================
// Pipeline
// ============================================================================

/// Detect the toolchain generation from `xcodebuild -version`.
///
/// A failing or unparsable version query falls back to legacy.
pub fn detect_toolchain<R: CommandRunner>(runner: &R) -> SchemaVersion {
    match query_version(runner) {
        Ok(version) => detect_schema(Some(version.as_str())),
        Err(e) => {
            tracing::warn!(error = %e, "xcode version query failed, assuming legacy toolchain");
            SchemaVersion::Legacy
        }
    }
}

/// Build a report by running the real `xcrun` toolchain.
///
/// Captured tool output is capped at `max_output_bytes` per invocation.
pub fn run(request: &BuildRequest, max_output_bytes: usize) -> ReportOutput {
    let runner = ProcessRunner::new(max_output_bytes);
    let toolchain = detect_toolchain(&runner);
    let tool = XcrunTool::new(runner, toolchain);

    let mut request = request.clone();
    if request.schema.is_none() {
        request.schema = Some(toolchain);
    }
    build_report(&tool, &request)
}

/// Build a report through an arbitrary [`ResultTool`].
///
/// Test results and coverage are loaded independently; a failure in one
/// becomes an error section and never prevents the other.
pub fn build_report<T: ResultTool + ?Sized>(tool: &T, request: &BuildRequest) -> ReportOutput {
    let schema = request
        .schema
        .unwrap_or_else(|| detect_schema_with(tool));
    tracing::info!(schema = %schema, bundle = %request.bundle.display(), "building report");

    let tests = load_tests(tool, &request.bundle, schema);
    let coverage = request
        .options
        .show_code_coverage
        .then(|| load_coverage(tool, &request.bundle, schema));

    let markdown = assemble_markdown(
        request.title.as_deref(),
        &tests,
        coverage.as_ref(),
        &request.options,
    );

    ReportOutput {
        schema,
        tests,
        coverage,
        markdown,
    }
}

fn load_tests<T: ResultTool + ?Sized>(
    tool: &T,
    bundle: &Path,
    schema: SchemaVersion,
) -> Result<TestReport, AppError> {
    load_report(tool, bundle, schema).map_err(|e| {
        tracing::warn!(error = %e, "test results could not be processed");
        AppError::from(e)
    })
}

fn load_coverage<T: ResultTool + ?Sized>(
    tool: &T,
    bundle: &Path,
    schema: SchemaVersion,
) -> Result<CoverageReport, AppError> {
    collect_for_schema(tool, bundle, schema).map_err(|e| {
        tracing::warn!(error = %e, "code coverage could not be processed");
        AppError::from(e)
    })
}

// ============================================================================
// Markdown Assembly
// ============================================================================

fn assemble_markdown(
    title: Option<&str>,
    tests: &Result<TestReport, AppError>,
    coverage: Option<&Result<CoverageReport, AppError>>,
    options: &RenderOptions,
) -> String {
    let mut sections: Vec<String> = Vec::new();

    if let Some(title) = title {
        sections.push(format!("# {}\n", title));
    }

    let loaded_coverage = coverage.and_then(|c| c.as_ref().ok());
    match tests {
        Ok(report) => {
            let rendered = render_sections(report, loaded_coverage, options);
            sections.push(render_markdown(&rendered));
        }
        Err(e) => {
            sections.push(render_error_section(RESULTS_ERROR_TITLE, &e.to_string()));
            if options.show_code_coverage
                && let Some(coverage) = loaded_coverage
            {
                sections.push(render_coverage(coverage));
            }
        }
    }

    if let Some(Err(e)) = coverage {
        sections.push(render_error_section(COVERAGE_ERROR_TITLE, &e.to_string()));
    }

    sections.join("\n")
}

// ============================================================================
// Tests
// ============================================================================
