//! Coverage aggregation adapters for xcreport.
//!
//! This crate collects the text coverage reports the toolchain produces and
//! aggregates them into a [`CoverageReport`]: the whole-bundle report plus one
//! entry per build target. Per-target detail degrades to the target's one-line
//! summary when the toolchain cannot filter by target.
//!
//! Legacy bundles do not expose coverage directly; their coverage archive is
//! exported into a scratch directory that is removed before returning.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use xcreport_adapters_results::{ResultsError, load_root_refs};
use xcreport_ports::{ResultTool, ToolError};
use xcreport_types::{CoverageReport, SchemaVersion, TargetCoverage, TargetDetail};

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur while collecting coverage.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoverageError {
    /// The external tool failed.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// The legacy root record could not be resolved.
    #[error("failed to resolve coverage archive: {0}")]
    Results(#[from] ResultsError),

    /// The legacy root record has no coverage archive reference.
    #[error("bundle contains no coverage archive")]
    MissingArchiveRef,

    /// The scratch directory for the exported archive could not be created.
    #[error("failed to create scratch directory: {0}")]
    Scratch(String),
}

// ============================================================================
// Target Lines
// ============================================================================

/// Name of the exported archive inside the scratch directory.
pub const EXPORTED_ARCHIVE_NAME: &str = "coverage.xccovarchive";

static TARGET_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]+\s+(.+?)\s+\d+\s+\d+(?:\.\d+)?%(?:\s+\(\d+/\d+\))?$")
        .expect("valid target line pattern")
});

/// One parsed line of the target summary listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetLine {
    /// Target name, e.g. `MyApp.app`.
    pub name: String,
    /// The line as it appeared (trimmed).
    pub line: String,
}

/// Parse one target summary line.
///
/// Expected form: `<hex-id> <name> <file count> <percentage>%`, optionally
/// followed by `(covered/executable)`.
///
/// # Examples
///
/// ```
/// use xcreport_adapters_coverage::parse_target_line;
///
/// let line = parse_target_line("0  MyApp.app   42   71.43% (500/700)").unwrap();
/// assert_eq!(line.name, "MyApp.app");
/// assert!(parse_target_line("ID Name # Source Files Coverage").is_none());
/// ```
pub fn parse_target_line(line: &str) -> Option<TargetLine> {
    let trimmed = line.trim();
    let caps = TARGET_LINE_RE.captures(trimmed)?;
    Some(TargetLine {
        name: caps.get(1)?.as_str().to_string(),
        line: trimmed.to_string(),
    })
}

/// Parse every target line of a newline-delimited listing.
///
/// Empty lines, headers, separators and anything else that does not match
/// the target pattern are skipped.
pub fn parse_target_lines(text: &str) -> Vec<TargetLine> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let parsed = parse_target_line(line);
            if parsed.is_none() {
                tracing::debug!(line, "skipping unrecognized coverage target line");
            }
            parsed
        })
        .collect()
}

// ============================================================================
// Aggregation
// ============================================================================

/// Aggregate coverage text into a [`CoverageReport`].
///
/// `fetch_detail` is `None` when per-target filtering is unsupported; every
/// target is then marked [`TargetDetail::Unsupported`]. A failing fetch is
/// recorded inline for that target only.
pub fn aggregate_coverage<F>(
    combined: String,
    target_list: &str,
    mut fetch_detail: Option<F>,
) -> CoverageReport
where
    F: FnMut(&str) -> Result<String, ToolError>,
{
    let targets = parse_target_lines(target_list)
        .into_iter()
        .map(|target| {
            let detail = match fetch_detail.as_mut() {
                Some(fetch) => match fetch(&target.name) {
                    Ok(text) => TargetDetail::Report(text),
                    Err(e) => {
                        tracing::warn!(target_name = %target.name, error = %e, "per-target coverage failed");
                        TargetDetail::Error(e.to_string())
                    }
                },
                None => TargetDetail::Unsupported,
            };
            TargetCoverage {
                target_name: target.name,
                summary_line: target.line,
                detail,
            }
        })
        .collect();

    CoverageReport { combined, targets }
}

/// Collect coverage for `path` (a bundle or an exported archive).
///
/// The whole-bundle report is required. A failing target listing leaves the
/// report without target subsections, and a failing support probe counts as
/// "unsupported".
pub fn collect_coverage<T: ResultTool + ?Sized>(
    tool: &T,
    path: &Path,
) -> Result<CoverageReport, CoverageError> {
    let combined = tool.coverage_report(path)?;

    let target_list = match tool.coverage_targets(path) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(error = %e, "coverage target listing failed");
            String::new()
        }
    };

    let supported = match tool.supports_target_filter() {
        Ok(supported) => supported,
        Err(e) => {
            tracing::debug!(error = %e, "target filter probe failed, treating as unsupported");
            false
        }
    };

    let fetch = supported.then_some(|target: &str| tool.target_coverage(path, target));
    Ok(aggregate_coverage(combined, &target_list, fetch))
}

/// Collect coverage from a legacy bundle.
///
/// Resolves the coverage archive id from the root record, exports the archive
/// into a fresh scratch directory, and collects coverage from the export. The
/// scratch directory is removed on every exit path.
pub fn collect_legacy_coverage<T: ResultTool + ?Sized>(
    tool: &T,
    bundle: &Path,
) -> Result<CoverageReport, CoverageError> {
    let refs = load_root_refs(tool, bundle)?;
    let archive_ref = refs.archive_ref.ok_or(CoverageError::MissingArchiveRef)?;

    let scratch = tempfile::Builder::new()
        .prefix("xcreport-coverage-")
        .tempdir()
        .map_err(|e| CoverageError::Scratch(e.to_string()))?;
    tracing::debug!(path = %scratch.path().display(), "created coverage scratch directory");

    let result = export_and_collect(tool, bundle, &archive_ref, scratch.path());

    let scratch_path = scratch.path().to_path_buf();
    if let Err(e) = scratch.close() {
        tracing::warn!(path = %scratch_path.display(), error = %e, "failed to remove scratch directory");
    }

    result
}

fn export_and_collect<T: ResultTool + ?Sized>(
    tool: &T,
    bundle: &Path,
    archive_ref: &str,
    scratch: &Path,
) -> Result<CoverageReport, CoverageError> {
    let export_path = scratch.join(EXPORTED_ARCHIVE_NAME);
    tool.export_coverage_archive(bundle, archive_ref, &export_path)?;
    collect_coverage(tool, &export_path)
}

/// Collect coverage with the strategy matching `schema`.
pub fn collect_for_schema<T: ResultTool + ?Sized>(
    tool: &T,
    bundle: &Path,
    schema: SchemaVersion,
) -> Result<CoverageReport, CoverageError> {
    match schema {
        SchemaVersion::Legacy => collect_legacy_coverage(tool, bundle),
        SchemaVersion::Modern => collect_coverage(tool, bundle),
    }
}

// ============================================================================
// Tests
// ============================================================================
