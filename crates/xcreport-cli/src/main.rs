//! xcreport turns an Xcode `.xcresult` bundle into a markdown test and coverage report.
//!
//! The report can be printed, written to a file, appended to the GitHub
//! Actions step summary, and accompanied by the normalized model as JSON.

use clap::{ArgAction, Parser, ValueEnum};
use std::fs;
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use xcreport_app::{BuildRequest, run as run_pipeline};
use xcreport_config::{
    CliOverrides, Config, SchemaChoice, discover_config, load_config, resolve_config,
};

/// xcreport turns an Xcode `.xcresult` bundle into a markdown test and coverage report.
#[derive(Debug, Parser)]
#[command(name = "xcreport")]
#[command(about = "Render an Xcode .xcresult bundle as a markdown test and coverage report.")]
#[command(version)]
struct Cli {
    /// Path to the .xcresult bundle.
    bundle: PathBuf,

    /// Write the markdown report to this file instead of stdout.
    #[arg(long, value_name = "FILE")]
    out: Option<PathBuf>,

    /// Write the normalized test and coverage model as JSON.
    #[arg(long, value_name = "FILE")]
    json: Option<PathBuf>,

    /// Show passing tests in the test listing.
    #[arg(long, value_name = "BOOL")]
    show_passed_tests: Option<bool>,

    /// Render the code coverage section.
    #[arg(long, value_name = "BOOL")]
    show_code_coverage: Option<bool>,

    /// Result schema to read (default: detect from the Xcode version).
    #[arg(long, value_enum)]
    schema: Option<CliSchema>,

    /// Path to an xcreport.toml (default: search upward from the current directory).
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Append the report to the file named by $GITHUB_STEP_SUMMARY.
    #[arg(long)]
    step_summary: bool,

    /// Exit with status 2 when the results contain failing tests.
    #[arg(long)]
    fail_on_test_failure: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliSchema {
    Auto,
    Legacy,
    Modern,
}

impl From<CliSchema> for SchemaChoice {
    fn from(schema: CliSchema) -> Self {
        match schema {
            CliSchema::Auto => SchemaChoice::Auto,
            CliSchema::Legacy => SchemaChoice::Legacy,
            CliSchema::Modern => SchemaChoice::Modern,
        }
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error("Bundle '{0}' does not exist")]
    BundleNotFound(String),

    #[error("'{0}' is not an .xcresult bundle (expected a directory containing Info.plist)")]
    NotABundle(String),

    #[error("Failed to write file '{path}': {source}")]
    FileWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create directory '{path}': {source}")]
    DirCreate {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to load config: {0}")]
    ConfigLoad(String),
}

/// Exit codes:
/// - 0: report written
/// - 1: invalid input or I/O failure
/// - 2: `--fail-on-test-failure` and the results contain failing tests
const EXIT_CODE_ERROR: i32 = 1;
const EXIT_CODE_TEST_FAILURE: i32 = 2;

/// Environment variable naming the GitHub Actions step summary file.
const STEP_SUMMARY_ENV: &str = "GITHUB_STEP_SUMMARY";

/// Environment variable holding a plain log level name.
const LOG_ENV: &str = "XCREPORT_LOG";

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            EXIT_CODE_ERROR
        }
    };
    std::process::exit(exit_code);
}

/// Pick the log level from `-v` flags, then `XCREPORT_LOG`, then `warn`.
fn log_level(verbose: u8, env_value: Option<&str>) -> LevelFilter {
    match verbose {
        0 => env_value
            .and_then(|value| LevelFilter::from_str(value.trim()).ok())
            .unwrap_or(LevelFilter::WARN),
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

fn init_tracing(verbose: u8) {
    let env_value = std::env::var(LOG_ENV).ok();
    let stderr = std::io::stderr();
    tracing_subscriber::fmt()
        .with_max_level(log_level(verbose, env_value.as_deref()))
        .with_ansi(stderr.is_terminal())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<i32, CliError> {
    validate_bundle(&cli.bundle)?;

    let config = match &cli.config {
        Some(path) => Some(load_config(path).map_err(|e| CliError::ConfigLoad(e.to_string()))),
        None => discover(),
    }
    .transpose()?;

    let overrides = CliOverrides {
        show_passed_tests: cli.show_passed_tests,
        show_code_coverage: cli.show_code_coverage,
        schema: cli.schema.map(SchemaChoice::from),
    };
    let effective = resolve_config(config.as_ref(), &overrides);
    tracing::debug!(?effective, "resolved configuration");

    let request = BuildRequest {
        bundle: cli.bundle.clone(),
        options: effective.render_options(),
        schema: effective.schema.forced(),
        title: effective.title.clone(),
    };
    let output = run_pipeline(&request, effective.max_output_bytes());

    match &cli.out {
        Some(path) => write_file(path, &output.markdown)?,
        None => print!("{}", output.markdown),
    }

    if let Some(path) = &cli.json {
        let json = output.to_json()?;
        write_file(path, &json)?;
    }

    if cli.step_summary {
        append_step_summary(&output.markdown)?;
    }

    if cli.fail_on_test_failure && output.has_test_failures() {
        return Ok(EXIT_CODE_TEST_FAILURE);
    }
    Ok(0)
}

/// Discover `xcreport.toml` upward from the current directory.
fn discover() -> Option<Result<Config, CliError>> {
    match discover_config() {
        Ok(Some((path, config))) => {
            tracing::debug!(path = %path.display(), "loaded config");
            Some(Ok(config))
        }
        Ok(None) => None,
        Err(e) => Some(Err(CliError::ConfigLoad(e.to_string()))),
    }
}

/// A bundle is a directory that contains `Info.plist`.
fn validate_bundle(bundle: &Path) -> Result<(), CliError> {
    if !bundle.exists() {
        return Err(CliError::BundleNotFound(bundle.display().to_string()));
    }
    if !bundle.is_dir() || !bundle.join("Info.plist").is_file() {
        return Err(CliError::NotABundle(bundle.display().to_string()));
    }
    Ok(())
}

fn write_file(path: &Path, content: &str) -> Result<(), CliError> {
    ensure_parent_dir(path)?;
    fs::write(path, content).map_err(|e| CliError::FileWrite {
        path: path.display().to_string(),
        source: e,
    })
}

fn append_step_summary(markdown: &str) -> Result<(), CliError> {
    let Some(path) = std::env::var_os(STEP_SUMMARY_ENV) else {
        tracing::warn!("--step-summary given but {} is not set", STEP_SUMMARY_ENV);
        return Ok(());
    };
    let path = PathBuf::from(path);
    let write_error = |e: std::io::Error| CliError::FileWrite {
        path: path.display().to_string(),
        source: e,
    };

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(write_error)?;
    writeln!(file, "{}", markdown).map_err(write_error)
}

/// Ensure the parent directory of a path exists
fn ensure_parent_dir(path: &Path) -> Result<(), CliError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| CliError::DirCreate {
            path: parent.display().to_string(),
            source: e,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["xcreport", "Test.xcresult"]).unwrap();
        assert_eq!(cli.bundle, PathBuf::from("Test.xcresult"));
        assert!(cli.out.is_none());
        assert!(cli.show_passed_tests.is_none());
        assert!(cli.schema.is_none());
        assert!(!cli.step_summary);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_cli_explicit_values() {
        let cli = Cli::try_parse_from([
            "xcreport",
            "Test.xcresult",
            "--show-passed-tests",
            "false",
            "--show-code-coverage",
            "true",
            "--schema",
            "modern",
            "--out",
            "report.md",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.show_passed_tests, Some(false));
        assert_eq!(cli.show_code_coverage, Some(true));
        assert!(matches!(cli.schema, Some(CliSchema::Modern)));
        assert_eq!(cli.out, Some(PathBuf::from("report.md")));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_cli_rejects_bad_values() {
        assert!(Cli::try_parse_from(["xcreport", "T.xcresult", "--schema", "newest"]).is_err());
        assert!(
            Cli::try_parse_from(["xcreport", "T.xcresult", "--show-passed-tests", "maybe"])
                .is_err()
        );
        assert!(Cli::try_parse_from(["xcreport"]).is_err());
    }

    #[test]
    fn test_schema_mapping() {
        assert_eq!(SchemaChoice::from(CliSchema::Auto), SchemaChoice::Auto);
        assert_eq!(SchemaChoice::from(CliSchema::Legacy), SchemaChoice::Legacy);
        assert_eq!(SchemaChoice::from(CliSchema::Modern), SchemaChoice::Modern);
    }

    #[test]
    fn test_log_level() {
        assert_eq!(log_level(0, None), LevelFilter::WARN);
        assert_eq!(log_level(0, Some("debug")), LevelFilter::DEBUG);
        assert_eq!(log_level(0, Some("nonsense")), LevelFilter::WARN);
        assert_eq!(log_level(1, Some("error")), LevelFilter::INFO);
        assert_eq!(log_level(2, None), LevelFilter::DEBUG);
        assert_eq!(log_level(9, None), LevelFilter::TRACE);
    }

    #[test]
    fn test_validate_bundle() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("Missing.xcresult");
        assert!(matches!(
            validate_bundle(&missing),
            Err(CliError::BundleNotFound(_))
        ));

        let bundle = temp.path().join("Test.xcresult");
        fs::create_dir(&bundle).unwrap();
        assert!(matches!(
            validate_bundle(&bundle),
            Err(CliError::NotABundle(_))
        ));

        fs::write(bundle.join("Info.plist"), "{}").unwrap();
        assert!(validate_bundle(&bundle).is_ok());

        let file = temp.path().join("file.xcresult");
        fs::write(&file, "").unwrap();
        assert!(matches!(validate_bundle(&file), Err(CliError::NotABundle(_))));
    }

    #[test]
    fn test_write_file_creates_parent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("dir").join("report.md");
        write_file(&path, "# Test Results Summary\n").unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "# Test Results Summary\n"
        );
    }
}
