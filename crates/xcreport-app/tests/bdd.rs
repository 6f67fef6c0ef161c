//! BDD/Cucumber test harness for xcreport.
//!
//! Step definitions for the Gherkin feature files in `bdd/features/`. The
//! toolchain is replaced by an in-memory `ResultTool` seeded by the steps.
//!
//! Run with: `cargo test --test bdd`

use std::collections::HashMap;
use std::path::Path;

use cucumber::{World, given, then, when};
use xcreport_app::{BuildRequest, ReportOutput, build_report};
use xcreport_ports::{ResultTool, ToolError};
use xcreport_types::RenderOptions;

const ROOT_PLIST: &str = r#"{ "rootId" => { "hash" => "0~root" } }"#;

const ROOT_OBJECT: &str = r#"{"actions": {"_values": [{"actionResult": {
    "status": {"_value": "failed"},
    "testsRef": {"id": {"_value": "0~tests"}}
}}]}}"#;

const TESTS_OBJECT: &str = r#"{"summaries": {"_values": [{
    "totals": {"testsCount": {"_value": "2"}, "testsFailedCount": {"_value": "1"}},
    "tests": {"_values": [{
        "name": {"_value": "AppTests"},
        "subtests": {"_values": [
            {"name": {"_value": "testOne()"}, "testStatus": {"_value": "Success"}, "duration": {"_value": "0.5"}},
            {"name": {"_value": "testTwo()"}, "testStatus": {"_value": "Failure"}, "duration": {"_value": "0.25"},
             "summaryRef": {"id": {"_value": "0~failure"}}}
        ]}
    }]}
}]}}"#;

/// In-memory toolchain seeded by the scenario steps.
#[derive(Debug, Default)]
struct ScenarioTool {
    version: Option<String>,
    summary: Option<String>,
    objects: HashMap<String, String>,
    coverage: Option<String>,
    targets: String,
}

fn unavailable(what: &str) -> ToolError {
    ToolError::NonZeroExit {
        command: what.to_string(),
        exit_code: 1,
        stderr: format!("{what} unavailable"),
    }
}

impl ResultTool for ScenarioTool {
    fn version(&self) -> Result<String, ToolError> {
        self.version.clone().ok_or_else(|| unavailable("xcodebuild -version"))
    }

    fn root_info(&self, _bundle: &Path) -> Result<String, ToolError> {
        Ok(ROOT_PLIST.to_string())
    }

    fn object_json(&self, _bundle: &Path, id: &str) -> Result<String, ToolError> {
        self.objects
            .get(id)
            .cloned()
            .ok_or_else(|| unavailable("xcresulttool get"))
    }

    fn test_summary_json(&self, _bundle: &Path) -> Result<String, ToolError> {
        self.summary
            .clone()
            .ok_or_else(|| unavailable("xcresulttool get test-results summary"))
    }

    fn coverage_report(&self, _path: &Path) -> Result<String, ToolError> {
        self.coverage
            .clone()
            .ok_or_else(|| unavailable("xccov view --report"))
    }

    fn coverage_targets(&self, _path: &Path) -> Result<String, ToolError> {
        Ok(self.targets.clone())
    }

    fn supports_target_filter(&self) -> Result<bool, ToolError> {
        Ok(true)
    }

    fn target_coverage(&self, _path: &Path, target: &str) -> Result<String, ToolError> {
        Ok(format!("{target}: Sources/App.swift 81.25%"))
    }

    fn export_coverage_archive(
        &self,
        _bundle: &Path,
        _id: &str,
        _dest: &Path,
    ) -> Result<(), ToolError> {
        Err(unavailable("xcresulttool export"))
    }
}

/// The world state for BDD tests.
#[derive(Debug, Default, World)]
pub struct ReportWorld {
    tool: ScenarioTool,
    options: RenderOptions,
    output: Option<ReportOutput>,
}

impl ReportWorld {
    fn build(&self) -> ReportOutput {
        let request = BuildRequest {
            options: self.options,
            ..BuildRequest::new("/tmp/Scenario.xcresult")
        };
        build_report(&self.tool, &request)
    }

    fn markdown(&self) -> &str {
        &self
            .output
            .as_ref()
            .expect("the report should have been built")
            .markdown
    }
}

// ============================================================================
// Given Steps
// ============================================================================

#[given(expr = "an Xcode {string} toolchain")]
fn given_toolchain(world: &mut ReportWorld, version: String) {
    world.tool.version = Some(format!("Xcode {version}\nBuild version 0A000"));
}

#[given("no Xcode version can be read")]
fn given_no_toolchain(world: &mut ReportWorld) {
    world.tool.version = None;
}

#[given(expr = "a modern summary with {int} tests and {int} failure")]
fn given_modern_summary(world: &mut ReportWorld, total: u64, failed: u64) {
    world.tool.summary = Some(format!(
        r#"{{
            "result": "Failed",
            "totalTestCount": {total},
            "passedTests": {passed},
            "failedTests": {failed},
            "skippedTests": 0,
            "expectedFailures": 0,
            "testFailures": {{
                "0": {{"testName": "testCheckout()", "targetName": "ShopTests", "failureText": "XCTAssertTrue failed"}}
            }}
        }}"#,
        passed = total - failed,
    ));
}

#[given("the test summary cannot be read")]
fn given_unreadable_summary(world: &mut ReportWorld) {
    world.tool.summary = None;
}

#[given("a legacy bundle with a passing and a failing test")]
fn given_legacy_bundle(world: &mut ReportWorld) {
    world
        .tool
        .objects
        .insert("0~root".to_string(), ROOT_OBJECT.to_string());
    world
        .tool
        .objects
        .insert("0~tests".to_string(), TESTS_OBJECT.to_string());
}

#[given(expr = "coverage for target {string}")]
fn given_coverage(world: &mut ReportWorld, target: String) {
    world.tool.coverage = Some(format!("{target}  81.25% (130/160)"));
    world.tool.targets = format!("ID Name # Source Files Coverage\n0 {target} 4 81.25% (130/160)\n");
}

#[given("passing tests are hidden")]
fn given_hide_passing(world: &mut ReportWorld) {
    world.options.show_passed_tests = false;
}

#[given("code coverage is hidden")]
fn given_hide_coverage(world: &mut ReportWorld) {
    world.options.show_code_coverage = false;
}

// ============================================================================
// When Steps
// ============================================================================

#[when("the report is built")]
fn when_report_built(world: &mut ReportWorld) {
    world.output = Some(world.build());
}

// ============================================================================
// Then Steps
// ============================================================================

#[then(expr = "the schema is {string}")]
fn then_schema_is(world: &mut ReportWorld, expected: String) {
    let output = world.output.as_ref().expect("the report should have been built");
    assert_eq!(output.schema.as_str(), expected);
}

#[then(expr = "the markdown contains {string}")]
fn then_markdown_contains(world: &mut ReportWorld, needle: String) {
    let markdown = world.markdown();
    assert!(
        markdown.contains(&needle),
        "expected {needle:?} in:\n{markdown}"
    );
}

#[then(expr = "the markdown does not contain {string}")]
fn then_markdown_lacks(world: &mut ReportWorld, needle: String) {
    let markdown = world.markdown();
    assert!(
        !markdown.contains(&needle),
        "did not expect {needle:?} in:\n{markdown}"
    );
}

#[then("the report has test failures")]
fn then_has_failures(world: &mut ReportWorld) {
    let output = world.output.as_ref().expect("the report should have been built");
    assert!(output.has_test_failures());
}

#[then("rebuilding the report yields identical markdown")]
fn then_rebuild_is_deterministic(world: &mut ReportWorld) {
    let first = world.markdown().to_string();
    let second = world.build().markdown;
    assert_eq!(first, second);
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() {
    futures::executor::block_on(ReportWorld::cucumber().run("../../bdd/features"));
}
