#![no_main]

use libfuzzer_sys::fuzz_target;
use xcreport_adapters_coverage::{aggregate_coverage, parse_target_lines};
use xcreport_ports::ToolError;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let lines = parse_target_lines(text);
        let report = aggregate_coverage(
            String::new(),
            text,
            Some(|_: &str| Ok::<_, ToolError>(String::new())),
        );
        assert_eq!(lines.len(), report.targets.len());
    }
});
