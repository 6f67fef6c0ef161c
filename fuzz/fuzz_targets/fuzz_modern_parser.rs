#![no_main]

use libfuzzer_sys::fuzz_target;
use xcreport_adapters_results::parse_modern_summary;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        // Errors are expected; panics are not
        let _ = parse_modern_summary(text);
    }
});
