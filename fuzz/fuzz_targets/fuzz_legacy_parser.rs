#![no_main]

use libfuzzer_sys::fuzz_target;
use xcreport_adapters_results::{parse_legacy_tests, parse_root_id, parse_root_object};

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        // Errors are expected; panics are not
        let _ = parse_root_id(text);
        let _ = parse_root_object(text);
        let _ = parse_legacy_tests(text, None);
    }
});
