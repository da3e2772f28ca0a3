#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        if let Some((source, key)) = loadrig::fuzzing::split_locator(input) {
            debug_assert!(!source.is_empty());
            debug_assert!(!source.contains("---"));
            debug_assert!(!key.contains("---"));
        }
    }
});
