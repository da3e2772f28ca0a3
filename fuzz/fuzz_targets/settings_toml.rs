#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        if let Ok(settings) = loadrig::fuzzing::settings_from_toml(input) {
            debug_assert!(settings.request_timeout_ms > 0);
            debug_assert!(settings.results_capacity > 0);
        }
    }
});
