#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(options) = loadrig::fuzzing::options_from_json(data) {
        debug_assert!(!options.url.trim().is_empty());
        debug_assert!(options.concurrent > 0);
        for step in &options.transaction_options.steps {
            debug_assert!(!step.name.is_empty());
            debug_assert!(!step.url.trim().is_empty());
        }
    }
});
