#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let split = data.iter().position(|byte| *byte == b'\n').unwrap_or(data.len());
    let (path, document) = data.split_at(split);
    if let Ok(path) = std::str::from_utf8(path) {
        let document = document.get(1..).unwrap_or_default();
        if path.is_empty() {
            debug_assert_eq!(
                loadrig::fuzzing::lookup_path(document, path),
                serde_json::from_slice(document).ok()
            );
        } else {
            let _ = loadrig::fuzzing::lookup_path(document, path);
        }
    }
});
