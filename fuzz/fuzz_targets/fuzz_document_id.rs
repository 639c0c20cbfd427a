#![no_main]

use libfuzzer_sys::fuzz_target;
use sunat_cpe::core::DocumentNumber;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(n) = DocumentNumber::parse(s) {
            // Parsed ids re-render to something that parses to the same value.
            assert_eq!(DocumentNumber::parse(&n.document_id()).ok(), Some(n));
        }
    }
});
