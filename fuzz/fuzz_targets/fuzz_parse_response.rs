#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Must not panic; every input becomes an outcome.
    let outcome = sunat_cpe::transmission::parse_response(data);
    assert_eq!(outcome.raw_response, data);
});
