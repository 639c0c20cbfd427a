#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = sunat_cpe::transmission::parse_cdr(data);
});
