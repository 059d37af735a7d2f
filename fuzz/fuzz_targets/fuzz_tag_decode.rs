#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let text = refill_core::codec::decode(data);
    assert!(text.chars().all(|c| (' '..='~').contains(&c)));
    assert!(text.len() <= data.len());
});
