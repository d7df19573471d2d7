#![no_main]
use libfuzzer_sys::fuzz_target;
use arraypb::Descriptor;

fuzz_target!(|data: &[u8]| {
    if let Ok(digits) = std::str::from_utf8(data) {
        let _ = Descriptor::decode(digits, &[], None);
    }
});
