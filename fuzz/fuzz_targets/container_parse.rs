#![no_main]
use libfuzzer_sys::fuzz_target;
use arraypb::Container;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(container) = Container::parse(text, false, 0) {
            let _ = container.serialize();
            let _ = container.hash_code();
        }
    }
});
