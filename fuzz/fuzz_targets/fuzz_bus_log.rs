#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(frames) = vehid_config::read_bus_log(data) {
        for f in frames {
            assert!(f.data.len() <= vehid_config::MAX_PAYLOAD);
            assert!(f.id <= vehid_config::MAX_EXTENDED_ID);
        }
    }
});
