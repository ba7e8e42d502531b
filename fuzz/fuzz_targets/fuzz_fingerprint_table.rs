#![no_main]
use libfuzzer_sys::fuzz_target;
use vehid_core::FingerprintDatabase;

fuzz_target!(|data: &str| {
    // Loader and database construction must reject bad tables without panicking.
    if let Ok(table) = vehid_config::load_fingerprint_toml(data) {
        if let Ok(db) = FingerprintDatabase::try_from(&table) {
            assert_eq!(db.len(), table.cars.len());
        }
    }
    // The runtime config shares the id parsing helpers.
    if let Ok(cfg) = vehid_config::load_toml(data) {
        let _ = cfg.validate();
    }
});
