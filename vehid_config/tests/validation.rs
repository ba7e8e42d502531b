use rstest::rstest;
use vehid_config::load_toml;

#[test]
fn empty_config_uses_defaults() {
    let cfg = load_toml("").expect("parse TOML");
    cfg.validate().expect("defaults are valid");
    assert_eq!(cfg.fingerprint.max_frames, 1000);
    assert_eq!(cfg.fingerprint.settle_frames, 25);
    assert_eq!(cfg.fingerprint.channels, 3);
    assert_eq!(cfg.fingerprint.max_id, 0x800);
    assert_eq!(cfg.fingerprint.ignore_ids, vec![0x7DF, 0x7E0, 0x7E8]);
    assert!(cfg.fingerprint.allow_ambiguous);
    assert_eq!(cfg.cycle.rate_hz, 100);
}

#[test]
fn accepts_hex_and_decimal_ids() {
    let toml = r#"
[fingerprint]
ignore_ids = ["0x7df", 2024]
max_id = "0x800"
allow_ambiguous = false

[cycle]
rate_hz = 50

[logging]
level = "debug"
rotation = "daily"
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    cfg.validate().expect("valid");
    assert_eq!(cfg.fingerprint.ignore_ids, vec![0x7DF, 2024]);
    assert_eq!(cfg.fingerprint.max_id, 0x800);
    assert!(!cfg.fingerprint.allow_ambiguous);
    assert_eq!(cfg.logging.level.as_deref(), Some("debug"));
}

#[test]
fn rejects_malformed_ids_at_parse_time() {
    let toml = r#"
[fingerprint]
ignore_ids = ["0xnope"]
"#;
    let err = load_toml(toml).expect_err("bad id");
    assert!(format!("{err}").contains("invalid message id"));
}

#[rstest]
#[case("[fingerprint]\nmax_frames = 0", "max_frames must be >= 1")]
#[case("[fingerprint]\nmax_frames = 10\nsettle_frames = 20", "settle_frames must be <=")]
#[case("[fingerprint]\ntimeout_ms = 0", "timeout_ms must be >= 1")]
#[case("[fingerprint]\nread_timeout_ms = 0", "read_timeout_ms must be in")]
#[case("[fingerprint]\nchannels = 0", "channels must be in")]
#[case("[cycle]\nrate_hz = 0", "rate_hz must be in")]
#[case("[logging]\nrotation = \"weekly\"", "rotation must be one of")]
fn rejects_out_of_range_values(#[case] toml: &str, #[case] needle: &str) {
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    assert!(format!("{err}").contains(needle), "{err}");
}
