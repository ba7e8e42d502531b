use std::fs::File;
use std::io::Write;

use rstest::rstest;
use tempfile::tempdir;
use vehid_config::{SignatureEntry, load_fingerprint_file, load_fingerprint_toml};

const TABLE: &str = r#"
[[car]]
name = "TOYOTA PRIUS 2017"

[[car.signature]]
bus0 = { "0x1c4" = 8, "0x4cb" = 8 }
bus1 = { "0x2e4" = 5 }

[[car.signature]]
bus0 = { "0x1c4" = 8, "0x4cb" = 8, "0x201" = 6 }

[[car]]
name = "HONDA CIVIC 2016"

[[car.signature]]
bus0 = { "0x1c4" = 4, "0x33d" = 5 }
"#;

#[test]
fn keeps_file_order_and_variants() {
    let t = load_fingerprint_toml(TABLE).expect("valid table");
    assert_eq!(t.cars.len(), 2);
    assert_eq!(t.cars[0].name, "TOYOTA PRIUS 2017");
    assert_eq!(t.cars[0].signatures.len(), 2);
    assert!(t.cars[0].signatures[0].contains(&SignatureEntry {
        channel: 1,
        id: 0x2E4,
        len: 5
    }));
    assert_eq!(t.cars[1].signatures[0].len(), 2);
}

#[rstest]
#[case("[[car]]\nname = \"\"\n[[car.signature]]\nbus0 = { \"0x1\" = 1 }", "empty name")]
#[case("[[car]]\nname = \"A\"", "declares no signatures")]
#[case("[[car]]\nname = \"A\"\n[[car.signature]]\ncan0 = { \"0x1\" = 1 }", "must be bus0")]
#[case("[[car]]\nname = \"A\"\n[[car.signature]]\nbus0 = { \"0xq\" = 1 }", "invalid message id")]
#[case("[[car]]\nname = \"A\"\n[[car.signature]]\nbus0 = { \"0x1\" = 65 }", "exceeds 64 bytes")]
#[case("[[car]]\nname = \"A\"\n[[car.signature]]\nbus0 = {}", "is empty")]
#[case(
    "[[car]]\nname = \"A\"\n[[car.signature]]\nbus0 = { \"1\" = 1 }\n[[car]]\nname = \"A\"\n[[car.signature]]\nbus0 = { \"1\" = 2 }",
    "declared twice"
)]
fn rejects_malformed_tables(#[case] toml: &str, #[case] needle: &str) {
    let err = load_fingerprint_toml(toml).expect_err("should reject");
    assert!(format!("{err}").contains(needle), "{err}");
}

#[test]
fn loads_from_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fingerprints.toml");
    let mut f = File::create(&path).unwrap();
    f.write_all(TABLE.as_bytes()).unwrap();
    let t = load_fingerprint_file(&path).expect("load");
    assert_eq!(t.cars.len(), 2);

    let err = load_fingerprint_file(&dir.path().join("missing.toml")).expect_err("missing file");
    assert!(format!("{err}").contains("read fingerprint table"));
}
