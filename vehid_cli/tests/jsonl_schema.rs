use assert_cmd::prelude::*;
use rstest::rstest;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;
use vehid_brands::{honda, nissan};
use vehid_traits::VehicleIdentity;

fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[cycle]
rate_hz = 1000
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn write_log(dir: &tempfile::TempDir, car: &VehicleIdentity, repeats: u64) -> PathBuf {
    let cat = vehid_brands::catalog().unwrap();
    let frames = cat.fingerprints.get(car).unwrap().canonical().to_frames();
    let mut csv = String::from("t_ms,channel,id,data\n");
    for rep in 0..repeats {
        for f in &frames {
            let data: String = f.data.iter().map(|b| format!("{b:02x}")).collect();
            writeln!(csv, "{},{},0x{:x},{}", rep * 10, f.channel, f.id, data).unwrap();
        }
    }
    let path = dir.path().join("log.csv");
    fs::write(&path, csv).unwrap();
    path
}

fn vehid_json(cfg: &PathBuf) -> Command {
    let mut cmd = Command::cargo_bin("vehid").unwrap();
    cmd.env_remove("RUST_LOG")
        .arg("--json")
        .arg("--log-level")
        .arg("off")
        .arg("--config")
        .arg(cfg);
    cmd
}

fn json_lines(bytes: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(bytes)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap_or_else(|e| panic!("not JSON ({e}): {l}")))
        .collect()
}

/// Validate the JSON schema of a successful identification.
#[rstest]
#[case::civic(honda::CIVIC, "honda")]
#[case::leaf(nissan::LEAF, "nissan")]
fn identify_json_schema(#[case] car: VehicleIdentity, #[case] brand: &str) {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let log = write_log(&dir, &car, 30);

    let out = vehid_json(&cfg)
        .arg("identify")
        .arg("--log")
        .arg(&log)
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let lines = json_lines(&out.stdout);
    assert_eq!(lines.len(), 1);
    let v = &lines[0];
    assert_eq!(v["car"], car.as_str());
    assert_eq!(v["brand"], brand);
    assert_eq!(v["variant"], 0);
    assert_eq!(v["fallback"], false);
    assert!(v["frames"].as_u64().unwrap() > 0);
    assert!(v["candidates"].as_array().unwrap().is_empty());
}

/// One JSON object per cycle; engagement starts at the requested cycle.
#[test]
fn drive_json_lines_per_cycle() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let log = write_log(&dir, &honda::CIVIC, 40);

    let out = vehid_json(&cfg)
        .arg("drive")
        .arg("--log")
        .arg(&log)
        .arg("--engage-after")
        .arg("3")
        .arg("--steer")
        .arg("-0.2")
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let lines = json_lines(&out.stdout);
    assert!(lines.len() > 5);
    for (i, v) in lines.iter().enumerate() {
        for key in [
            "cycle",
            "enabled",
            "steer",
            "accel",
            "frames",
            "v_ego",
            "can_valid",
            "radar_points",
        ] {
            assert!(v.get(key).is_some(), "missing {key} in {v}");
        }
        assert_eq!(v["cycle"], i as u64);
        assert_eq!(v["enabled"], i >= 3);
        assert!(v["frames"].as_u64().unwrap() > 0);
    }
    assert_eq!(lines[5]["steer"]["kind"], "torque");
    assert_eq!(lines[0]["steer"]["kind"], "inactive");
}

/// Errors are a single JSON object with a stable reason.
#[test]
fn no_match_error_json() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let log = dir.path().join("odd.csv");
    fs::write(&log, "t_ms,channel,id,data\n0,0,0x1c4,aa\n").unwrap();

    let out = vehid_json(&cfg)
        .arg("identify")
        .arg("--log")
        .arg(&log)
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(3));

    let lines = json_lines(&out.stderr);
    let last = lines.last().unwrap();
    assert_eq!(last["reason"], "NoMatch");
    assert!(last["message"].as_str().unwrap().contains("What happened"));
}

#[test]
fn list_json_covers_every_registered_car() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let out = vehid_json(&cfg).arg("list").output().unwrap();
    assert!(out.status.success());

    let lines = json_lines(&out.stdout);
    let cat = vehid_brands::catalog().unwrap();
    assert_eq!(lines.len(), cat.interfaces.len());
    assert_eq!(lines[0]["car"], "TOYOTA PRIUS 2017");
    let mock = lines.iter().find(|v| v["car"] == "MOCK").unwrap();
    assert_eq!(mock["variants"], 0);
    assert_eq!(mock["radar_off_can"], true);
}

#[test]
fn invalid_config_error_json() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("cfg.toml");
    fs::write(&cfg, "[cycle]\nrate_hz = 0\n").unwrap();

    let out = vehid_json(&cfg).arg("list").output().unwrap();
    assert_eq!(out.status.code(), Some(1));

    let lines = json_lines(&out.stderr);
    let last = lines.last().unwrap();
    assert_eq!(last["reason"], "Config");
    assert!(last["message"].as_str().unwrap().contains("cycle.rate_hz"));
}
