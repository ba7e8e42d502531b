#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and table loaders for vehicle identification.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Fingerprint tables are TOML files of `[[car]]` entries with one or more
//!   `[[car.signature]]` tables (`bus0 = { "0x1c4" = 8 }`).
//! - Bus logs for replay are CSV files with exact headers `t_ms,channel,id,data`.
use serde::Deserialize;
use serde::de::Deserializer;
use std::collections::{BTreeMap, HashSet};

/// Largest payload accepted in tables and logs (CAN-FD).
pub const MAX_PAYLOAD: usize = 64;
/// Largest identifier (29-bit extended).
pub const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FingerprintCfg {
    /// Upper bound on frames consumed during identification
    pub max_frames: u32,
    /// Frames to keep observing once a single candidate remains
    pub settle_frames: u32,
    /// Wall-clock bound on identification (ms)
    pub timeout_ms: u64,
    /// Max wait for one frame from the source (ms)
    pub read_timeout_ms: u64,
    /// Channels considered by the matcher
    pub channels: u8,
    /// Ids never used for elimination. Accepts integers or "0x..." strings.
    #[serde(deserialize_with = "de_ids")]
    pub ignore_ids: Vec<u32>,
    /// Ids at or above this value are ignored
    #[serde(deserialize_with = "de_id")]
    pub max_id: u32,
    /// Accept the first-registered candidate when several remain
    pub allow_ambiguous: bool,
    /// Optional external fingerprint table replacing the built-in one
    pub file: Option<String>,
}

impl Default for FingerprintCfg {
    fn default() -> Self {
        Self {
            max_frames: 1000,
            settle_frames: 25,
            timeout_ms: 10_000,
            read_timeout_ms: 100,
            channels: 3,
            ignore_ids: vec![0x7DF, 0x7E0, 0x7E8],
            max_id: 0x800,
            allow_ambiguous: true,
            file: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CycleCfg {
    pub rate_hz: u32,
}

impl Default for CycleCfg {
    fn default() -> Self {
        Self { rate_hz: 100 }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub fingerprint: FingerprintCfg,
    pub cycle: CycleCfg,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IdToml {
    Int(u32),
    Str(String),
}

impl IdToml {
    fn resolve(self) -> Result<u32, String> {
        match self {
            IdToml::Int(v) => Ok(v),
            IdToml::Str(s) => parse_id(&s),
        }
    }
}

fn de_id<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    IdToml::deserialize(deserializer)?
        .resolve()
        .map_err(serde::de::Error::custom)
}

fn de_ids<'de, D>(deserializer: D) -> Result<Vec<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let items: Vec<IdToml> = Vec::deserialize(deserializer)?;
    items
        .into_iter()
        .map(|i| i.resolve().map_err(serde::de::Error::custom))
        .collect()
}

/// Parse a message id written as `0x1c4`, `0X1C4` or decimal `452`.
pub fn parse_id(s: &str) -> Result<u32, String> {
    let t = s.trim();
    let parsed = match t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => t.parse::<u32>(),
    };
    let id = parsed.map_err(|e| format!("invalid message id {s:?}: {e}"))?;
    if id > MAX_EXTENDED_ID {
        return Err(format!("message id {s:?} exceeds 29 bits"));
    }
    Ok(id)
}

/// Parse a hex payload (`"0a1B"`, optional `0x` prefix, no separators).
pub fn parse_hex_payload(s: &str) -> Result<Vec<u8>, String> {
    let t = s.trim();
    let t = t
        .strip_prefix("0x")
        .or_else(|| t.strip_prefix("0X"))
        .unwrap_or(t);
    if t.len() / 2 > MAX_PAYLOAD {
        return Err(format!("payload {s:?} exceeds {MAX_PAYLOAD} bytes"));
    }
    hex::decode(t).map_err(|e| match e {
        hex::FromHexError::OddLength => {
            format!("payload {s:?} has an odd number of hex digits")
        }
        _ => format!("payload {s:?} is not hex"),
    })
}

// ── Fingerprint tables ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct FingerprintToml {
    #[serde(default)]
    car: Vec<CarToml>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CarToml {
    name: String,
    #[serde(default)]
    signature: Vec<BTreeMap<String, BTreeMap<String, u8>>>,
}

/// One expected `(channel, id) -> length` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureEntry {
    pub channel: u8,
    pub id: u32,
    pub len: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarFingerprints {
    pub name: String,
    /// Canonical signature first.
    pub signatures: Vec<Vec<SignatureEntry>>,
}

/// Fingerprint table in file order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FingerprintTable {
    pub cars: Vec<CarFingerprints>,
}

fn parse_bus_key(key: &str) -> Result<u8, String> {
    key.strip_prefix("bus")
        .and_then(|n| n.parse::<u8>().ok())
        .ok_or_else(|| format!("signature key {key:?} must be bus0, bus1, ..."))
}

/// Parse and validate a fingerprint table.
///
/// Every car needs a non-empty unique name and at least one signature; every
/// signature needs at least one id. Lengths are capped at `MAX_PAYLOAD`.
pub fn load_fingerprint_toml(s: &str) -> eyre::Result<FingerprintTable> {
    let raw: FingerprintToml =
        toml::from_str(s).map_err(|e| eyre::eyre!("parse fingerprint table: {e}"))?;
    let mut seen = HashSet::new();
    let mut cars = Vec::with_capacity(raw.car.len());
    for (idx, car) in raw.car.into_iter().enumerate() {
        let name = car.name.trim().to_string();
        if name.is_empty() {
            eyre::bail!("car #{} has an empty name", idx + 1);
        }
        if !seen.insert(name.clone()) {
            eyre::bail!("car {name} is declared twice");
        }
        if car.signature.is_empty() {
            eyre::bail!("car {name} declares no signatures");
        }
        let mut signatures = Vec::with_capacity(car.signature.len());
        for (sidx, sig) in car.signature.into_iter().enumerate() {
            let mut entries = Vec::new();
            for (bus, ids) in sig {
                let channel = parse_bus_key(&bus).map_err(|e| eyre::eyre!("car {name}: {e}"))?;
                for (key, len) in ids {
                    let id = parse_id(&key).map_err(|e| eyre::eyre!("car {name}: {e}"))?;
                    if usize::from(len) > MAX_PAYLOAD {
                        eyre::bail!(
                            "car {name}: length {len} for {key} exceeds {MAX_PAYLOAD} bytes"
                        );
                    }
                    entries.push(SignatureEntry { channel, id, len });
                }
            }
            if entries.is_empty() {
                eyre::bail!("car {name}: signature #{} is empty", sidx + 1);
            }
            signatures.push(entries);
        }
        cars.push(CarFingerprints { name, signatures });
    }
    Ok(FingerprintTable { cars })
}

pub fn load_fingerprint_file(path: &std::path::Path) -> eyre::Result<FingerprintTable> {
    let s = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read fingerprint table {:?}: {}", path, e))?;
    load_fingerprint_toml(&s)
}

// ── Bus logs ─────────────────────────────────────────────────────────────────

/// Bus log CSV schema.
///
/// Expected headers:
/// t_ms,channel,id,data
///
/// Example:
/// t_ms,channel,id,data
/// 0,0,0x1c4,0000000000000000
/// 10,1,0x2e4,0000000000
#[derive(Debug, Deserialize)]
struct BusLogRow {
    t_ms: u64,
    channel: u8,
    id: String,
    data: String,
}

/// One timestamped frame from a bus log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedFrame {
    pub t_ms: u64,
    pub channel: u8,
    pub id: u32,
    pub data: Vec<u8>,
}

/// Read a bus log, enforcing exact headers. Row numbers in errors are 1-based
/// and count the header line.
pub fn read_bus_log<R: std::io::Read>(reader: R) -> eyre::Result<Vec<LoggedFrame>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers: {}", e))?
        .clone();
    let expected = ["t_ms", "channel", "id", "data"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "bus log CSV must have headers 't_ms,channel,id,data', got: {}",
            actual.join(",")
        );
    }

    let mut frames = Vec::new();
    for (idx, rec) in rdr.deserialize::<BusLogRow>().enumerate() {
        let row = rec.map_err(|e| eyre::eyre!("invalid CSV row {}: {}", idx + 2, e))?;
        let id = parse_id(&row.id).map_err(|e| eyre::eyre!("invalid CSV row {}: {}", idx + 2, e))?;
        let data = parse_hex_payload(&row.data)
            .map_err(|e| eyre::eyre!("invalid CSV row {}: {}", idx + 2, e))?;
        frames.push(LoggedFrame {
            t_ms: row.t_ms,
            channel: row.channel,
            id,
            data,
        });
    }
    Ok(frames)
}

pub fn load_bus_log_csv(path: &std::path::Path) -> eyre::Result<Vec<LoggedFrame>> {
    let file = std::fs::File::open(path)
        .map_err(|e| eyre::eyre!("open bus log CSV {:?}: {}", path, e))?;
    read_bus_log(file)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Fingerprint
        let fp = &self.fingerprint;
        if fp.max_frames == 0 {
            eyre::bail!("fingerprint.max_frames must be >= 1");
        }
        if fp.settle_frames > fp.max_frames {
            eyre::bail!("fingerprint.settle_frames must be <= fingerprint.max_frames");
        }
        if fp.timeout_ms == 0 {
            eyre::bail!("fingerprint.timeout_ms must be >= 1");
        }
        if fp.timeout_ms > 10 * 60 * 1000 {
            eyre::bail!("fingerprint.timeout_ms is unreasonably large (>10min)");
        }
        if fp.read_timeout_ms == 0 || fp.read_timeout_ms > fp.timeout_ms {
            eyre::bail!("fingerprint.read_timeout_ms must be in [1, fingerprint.timeout_ms]");
        }
        if fp.channels == 0 || fp.channels > 8 {
            eyre::bail!("fingerprint.channels must be in [1, 8]");
        }
        if fp.max_id == 0 || fp.max_id > MAX_EXTENDED_ID + 1 {
            eyre::bail!("fingerprint.max_id must be in [1, 0x20000000]");
        }

        // Cycle
        if self.cycle.rate_hz == 0 || self.cycle.rate_hz > 1000 {
            eyre::bail!("cycle.rate_hz must be in [1, 1000]");
        }

        // Logging
        if let Some(r) = self.logging.rotation.as_deref()
            && !matches!(r, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("0x1c4", 0x1C4)]
    #[case("0X1C4", 0x1C4)]
    #[case("452", 452)]
    #[case(" 0x7df ", 0x7DF)]
    fn parses_ids(#[case] s: &str, #[case] want: u32) {
        assert_eq!(parse_id(s).unwrap(), want);
    }

    #[rstest]
    #[case("0xzz")]
    #[case("0x20000000")]
    #[case("")]
    fn rejects_bad_ids(#[case] s: &str) {
        assert!(parse_id(s).is_err());
    }

    #[test]
    fn parses_payloads() {
        assert_eq!(parse_hex_payload("0a1B").unwrap(), vec![0x0A, 0x1B]);
        assert!(parse_hex_payload("").unwrap().is_empty());
        assert!(parse_hex_payload("abc").is_err());
        assert!(parse_hex_payload("zz").is_err());
    }

    #[rstest]
    #[case("0x0a1b", Ok(vec![0x0A, 0x1B]))]
    #[case("0X00ff", Ok(vec![0x00, 0xFF]))]
    #[case(" 7f ", Ok(vec![0x7F]))]
    #[case("abc", Err("odd number of hex digits"))]
    #[case("0xg0", Err("is not hex"))]
    fn decodes_prefixed_payloads(#[case] s: &str, #[case] want: Result<Vec<u8>, &str>) {
        match (parse_hex_payload(s), want) {
            (Ok(got), Ok(want)) => assert_eq!(got, want),
            (Err(got), Err(needle)) => assert!(got.contains(needle), "{got}"),
            (got, want) => panic!("{s:?}: got {got:?}, want {want:?}"),
        }
    }

    #[test]
    fn oversized_payloads_are_rejected_before_decoding() {
        let s = "00".repeat(MAX_PAYLOAD + 1);
        let err = parse_hex_payload(&s).unwrap_err();
        assert!(err.contains(&format!("exceeds {MAX_PAYLOAD} bytes")), "{err}");
        assert_eq!(parse_hex_payload(&"ab".repeat(MAX_PAYLOAD)).unwrap().len(), MAX_PAYLOAD);
    }
}
