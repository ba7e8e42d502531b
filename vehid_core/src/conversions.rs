//! `From`/`TryFrom` implementations bridging `vehid_config` types to
//! `vehid_core` types.

use vehid_traits::Fingerprint;

use crate::config::{CycleCfg, IdentifyCfg, MatchCfg};
use crate::error::Report;
use crate::fingerprint::{BusSignature, FingerprintDatabase};

// ── Identification ───────────────────────────────────────────────────────────

impl From<&vehid_config::FingerprintCfg> for MatchCfg {
    fn from(c: &vehid_config::FingerprintCfg) -> Self {
        Self {
            channels: c.channels,
            max_id: c.max_id,
            ignore_ids: c.ignore_ids.clone(),
            settle_frames: c.settle_frames,
        }
    }
}

impl From<&vehid_config::FingerprintCfg> for IdentifyCfg {
    fn from(c: &vehid_config::FingerprintCfg) -> Self {
        Self {
            matcher: MatchCfg::from(c),
            max_frames: c.max_frames,
            timeout_ms: c.timeout_ms,
            read_timeout_ms: c.read_timeout_ms,
            allow_ambiguous: c.allow_ambiguous,
        }
    }
}

// ── Cycle ────────────────────────────────────────────────────────────────────

impl From<&vehid_config::CycleCfg> for CycleCfg {
    fn from(c: &vehid_config::CycleCfg) -> Self {
        Self { rate_hz: c.rate_hz }
    }
}

// ── Fingerprint tables ───────────────────────────────────────────────────────

impl TryFrom<&vehid_config::FingerprintTable> for FingerprintDatabase {
    type Error = Report;

    fn try_from(t: &vehid_config::FingerprintTable) -> Result<Self, Self::Error> {
        t.cars
            .iter()
            .fold(FingerprintDatabase::builder(), |b, car| {
                let sigs = car
                    .signatures
                    .iter()
                    .map(|entries| {
                        let mut sig: BusSignature = Fingerprint::new();
                        for e in entries {
                            sig.insert(e.channel, e.id, e.len);
                        }
                        sig
                    })
                    .collect();
                b.add(car.name.clone().into(), sigs)
            })
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_match_core_defaults() {
        let cfg = vehid_config::FingerprintCfg::default();
        let core = IdentifyCfg::from(&cfg);
        let def = IdentifyCfg::default();
        assert_eq!(core.max_frames, def.max_frames);
        assert_eq!(core.timeout_ms, def.timeout_ms);
        assert_eq!(core.matcher.ignore_ids, def.matcher.ignore_ids);
        assert_eq!(core.matcher.max_id, def.matcher.max_id);
        assert_eq!(core.matcher.settle_frames, def.matcher.settle_frames);
    }

    #[test]
    fn table_converts_in_file_order() {
        let table = vehid_config::load_fingerprint_toml(
            r#"
[[car]]
name = "B"
[[car.signature]]
bus0 = { "0x10" = 8 }
bus2 = { "0x20" = 2 }

[[car]]
name = "A"
[[car.signature]]
bus0 = { "0x10" = 4 }
"#,
        )
        .unwrap();
        let db = FingerprintDatabase::try_from(&table).unwrap();
        assert_eq!(db.position(&"B".into()), Some(0));
        let b = db.get(&"B".into()).unwrap();
        assert_eq!(b.canonical().get(2, 0x20), Some(2));
    }
}
