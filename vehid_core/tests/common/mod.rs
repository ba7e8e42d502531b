#![allow(dead_code)]
//! Shared fixtures: a small fingerprint table whose identities pairwise
//! conflict on a shared id, plus a mock catalog wired to the echo triple.

use vehid_core::fingerprint::BusSignature;
use vehid_core::mocks::echo_entry;
use vehid_core::params::{ParamsTable, ParamsTemplate};
use vehid_core::registry::{InterfaceRegistry, RadarRegistry};
use vehid_core::{Catalog, FingerprintDatabase};
use vehid_traits::{
    Brand, CanFrame, Fingerprint, LateralTuning, PidTuning, SteerControlType, VehicleIdentity,
};

pub const NAMES: [&str; 4] = ["ALPHA", "BRAVO", "CHARLIE", "DELTA"];

/// Every signature carries 0x100 with a distinct length, so any two
/// identities conflict there.
pub fn signature(i: usize) -> BusSignature {
    let len = u8::try_from(i + 1).unwrap();
    Fingerprint::new()
        .with_channel(0, &[(0x100, len), (0x200 + i as u32, 8), (0x300, 4)])
        .with_channel(1, &[(0x400, len + 2)])
        .with_channel(2, &[(0x500 + i as u32, 3)])
}

pub fn database() -> FingerprintDatabase {
    NAMES
        .iter()
        .enumerate()
        .fold(FingerprintDatabase::builder(), |b, (i, n)| {
            b.add((*n).into(), vec![signature(i)])
        })
        .build()
        .unwrap()
}

pub fn template() -> ParamsTemplate {
    ParamsTemplate {
        mass: 1400.0,
        wheelbase: 2.6,
        center_to_front: 1.1,
        steer_ratio: 14.5,
        tuning: Some(LateralTuning::Pid(PidTuning {
            kp_bp: vec![0.0, 20.0],
            kp_v: vec![0.2, 0.3],
            ki_bp: vec![0.0],
            ki_v: vec![0.05],
            kf: 0.00006,
        })),
        radar_off_can: true,
        ..ParamsTemplate::new(Brand::Mock, SteerControlType::Torque)
    }
}

pub fn catalog() -> Catalog {
    let mut interfaces = InterfaceRegistry::builder();
    let mut params = ParamsTable::builder();
    for n in NAMES.iter().copied().map(VehicleIdentity::from_static) {
        interfaces = interfaces.register(n.clone(), echo_entry(Brand::Mock));
        params = params.add(n, template());
    }
    Catalog::new(
        database(),
        interfaces.build().unwrap(),
        RadarRegistry::builder().build().unwrap(),
        params.build().unwrap(),
    )
}

pub fn frames_of(sig: &BusSignature) -> Vec<CanFrame> {
    sig.to_frames()
}
