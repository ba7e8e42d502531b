//! The explicit "no car" vehicle: decodes nothing and echoes the command.

use vehid_core::mocks::echo_entry;
use vehid_core::params::ParamsTemplate;
use vehid_traits::{Brand, LateralTuning, PidTuning, SteerControlType, VehicleIdentity};

use crate::BrandTables;

/// Never fingerprinted; reachable only through `SessionBuilder::mock`.
pub fn tables() -> BrandTables {
    BrandTables {
        brand: Brand::Mock,
        fingerprints: Vec::new(),
        templates: vec![(
            VehicleIdentity::MOCK,
            ParamsTemplate {
                mass: 1700.0,
                wheelbase: 2.70,
                center_to_front: 2.70 * 0.5,
                steer_ratio: 13.0,
                radar_off_can: true,
                tuning: Some(LateralTuning::Pid(PidTuning {
                    kp_bp: vec![0.0],
                    kp_v: vec![0.0],
                    ki_bp: vec![0.0],
                    ki_v: vec![0.0],
                    kf: 0.0,
                })),
                ..ParamsTemplate::new(Brand::Mock, SteerControlType::Torque)
            },
        )],
        entry: echo_entry(Brand::Mock),
        radar: None,
    }
}
