//! Test and helper mocks for vehid_core.
//!
//! The echo triple decodes nothing and actuates nothing; it mirrors the
//! command back so the cycle contract can be exercised without a brand.

use vehid_traits::{
    Brand, CarControl, CarController, CarParams, CarState, ControlCommand, FingerprintMeta,
    LateralTuning, PidTuning, SteerControlType, SteerTarget, VehicleState,
};

use crate::interface::StandardInterface;
use crate::registry::{ControllerCtor, Factory, InterfaceCtor, InterfaceEntry, StateCtor};

/// Counts cycles; valid whenever any frame arrived.
#[derive(Debug)]
pub struct EchoState {
    brand: Brand,
    cycle: u64,
}

impl EchoState {
    pub fn new(brand: Brand) -> Self {
        Self { brand, cycle: 0 }
    }
}

impl CarState for EchoState {
    fn brand(&self) -> Brand {
        self.brand
    }

    fn update(&mut self, frames: &[vehid_traits::CanFrame]) -> VehicleState {
        self.cycle += 1;
        VehicleState {
            cycle: self.cycle,
            can_valid: !frames.is_empty(),
            ..VehicleState::default()
        }
    }
}

/// Echoes the actuators as a torque target scaled to +/-1000.
#[derive(Debug)]
pub struct EchoController {
    brand: Brand,
}

impl EchoController {
    pub fn new(brand: Brand) -> Self {
        Self { brand }
    }
}

impl CarController for EchoController {
    fn brand(&self) -> Brand {
        self.brand
    }

    fn apply(&self, cc: &CarControl, _cs: &VehicleState) -> ControlCommand {
        let steer = if cc.enabled {
            SteerTarget::Torque((cc.actuators.steer.clamp(-1.0, 1.0) * 1000.0) as i16)
        } else {
            SteerTarget::Inactive
        };
        ControlCommand {
            enabled: cc.enabled,
            steer,
            accel: if cc.enabled { cc.actuators.accel } else { 0.0 },
            frames: Vec::new(),
        }
    }
}

fn echo_controller(p: &CarParams) -> Box<dyn CarController> {
    Box::new(EchoController::new(p.brand))
}

fn echo_state(p: &CarParams) -> Box<dyn CarState> {
    Box::new(EchoState::new(p.brand))
}

/// Registry entry wiring the echo triple under `brand`.
pub fn echo_entry(brand: Brand) -> InterfaceEntry {
    InterfaceEntry {
        interface: Factory::new(brand, StandardInterface::boxed as InterfaceCtor),
        controller: Factory::new(brand, echo_controller as ControllerCtor),
        state: Factory::new(brand, echo_state as StateCtor),
    }
}

/// Valid parameters for a mock-brand vehicle called `name`.
pub fn echo_params(name: &str) -> CarParams {
    CarParams {
        car_name: name.into(),
        brand: Brand::Mock,
        mass: 1500.0,
        wheelbase: 2.7,
        center_to_front: 1.2,
        steer_ratio: 15.0,
        steer_rate_cost: 0.5,
        steer_control_type: SteerControlType::Torque,
        lateral_tuning: LateralTuning::Pid(PidTuning {
            kp_bp: vec![0.0],
            kp_v: vec![0.2],
            ki_bp: vec![0.0],
            ki_v: vec![0.05],
            kf: 0.0,
        }),
        radar_off_can: true,
        enable_gas_interceptor: false,
        enable_bsm: false,
        fingerprint: FingerprintMeta::default(),
    }
}
