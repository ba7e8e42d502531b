//! Nissan: angle steering. The radar is not on a bus we read, so sessions
//! get the no-op ranging interface.

use vehid_core::StandardInterface;
use vehid_core::fingerprint::BusSignature;
use vehid_core::params::ParamsTemplate;
use vehid_core::parser::{CanParser, MessageSpec};
use vehid_core::registry::{ControllerCtor, Factory, InterfaceCtor, InterfaceEntry, StateCtor};
use vehid_traits::{
    Brand, CanFrame, CarControl, CarController, CarParams, CarState, ControlCommand, Fingerprint,
    SteerControlType, SteerTarget, VehicleIdentity, VehicleState,
};

use crate::BrandTables;
use crate::util::{STD_CARGO_KG, accel_command, counter, interp, mean_kph_to_ms};

pub const LEAF: VehicleIdentity = VehicleIdentity::from_static("NISSAN LEAF 2018");
pub const XTRAIL: VehicleIdentity = VehicleIdentity::from_static("NISSAN X-TRAIL 2017");

pub mod msg {
    pub const STEER_ANGLE_SENSOR: u32 = 0x2;
    pub const GAS_PEDAL: u32 = 0x15C;
    pub const LKAS: u32 = 0x169;
    pub const STEER_TORQUE_SENSOR: u32 = 0x16B;
    pub const BCM: u32 = 0x1C4;
    pub const CRUISE_STATE: u32 = 0x239;
    pub const WHEEL_SPEED_REAR: u32 = 0x285;
    pub const PROPILOT_HUD: u32 = 0x2DE;
    pub const BRAKE_PEDAL: u32 = 0x454;
}

/// Largest angle step per cycle, scheduled on speed (m/s).
const ANGLE_DELTA_BP: [f32; 3] = [0.0, 5.0, 15.0];
const ANGLE_DELTA_V: [f32; 3] = [5.0, 0.8, 0.15];
/// Angle field range: signed 16 bits at 0.01 deg.
const ANGLE_MAX_DEG: f32 = 327.67;
const ACCEL_MIN: f32 = -3.5;
const ACCEL_MAX: f32 = 2.0;

const CHASSIS: &[(u32, u8)] = &[
    (msg::STEER_ANGLE_SENSOR, 5),
    (msg::GAS_PEDAL, 8),
    (msg::LKAS, 8),
    (msg::STEER_TORQUE_SENSOR, 8),
    (msg::BCM, 2),
    (msg::CRUISE_STATE, 8),
    (msg::WHEEL_SPEED_REAR, 8),
    (msg::BRAKE_PEDAL, 8),
];

fn signature(hud_len: u8) -> BusSignature {
    Fingerprint::new()
        .with_channel(0, CHASSIS)
        .with_channel(0, &[(msg::PROPILOT_HUD, hud_len)])
}

fn template(mass: f32) -> ParamsTemplate {
    ParamsTemplate {
        mass: mass + STD_CARGO_KG,
        wheelbase: 2.705,
        center_to_front: 2.705 * 0.44,
        steer_ratio: 17.0,
        radar_off_can: true,
        ..ParamsTemplate::new(Brand::Nissan, SteerControlType::Angle)
    }
}

pub fn tables() -> BrandTables {
    BrandTables {
        brand: Brand::Nissan,
        fingerprints: vec![(LEAF, vec![signature(6)]), (XTRAIL, vec![signature(8)])],
        templates: vec![(LEAF, template(1580.0)), (XTRAIL, template(1610.0))],
        entry: InterfaceEntry {
            interface: Factory::new(Brand::Nissan, StandardInterface::boxed as InterfaceCtor),
            controller: Factory::new(Brand::Nissan, controller as ControllerCtor),
            state: Factory::new(Brand::Nissan, state as StateCtor),
        },
        radar: None,
    }
}

fn controller(_: &CarParams) -> Box<dyn CarController> {
    Box::new(NissanController)
}

fn state(_: &CarParams) -> Box<dyn CarState> {
    Box::new(NissanState::new())
}

#[derive(Debug)]
pub struct NissanState {
    parser: CanParser,
    cycle: u64,
}

impl NissanState {
    pub fn new() -> Self {
        Self {
            parser: CanParser::new(
                0,
                &[
                    MessageSpec::new(msg::STEER_ANGLE_SENSOR, 5),
                    MessageSpec::new(msg::GAS_PEDAL, 8),
                    MessageSpec::new(msg::STEER_TORQUE_SENSOR, 8),
                    MessageSpec::new(msg::CRUISE_STATE, 8),
                    MessageSpec::new(msg::WHEEL_SPEED_REAR, 8),
                    MessageSpec::new(msg::BRAKE_PEDAL, 8),
                ],
            ),
            cycle: 0,
        }
    }
}

impl Default for NissanState {
    fn default() -> Self {
        Self::new()
    }
}

impl CarState for NissanState {
    fn brand(&self) -> Brand {
        Brand::Nissan
    }

    fn update(&mut self, frames: &[CanFrame]) -> VehicleState {
        self.cycle += 1;
        self.parser.update(frames);
        let p = &self.parser;
        let wheel = |at| {
            p.be_u16(msg::WHEEL_SPEED_REAR, at)
                .map(|raw| f32::from(raw) * 0.005)
        };
        VehicleState {
            cycle: self.cycle,
            v_ego: mean_kph_to_ms(&[wheel(0), wheel(2)]),
            steering_angle_deg: p
                .be_i16(msg::STEER_ANGLE_SENSOR, 0)
                .map_or(0.0, |raw| f32::from(raw) * -0.1),
            steering_torque: p
                .be_i16(msg::STEER_TORQUE_SENSOR, 0)
                .map_or(0.0, f32::from),
            steering_torque_eps: 0.0,
            gas_pressed: p.byte(msg::GAS_PEDAL, 0).is_some_and(|b| b > 3),
            brake_pressed: p.byte(msg::BRAKE_PEDAL, 0).is_some_and(|b| b > 3),
            cruise_available: p.byte(msg::CRUISE_STATE, 1).is_some_and(|b| b & 0x01 != 0),
            can_valid: p.can_valid(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NissanController;

impl NissanController {
    /// Step from the measured angle toward the request, bounded per cycle.
    fn limit_angle(request: f32, cs: &VehicleState) -> f32 {
        let current = if cs.steering_angle_deg.is_finite() {
            cs.steering_angle_deg.clamp(-ANGLE_MAX_DEG, ANGLE_MAX_DEG)
        } else {
            0.0
        };
        let request = if request.is_finite() { request } else { current };
        let delta = interp(cs.v_ego.abs(), &ANGLE_DELTA_BP, &ANGLE_DELTA_V);
        request
            .clamp(current - delta, current + delta)
            .clamp(-ANGLE_MAX_DEG, ANGLE_MAX_DEG)
    }
}

impl CarController for NissanController {
    fn brand(&self) -> Brand {
        Brand::Nissan
    }

    fn apply(&self, cc: &CarControl, cs: &VehicleState) -> ControlCommand {
        let (steer, angle) = if cc.enabled {
            let a = Self::limit_angle(cc.actuators.steering_angle_deg, cs);
            (SteerTarget::Angle(a), a)
        } else {
            (SteerTarget::Inactive, cs.steering_angle_deg)
        };
        ControlCommand {
            enabled: cc.enabled,
            steer,
            accel: accel_command(cc.enabled, cc.actuators.accel, ACCEL_MIN, ACCEL_MAX),
            frames: vec![lkas(counter(cs, 4), cc.enabled, angle)],
        }
    }
}

fn lkas(count: u8, active: bool, angle: f32) -> CanFrame {
    let a = if angle.is_finite() {
        (angle.clamp(-ANGLE_MAX_DEG, ANGLE_MAX_DEG) * 100.0).round() as i16
    } else {
        0
    };
    let [hi, lo] = a.to_be_bytes();
    let flags = if active { 0x80 } else { 0x00 };
    CanFrame::new(0, msg::LKAS, [hi, lo, flags, 0, 0, 0, count & 0xF, 0])
}
