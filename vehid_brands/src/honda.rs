//! Honda: torque steering with nibble checksums, optional pedal interceptor,
//! and the passive Nidec radar on channel 1. Bosch-radar models keep the
//! radar off the bus.

use std::collections::BTreeMap;

use vehid_core::StandardInterface;
use vehid_core::fingerprint::BusSignature;
use vehid_core::params::{AuxRule, HardwareOverride, ParamsTemplate};
use vehid_core::parser::{CanParser, MessageSpec};
use vehid_core::registry::{
    ControllerCtor, Factory, InterfaceCtor, InterfaceEntry, RadarCtor, StateCtor,
};
use vehid_traits::{
    Brand, CanFrame, CarControl, CarController, CarParams, CarState, ControlCommand, Fingerprint,
    LateralTuning, PidTuning, RadarError, RadarInterface, RadarPoint, RadarReading,
    SteerControlType, SteerTarget, VehicleIdentity, VehicleState,
};

use crate::BrandTables;
use crate::checksum::{honda_ok, seal_honda, seal_pedal};
use crate::util::{
    LB_TO_KG, STD_CARGO_KG, TorqueLimits, accel_command, counter, limit_torque, mean_kph_to_ms,
};

pub const CIVIC: VehicleIdentity = VehicleIdentity::from_static("HONDA CIVIC 2016");
pub const ACCORD: VehicleIdentity = VehicleIdentity::from_static("HONDA ACCORD 2018");
pub const CRV: VehicleIdentity = VehicleIdentity::from_static("HONDA CR-V 2016");

pub mod msg {
    pub const STEERING_CONTROL: u32 = 0xE4;
    pub const STEERING_SENSORS: u32 = 0x156;
    pub const ENGINE_DATA: u32 = 0x158;
    pub const POWERTRAIN_DATA: u32 = 0x17C;
    pub const STEER_STATUS: u32 = 0x18F;
    pub const GAS_PEDAL_2: u32 = 0x1C4;
    pub const GAS_COMMAND: u32 = 0x200;
    pub const GAS_SENSOR: u32 = 0x201;
    pub const SCM_FEEDBACK: u32 = 0x326;
    pub const LKAS_HUD: u32 = 0x33D;
    /// Blind-spot monitor, extended frame.
    pub const BSM_STATUS: u32 = 0x12F8_BFA7;
    pub const RADAR_DIAGNOSTIC: u32 = 0x400;
    pub const RADAR_TRACKS: std::ops::RangeInclusive<u32> = 0x430..=0x439;
}

pub const RADAR_CHANNEL: u8 = 1;

const STEER_LIMITS: TorqueLimits = TorqueLimits {
    max: 3840,
    error_max: None,
};
const ACCEL_MIN: f32 = -4.0;
const ACCEL_MAX: f32 = 1.6;
/// Interceptor reading (average of both sensors) above which gas is pressed.
const INTERCEPTOR_THRESHOLD: u32 = 492;

const POWERTRAIN: &[(u32, u8)] = &[
    (msg::STEERING_CONTROL, 5),
    (msg::STEERING_SENSORS, 6),
    (msg::ENGINE_DATA, 8),
    (msg::POWERTRAIN_DATA, 8),
    (msg::STEER_STATUS, 7),
    (msg::GAS_PEDAL_2, 4),
    (msg::SCM_FEEDBACK, 8),
];
const NIDEC: &[(u32, u8)] = &[(msg::RADAR_DIAGNOSTIC, 8), (0x430, 8), (0x431, 8)];

fn signature(hud_len: u8, nidec: bool) -> BusSignature {
    let sig = Fingerprint::new()
        .with_channel(0, POWERTRAIN)
        .with_channel(0, &[(msg::LKAS_HUD, hud_len)]);
    if nidec {
        sig.with_channel(RADAR_CHANNEL, NIDEC)
    } else {
        sig
    }
}

fn template(mass_lb: f32, wheelbase: f32, steer_ratio: f32, kp: f32, ki: f32) -> ParamsTemplate {
    ParamsTemplate {
        mass: mass_lb * LB_TO_KG + STD_CARGO_KG,
        wheelbase,
        center_to_front: wheelbase * 0.4,
        steer_ratio,
        tuning: Some(LateralTuning::Pid(PidTuning {
            kp_bp: vec![0.0],
            kp_v: vec![kp],
            ki_bp: vec![0.0],
            ki_v: vec![ki],
            kf: 0.000_06,
        })),
        aux_rules: vec![AuxRule::new(0, msg::GAS_SENSOR, HardwareOverride::GasInterceptor)],
        ..ParamsTemplate::new(Brand::Honda, SteerControlType::Torque)
    }
}

pub fn tables() -> BrandTables {
    let mut accord = template(3279.0, 2.83, 16.33, 0.6, 0.18);
    accord.radar_off_can = true;
    accord
        .aux_rules
        .push(AuxRule::new(0, msg::BSM_STATUS, HardwareOverride::BlindSpot));
    BrandTables {
        brand: Brand::Honda,
        fingerprints: vec![
            (CIVIC, vec![signature(5, true)]),
            (ACCORD, vec![signature(6, false)]),
            (CRV, vec![signature(7, true)]),
        ],
        templates: vec![
            (CIVIC, template(2923.0, 2.70, 15.38, 0.8, 0.24)),
            (ACCORD, accord),
            (CRV, template(3572.0, 2.62, 16.89, 0.8, 0.24)),
        ],
        entry: InterfaceEntry {
            interface: Factory::new(Brand::Honda, StandardInterface::boxed as InterfaceCtor),
            controller: Factory::new(Brand::Honda, controller as ControllerCtor),
            state: Factory::new(Brand::Honda, state as StateCtor),
        },
        radar: Some(Factory::new(Brand::Honda, radar as RadarCtor)),
    }
}

fn controller(p: &CarParams) -> Box<dyn CarController> {
    Box::new(HondaController::new(p))
}

fn state(p: &CarParams) -> Box<dyn CarState> {
    Box::new(HondaState::new(p))
}

fn radar(_: &CarParams) -> Box<dyn RadarInterface> {
    Box::new(NidecRadar::default())
}

// ── State ────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct HondaState {
    parser: CanParser,
    interceptor: bool,
    cycle: u64,
}

impl HondaState {
    pub fn new(p: &CarParams) -> Self {
        // 2-bit rolling counter above the checksum nibble of the last byte.
        let counted = |id, len: u8| {
            MessageSpec::checked(id, len, honda_ok).with_counter(usize::from(len) - 1, 4, 2)
        };
        let mut specs = vec![
            counted(msg::STEERING_SENSORS, 6),
            counted(msg::ENGINE_DATA, 8),
            counted(msg::POWERTRAIN_DATA, 8),
            counted(msg::STEER_STATUS, 7),
            counted(msg::SCM_FEEDBACK, 8),
        ];
        if p.enable_gas_interceptor {
            specs.push(MessageSpec::new(msg::GAS_SENSOR, 6));
        }
        Self {
            parser: CanParser::new(0, &specs),
            interceptor: p.enable_gas_interceptor,
            cycle: 0,
        }
    }

    fn gas_pressed(&self) -> bool {
        let p = &self.parser;
        if self.interceptor {
            match (p.be_u16(msg::GAS_SENSOR, 0), p.be_u16(msg::GAS_SENSOR, 2)) {
                (Some(a), Some(b)) => (u32::from(a) + u32::from(b)) / 2 > INTERCEPTOR_THRESHOLD,
                _ => false,
            }
        } else {
            p.byte(msg::POWERTRAIN_DATA, 4).is_some_and(|b| b & 0x80 != 0)
        }
    }
}

impl CarState for HondaState {
    fn brand(&self) -> Brand {
        Brand::Honda
    }

    fn update(&mut self, frames: &[CanFrame]) -> VehicleState {
        self.cycle += 1;
        self.parser.update(frames);
        let p = &self.parser;
        let speed = p
            .be_u16(msg::ENGINE_DATA, 0)
            .map(|raw| f32::from(raw) * 0.01);
        VehicleState {
            cycle: self.cycle,
            v_ego: mean_kph_to_ms(&[speed]),
            steering_angle_deg: p
                .be_i16(msg::STEERING_SENSORS, 0)
                .map_or(0.0, |raw| f32::from(raw) * -0.1),
            steering_torque: p.be_i16(msg::STEER_STATUS, 0).map_or(0.0, f32::from),
            steering_torque_eps: p.be_i16(msg::STEER_STATUS, 2).map_or(0.0, f32::from),
            gas_pressed: self.gas_pressed(),
            brake_pressed: p
                .byte(msg::POWERTRAIN_DATA, 4)
                .is_some_and(|b| b & 0x20 != 0),
            cruise_available: p.byte(msg::SCM_FEEDBACK, 3).is_some_and(|b| b & 0x10 != 0),
            can_valid: p.can_valid(),
        }
    }
}

// ── Controller ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct HondaController {
    interceptor: bool,
}

impl HondaController {
    pub fn new(p: &CarParams) -> Self {
        Self {
            interceptor: p.enable_gas_interceptor,
        }
    }
}

impl CarController for HondaController {
    fn brand(&self) -> Brand {
        Brand::Honda
    }

    fn apply(&self, cc: &CarControl, cs: &VehicleState) -> ControlCommand {
        let torque = if cc.enabled {
            limit_torque(cc.actuators.steer, cs.steering_torque_eps, STEER_LIMITS)
        } else {
            0
        };
        let accel = accel_command(cc.enabled, cc.actuators.accel, ACCEL_MIN, ACCEL_MAX);
        let count = counter(cs, 2);
        let mut frames = vec![steering_control(count, cc.enabled, torque)];
        if self.interceptor {
            let gas = if accel > 0.0 { accel / ACCEL_MAX } else { 0.0 };
            frames.push(gas_command(counter(cs, 4), cc.enabled, gas));
        }
        ControlCommand {
            enabled: cc.enabled,
            steer: if cc.enabled {
                SteerTarget::Torque(torque)
            } else {
                SteerTarget::Inactive
            },
            accel,
            frames,
        }
    }
}

fn steering_control(count: u8, request: bool, torque: i16) -> CanFrame {
    let t = torque.to_be_bytes();
    let flags = if request { 0x80 } else { 0x00 };
    let mut d = [t[0], t[1], flags, 0, (count & 0x3) << 4];
    seal_honda(msg::STEERING_CONTROL, &mut d);
    CanFrame::new(0, msg::STEERING_CONTROL, d)
}

/// Pedal interceptor command: two redundant readings, the second doubled.
fn gas_command(count: u8, enable: bool, gas: f32) -> CanFrame {
    let raw = (gas.clamp(0.0, 1.0) * 1000.0).round() as u16;
    let a = raw.to_be_bytes();
    let b = raw.saturating_mul(2).to_be_bytes();
    let flags = if enable { 0x80 } else { 0x00 };
    let mut d = [a[0], a[1], b[0], b[1], flags | (count & 0xF), 0];
    seal_pedal(msg::GAS_COMMAND, &mut d);
    CanFrame::new(0, msg::GAS_COMMAND, d)
}

// ── Radar ────────────────────────────────────────────────────────────────────

/// Nidec radar: tracks stream continuously, the diagnostic frame closes a scan.
#[derive(Debug, Default)]
pub struct NidecRadar {
    tracks: BTreeMap<u32, RadarPoint>,
}

impl RadarInterface for NidecRadar {
    fn update(&mut self, frames: &[CanFrame]) -> RadarReading {
        let mut errors = Vec::new();
        let mut status_seen = false;
        for frame in frames.iter().filter(|f| f.channel == RADAR_CHANNEL) {
            let is_status = frame.id == msg::RADAR_DIAGNOSTIC;
            if !is_status && !msg::RADAR_TRACKS.contains(&frame.id) {
                continue;
            }
            if frame.data.len() != 8 {
                errors.push(RadarError::Malformed {
                    id: frame.id,
                    len: frame.data.len(),
                });
                continue;
            }
            if is_status {
                status_seen = true;
                if frame.byte(0).is_some_and(|b| b != 0) {
                    errors.push(RadarError::Fault);
                }
                continue;
            }
            let track_id = frame.id - msg::RADAR_TRACKS.start();
            // 12-bit distance, 1/16 m per bit; 255 m and above means no target.
            let d_rel = frame
                .be_u16(0)
                .map_or(f32::MAX, |raw| f32::from(raw >> 4) * 0.0625);
            if d_rel < 255.0 {
                self.tracks.insert(
                    track_id,
                    RadarPoint {
                        track_id,
                        d_rel,
                        y_rel: frame.be_i16(2).map_or(0.0, |raw| f32::from(raw) * -0.01),
                        v_rel: frame.be_i16(4).map_or(0.0, |raw| f32::from(raw) * 0.031_25),
                    },
                );
            } else {
                self.tracks.remove(&track_id);
            }
        }
        if !status_seen {
            return RadarReading {
                errors,
                ..RadarReading::default()
            };
        }
        RadarReading {
            points: self.tracks.values().copied().collect(),
            valid: !errors.contains(&RadarError::Fault),
            errors,
        }
    }
}
