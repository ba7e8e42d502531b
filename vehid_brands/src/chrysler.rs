//! Chrysler / Jeep: torque steering with CRC-8 checked frames and a polling
//! radar on channel 1 whose tracks are split over two interleaved message
//! ranges.

use std::collections::BTreeMap;

use vehid_core::StandardInterface;
use vehid_core::fingerprint::BusSignature;
use vehid_core::params::ParamsTemplate;
use vehid_core::parser::{CanParser, MessageSpec};
use vehid_core::registry::{
    ControllerCtor, Factory, InterfaceCtor, InterfaceEntry, RadarCtor, StateCtor,
};
use vehid_traits::{
    Brand, CanFrame, CarControl, CarController, CarParams, CarState, ControlCommand, Fingerprint,
    LateralTuning, PidTuning, PollingRadar, RadarError, RadarInterface, RadarPoint, RadarReading,
    SteerControlType, SteerTarget, VehicleIdentity, VehicleState,
};

use crate::BrandTables;
use crate::checksum::{chrysler_ok, seal_chrysler};
use crate::util::{STD_CARGO_KG, TorqueLimits, accel_command, counter, limit_torque, mean_kph_to_ms};

pub const PACIFICA: VehicleIdentity = VehicleIdentity::from_static("CHRYSLER PACIFICA 2018");
pub const GRAND_CHEROKEE: VehicleIdentity =
    VehicleIdentity::from_static("JEEP GRAND CHEROKEE 2019");

pub mod msg {
    pub const STEERING: u32 = 0x10B;
    pub const WHEEL_SPEEDS: u32 = 0x11C;
    pub const BRAKE_2: u32 = 0x145;
    pub const GEAR: u32 = 0x1C4;
    pub const ACC_2: u32 = 0x1F4;
    pub const EPS_STATUS: u32 = 0x220;
    pub const LKAS_COMMAND: u32 = 0x292;
    pub const DASHBOARD: u32 = 0x2E1;
    pub const ACCEL_GAS: u32 = 0x308;
    /// Track distance messages, every other id.
    pub const RADAR_C_FIRST: u32 = 0x2C2;
    pub const RADAR_C_LAST: u32 = 0x2D4;
    /// Track speed messages, every other id.
    pub const RADAR_D_FIRST: u32 = 0x2A2;
    pub const RADAR_D_LAST: u32 = 0x2B4;
}

pub const RADAR_CHANNEL: u8 = 1;

const STEER_LIMITS: TorqueLimits = TorqueLimits {
    max: 261,
    error_max: Some(80),
};
/// LKAS torque field is 11 bits with this offset.
const TORQUE_OFFSET: i16 = 1024;
const ACCEL_MIN: f32 = -3.5;
const ACCEL_MAX: f32 = 2.0;

const POWERTRAIN: &[(u32, u8)] = &[
    (msg::STEERING, 8),
    (msg::WHEEL_SPEEDS, 8),
    (msg::BRAKE_2, 8),
    (msg::GEAR, 3),
    (msg::ACC_2, 8),
    (msg::EPS_STATUS, 8),
    (msg::LKAS_COMMAND, 6),
    (msg::ACCEL_GAS, 8),
];
const RADAR: &[(u32, u8)] = &[
    (msg::RADAR_C_FIRST, 8),
    (msg::RADAR_D_FIRST, 8),
    (msg::RADAR_C_LAST, 8),
    (msg::RADAR_D_LAST, 8),
];

fn signature(dash_len: u8) -> BusSignature {
    Fingerprint::new()
        .with_channel(0, POWERTRAIN)
        .with_channel(0, &[(msg::DASHBOARD, dash_len)])
        .with_channel(RADAR_CHANNEL, RADAR)
}

fn template(mass: f32, wheelbase: f32, steer_ratio: f32) -> ParamsTemplate {
    ParamsTemplate {
        mass: mass + STD_CARGO_KG,
        wheelbase,
        center_to_front: wheelbase * 0.44,
        steer_ratio,
        steer_rate_cost: 0.7,
        tuning: Some(LateralTuning::Pid(PidTuning {
            kp_bp: vec![9.0, 20.0],
            kp_v: vec![0.15, 0.30],
            ki_bp: vec![9.0, 20.0],
            ki_v: vec![0.03, 0.05],
            kf: 0.000_06,
        })),
        ..ParamsTemplate::new(Brand::Chrysler, SteerControlType::Torque)
    }
}

pub fn tables() -> BrandTables {
    BrandTables {
        brand: Brand::Chrysler,
        fingerprints: vec![
            (PACIFICA, vec![signature(3)]),
            (GRAND_CHEROKEE, vec![signature(5)]),
        ],
        templates: vec![
            (PACIFICA, template(2242.0, 3.089, 16.2)),
            (GRAND_CHEROKEE, template(1778.0, 2.71, 16.7)),
        ],
        entry: InterfaceEntry {
            interface: Factory::new(Brand::Chrysler, StandardInterface::boxed as InterfaceCtor),
            controller: Factory::new(Brand::Chrysler, controller as ControllerCtor),
            state: Factory::new(Brand::Chrysler, state as StateCtor),
        },
        radar: Some(Factory::new(Brand::Chrysler, radar as RadarCtor)),
    }
}

fn controller(_: &CarParams) -> Box<dyn CarController> {
    Box::new(ChryslerController)
}

fn state(_: &CarParams) -> Box<dyn CarState> {
    Box::new(ChryslerState::new())
}

fn radar(_: &CarParams) -> Box<dyn RadarInterface> {
    Box::new(ChryslerRadar::default())
}

// ── State ────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ChryslerState {
    parser: CanParser,
    cycle: u64,
}

impl ChryslerState {
    pub fn new() -> Self {
        Self {
            parser: CanParser::new(
                0,
                &[
                    MessageSpec::new(msg::STEERING, 8),
                    MessageSpec::new(msg::WHEEL_SPEEDS, 8),
                    MessageSpec::checked(msg::BRAKE_2, 8, chrysler_ok),
                    MessageSpec::checked(msg::ACC_2, 8, chrysler_ok),
                    MessageSpec::checked(msg::EPS_STATUS, 8, chrysler_ok),
                    MessageSpec::new(msg::ACCEL_GAS, 8),
                ],
            ),
            cycle: 0,
        }
    }
}

impl Default for ChryslerState {
    fn default() -> Self {
        Self::new()
    }
}

impl CarState for ChryslerState {
    fn brand(&self) -> Brand {
        Brand::Chrysler
    }

    fn update(&mut self, frames: &[CanFrame]) -> VehicleState {
        self.cycle += 1;
        self.parser.update(frames);
        let p = &self.parser;
        let wheel = |at| p.be_u16(msg::WHEEL_SPEEDS, at).map(|raw| f32::from(raw) * 0.01);
        // 11-bit torque fields, offset by 1024.
        let torque = |at| {
            p.be_u16(msg::EPS_STATUS, at)
                .map_or(0.0, |raw| f32::from((raw & 0x7FF) as i16 - TORQUE_OFFSET))
        };
        VehicleState {
            cycle: self.cycle,
            v_ego: mean_kph_to_ms(&[wheel(0), wheel(2), wheel(4), wheel(6)]),
            steering_angle_deg: p
                .be_i16(msg::STEERING, 0)
                .map_or(0.0, |raw| f32::from(raw) * 0.1),
            steering_torque: torque(1),
            steering_torque_eps: torque(3),
            gas_pressed: p.byte(msg::ACCEL_GAS, 5).is_some_and(|b| b != 0),
            brake_pressed: p.byte(msg::BRAKE_2, 0).is_some_and(|b| b & 0x04 != 0),
            cruise_available: p.byte(msg::ACC_2, 2).is_some_and(|b| b & 0x20 != 0),
            can_valid: p.can_valid(),
        }
    }
}

// ── Controller ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct ChryslerController;

impl CarController for ChryslerController {
    fn brand(&self) -> Brand {
        Brand::Chrysler
    }

    fn apply(&self, cc: &CarControl, cs: &VehicleState) -> ControlCommand {
        let torque = if cc.enabled {
            limit_torque(cc.actuators.steer, cs.steering_torque_eps, STEER_LIMITS)
        } else {
            0
        };
        ControlCommand {
            enabled: cc.enabled,
            steer: if cc.enabled {
                SteerTarget::Torque(torque)
            } else {
                SteerTarget::Inactive
            },
            accel: accel_command(cc.enabled, cc.actuators.accel, ACCEL_MIN, ACCEL_MAX),
            frames: vec![lkas_command(counter(cs, 4), cc.enabled, torque)],
        }
    }
}

fn lkas_command(count: u8, enabled: bool, torque: i16) -> CanFrame {
    let raw = (torque + TORQUE_OFFSET).clamp(0, 0x7FF) as u16;
    let [hi, lo] = raw.to_be_bytes();
    let flags = if enabled { 0x10 } else { 0x00 };
    let mut d = [flags | (hi & 0x07), lo, 0, 0, (count & 0xF) << 4, 0];
    seal_chrysler(msg::LKAS_COMMAND, &mut d);
    CanFrame::new(0, msg::LKAS_COMMAND, d)
}

// ── Radar ────────────────────────────────────────────────────────────────────

fn track_of(first: u32, last: u32, id: u32) -> Option<u32> {
    (first..=last)
        .contains(&id)
        .then(|| id - first)
        .filter(|off| off % 2 == 0)
        .map(|off| off / 2)
}

#[derive(Debug, Clone, Copy, Default)]
struct Track {
    d_rel: f32,
    y_rel: f32,
    v_rel: Option<f32>,
}

/// Distance and speed arrive in separate messages; a scan closes on the last
/// distance message.
#[derive(Debug, Default)]
pub struct ChryslerRadar {
    tracks: BTreeMap<u32, Track>,
    errors: Vec<RadarError>,
}

impl ChryslerRadar {
    fn ingest(&mut self, frame: &CanFrame) {
        if frame.channel != RADAR_CHANNEL {
            return;
        }
        let c = track_of(msg::RADAR_C_FIRST, msg::RADAR_C_LAST, frame.id);
        let d = track_of(msg::RADAR_D_FIRST, msg::RADAR_D_LAST, frame.id);
        if c.is_none() && d.is_none() {
            return;
        }
        if frame.data.len() != 8 {
            self.errors.push(RadarError::Malformed {
                id: frame.id,
                len: frame.data.len(),
            });
            return;
        }
        if let Some(track_id) = c {
            let d_rel = frame
                .be_u16(0)
                .map_or(0.0, |raw| f32::from(raw & 0x1FFF) * 0.05);
            if d_rel > 0.0 {
                let t = self.tracks.entry(track_id).or_default();
                t.d_rel = d_rel;
                t.y_rel = frame.be_i16(2).map_or(0.0, |raw| f32::from(raw) * 0.01);
            } else {
                self.tracks.remove(&track_id);
            }
        } else if let Some(track_id) = d
            && let Some(t) = self.tracks.get_mut(&track_id)
        {
            t.v_rel = frame.be_i16(0).map(|raw| f32::from(raw) * 0.01);
        }
    }

    fn scan(&mut self) -> RadarReading {
        RadarReading {
            points: self
                .tracks
                .iter()
                .map(|(&track_id, t)| RadarPoint {
                    track_id,
                    d_rel: t.d_rel,
                    y_rel: t.y_rel,
                    v_rel: t.v_rel.unwrap_or(0.0),
                })
                .collect(),
            errors: std::mem::take(&mut self.errors),
            valid: true,
        }
    }

    fn is_trigger(frame: &CanFrame) -> bool {
        frame.channel == RADAR_CHANNEL && frame.id == msg::RADAR_C_LAST
    }
}

impl RadarInterface for ChryslerRadar {
    fn update(&mut self, frames: &[CanFrame]) -> RadarReading {
        let mut triggered = false;
        for frame in frames {
            self.ingest(frame);
            triggered |= Self::is_trigger(frame);
        }
        if triggered {
            self.scan()
        } else {
            // Errors are reported as they happen, not held for the next scan.
            RadarReading {
                errors: std::mem::take(&mut self.errors),
                ..RadarReading::default()
            }
        }
    }

    fn as_polling(&mut self) -> Option<&mut dyn PollingRadar> {
        Some(self)
    }
}

impl PollingRadar for ChryslerRadar {
    fn trigger_frame(&self) -> CanFrame {
        CanFrame::zeroed(RADAR_CHANNEL, msg::RADAR_C_LAST, 8)
    }

    fn poll_once(&mut self, trigger: &CanFrame) -> Result<RadarReading, RadarError> {
        if !Self::is_trigger(trigger) {
            return Err(RadarError::UnexpectedTrigger {
                channel: trigger.channel,
                id: trigger.id,
            });
        }
        self.ingest(trigger);
        Ok(self.scan())
    }
}
