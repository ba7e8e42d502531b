//! Toyota: torque steering limited against the reported motor torque, and a
//! radar on channel 1 that publishes a scan once its last message arrives.

use std::collections::BTreeMap;

use vehid_core::StandardInterface;
use vehid_core::fingerprint::BusSignature;
use vehid_core::params::{HardwareOverride, ParamsTemplate};
use vehid_core::parser::{CanParser, MessageSpec};
use vehid_core::registry::{
    ControllerCtor, Factory, InterfaceCtor, InterfaceEntry, RadarCtor, StateCtor,
};
use vehid_traits::{
    Brand, CanFrame, CarControl, CarController, CarParams, CarState, ControlCommand, Fingerprint,
    IndiTuning, LateralTuning, LqrTuning, PidTuning, PollingRadar, RadarError, RadarInterface,
    RadarPoint, RadarReading, SteerControlType, SteerTarget, VehicleIdentity, VehicleState,
};

use crate::BrandTables;
use crate::checksum::{seal_toyota, toyota_ok};
use crate::util::{
    LB_TO_KG, STD_CARGO_KG, TorqueLimits, accel_command, counter, limit_torque, mean_kph_to_ms,
};

pub const PRIUS: VehicleIdentity = VehicleIdentity::from_static("TOYOTA PRIUS 2017");
pub const RAV4: VehicleIdentity = VehicleIdentity::from_static("TOYOTA RAV4 2017");
pub const COROLLA: VehicleIdentity = VehicleIdentity::from_static("TOYOTA COROLLA 2017");

pub mod msg {
    pub const STEER_ANGLE_SENSOR: u32 = 0x25;
    pub const WHEEL_SPEEDS: u32 = 0xAA;
    pub const GEAR_PACKET: u32 = 0x1C4;
    pub const PCM_CRUISE: u32 = 0x1D2;
    pub const BRAKE_MODULE: u32 = 0x224;
    pub const STEER_TORQUE_SENSOR: u32 = 0x260;
    pub const GAS_PEDAL: u32 = 0x2C1;
    pub const STEERING_LKA: u32 = 0x2E4;
    pub const ACC_CONTROL: u32 = 0x343;
    pub const HYBRID_STATUS: u32 = 0x3BC;
    pub const BODY_TRIM: u32 = 0x4CB;
    /// Track position messages, one per track.
    pub const RADAR_TRACK_A: std::ops::RangeInclusive<u32> = 0x210..=0x21F;
    /// Track score messages; the last one closes a scan.
    pub const RADAR_TRACK_B: std::ops::RangeInclusive<u32> = 0x220..=0x22F;
    pub const RADAR_TRIGGER: u32 = 0x22F;
}

pub const RADAR_CHANNEL: u8 = 1;

const STEER_LIMITS: TorqueLimits = TorqueLimits {
    max: 1500,
    error_max: Some(350),
};
const ACCEL_MIN: f32 = -3.5;
const ACCEL_MAX: f32 = 2.0;

const POWERTRAIN: &[(u32, u8)] = &[
    (msg::STEER_ANGLE_SENSOR, 8),
    (msg::WHEEL_SPEEDS, 8),
    (msg::GEAR_PACKET, 8),
    (msg::PCM_CRUISE, 8),
    (msg::BRAKE_MODULE, 8),
    (msg::STEER_TORQUE_SENSOR, 8),
    (msg::GAS_PEDAL, 8),
    (msg::ACC_CONTROL, 8),
];
const RADAR: &[(u32, u8)] = &[(0x210, 8), (0x211, 8), (0x220, 8), (msg::RADAR_TRIGGER, 8)];
const CAMERA: &[(u32, u8)] = &[(msg::STEERING_LKA, 5), (msg::ACC_CONTROL, 8)];

fn signature(trim_len: u8, extra: &[(u32, u8)], radar: bool) -> BusSignature {
    let sig = Fingerprint::new()
        .with_channel(0, POWERTRAIN)
        .with_channel(0, &[(msg::BODY_TRIM, trim_len)])
        .with_channel(0, extra)
        .with_channel(2, CAMERA);
    if radar {
        sig.with_channel(RADAR_CHANNEL, RADAR)
    } else {
        sig
    }
}

fn template(mass_lb: f32, wheelbase: f32, steer_ratio: f32, tuning: LateralTuning) -> ParamsTemplate {
    ParamsTemplate {
        mass: mass_lb * LB_TO_KG + STD_CARGO_KG,
        wheelbase,
        center_to_front: wheelbase * 0.44,
        steer_ratio,
        steer_rate_cost: 1.0,
        tuning: Some(tuning),
        ..ParamsTemplate::new(Brand::Toyota, SteerControlType::Torque)
    }
}

pub fn tables() -> BrandTables {
    let prius_indi = LateralTuning::Indi(IndiTuning {
        inner_loop_gain_bp: vec![0.0],
        inner_loop_gain_v: vec![4.0],
        outer_loop_gain_bp: vec![0.0],
        outer_loop_gain_v: vec![3.0],
        time_constant_bp: vec![0.0],
        time_constant_v: vec![1.0],
        actuator_effectiveness_bp: vec![0.0],
        actuator_effectiveness_v: vec![1.0],
    });
    let rav4_lqr = LateralTuning::Lqr(LqrTuning {
        scale: 1500.0,
        ki: 0.05,
        dc_gain: 0.002_237_853,
        a: vec![0.0, 1.0, -0.226_196_43, 1.0],
        b: vec![-1.920_065_9e-4, 3.956_030_3e-5],
        c: vec![1.0, 0.0],
        k: vec![-110.735_72, 451.227_2],
        l: vec![0.323_367_1, 0.318_575_7],
    });
    let corolla_pid = LateralTuning::Pid(PidTuning {
        kp_bp: vec![0.0],
        kp_v: vec![0.2],
        ki_bp: vec![0.0],
        ki_v: vec![0.05],
        kf: 0.000_03,
    });

    BrandTables {
        brand: Brand::Toyota,
        fingerprints: vec![
            (PRIUS, vec![signature(8, &[], true)]),
            (
                RAV4,
                vec![
                    signature(7, &[(msg::HYBRID_STATUS, 8)], true),
                    // Later trim: different hybrid frame, radar behind the camera.
                    signature(7, &[(msg::HYBRID_STATUS, 5)], false),
                ],
            ),
            (COROLLA, vec![signature(6, &[], true)]),
        ],
        templates: vec![
            (PRIUS, template(3045.0, 2.70, 15.74, prius_indi)),
            (
                RAV4,
                ParamsTemplate {
                    variant_overrides: vec![(1, HardwareOverride::RadarOffCan(true))],
                    ..template(3650.0, 2.65, 16.88, rav4_lqr)
                },
            ),
            (COROLLA, template(2860.0, 2.70, 18.27, corolla_pid)),
        ],
        entry: InterfaceEntry {
            interface: Factory::new(Brand::Toyota, StandardInterface::boxed as InterfaceCtor),
            controller: Factory::new(Brand::Toyota, controller as ControllerCtor),
            state: Factory::new(Brand::Toyota, state as StateCtor),
        },
        radar: Some(Factory::new(Brand::Toyota, radar as RadarCtor)),
    }
}

fn controller(_: &CarParams) -> Box<dyn CarController> {
    Box::new(ToyotaController)
}

fn state(_: &CarParams) -> Box<dyn CarState> {
    Box::new(ToyotaState::new())
}

fn radar(_: &CarParams) -> Box<dyn RadarInterface> {
    Box::new(ToyotaRadar::default())
}

// ── State ────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ToyotaState {
    parser: CanParser,
    cycle: u64,
}

impl ToyotaState {
    pub fn new() -> Self {
        Self {
            parser: CanParser::new(
                0,
                &[
                    MessageSpec::new(msg::STEER_ANGLE_SENSOR, 8),
                    MessageSpec::new(msg::WHEEL_SPEEDS, 8),
                    MessageSpec::checked(msg::PCM_CRUISE, 8, toyota_ok),
                    MessageSpec::new(msg::BRAKE_MODULE, 8),
                    MessageSpec::checked(msg::STEER_TORQUE_SENSOR, 8, toyota_ok),
                    MessageSpec::new(msg::GAS_PEDAL, 8),
                ],
            ),
            cycle: 0,
        }
    }
}

impl Default for ToyotaState {
    fn default() -> Self {
        Self::new()
    }
}

impl CarState for ToyotaState {
    fn brand(&self) -> Brand {
        Brand::Toyota
    }

    fn update(&mut self, frames: &[CanFrame]) -> VehicleState {
        self.cycle += 1;
        self.parser.update(frames);
        let p = &self.parser;
        let wheel = |at| p.be_u16(msg::WHEEL_SPEEDS, at).map(|raw| f32::from(raw) * 0.01);
        VehicleState {
            cycle: self.cycle,
            v_ego: mean_kph_to_ms(&[wheel(0), wheel(2), wheel(4), wheel(6)]),
            // 12-bit signed, 1.5 deg per bit.
            steering_angle_deg: p
                .be_i16(msg::STEER_ANGLE_SENSOR, 0)
                .map_or(0.0, |raw| f32::from(raw >> 4) * 1.5),
            steering_torque: p
                .be_i16(msg::STEER_TORQUE_SENSOR, 1)
                .map_or(0.0, f32::from),
            steering_torque_eps: p
                .be_i16(msg::STEER_TORQUE_SENSOR, 5)
                .map_or(0.0, f32::from),
            gas_pressed: p.byte(msg::GAS_PEDAL, 6).is_some_and(|b| b != 0),
            brake_pressed: p.byte(msg::BRAKE_MODULE, 0).is_some_and(|b| b & 0x20 != 0),
            cruise_available: p.byte(msg::PCM_CRUISE, 0).is_some_and(|b| b & 0x20 != 0),
            can_valid: p.can_valid(),
        }
    }
}

// ── Controller ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct ToyotaController;

impl CarController for ToyotaController {
    fn brand(&self) -> Brand {
        Brand::Toyota
    }

    fn apply(&self, cc: &CarControl, cs: &VehicleState) -> ControlCommand {
        let torque = if cc.enabled {
            limit_torque(cc.actuators.steer, cs.steering_torque_eps, STEER_LIMITS)
        } else {
            0
        };
        let accel = accel_command(cc.enabled, cc.actuators.accel, ACCEL_MIN, ACCEL_MAX);
        ControlCommand {
            enabled: cc.enabled,
            steer: if cc.enabled {
                SteerTarget::Torque(torque)
            } else {
                SteerTarget::Inactive
            },
            accel,
            frames: vec![
                steering_lka(counter(cs, 6), cc.enabled, torque),
                acc_control(accel, cc.cruise_cancel),
            ],
        }
    }
}

fn steering_lka(count: u8, request: bool, torque: i16) -> CanFrame {
    let t = torque.to_be_bytes();
    let mut d = [0x80 | (count & 0x3F) << 1 | u8::from(request), t[0], t[1], 0, 0];
    seal_toyota(msg::STEERING_LKA, &mut d);
    CanFrame::new(0, msg::STEERING_LKA, d)
}

fn acc_control(accel: f32, cancel: bool) -> CanFrame {
    // 0.001 m/s^2 per bit.
    let a = ((accel * 1000.0).round() as i16).to_be_bytes();
    let mut d = [a[0], a[1], 0, u8::from(cancel), 0, 0, 0, 0];
    seal_toyota(msg::ACC_CONTROL, &mut d);
    CanFrame::new(0, msg::ACC_CONTROL, d)
}

// ── Radar ────────────────────────────────────────────────────────────────────

/// Accumulates track messages and publishes them when the trigger arrives.
#[derive(Debug, Default)]
pub struct ToyotaRadar {
    tracks: BTreeMap<u32, RadarPoint>,
    errors: Vec<RadarError>,
}

impl ToyotaRadar {
    fn ingest(&mut self, frame: &CanFrame) {
        if frame.channel != RADAR_CHANNEL {
            return;
        }
        let track_a = msg::RADAR_TRACK_A.contains(&frame.id);
        if !track_a && !msg::RADAR_TRACK_B.contains(&frame.id) {
            return;
        }
        if frame.data.len() != 8 {
            self.errors.push(RadarError::Malformed {
                id: frame.id,
                len: frame.data.len(),
            });
            return;
        }
        if !track_a {
            return;
        }
        let track_id = frame.id - msg::RADAR_TRACK_A.start();
        let valid = frame.byte(0).is_some_and(|b| b & 0x80 != 0);
        let d_rel = frame
            .be_u16(0)
            .map_or(0.0, |raw| f32::from(raw & 0x1FFF) * 0.04);
        if valid && d_rel > 0.0 {
            self.tracks.insert(
                track_id,
                RadarPoint {
                    track_id,
                    d_rel,
                    y_rel: frame.be_i16(2).map_or(0.0, |raw| f32::from(raw) * 0.01),
                    v_rel: frame.be_i16(4).map_or(0.0, |raw| f32::from(raw) * 0.025),
                },
            );
        } else {
            self.tracks.remove(&track_id);
        }
    }

    fn scan(&mut self) -> RadarReading {
        RadarReading {
            points: self.tracks.values().copied().collect(),
            errors: std::mem::take(&mut self.errors),
            valid: true,
        }
    }

    fn is_trigger(frame: &CanFrame) -> bool {
        frame.channel == RADAR_CHANNEL && frame.id == msg::RADAR_TRIGGER
    }
}

impl RadarInterface for ToyotaRadar {
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

impl PollingRadar for ToyotaRadar {
    fn trigger_frame(&self) -> CanFrame {
        CanFrame::zeroed(RADAR_CHANNEL, msg::RADAR_TRIGGER, 8)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::toyota_checksum;
    use vehid_traits::Actuators;

    fn sealed(id: u32, mut d: [u8; 8]) -> CanFrame {
        d[7] = toyota_checksum(id, &d);
        CanFrame::new(0, id, d)
    }

    #[test]
    fn decodes_torque_and_validity() {
        let mut cs = ToyotaState::new();
        let s = cs.update(&[]);
        assert!(!s.can_valid);

        let frames = [
            CanFrame::new(0, msg::STEER_ANGLE_SENSOR, [0xFF, 0xF0, 0, 0, 0, 0, 0, 0]),
            CanFrame::new(0, msg::WHEEL_SPEEDS, [0x03, 0xE8, 0x03, 0xE8, 0x03, 0xE8, 0x03, 0xE8]),
            sealed(msg::PCM_CRUISE, [0x20, 0, 0, 0, 0, 0, 0, 0]),
            CanFrame::zeroed(0, msg::BRAKE_MODULE, 8),
            sealed(msg::STEER_TORQUE_SENSOR, [0, 0x00, 0x64, 0, 0, 0x01, 0x2C, 0]),
            CanFrame::zeroed(0, msg::GAS_PEDAL, 8),
        ];
        let s = cs.update(&frames);
        assert!(s.can_valid);
        assert_eq!(s.cycle, 2);
        assert!((s.v_ego - 10.0 / 3.6).abs() < 1e-4);
        assert_eq!(s.steering_angle_deg, -1.5);
        assert_eq!(s.steering_torque, 100.0);
        assert_eq!(s.steering_torque_eps, 300.0);
        assert!(s.cruise_available);

        // Bad checksum invalidates until the next good frame.
        let s = cs.update(&[CanFrame::zeroed(0, msg::PCM_CRUISE, 8)]);
        assert!(!s.can_valid);
        assert!(s.cruise_available);
    }

    #[test]
    fn controller_limits_against_motor_torque() {
        let cs = VehicleState {
            cycle: 65,
            steering_torque_eps: 100.0,
            ..VehicleState::default()
        };
        let cc = CarControl::engaged(Actuators {
            steer: 1.0,
            accel: 5.0,
            ..Actuators::default()
        });
        let cmd = ToyotaController.apply(&cc, &cs);
        assert_eq!(cmd.steer, SteerTarget::Torque(450));
        assert_eq!(cmd.accel, ACCEL_MAX);
        let lka = &cmd.frames[0];
        assert_eq!(lka.id, msg::STEERING_LKA);
        assert_eq!(lka.data[0], 0x80 | 1 << 1 | 1);
        assert!(toyota_ok(lka.id, &lka.data));
    }

    #[test]
    fn disabled_controller_sends_zero_torque() {
        let cmd = ToyotaController.apply(&CarControl::default(), &VehicleState::default());
        assert_eq!(cmd.steer, SteerTarget::Inactive);
        assert_eq!(&cmd.frames[0].data[1..3], &[0, 0]);
    }

    #[test]
    fn radar_publishes_on_trigger_only() {
        let mut r = ToyotaRadar::default();
        let track = CanFrame::new(RADAR_CHANNEL, 0x212, [0x80, 0xFA, 0, 100, 0, 0, 0, 0]);
        let out = r.update(std::slice::from_ref(&track));
        assert!(!out.valid && out.is_empty());

        let trigger = r.trigger_frame();
        let out = r.poll_once(&trigger).unwrap();
        assert!(out.valid);
        assert_eq!(out.points.len(), 1);
        assert_eq!(out.points[0].track_id, 2);
        assert!((out.points[0].d_rel - 10.0).abs() < 1e-4);
    }

    #[test]
    fn radar_rejects_foreign_trigger_and_reports_malformed() {
        let mut r = ToyotaRadar::default();
        let err = r.poll_once(&CanFrame::zeroed(0, msg::RADAR_TRIGGER, 8));
        assert_eq!(
            err,
            Err(RadarError::UnexpectedTrigger {
                channel: 0,
                id: msg::RADAR_TRIGGER
            })
        );
        let out = r.update(&[
            CanFrame::zeroed(RADAR_CHANNEL, 0x213, 3),
            CanFrame::zeroed(RADAR_CHANNEL, msg::RADAR_TRIGGER, 8),
        ]);
        assert!(out.valid);
        assert_eq!(out.errors, vec![RadarError::Malformed { id: 0x213, len: 3 }]);
    }

    #[test]
    fn malformed_frames_without_a_trigger_are_not_buffered() {
        let mut r = ToyotaRadar::default();
        let bad = CanFrame::zeroed(RADAR_CHANNEL, 0x213, 3);
        for _ in 0..1000 {
            let out = r.update(std::slice::from_ref(&bad));
            assert!(!out.valid && out.is_empty());
            assert_eq!(out.errors, vec![RadarError::Malformed { id: 0x213, len: 3 }]);
        }
        assert!(r.errors.is_empty());
        let trigger = r.trigger_frame();
        let out = r.poll_once(&trigger).unwrap();
        assert!(out.errors.is_empty());
    }
}
