//! Resolved per-session vehicle parameters.

use crate::can::Fingerprint;
use crate::car::{Brand, VehicleIdentity};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SteerControlType {
    Torque,
    Angle,
}

/// Gain-scheduled PID lateral tuning.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PidTuning {
    pub kp_bp: Vec<f32>,
    pub kp_v: Vec<f32>,
    pub ki_bp: Vec<f32>,
    pub ki_v: Vec<f32>,
    pub kf: f32,
}

/// Linear-quadratic regulator lateral tuning (2-state model).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LqrTuning {
    pub scale: f32,
    pub ki: f32,
    pub dc_gain: f32,
    pub a: Vec<f32>,
    pub b: Vec<f32>,
    pub c: Vec<f32>,
    pub k: Vec<f32>,
    pub l: Vec<f32>,
}

/// Incremental nonlinear dynamic inversion lateral tuning.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndiTuning {
    pub inner_loop_gain_bp: Vec<f32>,
    pub inner_loop_gain_v: Vec<f32>,
    pub outer_loop_gain_bp: Vec<f32>,
    pub outer_loop_gain_v: Vec<f32>,
    pub time_constant_bp: Vec<f32>,
    pub time_constant_v: Vec<f32>,
    pub actuator_effectiveness_bp: Vec<f32>,
    pub actuator_effectiveness_v: Vec<f32>,
}

/// Exactly one lateral tuning shape per vehicle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LateralTuning {
    Pid(PidTuning),
    Lqr(LqrTuning),
    Indi(IndiTuning),
}

impl LateralTuning {
    pub fn kind(&self) -> &'static str {
        match self {
            LateralTuning::Pid(_) => "pid",
            LateralTuning::Lqr(_) => "lqr",
            LateralTuning::Indi(_) => "indi",
        }
    }

    /// The vector that defines the variant: `kp_v`, `a` or `outer_loop_gain_v`.
    pub fn primary(&self) -> &[f32] {
        match self {
            LateralTuning::Pid(p) => &p.kp_v,
            LateralTuning::Lqr(l) => &l.a,
            LateralTuning::Indi(i) => &i.outer_loop_gain_v,
        }
    }
}

impl Default for LateralTuning {
    fn default() -> Self {
        LateralTuning::Pid(PidTuning::default())
    }
}

/// Fingerprint metadata carried into the parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FingerprintMeta {
    /// Index of the matched signature variant, if identification produced one.
    pub variant: Option<usize>,
    /// Traffic observed during identification.
    pub observed: Fingerprint,
}

/// Parameters for one driving session. Constructed and validated by the core
/// parameter builder; brand code only reads them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CarParams {
    pub car_name: VehicleIdentity,
    pub brand: Brand,
    /// Curb mass plus standard load (kg).
    pub mass: f32,
    pub wheelbase: f32,
    pub center_to_front: f32,
    pub steer_ratio: f32,
    pub steer_rate_cost: f32,
    pub steer_control_type: SteerControlType,
    pub lateral_tuning: LateralTuning,
    pub radar_off_can: bool,
    pub enable_gas_interceptor: bool,
    pub enable_bsm: bool,
    pub fingerprint: FingerprintMeta,
}
