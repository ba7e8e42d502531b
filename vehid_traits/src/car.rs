//! Identity and per-cycle message schemas shared by every brand.

use crate::can::CanFrame;
use serde::{Serialize, Serializer};
use std::borrow::Cow;
use std::fmt;

/// Unique vehicle token at make/model/year-range granularity.
///
/// Built-in identities are `&'static str` backed; identities read from
/// external tables are owned. Both compare and hash by their text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VehicleIdentity(Cow<'static, str>);

impl VehicleIdentity {
    /// Explicit "no car" identity; never produced by fingerprinting.
    pub const MOCK: VehicleIdentity = VehicleIdentity::from_static("MOCK");

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for VehicleIdentity {
    fn from(s: String) -> Self {
        Self(Cow::Owned(s))
    }
}

impl From<&str> for VehicleIdentity {
    fn from(s: &str) -> Self {
        Self(Cow::Owned(s.to_owned()))
    }
}

impl fmt::Display for VehicleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for VehicleIdentity {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.0)
    }
}

/// Closed set of brand implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Brand {
    Toyota,
    Honda,
    Chrysler,
    Nissan,
    Mock,
}

impl Brand {
    pub fn name(self) -> &'static str {
        match self {
            Brand::Toyota => "toyota",
            Brand::Honda => "honda",
            Brand::Chrysler => "chrysler",
            Brand::Nissan => "nissan",
            Brand::Mock => "mock",
        }
    }
}

impl fmt::Display for Brand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Actuation intent for the current cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Actuators {
    /// Normalized steering torque request in [-1, 1].
    pub steer: f32,
    /// Desired steering wheel angle for angle-controlled vehicles.
    pub steering_angle_deg: f32,
    /// Longitudinal acceleration request (m/s^2).
    pub accel: f32,
}

/// Command intent delivered once per cycle to `update` and `apply`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CarControl {
    pub enabled: bool,
    pub actuators: Actuators,
    pub cruise_cancel: bool,
}

impl CarControl {
    pub fn engaged(actuators: Actuators) -> Self {
        Self {
            enabled: true,
            actuators,
            cruise_cancel: false,
        }
    }
}

/// Snapshot of the vehicle produced by a state implementation each cycle.
///
/// Fields stay at their defaults until the corresponding message is seen.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VehicleState {
    /// Number of `update` calls that produced this snapshot (1 on the first cycle).
    pub cycle: u64,
    pub v_ego: f32,
    pub steering_angle_deg: f32,
    /// Driver torque on the steering column (brand units).
    pub steering_torque: f32,
    /// Torque the steering actuator reports applying (brand units).
    pub steering_torque_eps: f32,
    pub gas_pressed: bool,
    pub brake_pressed: bool,
    pub cruise_available: bool,
    /// False while an expected message is missing or failing validation.
    pub can_valid: bool,
}

/// Steering target carried by a control command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum SteerTarget {
    #[default]
    Inactive,
    /// Raw actuator torque units.
    Torque(i16),
    /// Steering wheel angle in degrees.
    Angle(f32),
}

/// Outbound command produced by `apply`; one schema for every brand.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ControlCommand {
    pub enabled: bool,
    pub steer: SteerTarget,
    pub accel: f32,
    /// Frames to place on the bus this cycle.
    pub frames: Vec<CanFrame>,
}
