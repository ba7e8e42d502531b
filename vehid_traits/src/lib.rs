//! Contracts between the vehicle core and brand implementations.
//!
//! The message schemas are shared by every brand; the traits describe the
//! per-cycle update/apply cycle and the ranging sensor plugin.
pub mod can;
pub mod car;
pub mod clock;
pub mod params;
pub mod radar;

pub use can::{CanFrame, Fingerprint, MAX_PAYLOAD};
pub use car::{
    Actuators, Brand, CarControl, ControlCommand, SteerTarget, VehicleIdentity, VehicleState,
};
pub use clock::{Clock, MonotonicClock};
pub use params::{
    CarParams, FingerprintMeta, IndiTuning, LateralTuning, LqrTuning, PidTuning, SteerControlType,
};
pub use radar::{RadarError, RadarPoint, RadarReading};

/// Source of raw frames during identification and replay.
pub trait FrameSource {
    /// Wait up to `timeout` for the next frame. `Ok(None)` means the source is exhausted.
    fn recv(
        &mut self,
        timeout: std::time::Duration,
    ) -> Result<Option<CanFrame>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Decodes raw frames into a `VehicleState`.
///
/// `update` never fails: missing or malformed frames leave the affected fields
/// stale and clear `can_valid`.
pub trait CarState: Send {
    fn brand(&self) -> Brand;
    fn update(&mut self, frames: &[CanFrame]) -> VehicleState;
}

/// Turns command intent into actuator frames.
///
/// `apply` takes `&self`: output depends only on its inputs and the tuning
/// captured at construction, so repeated calls agree.
pub trait CarController: Send {
    fn brand(&self) -> Brand;
    fn apply(&self, cc: &CarControl, cs: &VehicleState) -> ControlCommand;
}

/// Per-session control interface driven once per cycle: `update`, then `apply`.
pub trait CarInterface: Send {
    fn brand(&self) -> Brand;
    fn params(&self) -> &CarParams;
    fn update(&mut self, cc: &CarControl, frames: &[CanFrame]) -> VehicleState;
    fn apply(&self, cc: &CarControl) -> ControlCommand;
}

/// Passive ranging sensor plugin.
pub trait RadarInterface: Send {
    fn update(&mut self, frames: &[CanFrame]) -> RadarReading;

    /// Polling capability, present only on sensors that need an explicit request.
    fn as_polling(&mut self) -> Option<&mut dyn PollingRadar> {
        None
    }
}

/// Sensors that emit a scan only after seeing their trigger frame.
pub trait PollingRadar {
    fn trigger_frame(&self) -> CanFrame;
    fn poll_once(&mut self, trigger: &CanFrame) -> Result<RadarReading, RadarError>;
}
