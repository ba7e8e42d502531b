//! Ranging interface used when the vehicle's radar is not on the bus.

use vehid_traits::{CanFrame, RadarInterface, RadarReading};

/// No-op ranging interface. Never exposes a polling path.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRadar;

impl RadarInterface for NoRadar {
    fn update(&mut self, _frames: &[CanFrame]) -> RadarReading {
        RadarReading::default()
    }
}
