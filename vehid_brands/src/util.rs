use vehid_traits::VehicleState;

pub const KPH_TO_MS: f32 = 1.0 / 3.6;
pub const LB_TO_KG: f32 = 0.453_592;
/// Occupants and cargo added to every curb mass (kg).
pub const STD_CARGO_KG: f32 = 136.0;

/// Torque limits of a steering actuator, in raw actuator units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TorqueLimits {
    pub max: i16,
    /// Largest allowed gap between the command and the torque the actuator
    /// reports applying. `None` when the actuator does not report it.
    pub error_max: Option<i16>,
}

/// Scale a normalized request to actuator units and clamp it.
///
/// With `error_max` set, the result stays within `error_max` of `eps`
/// (clamped to the actuator range first), so it is a pure function of the
/// request and the current state.
pub fn limit_torque(request: f32, eps: f32, lim: TorqueLimits) -> i16 {
    let max = f32::from(lim.max);
    let mut lo = -max;
    let mut hi = max;
    if let Some(err) = lim.error_max {
        let eps = if eps.is_finite() {
            eps.clamp(-max, max)
        } else {
            0.0
        };
        lo = (eps - f32::from(err)).max(-max);
        hi = (eps + f32::from(err)).min(max);
    }
    let want = if request.is_finite() {
        request.clamp(-1.0, 1.0) * max
    } else {
        0.0
    };
    want.clamp(lo, hi).round() as i16
}

/// Rolling counter derived from the state's cycle number, `bits` wide.
pub fn counter(cs: &VehicleState, bits: u32) -> u8 {
    (cs.cycle % (1u64 << bits)) as u8
}

/// Piecewise-linear interpolation over ascending breakpoints, clamped at the
/// ends.
pub fn interp(x: f32, bp: &[f32], v: &[f32]) -> f32 {
    let n = bp.len().min(v.len());
    if n == 0 {
        return 0.0;
    }
    if x <= bp[0] {
        return v[0];
    }
    for i in 1..n {
        if x <= bp[i] {
            let t = (x - bp[i - 1]) / (bp[i] - bp[i - 1]);
            return v[i - 1] + t * (v[i] - v[i - 1]);
        }
    }
    v[n - 1]
}

/// Mean of the present wheel speeds in m/s; zero when none decoded.
pub fn mean_kph_to_ms(speeds: &[Option<f32>]) -> f32 {
    let (sum, n) = speeds
        .iter()
        .flatten()
        .fold((0.0f32, 0u16), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / f32::from(n) * KPH_TO_MS
    }
}

/// Clamp an acceleration request to `[min, max]` when engaged, zero otherwise.
pub fn accel_command(enabled: bool, accel: f32, min: f32, max: f32) -> f32 {
    if enabled && accel.is_finite() {
        accel.clamp(min, max)
    } else {
        0.0
    }
}
