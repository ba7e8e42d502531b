//! Common time/period helpers for the cycle loop.

/// Number of microseconds in one second.
pub const MICROS_PER_SEC: u64 = 1_000_000;
/// Number of milliseconds in one second.
pub const MILLIS_PER_SEC: u64 = 1_000;

/// Cycle period in microseconds for a rate in Hz; `hz = 0` counts as 1 and
/// the result is never below 1 µs.
#[inline]
pub fn period_us(hz: u32) -> u64 {
    (MICROS_PER_SEC / u64::from(hz.max(1))).max(1)
}

/// Cycle period in milliseconds, used to slice recorded logs into cycles.
/// Same clamping as [`period_us`] with a 1 ms floor.
#[inline]
pub fn period_ms(hz: u32) -> u64 {
    (MILLIS_PER_SEC / u64::from(hz.max(1))).max(1)
}
