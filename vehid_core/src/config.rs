//! Runtime configuration used by the matcher, the identification runner and
//! the cycle loop.
//!
//! These are separate from the TOML-deserialized config in `vehid_config`;
//! see `conversions` for the mapping.

/// Diagnostic request/response ids that never take part in identification.
pub const DIAGNOSTIC_IDS: [u32; 3] = [0x7DF, 0x7E0, 0x7E8];

/// Matcher configuration.
#[derive(Debug, Clone)]
pub struct MatchCfg {
    /// Channels considered for elimination (0..channels).
    pub channels: u8,
    /// Ids at or above this value (extended frames) are ignored.
    pub max_id: u32,
    /// Additional ids that are ignored.
    pub ignore_ids: Vec<u32>,
    /// Frames to keep observing after a single candidate remains.
    pub settle_frames: u32,
}

impl Default for MatchCfg {
    fn default() -> Self {
        Self {
            channels: 3,
            max_id: 0x800,
            ignore_ids: DIAGNOSTIC_IDS.to_vec(),
            settle_frames: 25,
        }
    }
}

impl MatchCfg {
    /// Whether a frame on `channel` with `id` can eliminate candidates.
    #[inline]
    pub fn considers(&self, channel: u8, id: u32) -> bool {
        channel < self.channels && id < self.max_id && !self.ignore_ids.contains(&id)
    }
}

/// Bounds of the identification phase.
#[derive(Debug, Clone)]
pub struct IdentifyCfg {
    pub matcher: MatchCfg,
    /// Upper bound on frames consumed before giving up.
    pub max_frames: u32,
    /// Wall-clock bound on the whole phase (ms).
    pub timeout_ms: u64,
    /// Max wait for a single frame (ms).
    pub read_timeout_ms: u64,
    /// Accept the canonical candidate when several remain.
    pub allow_ambiguous: bool,
}

impl Default for IdentifyCfg {
    fn default() -> Self {
        Self {
            matcher: MatchCfg::default(),
            max_frames: 1000,
            timeout_ms: 10_000,
            read_timeout_ms: 100,
            allow_ambiguous: true,
        }
    }
}

/// Cycle loop configuration.
#[derive(Debug, Clone)]
pub struct CycleCfg {
    pub rate_hz: u32,
}

impl Default for CycleCfg {
    fn default() -> Self {
        Self { rate_hz: 100 }
    }
}
