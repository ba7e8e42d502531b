use thiserror::Error;
use vehid_traits::VehicleIdentity;

#[derive(Debug, Error, Clone)]
pub enum VehidError {
    /// No candidate survived the observed traffic.
    #[error("no known vehicle matches the observed bus traffic")]
    NoMatch,
    /// Several candidates survived and the caller refused the canonical fallback.
    #[error("ambiguous fingerprint: {} candidates remain ({})", .candidates.len(), join(.candidates))]
    Ambiguous { candidates: Vec<VehicleIdentity> },
    #[error("no interface registered for {0}")]
    UnknownIdentity(VehicleIdentity),
    #[error("interface mismatch for {identity}: {detail}")]
    InterfaceMismatch {
        identity: VehicleIdentity,
        detail: String,
    },
    #[error("invalid parameters for {identity}: {reason}")]
    InvalidParameters {
        identity: VehicleIdentity,
        reason: String,
    },
    #[error("timeout waiting for bus traffic")]
    Timeout,
    #[error("frame source error: {0}")]
    Source(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl VehidError {
    /// Static-table inconsistencies that must abort session construction.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            VehidError::UnknownIdentity(_)
                | VehidError::InterfaceMismatch { .. }
                | VehidError::InvalidParameters { .. }
        )
    }
}

fn join(ids: &[VehicleIdentity]) -> String {
    ids.iter()
        .map(VehicleIdentity::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing vehicle identity")]
    MissingIdentity,
    #[error("duplicate registration for {0}")]
    DuplicateIdentity(VehicleIdentity),
    #[error("{identity} declares no signatures")]
    EmptySignatures { identity: VehicleIdentity },
    #[error("{identity} declares {count} signature variants (max {max})")]
    TooManyVariants {
        identity: VehicleIdentity,
        count: usize,
        max: usize,
    },
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
