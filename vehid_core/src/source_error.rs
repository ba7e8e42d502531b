//! Maps `Box<dyn Error>` from the `FrameSource` boundary to typed `VehidError`.
//!
//! The traits in `vehid_traits` use `Box<dyn Error + Send + Sync>`; this module
//! converts those to the typed error enum.

use crate::error::VehidError;

/// Map a frame-source error to a typed `VehidError`.
///
/// `io::ErrorKind::TimedOut`/`WouldBlock` are matched precisely, then falls
/// back to string-based detection.
pub fn map_source_error(e: &(dyn std::error::Error + 'static)) -> VehidError {
    if let Some(io) = e.downcast_ref::<std::io::Error>() {
        if matches!(
            io.kind(),
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
        ) {
            return VehidError::Timeout;
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") || s.to_lowercase().contains("timed out") {
        VehidError::Timeout
    } else {
        VehidError::Source(s)
    }
}
