//! Human-readable error descriptions and structured JSON error formatting.

use crate::commands::SelfCheckFailed;
use vehid_core::error::{BuildError, VehidError};

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(ve) = err.downcast_ref::<VehidError>() {
        return match ve {
            VehidError::NoMatch => {
                "What happened: No known vehicle matches the bus traffic.\nLikely causes: Unsupported vehicle, a log recorded on the wrong channels, or traffic from a different harness.\nHow to fix: Check the channel numbering in the log, or supply a fingerprint table with --fingerprints.".to_string()
            }
            VehidError::Ambiguous { candidates } => format!(
                "What happened: Several vehicles match the bus traffic ({}).\nLikely causes: The log ends before a distinguishing message was seen.\nHow to fix: Record a longer log, raise fingerprint.max_frames, or drop --strict to accept the first-registered vehicle.",
                candidates
                    .iter()
                    .map(|c| c.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            VehidError::Timeout => {
                "What happened: No bus traffic arrived before the identification deadline.\nLikely causes: Empty log, disconnected bus, or fingerprint.timeout_ms set too low.\nHow to fix: Verify the log has frames and consider increasing fingerprint.timeout_ms.".to_string()
            }
            VehidError::UnknownIdentity(id) => format!(
                "What happened: No interface is registered for {id}.\nLikely causes: A fingerprint table names a vehicle this build does not implement.\nHow to fix: Use names printed by `vehid list` in the fingerprint table."
            ),
            VehidError::InterfaceMismatch { .. } | VehidError::InvalidParameters { .. } => format!(
                "What happened: {ve}.\nLikely causes: Inconsistent built-in vehicle tables.\nHow to fix: Run `vehid self-check` and report the failing vehicle."
            ),
            VehidError::Source(msg) => format!(
                "What happened: The frame source failed ({msg}).\nLikely causes: Bus interface went away or the log could not be read.\nHow to fix: Check the interface or log file, then rerun."
            ),
            VehidError::Config(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::DuplicateIdentity(id) => format!(
                "What happened: {id} is declared twice.\nLikely causes: A duplicated [[car]] entry in the fingerprint table.\nHow to fix: Keep one entry per vehicle; list every signature variant under it."
            ),
            BuildError::EmptySignatures { identity } | BuildError::TooManyVariants { identity, .. } => format!(
                "What happened: {be}.\nLikely causes: The fingerprint entry for {identity} is malformed.\nHow to fix: Edit the fingerprint table, then rerun."
            ),
            BuildError::MissingIdentity => format!(
                "What happened: {be}.\nLikely causes: Missing or out-of-range values.\nHow to fix: Check the config file and command arguments."
            ),
        };
    }

    if let Some(sc) = err.downcast_ref::<SelfCheckFailed>() {
        return format!(
            "What happened: {sc}.\nLikely causes: A vehicle's tables or interface break the cycle contract.\nHow to fix: See the table above for the failing vehicles."
        );
    }

    // String-based heuristics for errors coming from loaders or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("bus log csv must have headers") {
        return "Invalid headers in bus log CSV. Expected 't_ms,channel,id,data'.".to_string();
    }

    if lower.contains("invalid csv row") {
        return format!(
            "What happened: The bus log has a malformed row ({msg}).\nLikely causes: Non-hex payload, bad message id, or a truncated line.\nHow to fix: Fix the row and rerun."
        );
    }

    if lower.contains("fingerprint table")
        || (lower.starts_with("car ") && lower.contains("signature"))
    {
        return format!(
            "What happened: The fingerprint table could not be loaded ({msg}).\nLikely causes: Bad [[car]] or [[car.signature]] entries.\nHow to fix: Use bus0/bus1/bus2 tables of \"0x...\" = length under each signature."
        );
    }

    if lower.contains("fingerprint.") || lower.contains("cycle.") || lower.contains("logging.") {
        return format!(
            "What happened: Configuration is invalid ({msg}).\nLikely causes: Out-of-range values in the TOML.\nHow to fix: Edit the config file and try again."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes; unclassified errors return 1 (clap usage errors exit 2).
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(ve) = err.downcast_ref::<VehidError>() {
        return match ve {
            VehidError::NoMatch => 3,
            VehidError::Ambiguous { .. } => 4,
            VehidError::Timeout => 5,
            VehidError::UnknownIdentity(_)
            | VehidError::InterfaceMismatch { .. }
            | VehidError::InvalidParameters { .. } => 6,
            VehidError::Source(_) => 8,
            VehidError::Config(_) => 1,
        };
    }
    if err.downcast_ref::<SelfCheckFailed>().is_some() {
        return 7;
    }
    1
}

/// Short stable name of the error class, used as the JSON `reason`.
pub fn reason_name(err: &eyre::Report) -> &'static str {
    if let Some(ve) = err.downcast_ref::<VehidError>() {
        return match ve {
            VehidError::NoMatch => "NoMatch",
            VehidError::Ambiguous { .. } => "Ambiguous",
            VehidError::Timeout => "Timeout",
            VehidError::UnknownIdentity(_) => "UnknownIdentity",
            VehidError::InterfaceMismatch { .. } => "InterfaceMismatch",
            VehidError::InvalidParameters { .. } => "InvalidParameters",
            VehidError::Source(_) => "Source",
            VehidError::Config(_) => "Config",
        };
    }
    if err.downcast_ref::<BuildError>().is_some() {
        return "Build";
    }
    if err.downcast_ref::<SelfCheckFailed>().is_some() {
        return "SelfCheck";
    }
    "Error"
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let msg = humanize(err);
    let reason = reason_name(err);
    let details = match err.downcast_ref::<VehidError>() {
        Some(VehidError::Ambiguous { candidates }) => Some(json!({ "candidates": candidates })),
        Some(
            VehidError::InterfaceMismatch { identity, detail }
            | VehidError::InvalidParameters {
                identity,
                reason: detail,
            },
        ) => Some(json!({ "car": identity, "detail": detail })),
        Some(VehidError::UnknownIdentity(identity)) => Some(json!({ "car": identity })),
        _ => err
            .downcast_ref::<SelfCheckFailed>()
            .map(|sc| json!({ "failed": sc.failed, "total": sc.total })),
    };

    match details {
        Some(d) => json!({ "reason": reason, "details": d, "message": msg }),
        None => json!({ "reason": reason, "message": msg }),
    }
    .to_string()
}
