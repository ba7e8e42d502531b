#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Vehicle identification and per-brand dispatch (brand-agnostic).
//!
//! This crate identifies the vehicle from bus traffic and builds a driving
//! session for it. Brand behaviour lives behind the `vehid_traits` contracts;
//! the tables that bind identities to brands are supplied by the caller as a
//! [`Catalog`].
//!
//! ## Architecture
//!
//! - **Fingerprints**: identity to reference bus signatures (`fingerprint`)
//! - **Matcher**: candidate elimination over observed traffic (`matcher`)
//! - **Registries**: identity to control and ranging factories (`registry`)
//! - **Parameters**: per-identity templates with hardware overrides (`params`)
//! - **Session**: resolved identity driving the update/apply cycle (`session`)
//! - **Runner**: bounded identification and the paced cycle loop (`runner`,
//!   `worker` for the background variant)
//!
//! ## Identification window
//!
//! Identification never runs unbounded: it stops after `max_frames` frames or
//! `timeout_ms`, whichever comes first, and a single remaining candidate is
//! observed for `settle_frames` more frames before it is accepted.

pub mod catalog;
pub mod config;
pub mod conversions;
pub mod error;
pub mod fingerprint;
pub mod interface;
pub mod matcher;
pub mod mocks;
pub mod params;
pub mod parser;
pub mod radar;
pub mod registry;
pub mod runner;
pub mod session;
pub mod source_error;
pub mod util;
pub mod worker;

pub use catalog::Catalog;
pub use config::{CycleCfg, DIAGNOSTIC_IDS, IdentifyCfg, MatchCfg};
pub use error::{BuildError, Result, VehidError};
pub use fingerprint::{BusSignature, FingerprintDatabase, FingerprintEntry, MAX_VARIANTS};
pub use interface::{Engagement, StandardInterface};
pub use matcher::{Candidate, Identifier, MatchResult, match_samples};
pub use params::{AuxRule, HardwareOverride, ParamsTable, ParamsTemplate};
pub use radar::NoRadar;
pub use registry::{Factory, InterfaceEntry, InterfaceRegistry, RadarRegistry};
pub use runner::{Identification, ReplaySource, identify};
pub use session::{CycleOutput, Session, SessionBuilder};
pub use worker::IdentifierThread;

use vehid_traits::clock::Clock;
use vehid_traits::{CanFrame, CarControl, FrameSource};

/// Identify from `source` and build the session in one step.
///
/// Classification and construction errors surface here, before any cycle.
pub fn open_session<S, C>(
    catalog: &Catalog,
    source: &mut S,
    cfg: &IdentifyCfg,
    clock: &C,
) -> Result<Session>
where
    S: FrameSource + ?Sized,
    C: Clock + ?Sized,
{
    let ident = identify(source, &catalog.fingerprints, cfg, clock)?;
    Session::builder(catalog).with_identification(ident).build()
}

/// Run the cycle contract checks against a freshly built session.
///
/// Ten disabled cycles followed by ten engaged ones; `apply` is invoked twice
/// per cycle and both results must agree, and the command must echo
/// `enabled`. Returns a description of the first violation.
pub fn check_cycle_contract(session: &mut Session) -> std::result::Result<(), String> {
    let frames: [CanFrame; 0] = [];
    for i in 0..20u32 {
        let cc = CarControl {
            enabled: i >= 10,
            ..CarControl::default()
        };
        let state = session.update(&cc, &frames);
        let first = session.apply(&cc);
        let second = session.apply(&cc);
        if first != second {
            return Err(format!("cycle {i}: apply is not idempotent"));
        }
        if first.enabled != cc.enabled {
            return Err(format!("cycle {i}: command does not echo enabled"));
        }
        if state.cycle != u64::from(i) + 1 {
            return Err(format!(
                "cycle {i}: state reports cycle {} (expected {})",
                state.cycle,
                i + 1
            ));
        }
    }
    Ok(())
}
