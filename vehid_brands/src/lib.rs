#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::new_without_default
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Built-in brand implementations and the tables that wire them to vehicle
//! identities.
//!
//! Each brand module exposes `tables()`: its fingerprints, parameter
//! templates, the state/controller/interface triple and, when the radar is on
//! a readable bus, a ranging factory. [`builtin::catalog`] assembles them into
//! the process-wide [`Catalog`](vehid_core::Catalog).

pub mod builtin;
pub mod checksum;
pub mod chrysler;
pub mod error;
pub mod honda;
pub mod mock;
pub mod nissan;
pub mod toyota;
pub mod util;

pub use builtin::{brands, catalog};

use vehid_core::fingerprint::BusSignature;
use vehid_core::params::ParamsTemplate;
use vehid_core::registry::{Factory, InterfaceEntry, RadarCtor};
use vehid_traits::{Brand, VehicleIdentity};

/// Everything one brand contributes to the catalog.
#[derive(Debug, Clone)]
pub struct BrandTables {
    pub brand: Brand,
    /// Fingerprinted identities with their signatures, canonical first.
    pub fingerprints: Vec<(VehicleIdentity, Vec<BusSignature>)>,
    /// Every identity the brand serves, fingerprinted or not.
    pub templates: Vec<(VehicleIdentity, ParamsTemplate)>,
    pub entry: InterfaceEntry,
    pub radar: Option<Factory<RadarCtor>>,
}
