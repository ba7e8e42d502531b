//! The static tables a session is built from, bundled together.

use std::sync::Arc;

use tracing::debug;
use vehid_traits::VehicleIdentity;

use crate::error::{Result, VehidError};
use crate::fingerprint::FingerprintDatabase;
use crate::params::ParamsTable;
use crate::registry::{InterfaceRegistry, RadarRegistry};

/// Fingerprints, registries and parameter templates. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub fingerprints: Arc<FingerprintDatabase>,
    pub interfaces: Arc<InterfaceRegistry>,
    pub radars: Arc<RadarRegistry>,
    pub params: Arc<ParamsTable>,
}

impl Catalog {
    pub fn new(
        fingerprints: FingerprintDatabase,
        interfaces: InterfaceRegistry,
        radars: RadarRegistry,
        params: ParamsTable,
    ) -> Self {
        Self {
            fingerprints: Arc::new(fingerprints),
            interfaces: Arc::new(interfaces),
            radars: Arc::new(radars),
            params: Arc::new(params),
        }
    }

    /// Same registries, different fingerprint table (e.g. loaded from a file).
    pub fn with_fingerprints(&self, fingerprints: FingerprintDatabase) -> Self {
        Self {
            fingerprints: Arc::new(fingerprints),
            ..self.clone()
        }
    }

    /// Verify that every identity the matcher can produce is fully wired.
    ///
    /// Every fingerprinted identity needs an interface entry of a single brand,
    /// a parameter template of that brand, and a radar factory unless the
    /// template declares the radar off the bus.
    pub fn check_consistency(&self) -> Result<()> {
        for identity in self.fingerprints.identities() {
            self.check_identity(identity)?;
        }
        debug!(identities = self.fingerprints.len(), "catalog consistent");
        Ok(())
    }

    pub fn check_identity(&self, identity: &VehicleIdentity) -> Result<()> {
        let entry = self.interfaces.resolve(identity)?;
        let tpl = self
            .params
            .get(identity)
            .ok_or_else(|| eyre::Report::new(VehidError::UnknownIdentity(identity.clone())))?;
        if tpl.brand != entry.brand() {
            return Err(eyre::Report::new(VehidError::InterfaceMismatch {
                identity: identity.clone(),
                detail: format!(
                    "parameters are {} but interface is {}",
                    tpl.brand,
                    entry.brand()
                ),
            }));
        }
        if !tpl.radar_off_can && !self.radars.contains(identity) {
            return Err(eyre::Report::new(VehidError::InterfaceMismatch {
                identity: identity.clone(),
                detail: "radar on bus but no ranging interface registered".into(),
            }));
        }
        Ok(())
    }
}
