//! Process-wide catalog assembled from every brand's tables.
//!
//! Built once on first use and shared read-only afterwards. Fingerprints are
//! registered brand by brand in the order of [`brands`], which makes that
//! order the tie-break for ambiguous traffic.

use std::sync::OnceLock;

use tracing::{debug, error};
use vehid_core::error::Report;
use vehid_core::params::ParamsTable;
use vehid_core::registry::{InterfaceRegistry, RadarRegistry};
use vehid_core::{Catalog, FingerprintDatabase};

use crate::error::BrandError;
use crate::{BrandTables, chrysler, honda, mock, nissan, toyota};

static CATALOG: OnceLock<Result<Catalog, BrandError>> = OnceLock::new();

/// Every built-in brand, in registration order.
pub fn brands() -> Vec<BrandTables> {
    vec![
        toyota::tables(),
        honda::tables(),
        chrysler::tables(),
        nissan::tables(),
        mock::tables(),
    ]
}

/// Assemble and cross-check a fresh catalog from `tables`.
pub fn build(tables: Vec<BrandTables>) -> vehid_core::Result<Catalog> {
    let mut fingerprints = FingerprintDatabase::builder();
    let mut interfaces = InterfaceRegistry::builder();
    let mut radars = RadarRegistry::builder();
    let mut params = ParamsTable::builder();
    let mut identities = Vec::new();

    for brand in tables {
        debug!(
            brand = %brand.brand,
            fingerprinted = brand.fingerprints.len(),
            registered = brand.templates.len(),
            "registering brand"
        );
        for (identity, signatures) in brand.fingerprints {
            fingerprints = fingerprints.add(identity, signatures);
        }
        for (identity, template) in brand.templates {
            interfaces = interfaces.register(identity.clone(), brand.entry);
            if let Some(radar) = brand.radar {
                radars = radars.register(identity.clone(), radar);
            }
            params = params.add(identity.clone(), template);
            identities.push(identity);
        }
    }

    let catalog = Catalog::new(
        fingerprints.build()?,
        interfaces.build()?,
        radars.build()?,
        params.build()?,
    );
    catalog.check_consistency()?;
    for identity in &identities {
        catalog.check_identity(identity)?;
    }
    Ok(catalog)
}

/// The built-in catalog. A failure here is a bug in the static tables and is
/// reported identically on every call.
pub fn catalog() -> vehid_core::Result<&'static Catalog> {
    CATALOG
        .get_or_init(|| {
            build(brands()).map_err(|e| {
                error!(error = %e, "built-in vehicle tables rejected");
                BrandError::Tables(format!("{e:#}"))
            })
        })
        .as_ref()
        .map_err(|e| Report::new(e.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vehid_core::BuildError;

    #[test]
    fn builtin_tables_assemble() {
        let cat = build(brands()).unwrap();
        assert_eq!(cat.fingerprints.len(), 10);
        assert_eq!(cat.interfaces.len(), 11);
    }

    #[test]
    fn registering_a_brand_twice_is_rejected() {
        let err = build(vec![honda::tables(), honda::tables()]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::DuplicateIdentity(_))
        ));
    }

    #[test]
    fn radar_on_bus_without_factory_is_inconsistent() {
        let mut toyota = toyota::tables();
        toyota.radar = None;
        assert!(build(vec![toyota]).is_err());
    }
}
