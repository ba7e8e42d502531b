//! Interface and radar registries: vehicle identity to brand factories.
//!
//! Both registries are assembled once through their builders and expose no
//! mutation afterwards. Lookup is an exact-key hash lookup.

use std::collections::HashMap;

use vehid_traits::{
    Brand, CarController, CarInterface, CarParams, CarState, RadarInterface, VehicleIdentity,
};

use crate::error::{BuildError, Result, VehidError};
use crate::radar::NoRadar;

pub type InterfaceCtor = fn(
    CarParams,
    Box<dyn CarController>,
    Box<dyn CarState>,
) -> std::result::Result<Box<dyn CarInterface>, VehidError>;
pub type ControllerCtor = fn(&CarParams) -> Box<dyn CarController>;
pub type StateCtor = fn(&CarParams) -> Box<dyn CarState>;
pub type RadarCtor = fn(&CarParams) -> Box<dyn RadarInterface>;

/// Constructor tagged with the brand it builds.
#[derive(Debug, Clone, Copy)]
pub struct Factory<F> {
    pub brand: Brand,
    pub build: F,
}

impl<F> Factory<F> {
    pub const fn new(brand: Brand, build: F) -> Self {
        Self { brand, build }
    }
}

/// The cooperating triple registered for one identity.
#[derive(Debug, Clone, Copy)]
pub struct InterfaceEntry {
    pub interface: Factory<InterfaceCtor>,
    pub controller: Factory<ControllerCtor>,
    pub state: Factory<StateCtor>,
}

impl InterfaceEntry {
    pub fn brand(&self) -> Brand {
        self.interface.brand
    }

    /// All three factories must come from the same brand.
    pub fn check(&self, identity: &VehicleIdentity) -> std::result::Result<(), VehidError> {
        let brand = self.interface.brand;
        if self.controller.brand != brand {
            return Err(VehidError::InterfaceMismatch {
                identity: identity.clone(),
                detail: format!(
                    "controller is {} but interface is {brand}",
                    self.controller.brand
                ),
            });
        }
        if self.state.brand != brand {
            return Err(VehidError::InterfaceMismatch {
                identity: identity.clone(),
                detail: format!("state is {} but interface is {brand}", self.state.brand),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InterfaceRegistry {
    entries: HashMap<VehicleIdentity, InterfaceEntry>,
}

impl InterfaceRegistry {
    pub fn builder() -> RegistryBuilder<InterfaceEntry> {
        RegistryBuilder::default()
    }

    /// Resolve the triple for `identity`.
    ///
    /// A missing entry or a mixed-brand triple is a static-table bug and is
    /// reported as fatal.
    pub fn resolve(&self, identity: &VehicleIdentity) -> Result<&InterfaceEntry> {
        let entry = self
            .entries
            .get(identity)
            .ok_or_else(|| eyre::Report::new(VehidError::UnknownIdentity(identity.clone())))?;
        entry.check(identity).map_err(eyre::Report::new)?;
        Ok(entry)
    }

    pub fn contains(&self, identity: &VehicleIdentity) -> bool {
        self.entries.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered identities in sorted order.
    pub fn identities(&self) -> Vec<&VehicleIdentity> {
        let mut ids: Vec<_> = self.entries.keys().collect();
        ids.sort();
        ids
    }
}

#[derive(Debug, Default)]
pub struct RadarRegistry {
    entries: HashMap<VehicleIdentity, Factory<RadarCtor>>,
}

impl RadarRegistry {
    pub fn builder() -> RegistryBuilder<Factory<RadarCtor>> {
        RegistryBuilder::default()
    }

    /// Build the ranging interface for a session.
    ///
    /// Vehicles whose radar is not on the bus get a no-op interface without
    /// a registry lookup.
    pub fn resolve(&self, params: &CarParams) -> Result<Box<dyn RadarInterface>> {
        if params.radar_off_can {
            return Ok(Box::new(NoRadar));
        }
        let factory = self.entries.get(&params.car_name).ok_or_else(|| {
            eyre::Report::new(VehidError::UnknownIdentity(params.car_name.clone()))
        })?;
        if factory.brand != params.brand {
            return Err(eyre::Report::new(VehidError::InterfaceMismatch {
                identity: params.car_name.clone(),
                detail: format!("radar is {} but vehicle is {}", factory.brand, params.brand),
            }));
        }
        Ok((factory.build)(params))
    }

    pub fn contains(&self, identity: &VehicleIdentity) -> bool {
        self.entries.contains_key(identity)
    }
}

/// Shared builder for both registries; duplicates are rejected at `build()`.
#[derive(Debug)]
pub struct RegistryBuilder<E> {
    entries: Vec<(VehicleIdentity, E)>,
}

impl<E> Default for RegistryBuilder<E> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<E> RegistryBuilder<E> {
    pub fn register(mut self, identity: VehicleIdentity, entry: E) -> Self {
        self.entries.push((identity, entry));
        self
    }

    fn into_map(self) -> Result<HashMap<VehicleIdentity, E>> {
        let mut map = HashMap::with_capacity(self.entries.len());
        for (identity, entry) in self.entries {
            if map.contains_key(&identity) {
                return Err(eyre::Report::new(BuildError::DuplicateIdentity(identity)));
            }
            map.insert(identity, entry);
        }
        Ok(map)
    }
}

impl RegistryBuilder<InterfaceEntry> {
    pub fn build(self) -> Result<InterfaceRegistry> {
        Ok(InterfaceRegistry {
            entries: self.into_map()?,
        })
    }
}

impl RegistryBuilder<Factory<RadarCtor>> {
    pub fn build(self) -> Result<RadarRegistry> {
        Ok(RadarRegistry {
            entries: self.into_map()?,
        })
    }
}
