//! Static fingerprint database: vehicle identity to reference bus signatures.
//!
//! Entries keep registration order. The first entry registered for the
//! database wins ties when the matcher cannot settle, and the first signature
//! of an entry is its canonical variant.

use std::collections::HashMap;

use vehid_traits::{Fingerprint, VehicleIdentity};

use crate::error::{BuildError, Result};

/// Expected `id -> length` pairs per channel for one vehicle variant.
pub type BusSignature = Fingerprint;

/// Upper bound on signature variants per identity (tracked as a bitmask).
pub const MAX_VARIANTS: usize = 64;

#[derive(Debug, Clone)]
pub struct FingerprintEntry {
    identity: VehicleIdentity,
    signatures: Vec<BusSignature>,
}

impl FingerprintEntry {
    pub fn identity(&self) -> &VehicleIdentity {
        &self.identity
    }

    pub fn signatures(&self) -> &[BusSignature] {
        &self.signatures
    }

    /// First-registered signature.
    pub fn canonical(&self) -> &BusSignature {
        // Non-empty by construction (`DatabaseBuilder::build`).
        &self.signatures[0]
    }
}

/// Read-only after `build()`; share it behind `Arc` or a process-wide static.
#[derive(Debug, Clone, Default)]
pub struct FingerprintDatabase {
    entries: Vec<FingerprintEntry>,
    index: HashMap<VehicleIdentity, usize>,
}

impl FingerprintDatabase {
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[FingerprintEntry] {
        &self.entries
    }

    pub fn get(&self, identity: &VehicleIdentity) -> Option<&FingerprintEntry> {
        self.index.get(identity).map(|&i| &self.entries[i])
    }

    /// Registration position of `identity`.
    pub fn position(&self, identity: &VehicleIdentity) -> Option<usize> {
        self.index.get(identity).copied()
    }

    pub fn identities(&self) -> impl Iterator<Item = &VehicleIdentity> {
        self.entries.iter().map(|e| &e.identity)
    }
}

#[derive(Debug, Default)]
pub struct DatabaseBuilder {
    entries: Vec<FingerprintEntry>,
}

impl DatabaseBuilder {
    /// Register `identity` with its signatures, canonical first.
    pub fn add(mut self, identity: VehicleIdentity, signatures: Vec<BusSignature>) -> Self {
        self.entries.push(FingerprintEntry {
            identity,
            signatures,
        });
        self
    }

    pub fn build(self) -> Result<FingerprintDatabase> {
        let mut index = HashMap::with_capacity(self.entries.len());
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.signatures.is_empty() {
                return Err(eyre::Report::new(BuildError::EmptySignatures {
                    identity: entry.identity.clone(),
                }));
            }
            if entry.signatures.len() > MAX_VARIANTS {
                return Err(eyre::Report::new(BuildError::TooManyVariants {
                    identity: entry.identity.clone(),
                    count: entry.signatures.len(),
                    max: MAX_VARIANTS,
                }));
            }
            if index.insert(entry.identity.clone(), i).is_some() {
                return Err(eyre::Report::new(BuildError::DuplicateIdentity(
                    entry.identity.clone(),
                )));
            }
        }
        Ok(FingerprintDatabase {
            entries: self.entries,
            index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(pairs: &[(u32, u8)]) -> BusSignature {
        Fingerprint::new().with_channel(0, pairs)
    }

    #[test]
    fn keeps_registration_order() {
        let db = FingerprintDatabase::builder()
            .add("B".into(), vec![sig(&[(1, 8)])])
            .add("A".into(), vec![sig(&[(1, 4)])])
            .build()
            .unwrap();
        let names: Vec<_> = db.identities().map(|i| i.as_str().to_owned()).collect();
        assert_eq!(names, ["B", "A"]);
        assert_eq!(db.position(&"A".into()), Some(1));
    }

    #[test]
    fn rejects_duplicates_and_empty_entries() {
        let err = FingerprintDatabase::builder()
            .add("A".into(), vec![sig(&[(1, 8)])])
            .add("A".into(), vec![sig(&[(2, 8)])])
            .build()
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::DuplicateIdentity(_))
        ));

        let err = FingerprintDatabase::builder()
            .add("A".into(), vec![])
            .build()
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::EmptySignatures { .. })
        ));
    }
}
