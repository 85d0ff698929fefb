//! Prototype store, one aggregated feature vector per enrolled identity.

use crate::types::{FeatureVector, Prototype};
use indexmap::IndexMap;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum StoreError {
    #[error("identifier must not be empty")]
    EmptyIdentifier,
    #[error("sample count must be at least 1")]
    ZeroSamples,
    #[error("vector for {identifier} has {actual} dimensions, expected {expected}")]
    DimensionMismatch {
        identifier: String,
        expected: usize,
        actual: usize,
    },
}

/// What a successful merge did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Created { sample_count: u32 },
    Updated { sample_count: u32 },
}

impl MergeOutcome {
    pub fn sample_count(&self) -> u32 {
        match *self {
            MergeOutcome::Created { sample_count } | MergeOutcome::Updated { sample_count } => {
                sample_count
            }
        }
    }
}

/// Identifier → prototype map, iterated in insertion order.
///
/// Vectors are stored as given; callers supply already-normalized features.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrototypeStore {
    prototypes: IndexMap<String, Prototype>,
}

impl PrototypeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `sample_count` new frames averaging to `vector` into `identifier`.
    ///
    /// An existing prototype becomes the exact mean over all frames seen so
    /// far: `(old * old_count + new * new_count) / (old_count + new_count)`.
    /// On error the store is unchanged.
    pub fn merge(
        &mut self,
        identifier: &str,
        vector: FeatureVector,
        sample_count: u32,
    ) -> Result<MergeOutcome, StoreError> {
        if identifier.is_empty() {
            return Err(StoreError::EmptyIdentifier);
        }
        if sample_count == 0 {
            return Err(StoreError::ZeroSamples);
        }

        if let Some(existing) = self.prototypes.get_mut(identifier) {
            if existing.vector.len() != vector.len() {
                return Err(StoreError::DimensionMismatch {
                    identifier: identifier.to_string(),
                    expected: existing.vector.len(),
                    actual: vector.len(),
                });
            }

            let old_count = existing.sample_count as f64;
            let new_count = sample_count as f64;
            let total = old_count + new_count;
            for (old, new) in existing.vector.values.iter_mut().zip(vector.values.iter()) {
                *old = ((*old as f64 * old_count + *new as f64 * new_count) / total) as f32;
            }
            existing.sample_count = existing.sample_count.saturating_add(sample_count);

            return Ok(MergeOutcome::Updated {
                sample_count: existing.sample_count,
            });
        }

        if let Some(expected) = self.dimension() {
            if expected != vector.len() {
                return Err(StoreError::DimensionMismatch {
                    identifier: identifier.to_string(),
                    expected,
                    actual: vector.len(),
                });
            }
        }
        self.prototypes.insert(
            identifier.to_string(),
            Prototype {
                vector,
                sample_count,
            },
        );
        Ok(MergeOutcome::Created { sample_count })
    }

    /// Replace (or create) a prototype verbatim. Returns the previous record.
    pub fn insert(&mut self, identifier: &str, prototype: Prototype) -> Option<Prototype> {
        self.prototypes.insert(identifier.to_string(), prototype)
    }

    /// Remove a prototype; absent identifiers are a no-op.
    pub fn remove(&mut self, identifier: &str) -> Option<Prototype> {
        self.prototypes.shift_remove(identifier)
    }

    pub fn clear(&mut self) {
        self.prototypes.clear();
    }

    pub fn get(&self, identifier: &str) -> Option<&Prototype> {
        self.prototypes.get(identifier)
    }

    pub fn len(&self) -> usize {
        self.prototypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prototypes.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Prototype)> {
        self.prototypes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.prototypes.keys().map(String::as_str)
    }

    /// Dimension of the first stored prototype, if any.
    pub fn dimension(&self) -> Option<usize> {
        self.prototypes.values().next().map(|p| p.vector.len())
    }
}
