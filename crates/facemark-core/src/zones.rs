//! Facial zones — weighted landmark groups used at inference time.
//!
//! The default table for the MediaPipe FaceMesh topology is embedded at
//! compile time from `contrib/zones/mediapipe-468.toml`.

use crate::types::WeightVector;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

const MEDIAPIPE_468_ZONES: &str = include_str!("../../../contrib/zones/mediapipe-468.toml");

static DEFAULT_ZONES: OnceLock<FacialZones> = OnceLock::new();

#[derive(Error, Debug)]
pub enum ZoneError {
    #[error("unknown facial zone: {0}")]
    UnknownZone(String),
    #[error("zone weight must be a finite positive number, got {0}")]
    InvalidWeight(f32),
    #[error("bad zone table: {0}")]
    Parse(#[from] toml::de::Error),
}

/// A named group of landmark indices with an activation flag and weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacialZone {
    pub name: String,
    pub weight: f32,
    #[serde(default = "default_active")]
    pub active: bool,
    pub indices: Vec<usize>,
}

fn default_active() -> bool {
    true
}

/// The full zone configuration consulted by the normalizer in inference mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FacialZones {
    #[serde(rename = "zone", default)]
    zones: Vec<FacialZone>,
}

impl FacialZones {
    /// Parse a zone table (`[[zone]]` entries) from TOML.
    pub fn from_toml_str(src: &str) -> Result<Self, ZoneError> {
        let zones: FacialZones = toml::from_str(src)?;
        for zone in &zones.zones {
            validate_weight(zone.weight)?;
        }
        Ok(zones)
    }

    /// The embedded MediaPipe FaceMesh table.
    pub fn mediapipe_default() -> Self {
        DEFAULT_ZONES
            .get_or_init(|| match Self::from_toml_str(MEDIAPIPE_468_ZONES) {
                Ok(z) => z,
                Err(e) => {
                    tracing::error!(error = %e, "embedded zone table is invalid; using no zones");
                    FacialZones::default()
                }
            })
            .clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FacialZone> {
        self.zones.iter()
    }

    pub fn get(&self, name: &str) -> Option<&FacialZone> {
        self.zones.iter().find(|z| z.name == name)
    }

    fn get_mut(&mut self, name: &str) -> Result<&mut FacialZone, ZoneError> {
        self.zones
            .iter_mut()
            .find(|z| z.name == name)
            .ok_or_else(|| ZoneError::UnknownZone(name.to_string()))
    }

    pub fn set_active(&mut self, name: &str, active: bool) -> Result<(), ZoneError> {
        self.get_mut(name)?.active = active;
        Ok(())
    }

    pub fn set_weight(&mut self, name: &str, weight: f32) -> Result<(), ZoneError> {
        validate_weight(weight)?;
        self.get_mut(name)?.weight = weight;
        Ok(())
    }

    /// Effective per-dimension weights for a face of `landmark_count` points.
    ///
    /// Each landmark takes the maximum weight of the active zones containing
    /// it, or 0 if none does. Indices beyond `landmark_count` are ignored.
    pub fn landmark_weights(&self, landmark_count: usize) -> WeightVector {
        let mut per_landmark = vec![0.0f32; landmark_count];
        for zone in self.zones.iter().filter(|z| z.active) {
            for &idx in &zone.indices {
                if let Some(w) = per_landmark.get_mut(idx) {
                    *w = w.max(zone.weight);
                }
            }
        }
        WeightVector::from_landmark_weights(&per_landmark)
    }
}

fn validate_weight(weight: f32) -> Result<(), ZoneError> {
    if weight.is_finite() && weight > 0.0 {
        Ok(())
    } else {
        Err(ZoneError::InvalidWeight(weight))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_zones() -> FacialZones {
        FacialZones::from_toml_str(
            r#"
            [[zone]]
            name = "a"
            weight = 2.0
            indices = [0, 1]

            [[zone]]
            name = "b"
            weight = 0.5
            active = true
            indices = [1, 2]
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_embedded_table_loads() {
        let zones = FacialZones::mediapipe_default();
        for name in ["eyes", "eyebrows", "nose", "mouth", "contour"] {
            assert!(zones.get(name).is_some(), "missing zone {name}");
        }
        // Reference eye landmarks belong to the eyes zone.
        let eyes = zones.get("eyes").unwrap();
        assert!(eyes.indices.contains(&33));
        assert!(eyes.indices.contains(&263));
        assert!(zones.iter().flat_map(|z| z.indices.iter()).all(|&i| i < 468));
    }

    #[test]
    fn test_overlap_takes_max() {
        let w = two_zones().landmark_weights(4);
        assert_eq!(w.values, vec![2.0, 2.0, 2.0, 2.0, 0.5, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_inactive_zone_ignored() {
        let mut zones = two_zones();
        zones.set_active("a", false).unwrap();
        let w = zones.landmark_weights(3);
        assert_eq!(w.values, vec![0.0, 0.0, 0.5, 0.5, 0.5, 0.5]);
    }

    #[test]
    fn test_set_weight_validation() {
        let mut zones = two_zones();
        assert!(matches!(zones.set_weight("a", 0.0), Err(ZoneError::InvalidWeight(_))));
        assert!(matches!(zones.set_weight("a", f32::NAN), Err(ZoneError::InvalidWeight(_))));
        assert!(matches!(zones.set_weight("zz", 1.0), Err(ZoneError::UnknownZone(_))));
        zones.set_weight("b", 3.0).unwrap();
        assert_eq!(zones.landmark_weights(3).values[4], 3.0);
    }

    #[test]
    fn test_parse_rejects_nonpositive_weight() {
        let result = FacialZones::from_toml_str(
            r#"
            [[zone]]
            name = "bad"
            weight = -1.0
            indices = [0]
            "#,
        );
        assert!(matches!(result, Err(ZoneError::InvalidWeight(_))));
    }

    #[test]
    fn test_out_of_range_index_ignored() {
        let zones = FacialZones::from_toml_str(
            r#"
            [[zone]]
            name = "far"
            weight = 1.0
            indices = [0, 999]
            "#,
        )
        .unwrap();
        assert_eq!(zones.landmark_weights(1).values, vec![1.0, 1.0]);
    }
}
