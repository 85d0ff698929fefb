use serde::{Deserialize, Serialize};
use std::time::Instant;

/// A single detected facial point in image-normalized coordinates (~[0, 1]).
///
/// Its identity is its position in the detector's ordered landmark list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    /// Depth, when the detector provides it. Ignored by normalization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f32>,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: None }
    }
}

/// Flat feature vector: interleaved `x, y` per landmark (length 2·N).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector {
    pub values: Vec<f32>,
}

impl FeatureVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Vec<f32>> for FeatureVector {
    fn from(values: Vec<f32>) -> Self {
        Self { values }
    }
}

/// Per-dimension weights parallel to a [`FeatureVector`].
///
/// `values[2i] == values[2i + 1]`: both coordinates of a landmark share its weight.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WeightVector {
    pub values: Vec<f32>,
}

impl WeightVector {
    /// All-ones weights over `dimension` slots.
    pub fn uniform(dimension: usize) -> Self {
        Self {
            values: vec![1.0; dimension],
        }
    }

    /// Broadcast one weight per landmark to its `x` and `y` slots.
    pub fn from_landmark_weights(per_landmark: &[f32]) -> Self {
        Self {
            values: per_landmark.iter().flat_map(|&w| [w, w]).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Aggregated reference vector for one enrolled identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prototype {
    pub vector: FeatureVector,
    /// Number of frames averaged into `vector` so far.
    #[serde(rename = "sampleCount")]
    pub sample_count: u32,
}

/// Output of one detector callback: zero or more faces, each a full landmark list.
#[derive(Debug, Clone)]
pub struct DetectionFrame {
    pub timestamp: Instant,
    pub faces: Vec<Vec<Landmark>>,
}

impl DetectionFrame {
    /// The face the engine acts on (detector is configured for a single face).
    pub fn primary_face(&self) -> Option<&[Landmark]> {
        self.faces.first().map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_broadcast_pairs() {
        let w = WeightVector::from_landmark_weights(&[0.5, 2.0]);
        assert_eq!(w.values, vec![0.5, 0.5, 2.0, 2.0]);
    }

    #[test]
    fn test_prototype_json_field_names() {
        let p = Prototype {
            vector: FeatureVector::new(vec![1.0, 2.0]),
            sample_count: 3,
        };
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json, serde_json::json!({ "vector": [1.0, 2.0], "sampleCount": 3 }));
    }

    #[test]
    fn test_landmark_z_optional() {
        let lm: Landmark = serde_json::from_str(r#"{"x":0.25,"y":0.5}"#).unwrap();
        assert_eq!(lm, Landmark::new(0.25, 0.5));
        let lm: Landmark = serde_json::from_str(r#"{"x":0.25,"y":0.5,"z":-0.1}"#).unwrap();
        assert_eq!(lm.z, Some(-0.1));
    }

    #[test]
    fn test_primary_face_empty_frame() {
        let frame = DetectionFrame {
            timestamp: Instant::now(),
            faces: vec![],
        };
        assert!(frame.primary_face().is_none());
    }
}
