//! Landmark normalization — translation- and scale-invariant feature vectors.
//!
//! Landmarks are centered on the midpoint between the two eye reference
//! points and divided by the interpupillary distance (IPD).

use crate::types::{FeatureVector, Landmark, WeightVector};
use crate::zones::FacialZones;
use thiserror::Error;

// --- MediaPipe FaceMesh reference indices ---
pub const MEDIAPIPE_LEFT_EYE: usize = 33;
pub const MEDIAPIPE_RIGHT_EYE: usize = 263;

/// Below this IPD the reference points are treated as coincident.
pub const MIN_IPD: f32 = 1e-6;

#[derive(Error, Debug, PartialEq)]
pub enum NormalizeError {
    #[error("reference landmark {index} missing from a face of {len} landmarks")]
    MissingReference { index: usize, len: usize },
}

/// Which weight vector accompanies the features.
#[derive(Debug, Clone, Copy)]
pub enum NormalizeMode<'a> {
    /// Enrollment: uniform weights of 1.0.
    Capture,
    /// Live classification: weights from the active facial zones.
    Inference(&'a FacialZones),
}

/// Normalized features plus the weights to compare them with.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub features: FeatureVector,
    pub weights: WeightVector,
    /// Set when the IPD was below [`MIN_IPD`] and raw coordinates were
    /// returned. Such vectors are not comparable with normally scaled ones.
    pub degenerate: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    left_eye: usize,
    right_eye: usize,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(MEDIAPIPE_LEFT_EYE, MEDIAPIPE_RIGHT_EYE)
    }
}

impl Normalizer {
    pub fn new(left_eye: usize, right_eye: usize) -> Self {
        Self {
            left_eye,
            right_eye,
        }
    }

    pub fn normalize(
        &self,
        landmarks: &[Landmark],
        mode: NormalizeMode<'_>,
    ) -> Result<Normalized, NormalizeError> {
        let (features, degenerate) = self.features(landmarks)?;
        let weights = match mode {
            NormalizeMode::Capture => WeightVector::uniform(features.len()),
            NormalizeMode::Inference(zones) => zones.landmark_weights(landmarks.len()),
        };
        Ok(Normalized {
            features,
            weights,
            degenerate,
        })
    }

    fn reference(&self, landmarks: &[Landmark], index: usize) -> Result<Landmark, NormalizeError> {
        landmarks
            .get(index)
            .copied()
            .ok_or(NormalizeError::MissingReference {
                index,
                len: landmarks.len(),
            })
    }

    fn features(&self, landmarks: &[Landmark]) -> Result<(FeatureVector, bool), NormalizeError> {
        let left = self.reference(landmarks, self.left_eye)?;
        let right = self.reference(landmarks, self.right_eye)?;

        let center_x = (left.x + right.x) / 2.0;
        let center_y = (left.y + right.y) / 2.0;
        let ipd = (right.x - left.x).hypot(right.y - left.y);

        if ipd < MIN_IPD {
            tracing::warn!(ipd, "reference landmarks coincide; returning unnormalized coordinates");
            let raw = landmarks.iter().flat_map(|lm| [lm.x, lm.y]).collect();
            return Ok((FeatureVector::new(raw), true));
        }

        let values = landmarks
            .iter()
            .flat_map(|lm| [(lm.x - center_x) / ipd, (lm.y - center_y) / ipd])
            .collect();
        Ok((FeatureVector::new(values), false))
    }
}
