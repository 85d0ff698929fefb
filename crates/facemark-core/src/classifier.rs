//! Weighted k-nearest-neighbor classification against the prototype store.
//!
//! The nearest distance decides rejection; the k neighbors vote only when
//! the query is close enough to be in-distribution.

use crate::store::PrototypeStore;
use crate::types::{FeatureVector, WeightVector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Display label of the rejected identity.
pub const UNKNOWN_LABEL: &str = "unknown";

#[derive(Error, Debug, PartialEq)]
pub enum ClassifyError {
    #[error("no prototypes enrolled")]
    NoPrototypes,
    #[error("k must be at least 1")]
    InvalidK,
    #[error("threshold must be a non-negative number, got {0}")]
    InvalidThreshold(f32),
    #[error("dimension mismatch: query has {query}, {what} has {other}")]
    DimensionMismatch {
        what: String,
        query: usize,
        other: usize,
    },
    #[error("unknown distance metric: {0} (expected euclidean or cosine)")]
    UnknownMetric(String),
}

/// A distance between a query and a prototype under optional per-dimension weights.
pub trait Distance {
    /// Lengths must already agree; see [`checked_distance`].
    fn distance(&self, query: &[f32], prototype: &[f32], weights: Option<&[f32]>) -> f32;
}

/// `sqrt(Σ w·(q − p)²)`
pub struct Euclidean;

impl Distance for Euclidean {
    fn distance(&self, query: &[f32], prototype: &[f32], weights: Option<&[f32]>) -> f32 {
        query
            .iter()
            .zip(prototype.iter())
            .enumerate()
            .map(|(i, (q, p))| weight_at(weights, i) * (q - p).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// `1 − Σwqp / (‖q‖_w · ‖p‖_w)`, infinite when either weighted norm is zero.
pub struct Cosine;

impl Distance for Cosine {
    fn distance(&self, query: &[f32], prototype: &[f32], weights: Option<&[f32]>) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_q = 0.0f32;
        let mut norm_p = 0.0f32;

        for (i, (q, p)) in query.iter().zip(prototype.iter()).enumerate() {
            let w = weight_at(weights, i);
            dot += w * q * p;
            norm_q += w * q * q;
            norm_p += w * p * p;
        }

        if norm_q == 0.0 || norm_p == 0.0 {
            return f32::INFINITY;
        }
        1.0 - dot / (norm_q.sqrt() * norm_p.sqrt())
    }
}

fn weight_at(weights: Option<&[f32]>, i: usize) -> f32 {
    weights.and_then(|w| w.get(i)).copied().unwrap_or(1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Euclidean,
    Cosine,
}

impl DistanceMetric {
    fn as_distance(&self) -> &'static dyn Distance {
        match self {
            DistanceMetric::Euclidean => &Euclidean,
            DistanceMetric::Cosine => &Cosine,
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceMetric::Euclidean => f.write_str("euclidean"),
            DistanceMetric::Cosine => f.write_str("cosine"),
        }
    }
}

impl FromStr for DistanceMetric {
    type Err = ClassifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "euclidean" | "l2" => Ok(DistanceMetric::Euclidean),
            "cosine" => Ok(DistanceMetric::Cosine),
            other => Err(ClassifyError::UnknownMetric(other.to_string())),
        }
    }
}

/// Distance between `query` and `prototype`, validating all lengths first.
pub fn checked_distance(
    metric: DistanceMetric,
    query: &FeatureVector,
    prototype: &FeatureVector,
    weights: Option<&WeightVector>,
) -> Result<f32, ClassifyError> {
    if prototype.len() != query.len() {
        return Err(ClassifyError::DimensionMismatch {
            what: "prototype".into(),
            query: query.len(),
            other: prototype.len(),
        });
    }
    if let Some(w) = weights {
        if w.len() != query.len() {
            return Err(ClassifyError::DimensionMismatch {
                what: "weight vector".into(),
                query: query.len(),
                other: w.len(),
            });
        }
    }
    Ok(metric.as_distance().distance(
        &query.values,
        &prototype.values,
        weights.map(|w| w.values.as_slice()),
    ))
}

/// Per-call classification parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub k: usize,
    pub metric: DistanceMetric,
    pub threshold: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            k: 1,
            metric: DistanceMetric::Euclidean,
            threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Known(String),
    /// Nearest prototype farther than the rejection threshold.
    Unknown,
}

impl Identity {
    pub fn as_known(&self) -> Option<&str> {
        match self {
            Identity::Known(id) => Some(id),
            Identity::Unknown => None,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Known(id) => f.write_str(id),
            Identity::Unknown => f.write_str(UNKNOWN_LABEL),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub identifier: String,
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub identity: Identity,
    /// Distance to the nearest prototype, even when the vote picked another identity.
    pub distance: f32,
    /// The k nearest prototypes, ascending.
    pub neighbors: Vec<Neighbor>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct KnnClassifier {
    config: ClassifierConfig,
}

impl KnnClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn classify(
        &self,
        query: &FeatureVector,
        weights: Option<&WeightVector>,
        store: &PrototypeStore,
    ) -> Result<Classification, ClassifyError> {
        let ClassifierConfig {
            k,
            metric,
            threshold,
        } = self.config;

        if k == 0 {
            return Err(ClassifyError::InvalidK);
        }
        if threshold.is_nan() || threshold < 0.0 {
            return Err(ClassifyError::InvalidThreshold(threshold));
        }
        if store.is_empty() {
            return Err(ClassifyError::NoPrototypes);
        }

        let mut ranked = store
            .iter()
            .map(|(id, proto)| {
                checked_distance(metric, query, &proto.vector, weights).map(|distance| Neighbor {
                    identifier: id.to_string(),
                    distance,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        // Stable: equal distances keep store order.
        ranked.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        ranked.truncate(k);

        let nearest = ranked[0].distance;
        if nearest > threshold {
            return Ok(Classification {
                identity: Identity::Unknown,
                distance: nearest,
                neighbors: ranked,
            });
        }

        let winner = plurality(&ranked).to_string();
        Ok(Classification {
            identity: Identity::Known(winner),
            distance: nearest,
            neighbors: ranked,
        })
    }
}

/// Most frequent identifier among `neighbors`; ties go to the one seen first
/// (i.e. nearest). `neighbors` must be non-empty and sorted ascending.
fn plurality(neighbors: &[Neighbor]) -> &str {
    let mut tally: Vec<(&str, usize)> = Vec::new();
    for n in neighbors {
        match tally.iter_mut().find(|(id, _)| *id == n.identifier) {
            Some((_, votes)) => *votes += 1,
            None => tally.push((n.identifier.as_str(), 1)),
        }
    }

    let mut best = tally[0];
    for &(id, votes) in &tally[1..] {
        if votes > best.1 {
            best = (id, votes);
        }
    }
    best.0
}
