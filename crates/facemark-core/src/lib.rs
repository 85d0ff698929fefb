//! facemark-core — Face recognition from geometric landmarks.
//!
//! Normalizes detector landmarks into scale-invariant feature vectors,
//! averages them into per-person prototypes, and classifies live frames
//! with a weighted k-nearest-neighbor vote and a rejection threshold.

pub mod capture;
pub mod classifier;
pub mod exchange;
pub mod normalizer;
pub mod session;
pub mod store;
pub mod throttle;
pub mod types;
pub mod zones;

pub use classifier::{Classification, ClassifierConfig, DistanceMetric, Identity, KnnClassifier};
pub use session::{FrameEvent, FrameReport, Session, SessionConfig, SessionError};
pub use store::PrototypeStore;
pub use types::{DetectionFrame, FeatureVector, Landmark, Prototype, WeightVector};
pub use zones::FacialZones;
