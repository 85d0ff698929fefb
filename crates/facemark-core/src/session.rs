//! Per-frame orchestration over all mutable recognition state.
//!
//! One detector callback maps to one [`Session::on_frame`] call. The capture
//! timer fires at the top of every frame, before throttling, and can also be
//! fired on its own through [`Session::tick`]. A frame that closes a capture
//! is then processed as an ordinary non-capturing frame.

use crate::capture::{CaptureController, CaptureError, CaptureReport, DEFAULT_CAPTURE_WINDOW};
use crate::classifier::{Classification, ClassifierConfig, ClassifyError, KnnClassifier};
use crate::exchange::{self, ExchangeError, ImportReport};
use crate::normalizer::{NormalizeError, NormalizeMode, Normalizer};
use crate::store::PrototypeStore;
use crate::throttle::{FrameThrottle, DEFAULT_TARGET_FPS};
use crate::types::{DetectionFrame, Landmark, Prototype};
use crate::zones::FacialZones;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("no prototypes enrolled")]
    NoPrototypes,
    #[error("capture: {0}")]
    Capture(#[from] CaptureError),
    #[error("normalize: {0}")]
    Normalize(#[from] NormalizeError),
    #[error("classify: {0}")]
    Classify(#[from] ClassifyError),
    #[error("exchange: {0}")]
    Exchange(#[from] ExchangeError),
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub classifier: ClassifierConfig,
    pub capture_window: Duration,
    pub target_fps: u32,
    pub normalizer: Normalizer,
    pub zones: FacialZones,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierConfig::default(),
            capture_window: DEFAULT_CAPTURE_WINDOW,
            target_fps: DEFAULT_TARGET_FPS,
            normalizer: Normalizer::default(),
            zones: FacialZones::mediapipe_default(),
        }
    }
}

/// What one detector frame produced.
#[derive(Debug)]
pub enum FrameEvent {
    /// Arrived before the throttle interval elapsed; not processed.
    Dropped,
    /// Frame buffered into the running capture.
    Captured { buffered: usize },
    /// No face in the frame.
    NoFace,
    /// Predicting, but nothing is enrolled.
    NoReferenceData,
    Prediction(Classification),
    /// Neither capturing nor predicting.
    Idle,
    /// The face could not be normalized or classified.
    Failed(SessionError),
}

/// Result of one [`Session::on_frame`] call.
#[derive(Debug)]
pub struct FrameReport {
    /// Capture window that closed at the top of this frame, if any.
    pub finished: Option<Result<CaptureReport, CaptureError>>,
    pub event: FrameEvent,
}

pub struct Session {
    normalizer: Normalizer,
    zones: FacialZones,
    store: PrototypeStore,
    capture: CaptureController,
    throttle: FrameThrottle,
    classifier: KnnClassifier,
    predicting: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            normalizer: config.normalizer,
            zones: config.zones,
            store: PrototypeStore::new(),
            capture: CaptureController::new(config.capture_window),
            throttle: FrameThrottle::from_fps(config.target_fps),
            classifier: KnnClassifier::new(config.classifier),
            predicting: false,
        }
    }

    pub fn store(&self) -> &PrototypeStore {
        &self.store
    }

    pub fn zones(&self) -> &FacialZones {
        &self.zones
    }

    pub fn zones_mut(&mut self) -> &mut FacialZones {
        &mut self.zones
    }

    pub fn classifier_config(&self) -> &ClassifierConfig {
        self.classifier.config()
    }

    pub fn set_classifier_config(&mut self, config: ClassifierConfig) {
        self.classifier = KnnClassifier::new(config);
    }

    pub fn capture(&self) -> &CaptureController {
        &self.capture
    }

    pub fn is_predicting(&self) -> bool {
        self.predicting
    }

    pub fn start_capture(&mut self, identifier: &str, now: Instant) -> Result<(), SessionError> {
        self.capture.start(identifier, now)?;
        Ok(())
    }

    /// Fire the capture timer. Returns the finished capture, if the window closed.
    pub fn tick(&mut self, now: Instant) -> Option<Result<CaptureReport, CaptureError>> {
        self.capture.poll(now, &mut self.store).transpose()
    }

    pub fn start_predicting(&mut self) -> Result<(), SessionError> {
        if self.store.is_empty() {
            return Err(SessionError::NoPrototypes);
        }
        self.predicting = true;
        tracing::info!(config = ?self.classifier.config(), "live prediction started");
        Ok(())
    }

    pub fn stop_predicting(&mut self) {
        if self.predicting {
            tracing::info!("live prediction stopped");
        }
        self.predicting = false;
    }

    /// Process one detector callback.
    pub fn on_frame(&mut self, frame: &DetectionFrame) -> FrameReport {
        let finished = self.tick(frame.timestamp);
        let event = self.process(frame);
        FrameReport { finished, event }
    }

    fn process(&mut self, frame: &DetectionFrame) -> FrameEvent {
        if !self.throttle.admit(frame.timestamp) {
            return FrameEvent::Dropped;
        }

        let Some(face) = frame.primary_face() else {
            return FrameEvent::NoFace;
        };

        if self.capture.is_capturing() {
            return match self.normalizer.normalize(face, NormalizeMode::Capture) {
                Ok(normalized) => {
                    self.capture.observe(normalized.features);
                    let buffered = self.capture.buffered();
                    tracing::debug!(buffered, "capture frame buffered");
                    FrameEvent::Captured { buffered }
                }
                Err(e) => FrameEvent::Failed(e.into()),
            };
        }

        if !self.predicting {
            return FrameEvent::Idle;
        }
        if self.store.is_empty() {
            return FrameEvent::NoReferenceData;
        }

        match self.classify_face(face) {
            Ok(classification) => {
                tracing::debug!(
                    identity = %classification.identity,
                    distance = classification.distance,
                    "frame classified"
                );
                FrameEvent::Prediction(classification)
            }
            Err(e) => FrameEvent::Failed(e),
        }
    }

    fn classify_face(&self, face: &[Landmark]) -> Result<Classification, SessionError> {
        let normalized = self
            .normalizer
            .normalize(face, NormalizeMode::Inference(&self.zones))?;
        let classification =
            self.classifier
                .classify(&normalized.features, Some(&normalized.weights), &self.store)?;
        Ok(classification)
    }

    pub fn remove(&mut self, identifier: &str) -> Option<Prototype> {
        let removed = self.store.remove(identifier);
        if removed.is_some() {
            tracing::info!(identifier, "prototype removed");
        }
        removed
    }

    /// Drop every prototype. Live prediction stops since nothing is enrolled.
    pub fn clear(&mut self) {
        let count = self.store.len();
        self.store.clear();
        self.stop_predicting();
        tracing::info!(count, "all prototypes cleared");
    }

    pub fn export(&self) -> Result<serde_json::Value, SessionError> {
        Ok(exchange::export(&self.store)?)
    }

    pub fn export_pretty(&self) -> Result<String, SessionError> {
        Ok(exchange::export_pretty(&self.store)?)
    }

    pub fn import(&mut self, value: &serde_json::Value) -> Result<ImportReport, SessionError> {
        Ok(exchange::import(&mut self.store, value)?)
    }

    pub fn import_str(&mut self, json: &str) -> Result<ImportReport, SessionError> {
        Ok(exchange::import_str(&mut self.store, json)?)
    }
}
