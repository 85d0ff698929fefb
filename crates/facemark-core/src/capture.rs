//! Capture controller: accumulates frames for a fixed window, then merges
//! their mean into the prototype store.

use crate::store::{MergeOutcome, PrototypeStore, StoreError};
use crate::types::FeatureVector;
use std::time::{Duration, Instant};
use thiserror::Error;

pub const DEFAULT_CAPTURE_WINDOW: Duration = Duration::from_millis(3000);

#[derive(Error, Debug, PartialEq)]
pub enum CaptureError {
    #[error("identifier must not be empty")]
    EmptyIdentifier,
    #[error("a capture for {0} is already running")]
    Busy(String),
    #[error("no face detected during the capture window for {0}")]
    NoData(String),
    #[error("captured frames have inconsistent dimensions ({expected} vs {actual})")]
    InconsistentFrames { expected: usize, actual: usize },
    #[error("store rejected capture: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Capturing {
        identifier: String,
        started_at: Instant,
    },
}

/// A completed capture that was merged into the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureReport {
    pub identifier: String,
    /// Frames averaged in this capture.
    pub frames: usize,
    pub outcome: MergeOutcome,
}

pub struct CaptureController {
    window: Duration,
    state: CaptureState,
    buffer: Vec<FeatureVector>,
}

impl Default for CaptureController {
    fn default() -> Self {
        Self::new(DEFAULT_CAPTURE_WINDOW)
    }
}

impl CaptureController {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: CaptureState::Idle,
            buffer: Vec::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self.state, CaptureState::Capturing { .. })
    }

    /// Frames buffered in the running capture.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Idle → Capturing. The identifier is trimmed.
    pub fn start(&mut self, identifier: &str, now: Instant) -> Result<(), CaptureError> {
        if let CaptureState::Capturing { identifier, .. } = &self.state {
            return Err(CaptureError::Busy(identifier.clone()));
        }
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(CaptureError::EmptyIdentifier);
        }

        self.buffer.clear();
        self.state = CaptureState::Capturing {
            identifier: identifier.to_string(),
            started_at: now,
        };
        tracing::info!(identifier, window_ms = self.window.as_millis() as u64, "capture started");
        Ok(())
    }

    /// Buffer one capture-mode vector. Ignored while idle.
    pub fn observe(&mut self, vector: FeatureVector) {
        if self.is_capturing() {
            self.buffer.push(vector);
        }
    }

    /// Close the window if it has elapsed at `now` and merge into `store`.
    ///
    /// Returns `Ok(None)` while idle or while the window is still open. An
    /// empty buffer yields [`CaptureError::NoData`] and leaves the store
    /// untouched. The controller is idle again after any `Some`/`Err` return.
    pub fn poll(
        &mut self,
        now: Instant,
        store: &mut PrototypeStore,
    ) -> Result<Option<CaptureReport>, CaptureError> {
        let CaptureState::Capturing { started_at, .. } = &self.state else {
            return Ok(None);
        };
        if now.saturating_duration_since(*started_at) < self.window {
            return Ok(None);
        }

        let CaptureState::Capturing { identifier, .. } =
            std::mem::replace(&mut self.state, CaptureState::Idle)
        else {
            return Ok(None);
        };
        let frames = std::mem::take(&mut self.buffer);

        if frames.is_empty() {
            tracing::warn!(identifier = %identifier, "capture window closed without a face");
            return Err(CaptureError::NoData(identifier));
        }

        let mean = mean_vector(&frames)?;
        let outcome = store.merge(&identifier, mean, frames.len() as u32)?;
        tracing::info!(
            identifier = %identifier,
            frames = frames.len(),
            sample_count = outcome.sample_count(),
            created = matches!(outcome, MergeOutcome::Created { .. }),
            "capture merged"
        );

        Ok(Some(CaptureReport {
            identifier,
            frames: frames.len(),
            outcome,
        }))
    }

    /// Drop a running capture without merging. Returns the discarded frame count.
    pub fn abort(&mut self) -> usize {
        let discarded = self.buffer.len();
        if let CaptureState::Capturing { identifier, .. } =
            std::mem::replace(&mut self.state, CaptureState::Idle)
        {
            tracing::info!(identifier = %identifier, discarded, "capture aborted");
        }
        self.buffer.clear();
        discarded
    }
}

/// Arithmetic mean of equally weighted vectors. `vectors` must be non-empty.
pub fn mean_vector(vectors: &[FeatureVector]) -> Result<FeatureVector, CaptureError> {
    let dimension = vectors.first().map(FeatureVector::len).unwrap_or(0);
    let mut sum = vec![0.0f64; dimension];

    for v in vectors {
        if v.len() != dimension {
            return Err(CaptureError::InconsistentFrames {
                expected: dimension,
                actual: v.len(),
            });
        }
        for (acc, x) in sum.iter_mut().zip(v.values.iter()) {
            *acc += *x as f64;
        }
    }

    let n = vectors.len().max(1) as f64;
    Ok(FeatureVector::new(sum.into_iter().map(|s| (s / n) as f32).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(values: &[f32]) -> FeatureVector {
        FeatureVector::new(values.to_vec())
    }

    #[test]
    fn test_full_cycle_merges_mean() {
        let t0 = Instant::now();
        let mut store = PrototypeStore::new();
        let mut capture = CaptureController::new(Duration::from_secs(3));

        capture.start("  Ana ", t0).unwrap();
        capture.observe(v(&[0.0, 2.0]));
        capture.observe(v(&[2.0, 4.0]));
        assert_eq!(capture.poll(t0 + Duration::from_secs(1), &mut store), Ok(None));
        assert!(capture.is_capturing());

        let report = capture
            .poll(t0 + Duration::from_secs(3), &mut store)
            .unwrap()
            .unwrap();
        assert_eq!(report.identifier, "Ana");
        assert_eq!(report.frames, 2);
        assert_eq!(report.outcome, MergeOutcome::Created { sample_count: 2 });
        assert_eq!(store.get("Ana").unwrap().vector.values, vec![1.0, 3.0]);
        assert!(!capture.is_capturing());
        assert_eq!(capture.buffered(), 0);
    }

    #[test]
    fn test_busy_guard() {
        let t0 = Instant::now();
        let mut capture = CaptureController::default();
        capture.start("Ana", t0).unwrap();
        assert_eq!(capture.start("Luis", t0), Err(CaptureError::Busy("Ana".into())));
    }

    #[test]
    fn test_empty_identifier_rejected() {
        let mut capture = CaptureController::default();
        assert_eq!(capture.start("   ", Instant::now()), Err(CaptureError::EmptyIdentifier));
        assert_eq!(capture.state(), &CaptureState::Idle);
    }

    #[test]
    fn test_no_data_leaves_store_untouched() {
        let t0 = Instant::now();
        let mut store = PrototypeStore::new();
        let mut capture = CaptureController::new(Duration::from_millis(100));
        capture.start("Ana", t0).unwrap();

        let result = capture.poll(t0 + Duration::from_millis(100), &mut store);
        assert_eq!(result, Err(CaptureError::NoData("Ana".into())));
        assert!(store.is_empty());
        assert!(!capture.is_capturing());
        // Idle again: a new capture can start.
        capture.start("Ana", t0).unwrap();
    }

    #[test]
    fn test_observe_ignored_when_idle() {
        let mut capture = CaptureController::default();
        capture.observe(v(&[1.0]));
        assert_eq!(capture.buffered(), 0);
    }

    #[test]
    fn test_second_capture_accumulates() {
        let t0 = Instant::now();
        let window = Duration::from_millis(10);
        let mut store = PrototypeStore::new();
        let mut capture = CaptureController::new(window);

        capture.start("Ana", t0).unwrap();
        capture.observe(v(&[1.0, 1.0]));
        capture.poll(t0 + window, &mut store).unwrap();

        let t1 = t0 + window * 2;
        capture.start("Ana", t1).unwrap();
        capture.observe(v(&[3.0, 3.0]));
        capture.observe(v(&[5.0, 5.0]));
        let report = capture.poll(t1 + window, &mut store).unwrap().unwrap();

        assert_eq!(report.outcome, MergeOutcome::Updated { sample_count: 3 });
        assert_eq!(store.get("Ana").unwrap().vector.values, vec![3.0, 3.0]);
    }

    #[test]
    fn test_abort_discards_buffer() {
        let t0 = Instant::now();
        let mut store = PrototypeStore::new();
        let mut capture = CaptureController::default();
        capture.start("Ana", t0).unwrap();
        capture.observe(v(&[1.0]));
        assert_eq!(capture.abort(), 1);
        assert!(!capture.is_capturing());
        assert_eq!(capture.poll(t0 + Duration::from_secs(10), &mut store), Ok(None));
        assert!(store.is_empty());
    }

    #[test]
    fn test_mean_vector_rejects_mixed_dimensions() {
        let result = mean_vector(&[v(&[1.0, 2.0]), v(&[1.0])]);
        assert_eq!(
            result,
            Err(CaptureError::InconsistentFrames {
                expected: 2,
                actual: 1
            })
        );
    }
}
