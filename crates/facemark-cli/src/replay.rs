//! Replays a recorded detector stream (JSON lines) through a [`Session`].
//!
//! Each line is one detector callback:
//! `{"timestampMs": 0, "faces": [[{"x": 0.41, "y": 0.52}, ...]]}`.

use facemark_core::capture::{CaptureError, CaptureReport};
use facemark_core::{Classification, DetectionFrame, FrameEvent, Landmark, Session, SessionError};
use serde::Deserialize;
use std::io::BufRead;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("reading frames: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        source: serde_json::Error,
    },
    #[error("frame stream is empty")]
    EmptyStream,
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedFrame {
    pub timestamp_ms: u64,
    #[serde(default)]
    pub faces: Vec<Vec<Landmark>>,
}

impl RecordedFrame {
    fn at(&self, origin: Instant) -> DetectionFrame {
        DetectionFrame {
            timestamp: origin + Duration::from_millis(self.timestamp_ms),
            faces: self.faces.clone(),
        }
    }
}

/// Parse a JSON-lines stream. Blank lines are skipped.
pub fn read_frames(reader: impl BufRead) -> Result<Vec<RecordedFrame>, ReplayError> {
    let mut frames = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let frame = serde_json::from_str(&line).map_err(|source| ReplayError::Parse {
            line: i + 1,
            source,
        })?;
        frames.push(frame);
    }
    Ok(frames)
}

/// Capture `identifier` starting at the first frame.
///
/// Frames after the one that closes the window are not consumed. If the
/// stream ends first, the capture timer fires at `start + window`.
pub fn run_enroll(
    session: &mut Session,
    frames: &[RecordedFrame],
    identifier: &str,
) -> Result<CaptureReport, ReplayError> {
    let first = frames.first().ok_or(ReplayError::EmptyStream)?;
    let origin = Instant::now();
    let started_at = origin + Duration::from_millis(first.timestamp_ms);
    session.start_capture(identifier, started_at)?;

    for recorded in frames {
        let report = session.on_frame(&recorded.at(origin));
        if let Some(result) = report.finished {
            return Ok(result?);
        }
        match report.event {
            FrameEvent::Failed(e) => {
                tracing::warn!(ts = recorded.timestamp_ms, error = %e, "frame skipped");
            }
            event => tracing::trace!(ts = recorded.timestamp_ms, ?event, "frame"),
        }
    }

    let deadline = started_at + session.capture().window();
    match session.tick(deadline) {
        Some(result) => Ok(result?),
        None => Err(CaptureError::NoData(identifier.to_string()).into()),
    }
}

/// One replayed frame's outcome in prediction mode.
pub enum Outcome {
    Prediction(Classification),
    NoFace,
    NoReferenceData,
    Failed(SessionError),
}

/// Run every admitted frame through live prediction.
pub fn run_classify(
    session: &mut Session,
    frames: &[RecordedFrame],
) -> Result<Vec<(u64, Outcome)>, ReplayError> {
    if frames.is_empty() {
        return Err(ReplayError::EmptyStream);
    }
    session.start_predicting()?;

    let origin = Instant::now();
    let mut outcomes = Vec::new();
    for recorded in frames {
        let outcome = match session.on_frame(&recorded.at(origin)).event {
            FrameEvent::Prediction(c) => Outcome::Prediction(c),
            FrameEvent::NoFace => Outcome::NoFace,
            FrameEvent::NoReferenceData => Outcome::NoReferenceData,
            FrameEvent::Failed(e) => Outcome::Failed(e),
            FrameEvent::Dropped | FrameEvent::Idle | FrameEvent::Captured { .. } => continue,
        };
        outcomes.push((recorded.timestamp_ms, outcome));
    }
    session.stop_predicting();
    Ok(outcomes)
}
