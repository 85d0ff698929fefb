//! Frame throttling.

use std::time::{Duration, Instant};

pub const DEFAULT_TARGET_FPS: u32 = 15;

/// Drops frames that arrive faster than the target rate. Dropped frames are
/// never queued; the next admitted frame is whichever arrives after the
/// interval has elapsed.
#[derive(Debug, Clone)]
pub struct FrameThrottle {
    interval: Duration,
    last_admitted: Option<Instant>,
}

impl Default for FrameThrottle {
    fn default() -> Self {
        Self::from_fps(DEFAULT_TARGET_FPS)
    }
}

impl FrameThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_admitted: None,
        }
    }

    /// `fps == 0` disables throttling.
    pub fn from_fps(fps: u32) -> Self {
        let interval = if fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(1) / fps
        };
        Self::new(interval)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether a frame arriving at `now` should be processed.
    pub fn admit(&mut self, now: Instant) -> bool {
        let ready = match self.last_admitted {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };
        if ready {
            self.last_admitted = Some(now);
        }
        ready
    }
}
