use facemark_core::capture::DEFAULT_CAPTURE_WINDOW;
use facemark_core::throttle::DEFAULT_TARGET_FPS;
use facemark_core::{ClassifierConfig, DistanceMetric};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// CLI configuration, loaded from environment variables.
pub struct Config {
    /// Prototype JSON file imported at start and rewritten after changes.
    pub db_path: PathBuf,
    /// Number of neighbors that vote.
    pub k: usize,
    pub metric: DistanceMetric,
    /// Nearest-neighbor distance above which a face is unknown.
    pub threshold: f32,
    /// Length of one enrollment capture window.
    pub capture_window: Duration,
    /// Detector frames processed per second; faster frames are dropped.
    pub target_fps: u32,
    /// Optional TOML zone table replacing the embedded MediaPipe one.
    pub zones_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `FACEMARK_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let db_path = std::env::var_os("FACEMARK_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir().join("prototypes.json"));

        let defaults = ClassifierConfig::default();
        Self {
            db_path,
            k: env_or("FACEMARK_K", defaults.k),
            metric: env_or("FACEMARK_METRIC", defaults.metric),
            threshold: env_or("FACEMARK_THRESHOLD", defaults.threshold),
            capture_window: Duration::from_millis(env_or(
                "FACEMARK_CAPTURE_MS",
                DEFAULT_CAPTURE_WINDOW.as_millis() as u64,
            )),
            target_fps: env_or("FACEMARK_TARGET_FPS", DEFAULT_TARGET_FPS),
            zones_path: std::env::var("FACEMARK_ZONES").ok().map(PathBuf::from),
        }
    }

    pub fn classifier(&self) -> ClassifierConfig {
        ClassifierConfig {
            k: self.k,
            metric: self.metric,
            threshold: self.threshold,
        }
    }
}

/// `$XDG_DATA_HOME/facemark`, or `~/.local/share/facemark` when unset.
fn data_dir() -> PathBuf {
    let base = match std::env::var_os("XDG_DATA_HOME") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir)
            .join(".local/share"),
    };
    base.join("facemark")
}

/// Parse `key` as `T`, falling back to `default` when unset. A value that
/// does not parse is logged and ignored.
fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|e| {
            tracing::warn!(key, value = %raw, error = %e, "ignoring invalid setting");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_or_parses_and_falls_back() {
        std::env::set_var("FACEMARK_TEST_ENV_OR", " 7 ");
        assert_eq!(env_or("FACEMARK_TEST_ENV_OR", 1usize), 7);
        std::env::set_var("FACEMARK_TEST_ENV_OR", "seven");
        assert_eq!(env_or("FACEMARK_TEST_ENV_OR", 1usize), 1);
        assert_eq!(
            env_or("FACEMARK_TEST_ENV_OR", DistanceMetric::Cosine),
            DistanceMetric::Cosine
        );
        std::env::remove_var("FACEMARK_TEST_ENV_OR");
        assert_eq!(env_or("FACEMARK_TEST_ENV_OR", 0.5f32), 0.5);
    }
}
