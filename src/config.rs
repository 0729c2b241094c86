use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::detection::Roi;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub debug: DebugConfig,
    #[serde(default)]
    pub sender: SenderConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DetectionConfig {
    /// Farthest depth kept by the gate, in raw depth units (mm for 16-bit depth)
    #[serde(default = "default_clipping_distance")]
    pub clipping_distance: f64,
    /// Metres per raw depth unit, applied by the deprojector
    #[serde(default = "default_depth_scale")]
    pub depth_scale: f64,
    #[serde(default = "default_roi")]
    pub roi: Roi,
    #[serde(default)]
    pub centroid: CentroidMode,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CentroidMode {
    /// Mean of every matching pixel inside the ROI
    #[default]
    Mean,
    /// Centroid of the largest contour inside the ROI
    LargestContour,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrackerConfig {
    /// Number of raw centroids kept per color for the median
    #[serde(default = "default_history_len")]
    pub history_len: usize,
    #[serde(default)]
    pub fallback: FallbackPolicy,
}

/// Which last-known point is reused when a deprojection is invalid.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    #[default]
    PerColor,
    /// One point shared by every color, updated by whichever color deprojected last
    Shared,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BroadcastConfig {
    #[serde(default = "default_rate_hz")]
    pub rate_hz: f64,
    #[serde(default = "default_base_frame")]
    pub base_frame: String,
    /// UDP target for encoded frames
    #[serde(default = "default_tf_addr")]
    pub tf_addr: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DebugConfig {
    /// Show the filtered image in a local window (desktop feature)
    #[serde(default)]
    pub view: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SenderConfig {
    #[serde(default = "default_listen_addr")]
    pub server_addr: String,
    #[serde(default)]
    pub device_index: i32,
    /// Row-major 3x3 camera matrix sent as camera info
    #[serde(default = "default_intrinsics")]
    pub intrinsics: [f64; 9],
    #[serde(default = "default_sender_rate_hz")]
    pub rate_hz: f64,
}

fn default_clipping_distance() -> f64 { 1400.0 }
fn default_depth_scale() -> f64 { 0.001 }
fn default_roi() -> Roi { Roi::new(1, 1, 1, 1) }
fn default_history_len() -> usize { 300 }
fn default_rate_hz() -> f64 { 30.0 }
fn default_base_frame() -> String { "camera_depth_frame".to_string() }
fn default_tf_addr() -> String { "127.0.0.1:39580".to_string() }
fn default_listen_addr() -> String { "127.0.0.1:39581".to_string() }
fn default_intrinsics() -> [f64; 9] { [910.0, 0.0, 640.0, 0.0, 910.0, 360.0, 0.0, 0.0, 1.0] }
fn default_sender_rate_hz() -> f64 { 30.0 }

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            clipping_distance: default_clipping_distance(),
            depth_scale: default_depth_scale(),
            roi: default_roi(),
            centroid: CentroidMode::default(),
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            history_len: default_history_len(),
            fallback: FallbackPolicy::default(),
        }
    }
}

/// Loop period for a rate; the rate must be finite and positive and the
/// period non-zero and representable.
pub fn tick_period(rate_hz: f64) -> Result<Duration> {
    if !(rate_hz.is_finite() && rate_hz > 0.0) {
        bail!("rate must be a finite positive number of Hz, got {}", rate_hz);
    }
    let period = Duration::try_from_secs_f64(1.0 / rate_hz)
        .with_context(|| format!("rate {} Hz has no representable period", rate_hz))?;
    if period.is_zero() {
        bail!("rate {} Hz is too high (zero period)", rate_hz);
    }
    Ok(period)
}

impl BroadcastConfig {
    pub fn period(&self) -> Result<Duration> {
        tick_period(self.rate_hz)
    }
}

impl SenderConfig {
    pub fn period(&self) -> Result<Duration> {
        tick_period(self.rate_hz)
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            rate_hz: default_rate_hz(),
            base_frame: default_base_frame(),
            tf_addr: default_tf_addr(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { listen_addr: default_listen_addr() }
    }
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            server_addr: default_listen_addr(),
            device_index: 0,
            intrinsics: default_intrinsics(),
            rate_hz: default_sender_rate_hz(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Falls back to defaults when the file is missing or invalid.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                warn!("{e:#}; using default configuration");
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.broadcast.period().context("invalid broadcast.rate_hz")?;
        self.sender.period().context("invalid sender.rate_hz")?;
        if self.tracker.history_len == 0 {
            bail!("tracker.history_len must be at least 1");
        }
        if !(self.detection.depth_scale > 0.0) {
            bail!("detection.depth_scale must be positive, got {}", self.detection.depth_scale);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.detection.clipping_distance, 1400.0);
        assert_eq!(config.detection.roi, Roi::new(1, 1, 1, 1));
        assert_eq!(config.detection.centroid, CentroidMode::Mean);
        assert_eq!(config.tracker.history_len, 300);
        assert_eq!(config.tracker.fallback, FallbackPolicy::PerColor);
        assert_eq!(config.broadcast.rate_hz, 30.0);
        assert_eq!(config.broadcast.base_frame, "camera_depth_frame");
        assert!(!config.debug.view);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_sections() {
        let toml_str = r#"
            [detection]
            clipping_distance = 900
            centroid = "largest_contour"
            roi = { start_x = 10, start_y = 20, end_x = 300, end_y = 200 }

            [tracker]
            history_len = 15
            fallback = "shared"

            [broadcast]
            rate_hz = 15.0
            base_frame = "camera_link"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.detection.clipping_distance, 900.0);
        assert_eq!(config.detection.centroid, CentroidMode::LargestContour);
        assert_eq!(config.detection.roi, Roi::new(10, 20, 300, 200));
        assert_eq!(config.detection.depth_scale, 0.001);
        assert_eq!(config.tracker.history_len, 15);
        assert_eq!(config.tracker.fallback, FallbackPolicy::Shared);
        assert_eq!(config.broadcast.rate_hz, 15.0);
        assert_eq!(config.broadcast.base_frame, "camera_link");
        assert_eq!(config.broadcast.tf_addr, "127.0.0.1:39580");
    }

    #[test]
    fn test_validate_rejects_zero_history() {
        let mut config = Config::default();
        config.tracker.history_len = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_positive_rate() {
        let mut config = Config::default();
        config.broadcast.rate_hz = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_infinite_rate() {
        let config: Config = toml::from_str("[broadcast]\nrate_hz = inf\n").unwrap();
        assert!(config.broadcast.rate_hz.is_infinite());
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.sender.rate_hz = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tick_period() {
        assert_eq!(tick_period(30.0).unwrap(), Duration::from_secs_f64(1.0 / 30.0));
        assert_eq!(tick_period(0.5).unwrap(), Duration::from_secs(2));
        // period would be sub-nanosecond
        assert!(tick_period(1e12).is_err());
        // period would overflow Duration
        assert!(tick_period(1e-30).is_err());
        assert!(tick_period(-1.0).is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = Config::load_or_default("does/not/exist.toml");
        assert_eq!(config.tracker.history_len, 300);
    }
}
