//! Instrument configuration
//!
//! Loaded from a JSON file. Every field has a default, so an empty object is
//! a valid configuration for the Swope site.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SwopeConfig {
    #[serde(default)]
    pub tcs: TcsConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub focuser: FocuserConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
}

impl SwopeConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.fits_links.len() != 4 {
            return Err(ConfigError::Invalid(format!(
                "camera.fits_links needs 4 entries, got {}",
                self.camera.fits_links.len()
            )));
        }
        if self.focuser.min_position > self.focuser.max_position {
            return Err(ConfigError::Invalid(format!(
                "focuser range {}..={} is empty",
                self.focuser.min_position, self.focuser.max_position
            )));
        }
        if self.weather.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "weather.request_timeout_secs must be positive".to_string(),
            ));
        }
        if self.weather.control_period_secs == 0 {
            return Err(ConfigError::Invalid(
                "weather.control_period_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Telescope control system link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TcsConfig {
    /// Address dialled by the network `TcsLink` implementation
    #[serde(default = "default_host")]
    pub host: String,
    /// How long a status snapshot is served before refetching
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
}

impl TcsConfig {
    pub fn endpoint(&self) -> &str {
        &self.host
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

impl Default for TcsConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            refresh_interval_ms: default_refresh_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// CCD controller address, dialled by the network `CcdLink` implementation
    #[serde(default = "default_host")]
    pub ccd_host: String,
    #[serde(default = "default_ccd_port")]
    pub ccd_port: u16,
    /// Per-amplifier FITS files written by the controller, in channel order 1..4
    #[serde(default = "default_fits_links")]
    pub fits_links: Vec<PathBuf>,
    #[serde(default = "default_ccd_width")]
    pub ccd_width: u32,
    #[serde(default = "default_ccd_height")]
    pub ccd_height: u32,
    /// Microns
    #[serde(default = "default_pixel_size")]
    pub pixel_size_x: f64,
    #[serde(default = "default_pixel_size")]
    pub pixel_size_y: f64,
    #[serde(default = "default_image_dir")]
    pub image_dir: PathBuf,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl CameraConfig {
    pub fn ccd_endpoint(&self) -> String {
        format!("{}:{}", self.ccd_host, self.ccd_port)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            ccd_host: default_host(),
            ccd_port: default_ccd_port(),
            fits_links: default_fits_links(),
            ccd_width: default_ccd_width(),
            ccd_height: default_ccd_height(),
            pixel_size_x: default_pixel_size(),
            pixel_size_y: default_pixel_size(),
            image_dir: default_image_dir(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocuserConfig {
    #[serde(default = "default_focus_min")]
    pub min_position: i32,
    #[serde(default = "default_focus_max")]
    pub max_position: i32,
}

impl Default for FocuserConfig {
    fn default() -> Self {
        Self {
            min_position: default_focus_min(),
            max_position: default_focus_max(),
        }
    }
}

/// LCO environment API endpoints. The UTC start timestamp is appended to each URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherConfig {
    #[serde(default = "default_weather_url")]
    pub weather_url: String,
    #[serde(default = "default_seeing_url")]
    pub seeing_url: String,
    #[serde(default = "default_update_interval_secs")]
    pub update_interval_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_control_period_secs")]
    pub control_period_secs: u64,
}

impl WeatherConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn control_period(&self) -> Duration {
        Duration::from_secs(self.control_period_secs)
    }
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            weather_url: default_weather_url(),
            seeing_url: default_seeing_url(),
            update_interval_secs: default_update_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            control_period_secs: default_control_period_secs(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_refresh_interval_ms() -> u64 {
    1000
}

fn default_ccd_port() -> u16 {
    51911
}

fn default_fits_links() -> Vec<PathBuf> {
    (1..=4)
        .map(|n| PathBuf::from(format!("~/ccdc{}.fits", n)))
        .collect()
}

fn default_ccd_width() -> u32 {
    4112
}

fn default_ccd_height() -> u32 {
    4096
}

fn default_pixel_size() -> f64 {
    15.0
}

fn default_image_dir() -> PathBuf {
    PathBuf::from("~/images")
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_focus_min() -> i32 {
    20000
}

fn default_focus_max() -> i32 {
    28000
}

fn default_weather_url() -> String {
    "http://env-api.lco.cl/metrics/weather?source=swope&start_ts=".to_string()
}

fn default_seeing_url() -> String {
    "http://env-api.lco.cl/metrics/seeing?source=dimm&start_ts=".to_string()
}

fn default_update_interval_secs() -> u64 {
    60
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_control_period_secs() -> u64 {
    300
}

/// Expand a leading `~/` against `$HOME`
pub fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = SwopeConfig::from_json("{}").unwrap();
        assert_eq!(config, SwopeConfig::default());
        assert_eq!(config.tcs.refresh_interval(), Duration::from_secs(1));
        assert_eq!(config.camera.ccd_port, 51911);
        assert_eq!(config.camera.fits_links.len(), 4);
        assert_eq!(config.camera.fits_links[0], PathBuf::from("~/ccdc1.fits"));
        assert_eq!(config.focuser.min_position, 20000);
        assert_eq!(config.focuser.max_position, 28000);
        assert_eq!(config.weather.update_interval(), Duration::from_secs(60));
        assert_eq!(config.weather.control_period(), Duration::from_secs(300));
    }

    #[test]
    fn test_partial_override() {
        let config = SwopeConfig::from_json(
            r#"{"tcs": {"host": "swope-tcs"}, "focuser": {"max_position": 26000}}"#,
        )
        .unwrap();
        assert_eq!(config.tcs.endpoint(), "swope-tcs");
        assert_eq!(config.tcs.refresh_interval_ms, 1000);
        assert_eq!(config.camera.ccd_endpoint(), "127.0.0.1:51911");
        assert_eq!(config.focuser.min_position, 20000);
        assert_eq!(config.focuser.max_position, 26000);
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            SwopeConfig::from_json(r#"{"focuser": {"min_position": 5, "max_position": 1}}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            SwopeConfig::from_json(r#"{"camera": {"fits_links": ["a.fits"]}}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            SwopeConfig::from_json("{not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swope.json");
        std::fs::write(&path, r#"{"weather": {"update_interval_secs": 30}}"#).unwrap();

        let config = SwopeConfig::load(&path).unwrap();
        assert_eq!(config.weather.update_interval_secs, 30);

        assert!(matches!(
            SwopeConfig::load(dir.path().join("missing.json")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_expand_home() {
        let plain = Path::new("/data/ccdc1.fits");
        assert_eq!(expand_home(plain), plain);

        if let Some(home) = std::env::var_os("HOME") {
            assert_eq!(
                expand_home(Path::new("~/ccdc1.fits")),
                PathBuf::from(home).join("ccdc1.fits")
            );
        }
    }
}
