//! Service configuration
//!
//! YAML file merged with `FIELDSRV_`-prefixed environment overrides via
//! figment. Each device role gets one section describing the transport and
//! protocol; circle dimensions are deliberately NOT configurable (they are
//! competition constants owned by `field-geometry`).

use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Logical device roles. Exactly one live connection is allowed per role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceRole {
    Edm,
    Wind,
    Scoreboard,
}

impl std::fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DeviceRole::Edm => "edm",
            DeviceRole::Wind => "wind",
            DeviceRole::Scoreboard => "scoreboard",
        };
        write!(f, "{name}")
    }
}

/// How a device is physically reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    /// RS-232 style serial link, always framed 8-N-1.
    Serial { path: String, baud: u32 },
    /// TCP socket, `host:port`.
    Network { host: String, port: u16 },
}

/// One device section: role, wire protocol and transport parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub role: DeviceRole,
    /// Protocol identifier, resolved by the codec layer
    /// (e.g. "edm_generic", "wind_gill", "wind_nmea", "scoreboard_fd").
    pub protocol: String,
    pub transport: TransportConfig,
    /// Per-read timeout in milliseconds.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

impl DeviceConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Result upload / cache retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Competition server endpoint for `POST /api/v1/results`.
    pub endpoint: String,
    /// Fixed cache flush period in seconds.
    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: u64,
    /// On-disk queue location.
    #[serde(default = "default_cache_path")]
    pub cache_path: String,
}

impl UploadConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }
}

/// Wind averaging window. The original hardware notes a "5 second average"
/// without fixing the cadence, so the sample count is configurable rather
/// than guessed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindConfig {
    #[serde(default = "default_wind_samples")]
    pub samples: usize,
    #[serde(default = "default_wind_sample_interval_ms")]
    pub sample_interval_ms: u64,
}

impl WindConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

impl Default for WindConfig {
    fn default() -> Self {
        Self {
            samples: default_wind_samples(),
            sample_interval_ms: default_wind_sample_interval_ms(),
        }
    }
}

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConfig {
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
    pub upload: UploadConfig,
    #[serde(default)]
    pub wind: WindConfig,
}

impl FieldConfig {
    /// Load from a YAML file, with `FIELDSRV_` environment overrides
    /// (e.g. `FIELDSRV_UPLOAD__ENDPOINT`).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config: FieldConfig = Figment::new()
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("FIELDSRV_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Structural checks beyond what serde enforces.
    pub fn validate(&self) -> Result<()> {
        use crate::error::FieldError;

        let mut seen = std::collections::HashSet::new();
        for device in &self.devices {
            if !seen.insert(device.role) {
                return Err(FieldError::config(format!(
                    "Duplicate device section for role: {}",
                    device.role
                )));
            }
            if device.read_timeout_ms == 0 {
                return Err(FieldError::config(format!(
                    "read_timeout_ms must be non-zero for role: {}",
                    device.role
                )));
            }
            if let TransportConfig::Serial { baud, .. } = &device.transport {
                if *baud == 0 {
                    return Err(FieldError::config(format!(
                        "Serial baud must be non-zero for role: {}",
                        device.role
                    )));
                }
            }
        }

        if self.wind.samples == 0 {
            return Err(FieldError::config("wind.samples must be at least 1"));
        }

        Ok(())
    }

    pub fn device(&self, role: DeviceRole) -> Option<&DeviceConfig> {
        self.devices.iter().find(|d| d.role == role)
    }
}

fn default_read_timeout_ms() -> u64 {
    10_000
}

fn default_retry_interval_secs() -> u64 {
    120
}

fn default_cache_path() -> String {
    "result_cache.jsonl".to_string()
}

fn default_wind_samples() -> usize {
    5
}

fn default_wind_sample_interval_ms() -> u64 {
    1_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(yaml: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_full_configuration() {
        let file = write_config(
            r#"
devices:
  - role: edm
    protocol: edm_generic
    transport:
      kind: serial
      path: /dev/ttyUSB0
      baud: 9600
  - role: wind
    protocol: wind_gill
    transport:
      kind: network
      host: 192.168.0.21
      port: 9000
    read_timeout_ms: 5000
  - role: scoreboard
    protocol: scoreboard_fd
    transport:
      kind: network
      host: 192.168.0.30
      port: 1950
upload:
  endpoint: http://comp.example/api/v1/results
wind:
  samples: 10
  sample_interval_ms: 500
"#,
        );

        let config = FieldConfig::load(file.path()).unwrap();
        assert_eq!(config.devices.len(), 3);

        let edm = config.device(DeviceRole::Edm).unwrap();
        assert_eq!(edm.protocol, "edm_generic");
        assert_eq!(edm.read_timeout_ms, 10_000); // default
        assert!(matches!(
            edm.transport,
            TransportConfig::Serial { ref path, baud: 9600 } if path == "/dev/ttyUSB0"
        ));

        let wind = config.device(DeviceRole::Wind).unwrap();
        assert_eq!(wind.read_timeout_ms, 5_000);

        assert_eq!(config.upload.retry_interval_secs, 120); // default
        assert_eq!(config.wind.samples, 10);
        assert_eq!(config.wind.sample_interval(), Duration::from_millis(500));
    }

    #[test]
    fn rejects_duplicate_roles() {
        let file = write_config(
            r#"
devices:
  - role: edm
    protocol: edm_generic
    transport: { kind: network, host: a, port: 1 }
  - role: edm
    protocol: edm_generic
    transport: { kind: network, host: b, port: 2 }
upload:
  endpoint: http://comp.example/api/v1/results
"#,
        );

        let err = FieldConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("Duplicate device section"));
    }

    #[test]
    fn rejects_zero_wind_samples() {
        let file = write_config(
            r#"
devices: []
upload:
  endpoint: http://comp.example/api/v1/results
wind:
  samples: 0
"#,
        );

        let err = FieldConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("wind.samples"));
    }
}
