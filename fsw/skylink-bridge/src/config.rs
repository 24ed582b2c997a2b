use anyhow::Result;
use serde::{Deserialize, Serialize};
use skylink::LinkConfig;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub link: LinkConfig,
    pub transport: TransportConfig,
    pub serial: SerialConfig,
    pub udp: UdpConfig,
    pub monitor: MonitorConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportConfig {
    Serial,
    #[default]
    Udp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UdpConfig {
    /// Local address to listen on.
    pub bind: String,
    /// Fixed vehicle address. When unset the link answers whoever sent last.
    pub remote: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub refresh_rate_hz: f32,
    pub heartbeat_period_ms: u64,
    /// Seconds to wait for the first vehicle heartbeat before giving up.
    pub connect_timeout_s: f64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".to_string(),
            baud: 115200,
        }
    }
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:14550".to_string(),
            remote: None,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            refresh_rate_hz: 2.0,
            heartbeat_period_ms: 1000,
            connect_timeout_s: 10.0,
        }
    }
}

impl MonitorConfig {
    pub fn refresh_period(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.refresh_rate_hz.max(0.1))
    }

    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_millis(self.heartbeat_period_ms.max(1))
    }
}

impl Config {
    pub fn from_file_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            let contents = fs::read_to_string(path)?;
            Ok(toml::from_str(&contents)?)
        } else {
            tracing::info!("Config file not found at {}, using defaults", path);
            Ok(Self::default())
        }
    }
}
