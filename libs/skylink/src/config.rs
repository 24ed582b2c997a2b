use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Header, Target};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Identity stamped on every outbound frame.
    pub system_id: u8,
    pub component_id: u8,
    /// Vehicle addressed by commands.
    pub target_system: u8,
    pub target_component: u8,
    pub history_capacity: usize,
    pub reader_timeout_ms: u64,
    pub repeat_scan_ms: u64,
    pub reconnect_poll_ms: u64,
    pub pose: PoseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseConfig {
    pub capacity: usize,
    pub max_skew_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            system_id: 255,
            component_id: 0,
            target_system: 1,
            target_component: 0,
            history_capacity: 100,
            reader_timeout_ms: 1000,
            repeat_scan_ms: 5,
            reconnect_poll_ms: 250,
            pose: PoseConfig::default(),
        }
    }
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            capacity: 200,
            max_skew_ms: 100,
        }
    }
}

impl LinkConfig {
    pub fn header(&self) -> Header {
        Header::new(self.system_id, self.component_id)
    }

    pub fn target(&self) -> Target {
        Target::new(self.target_system, self.target_component)
    }

    pub fn reader_timeout(&self) -> Duration {
        Duration::from_millis(self.reader_timeout_ms)
    }

    pub fn repeat_scan(&self) -> Duration {
        Duration::from_millis(self.repeat_scan_ms.max(1))
    }

    pub fn reconnect_poll(&self) -> Duration {
        Duration::from_millis(self.reconnect_poll_ms.max(1))
    }
}

impl PoseConfig {
    pub fn max_skew(&self) -> Duration {
        Duration::from_millis(self.max_skew_ms)
    }
}

/// Converts a wait in seconds to an optional deadline. Negative, non-finite and
/// unrepresentably large values mean wait forever.
pub fn timeout_from_secs(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_from_secs() {
        assert_eq!(timeout_from_secs(-1.0), None);
        assert_eq!(timeout_from_secs(0.5), Some(Duration::from_millis(500)));
        assert_eq!(timeout_from_secs(f64::NAN), None);
        assert_eq!(timeout_from_secs(1e300), None);
        assert_eq!(timeout_from_secs(f64::INFINITY), None);
    }

    #[test]
    fn test_defaults() {
        let config = LinkConfig::default();
        assert_eq!(config.header(), Header::new(255, 0));
        assert_eq!(config.target(), Target::new(1, 0));
        assert_eq!(config.pose.max_skew(), Duration::from_millis(100));
    }
}
