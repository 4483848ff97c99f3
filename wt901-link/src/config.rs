use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use uuid::Uuid;
use wt901_core::DeviceAddress;
use wt901_core::protocol::NOTIFY_UUID;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub device: DeviceConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub radio: RadioConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize)]
pub struct DeviceConfig {
    /// Radio address of the sensor
    pub address: DeviceAddress,
    /// Service carrying the notifications
    #[serde(default = "default_notify_uuid")]
    pub notify_uuid: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Seconds between connection attempts while disconnected
    pub retry_interval_secs: u64,
    /// Seconds to wait for a notification before polling again
    pub notify_timeout_secs: u64,
    /// Rewrite the notification descriptor after every idle timeout
    pub resubscribe_on_idle: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RadioConfig {
    Sim {
        /// Milliseconds between simulated frames
        #[serde(default = "default_frame_interval_ms")]
        frame_interval_ms: u64,
        /// One in this many waits drops the link (0 never drops)
        #[serde(default = "default_drop_ratio")]
        drop_ratio: u32,
        /// One in this many connects fails (0 never fails)
        #[serde(default = "default_connect_failure_ratio")]
        connect_failure_ratio: u32,
    },
    Ble {
        /// Seconds to scan for the device on each connection attempt
        #[serde(default = "default_scan_timeout_secs")]
        scan_timeout_secs: u64,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutputConfig {
    #[default]
    Log,
    Json,
}

fn default_notify_uuid() -> Uuid {
    NOTIFY_UUID
}

fn default_frame_interval_ms() -> u64 {
    100
}

fn default_drop_ratio() -> u32 {
    200
}

fn default_connect_failure_ratio() -> u32 {
    3
}

fn default_scan_timeout_secs() -> u64 {
    10
}

impl SessionConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retry_interval_secs: 60,
            notify_timeout_secs: 15,
            resubscribe_on_idle: true,
        }
    }
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self::Sim {
            frame_interval_ms: default_frame_interval_ms(),
            drop_ratio: default_drop_ratio(),
            connect_failure_ratio: default_connect_failure_ratio(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> color_eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: DeviceConfig {
                address: DeviceAddress::new("FF:FF:FF:FF:FF:FF"),
                notify_uuid: NOTIFY_UUID,
            },
            session: SessionConfig::default(),
            radio: RadioConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn minimal_config_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [device]
            address = "C4:7F:51:00:00:01"
            "#,
        )
        .unwrap();

        assert_eq!(config.device.address.as_str(), "C4:7F:51:00:00:01");
        assert_eq!(config.device.notify_uuid, NOTIFY_UUID);
        assert_eq!(config.session.retry_interval(), Duration::from_secs(60));
        assert_eq!(config.session.notify_timeout(), Duration::from_secs(15));
        assert!(config.session.resubscribe_on_idle);
        assert!(matches!(
            config.radio,
            RadioConfig::Sim {
                frame_interval_ms: 100,
                ..
            }
        ));
        assert!(matches!(config.output, OutputConfig::Log));
    }

    #[test]
    fn full_config_parses() {
        let config: Config = toml::from_str(
            r#"
            [device]
            address = "C4:7F:51:00:00:01"
            notify_uuid = "0000ffe4-0000-1000-8000-00805f9a34fb"

            [session]
            retry_interval_secs = 5
            notify_timeout_secs = 2
            resubscribe_on_idle = false

            [radio]
            type = "ble"
            scan_timeout_secs = 20

            [output]
            type = "json"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.device.notify_uuid,
            Uuid::from_u128(0x0000FFE4_0000_1000_8000_00805F9A34FB)
        );
        assert_eq!(config.session.retry_interval(), Duration::from_secs(5));
        assert!(!config.session.resubscribe_on_idle);
        assert!(matches!(
            config.radio,
            RadioConfig::Ble {
                scan_timeout_secs: 20
            }
        ));
        assert!(matches!(config.output, OutputConfig::Json));
    }

    #[test]
    fn unknown_radio_type_is_rejected() {
        let result: Result<Config, _> = toml::from_str(
            r#"
            [device]
            address = "C4:7F:51:00:00:01"

            [radio]
            type = "serial"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[device]\naddress = \"AA:BB:CC:DD:EE:FF\"\n\n[radio]\ntype = \"sim\"\ndrop_ratio = 0"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.device.address.as_str(), "AA:BB:CC:DD:EE:FF");
        assert!(matches!(
            config.radio,
            RadioConfig::Sim {
                drop_ratio: 0,
                connect_failure_ratio: 3,
                ..
            }
        ));
    }

    #[test]
    fn load_missing_file_fails() {
        assert!(Config::load(Path::new("/nonexistent/wt901-link.toml")).is_err());
    }
}
