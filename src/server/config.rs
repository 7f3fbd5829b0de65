use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use crate::hardware::HardwareSeed;
use crate::thresholds::change::ChangeOptions;
use crate::thresholds::restore::RestoreOptions;

fn default_ip() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    1975
}

fn default_housekeeping_interval() -> std::time::Duration {
    std::time::Duration::from_secs(5)
}

fn default_stats_every() -> u64 {
    32
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_ip")]
    pub ip: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,

    pub config_db: PathBuf,
    /// Derived from `config_db` when missing, see [`ServerConfig::runtime_db_path`].
    #[serde(default)]
    pub runtime_db: Option<PathBuf>,

    #[serde(
        with = "humantime_serde",
        default = "default_housekeeping_interval"
    )]
    pub housekeeping_interval: std::time::Duration,
    /// Housekeeping ticks between two stats lines.
    #[serde(default = "default_stats_every")]
    pub stats_every: u64,
    #[serde(default)]
    pub heartbeat_point: Option<String>,

    #[serde(default)]
    pub change: ChangeOptions,
    #[serde(default)]
    pub restore: RestoreOptions,
    #[serde(default)]
    pub hardware: HardwareSeed,
}

impl ServerConfig {
    pub fn new(config_db: PathBuf) -> Self {
        ServerConfig {
            ip: default_ip(),
            port: default_port(),
            config_db,
            runtime_db: None,
            housekeeping_interval: default_housekeeping_interval(),
            stats_every: default_stats_every(),
            heartbeat_point: None,
            change: ChangeOptions::default(),
            restore: RestoreOptions::default(),
            hardware: HardwareSeed::default(),
        }
    }

    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    /// `<dir>/<stem>_runtime.db` next to the configuration database unless set.
    pub fn runtime_db_path(&self) -> PathBuf {
        if let Some(path) = &self.runtime_db {
            return path.clone();
        }

        let stem = self
            .config_db
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.config_db
            .with_file_name(format!("{}_runtime.db", stem))
    }

    pub fn validate(&self) -> Result<()> {
        let mut error_string = String::new();

        if self.port == 0 {
            error_string += "port must not be 0\n";
        }

        if self.config_db.as_os_str().is_empty() {
            error_string += "config_db must name a database file\n";
        }

        if self.housekeeping_interval.is_zero() {
            error_string += "housekeeping_interval must be greater than 0\n";
        }

        if self.stats_every == 0 {
            error_string += "stats_every must be greater than 0\n";
        }

        if matches!(&self.heartbeat_point, Some(point) if point.is_empty()) {
            error_string += "heartbeat_point must not be empty\n";
        }

        if error_string.is_empty() {
            Ok(())
        } else {
            Err(anyhow!(error_string))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_filled_in() {
        let config: ServerConfig =
            serde_json::from_str(r#"{"config_db": "/var/mps/mps_config.db"}"#).unwrap();

        assert_eq!(config.port, 1975);
        assert_eq!(config.bind_address().to_string(), "0.0.0.0:1975");
        assert_eq!(config.housekeeping_interval, std::time::Duration::from_secs(5));
        assert_eq!(config.stats_every, 32);
        assert_eq!(config.restore.unreachable_tolerance, 2);
        assert!(config.restore.release);
        assert!(config.restore.verify);
        assert!(!config.change.force_write);
        assert_eq!(
            config.runtime_db_path(),
            PathBuf::from("/var/mps/mps_config_runtime.db")
        );
        config.validate().unwrap();
    }

    #[test]
    fn explicit_values_are_kept() {
        let config: ServerConfig = serde_json::from_str(
            r#"{
                "ip": "127.0.0.1",
                "port": 2000,
                "config_db": "config.db",
                "runtime_db": "/tmp/rt.db",
                "housekeeping_interval": "250ms",
                "heartbeat_point": "MPS:THR:HEARTBEAT",
                "restore": {"unreachable_tolerance": 0, "release": false},
                "hardware": {"read_only": ["A:B"]}
            }"#,
        )
        .unwrap();

        assert_eq!(config.housekeeping_interval, std::time::Duration::from_millis(250));
        assert_eq!(config.runtime_db_path(), PathBuf::from("/tmp/rt.db"));
        assert_eq!(config.restore.unreachable_tolerance, 0);
        assert!(!config.restore.release);
        assert!(config.restore.verify);
        assert_eq!(config.hardware.read_only, vec!["A:B".to_string()]);
    }

    #[test]
    fn validation_collects_every_problem() {
        let mut config = ServerConfig::new(PathBuf::new());
        config.port = 0;
        config.stats_every = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("port"));
        assert!(err.contains("config_db"));
        assert!(err.contains("stats_every"));
    }
}
