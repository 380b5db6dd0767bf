use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;

use crate::device::{Resolution, VirtualDeviceConfig, DEFAULT_CANDIDATES};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub account: AccountConfig,
    #[serde(default)]
    pub nats: Option<NatsConfig>,
    /// Simulated inputs exposed by the virtual backend
    #[serde(default)]
    pub devices: Vec<VirtualDeviceConfig>,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Prefix of the upload endpoints
    pub base_url: String,
    #[serde(default)]
    pub websocket_url: Option<String>,
    /// Session cookie sent with uploads and as the first realtime frame
    #[serde(default)]
    pub cookie: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    pub client_config_path: String,
}

impl StorageConfig {
    /// Client config path with `~` expanded
    pub fn client_config_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.client_config_path).as_ref())
    }
}

#[derive(Debug, Deserialize)]
pub struct ProbeConfig {
    /// Candidate camera resolutions, tried in order
    #[serde(default = "default_resolutions")]
    pub resolutions: Vec<Resolution>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            resolutions: default_resolutions(),
        }
    }
}

fn default_resolutions() -> Vec<Resolution> {
    DEFAULT_CANDIDATES.to_vec()
}

#[derive(Debug, Default, Deserialize)]
pub struct AccountConfig {
    #[serde(default)]
    pub premium: bool,
}

#[derive(Debug, Deserialize)]
pub struct NatsConfig {
    pub url: String,
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
}

fn default_subject_prefix() -> String {
    "ports".to_string()
}

fn default_client_id() -> String {
    "capsule-capture".to_string()
}

impl Config {
    /// Load from a config file, overridable with `CAPSULE__SECTION__KEY` variables
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("CAPSULE").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn from_toml(toml: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MediaKind;

    const MINIMAL: &str = r#"
        [service]
        name = "capsule-capture"
        [service.http]
        bind = "127.0.0.1"
        port = 7878

        [server]
        base_url = "http://localhost:8000"

        [storage]
        client_config_path = "~/.capsule/client.json"
    "#;

    #[test]
    fn test_defaults() {
        let cfg = Config::from_toml(MINIMAL).unwrap();

        assert_eq!(cfg.probe.resolutions, DEFAULT_CANDIDATES.to_vec());
        assert!(!cfg.account.premium);
        assert!(cfg.nats.is_none());
        assert!(cfg.devices.is_empty());
        assert!(cfg.storage.client_config_path().ends_with(".capsule/client.json"));
    }

    #[test]
    fn test_devices_and_resolutions() {
        let toml = format!(
            "{}\n{}",
            MINIMAL,
            r#"
            [probe]
            resolutions = [{ width = 640, height = 480 }]

            [[devices]]
            device_id = "cam1"
            label = "Virtual Camera"
            kind = "video"
            resolutions = [{ width = 640, height = 480 }]
            "#
        );
        let cfg = Config::from_toml(&toml).unwrap();

        assert_eq!(cfg.probe.resolutions, vec![Resolution::new(640, 480)]);
        assert_eq!(cfg.devices.len(), 1);
        assert_eq!(cfg.devices[0].kind, MediaKind::Video);
        assert!(!cfg.devices[0].denied);
    }
}
