//! Client configuration store
//!
//! A single JSON object persisted to disk, read at startup and written on
//! demand. The application owns its shape; the prober only reads
//! `preferredDevice` and reads/writes `devices`.

use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::device::DeviceList;
use crate::error::{CaptureError, CaptureResult};

const DEVICES_KEY: &str = "devices";
const PREFERRED_DEVICE_KEY: &str = "preferredDevice";

pub struct ClientConfigStore {
    path: PathBuf,
    // Serializes read-modify-write cycles
    lock: Mutex<()>,
}

impl ClientConfigStore {
    /// Open the store, creating an empty `{}` document if none exists
    pub fn open(path: impl AsRef<Path>) -> CaptureResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        if !path.exists() {
            info!("Initializing client config at {}", path.display());
            fs::write(&path, "{}")?;
        }

        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> CaptureResult<Value> {
        let _guard = self.lock.lock();
        self.read()
    }

    /// Replace the whole document
    pub fn save(&self, config: &Value) -> CaptureResult<()> {
        if !config.is_object() {
            return Err(CaptureError::Serialization(serde::de::Error::custom(
                "client config must be a JSON object",
            )));
        }

        let _guard = self.lock.lock();
        self.write(config)
    }

    /// Device descriptors from the last detection, empty if none
    pub fn cached_devices(&self) -> CaptureResult<DeviceList> {
        let config = self.load()?;
        match config.get(DEVICES_KEY) {
            Some(devices) if !devices.is_null() => Ok(serde_json::from_value(devices.clone())?),
            _ => Ok(DeviceList::default()),
        }
    }

    pub fn preferred_device(&self) -> CaptureResult<Option<Value>> {
        let config = self.load()?;
        Ok(config
            .get(PREFERRED_DEVICE_KEY)
            .filter(|v| !v.is_null())
            .cloned())
    }

    pub fn store_devices(&self, devices: &DeviceList) -> CaptureResult<()> {
        let _guard = self.lock.lock();

        let mut config = self.read()?;
        if let Value::Object(map) = &mut config {
            map.insert(DEVICES_KEY.to_string(), serde_json::to_value(devices)?);
        }

        self.write(&config)
    }

    fn read(&self) -> CaptureResult<Value> {
        let text = fs::read_to_string(&self.path)?;
        if text.trim().is_empty() {
            return Ok(Value::Object(Map::new()));
        }
        Ok(serde_json::from_str(&text)?)
    }

    fn write(&self, config: &Value) -> CaptureResult<()> {
        fs::write(&self.path, serde_json::to_vec_pretty(config)?)?;
        debug!("Saved client config to {}", self.path.display());
        Ok(())
    }
}
