//! Configuration loading

use anyhow::Result;
use rolemap_core::{DeviceClass, DeviceIndex, DeviceState, Handedness, RoleReferenceData};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bindings: BindingsConfig,
    /// Simulated device slots replayed as connection notifications
    #[serde(default, rename = "device")]
    pub devices: Vec<DeviceConfig>,
    /// Role references to resolve and print
    #[serde(default, rename = "reference")]
    pub references: Vec<RoleReferenceData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingsConfig {
    /// Path to the binding file
    #[serde(default = "default_bindings_path")]
    pub path: String,
    /// Import the binding file at startup when it allows it
    #[serde(default = "default_true")]
    pub apply_on_load: bool,
    /// Write the binding file before exiting
    #[serde(default)]
    pub save_on_exit: bool,
}

impl Default for BindingsConfig {
    fn default() -> Self {
        Self {
            path: default_bindings_path(),
            apply_on_load: true,
            save_on_exit: false,
        }
    }
}

fn default_bindings_path() -> String {
    "./rolemap_bindings.json".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device slot index
    pub index: u32,
    pub class: DeviceClass,
    pub serial: String,
    #[serde(default)]
    pub handedness: Handedness,
    #[serde(default = "default_true")]
    pub pose_valid: bool,
    #[serde(default)]
    pub valid_joints: usize,
}

impl DeviceConfig {
    pub fn device(&self) -> DeviceIndex {
        DeviceIndex(self.index)
    }

    pub fn to_state(&self) -> DeviceState {
        DeviceState::connected(self.class, self.serial.clone())
            .with_handedness(self.handedness)
            .with_pose(self.pose_valid, self.valid_joints)
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(
            path = %path.display(),
            devices = config.devices.len(),
            references = config.references.len(),
            "Loaded configuration"
        );
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}
