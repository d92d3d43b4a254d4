use std::path::PathBuf;

use log::warn;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use toml::Value;

use crate::ecc::codec::{EccConfig, FaultInjectConfig};
use crate::interco::top::FabricConfig;

/// A config struct that can hydrate itself from one [section] of the toml
/// config file, falling back to defaults when the section is absent.
pub trait Config: DeserializeOwned + Default {
    fn from_section(section: Option<&Value>) -> Self {
        match section {
            Some(value) => value.clone().try_into().expect("cannot deserialize config"),
            None => {
                warn!("config section not found");
                Self::default()
            }
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimConfig {
    pub timeout: u64,
    pub log_level: u64,
    /// When set, the end-of-run report is dumped here as JSON.
    pub results_json: Option<PathBuf>,
}

impl Config for SimConfig {}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            timeout: 1_000_000,
            log_level: 0,
            results_json: None,
        }
    }
}

impl Config for FabricConfig {}
impl Config for EccConfig {}
impl Config for FaultInjectConfig {}
