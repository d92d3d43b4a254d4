use serde::Deserialize;

use crate::sim::config::Config;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TrafficConfig {
    /// Requests per narrow master (one write pass plus one read-back pass).
    pub reqs_per_master: u32,
    /// Maximum idle gap, in cycles, between two consecutive requests from
    /// the same master; the actual gap is uniform in `0..=max_cycle_offset`.
    pub max_cycle_offset: u64,
    pub seed: u64,
    /// Replay plain-text stimuli files (`req id wen data add` lines), one
    /// per master, instead of generated patterns.  `{}` expands to the
    /// master index.
    pub stimuli_file: Option<String>,
    /// Patterns assigned to masters round-robin.  Empty means every master
    /// runs a default linear pattern.
    pub patterns: Vec<TrafficPatternSpec>,
    pub hwpe: HwpeTrafficConfig,
}

impl Config for TrafficConfig {}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            reqs_per_master: 64,
            max_cycle_offset: 1,
            seed: 1,
            stimuli_file: None,
            patterns: Vec::new(),
            hwpe: HwpeTrafficConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HwpeTrafficConfig {
    pub enabled: bool,
    /// Wide requests issued (again write pass then read-back pass).
    pub reqs: u32,
    /// Byte stride between consecutive wide accesses.
    pub stride: u64,
    pub base: u64,
}

impl Default for HwpeTrafficConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            reqs: 16,
            stride: 16,
            base: 0x1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TrafficPatternSpec {
    pub name: String,
    /// One of: linear, 2d, 3d, random.
    pub kind: String,
    pub base: u64,
    pub stride: u64,
    /// Inner extent and the second-dimension stride, for 2d/3d.
    pub len: u32,
    pub stride2: u64,
    pub len2: u32,
    pub stride3: u64,
    /// Address window for random patterns, in bytes.
    pub min: u64,
    pub max: u64,
    pub seed: u64,
}

impl Default for TrafficPatternSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: "linear".to_string(),
            base: 0,
            stride: 4,
            len: 16,
            stride2: 64,
            len2: 16,
            stride3: 1024,
            min: 0,
            max: 0,
            seed: 0,
        }
    }
}
