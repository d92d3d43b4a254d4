pub mod config;
pub mod master;
pub mod patterns;
pub mod stimuli;

pub use config::{HwpeTrafficConfig, TrafficConfig, TrafficPatternSpec};
pub use master::{DmaMaster, HwpeDriver, MasterStats, TrafficMaster};
pub use patterns::{compile_pattern, CompiledPattern};
pub use stimuli::{load_stimuli, parse_stimuli, Stimulus};
