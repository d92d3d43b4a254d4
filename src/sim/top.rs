use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::{bail, Context};
use log::{debug, info};
use serde::Serialize;

use crate::base::behavior::*;
use crate::ecc::codec::{EccConfig, FaultInjectConfig};
use crate::ecc::manager::EccCounters;
use crate::interco::top::{FabricConfig, FabricStats, TcdmFabric};
use crate::sim::config::SimConfig;
use crate::traffic::config::{TrafficConfig, TrafficPatternSpec};
use crate::traffic::master::{DmaMaster, HwpeDriver, MasterStats, Mirror, TrafficMaster};
use crate::traffic::patterns::compile_pattern;
use crate::traffic::stimuli::load_stimuli;

const DMA_ROB_DEPTH: usize = 8;

enum NarrowDriver {
    Core(TrafficMaster),
    Dma(DmaMaster),
}

/// Top-level simulation: one fabric, one self-checking driver per narrow
/// port, and optionally the wide-port driver.
pub struct Sim {
    pub fabric: TcdmFabric,
    drivers: Vec<NarrowDriver>,
    hwpe: Option<HwpeDriver>,
    timeout: u64,
}

#[derive(Debug, Serialize)]
pub struct SimReport {
    pub cycles: u64,
    pub finished: bool,
    pub masters: Vec<MasterStats>,
    pub hwpe: Option<MasterStats>,
    pub fabric: FabricStats,
    pub ecc: Option<EccCounters>,
}

impl SimReport {
    pub fn total_mismatches(&self) -> u32 {
        self.masters.iter().map(|m| m.mismatches).sum::<u32>()
            + self.hwpe.as_ref().map_or(0, |h| h.mismatches)
    }

    pub fn dump_json(&self, path: &Path) -> Result<(), anyhow::Error> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)
            .with_context(|| format!("cannot write results to {}", path.display()))?;
        Ok(())
    }
}

impl Sim {
    pub fn new(
        sim_config: SimConfig,
        fabric_config: FabricConfig,
        ecc_config: EccConfig,
        inject_config: FaultInjectConfig,
        traffic_config: TrafficConfig,
    ) -> Result<Sim, anyhow::Error> {
        let fabric_config = Arc::new(fabric_config);
        let fabric = TcdmFabric::new(Arc::clone(&fabric_config), &ecc_config, &inject_config);
        let mem_bytes = (fabric_config.tot_mem_size_kb as u64) << 10;
        let mirror: Mirror = Rc::new(RefCell::new(HashMap::new()));

        let mut drivers = Vec::new();
        for idx in 0..fabric_config.num_log_ports() {
            let is_dma = idx >= fabric_config.num_cores
                && idx < fabric_config.num_cores + fabric_config.num_dma;
            if is_dma {
                let pattern = compile_pattern(&pattern_spec_for(&traffic_config, idx), mem_bytes)?;
                let dma = DmaMaster::new(
                    idx,
                    &traffic_config,
                    &pattern,
                    DMA_ROB_DEPTH,
                    Rc::clone(&mirror),
                );
                dma.rob().check_downstream(&fabric.params());
                drivers.push(NarrowDriver::Dma(dma));
            } else if let Some(template) = &traffic_config.stimuli_file {
                let path = template.replace("{}", &idx.to_string());
                let stimuli = load_stimuli(Path::new(&path))?;
                drivers.push(NarrowDriver::Core(TrafficMaster::from_stimuli(
                    idx,
                    &traffic_config,
                    &stimuli,
                    Rc::clone(&mirror),
                )));
            } else {
                let pattern = compile_pattern(&pattern_spec_for(&traffic_config, idx), mem_bytes)?;
                drivers.push(NarrowDriver::Core(TrafficMaster::from_pattern(
                    idx,
                    &traffic_config,
                    &pattern,
                    Rc::clone(&mirror),
                )));
            }
        }

        let hwpe = (fabric_config.hwpe_present && traffic_config.hwpe.enabled).then(|| {
            HwpeDriver::new(
                &traffic_config.hwpe,
                traffic_config.seed,
                fabric_config.hwpe_width,
                mem_bytes,
                mirror,
            )
        });

        Ok(Sim {
            fabric,
            drivers,
            hwpe,
            timeout: sim_config.timeout,
        })
    }

    fn all_done(&self) -> bool {
        self.drivers.iter().enumerate().all(|(idx, d)| match d {
            NarrowDriver::Core(m) => m.done(self.fabric.port(idx)),
            NarrowDriver::Dma(m) => m.done(self.fabric.port(idx)),
        }) && self.hwpe.as_ref().map_or(true, |h| h.done(self.fabric.hwpe()))
    }

    /// Run lock-step until every driver has drained its program or the
    /// timeout expires.
    pub fn simulate(&mut self) -> Result<SimReport, anyhow::Error> {
        info!(
            "starting simulation: {} narrow drivers, hwpe: {}",
            self.drivers.len(),
            self.hwpe.is_some()
        );
        let mut finished = false;
        for cycle in 0..self.timeout {
            for (idx, driver) in self.drivers.iter_mut().enumerate() {
                match driver {
                    NarrowDriver::Core(m) => m.drive(self.fabric.port_mut(idx)),
                    NarrowDriver::Dma(m) => m.drive(self.fabric.port_mut(idx)),
                }
            }
            if let Some(hwpe) = &mut self.hwpe {
                hwpe.drive(self.fabric.hwpe_mut());
            }

            self.fabric.tick_one();

            for (idx, driver) in self.drivers.iter_mut().enumerate() {
                match driver {
                    NarrowDriver::Core(m) => m.observe(self.fabric.port_mut(idx)),
                    NarrowDriver::Dma(m) => m.observe(self.fabric.port_mut(idx)),
                }
            }
            if let Some(hwpe) = &mut self.hwpe {
                hwpe.observe(self.fabric.hwpe_mut());
            }

            if self.all_done() {
                debug!("all drivers drained at cycle {}", cycle);
                finished = true;
                break;
            }
        }
        if !finished {
            bail!("simulation timed out after {} cycles", self.timeout);
        }
        Ok(self.report(finished))
    }

    pub fn report(&self, finished: bool) -> SimReport {
        SimReport {
            cycles: self.fabric.cycle(),
            finished,
            masters: self
                .drivers
                .iter()
                .map(|d| match d {
                    NarrowDriver::Core(m) => m.stats.clone(),
                    NarrowDriver::Dma(m) => m.stats.clone(),
                })
                .collect(),
            hwpe: self.hwpe.as_ref().map(|h| h.stats.clone()),
            fabric: self.fabric.stats().clone(),
            ecc: self.fabric.ecc_counters(),
        }
    }
}

/// Pick the pattern spec for one master: round-robin over the configured
/// list, or a per-master linear walk offset so the default run spreads
/// masters across banks.
fn pattern_spec_for(traffic: &TrafficConfig, idx: usize) -> TrafficPatternSpec {
    if traffic.patterns.is_empty() {
        TrafficPatternSpec {
            base: idx as u64 * 0x100,
            ..TrafficPatternSpec::default()
        }
    } else {
        let mut spec = traffic.patterns[idx % traffic.patterns.len()].clone();
        spec.seed = spec.seed.wrapping_add(idx as u64);
        spec
    }
}
