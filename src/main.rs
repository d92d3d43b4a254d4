use std::fs;
use std::path::PathBuf;

use clap::Parser;
use toml::Table;

use tcdmsim::ecc::codec::{EccConfig, FaultInjectConfig};
use tcdmsim::interco::top::FabricConfig;
use tcdmsim::sim::config::{Config, SimConfig};
use tcdmsim::sim::top::Sim;
use tcdmsim::traffic::config::TrafficConfig;

#[derive(Parser)]
#[command(version, about)]
struct TcdmsimArgs {
    #[arg(help = "Path to config.toml")]
    config_path: PathBuf,
    #[arg(long, help = "Override number of core ports")]
    num_cores: Option<usize>,
    #[arg(long, help = "Override number of memory banks")]
    num_banks: Option<usize>,
    #[arg(long, help = "Override simulation timeout in cycles")]
    timeout: Option<u64>,
    #[arg(long, help = "Override requests per master")]
    reqs: Option<u32>,
    #[arg(long, help = "Stimuli file template, '{}' expands to the master index")]
    stimuli: Option<String>,
    #[arg(long, help = "Enable ECC protection on the fabric")]
    ecc: bool,
}

pub fn main() -> Result<(), u32> {
    env_logger::init();

    let argv = TcdmsimArgs::parse();
    let config = fs::read_to_string(&argv.config_path).unwrap_or_else(|err| {
        eprintln!("failed to read config file: {}", err);
        std::process::exit(1);
    });

    let config_table: Table = toml::from_str(&config).expect("cannot parse config toml");
    let mut sim_config = SimConfig::from_section(config_table.get("sim"));
    let mut fabric_config = FabricConfig::from_section(config_table.get("fabric"));
    let mut ecc_config = EccConfig::from_section(config_table.get("ecc"));
    let inject_config = FaultInjectConfig::from_section(config_table.get("fault_injection"));
    let mut traffic_config = TrafficConfig::from_section(config_table.get("traffic"));

    // override toml configs with argv
    sim_config.timeout = argv.timeout.unwrap_or(sim_config.timeout);
    fabric_config.num_cores = argv.num_cores.unwrap_or(fabric_config.num_cores);
    fabric_config.num_banks = argv.num_banks.unwrap_or(fabric_config.num_banks);
    traffic_config.reqs_per_master = argv.reqs.unwrap_or(traffic_config.reqs_per_master);
    if argv.stimuli.is_some() {
        traffic_config.stimuli_file = argv.stimuli;
    }
    ecc_config.enabled |= argv.ecc;

    let results_json = sim_config.results_json.clone();
    let mut sim = Sim::new(
        sim_config,
        fabric_config,
        ecc_config,
        inject_config,
        traffic_config,
    )
    .unwrap_or_else(|err| {
        eprintln!("cannot elaborate simulation: {:#}", err);
        std::process::exit(1);
    });

    let report = sim.simulate().unwrap_or_else(|err| {
        eprintln!("simulation failed: {:#}", err);
        std::process::exit(1);
    });

    println!(
        "finished in {} cycles: {} grants on the log branch, {} on the hwpe branch",
        report.cycles, report.fabric.log_grants, report.fabric.hwpe_grants
    );
    if let Some(counters) = &report.ecc {
        println!(
            "ecc: {} correctable, {} uncorrectable",
            counters.data_correctable + counters.meta_correctable,
            counters.data_uncorrectable + counters.meta_uncorrectable
        );
    }
    if let Some(path) = &results_json {
        if let Err(err) = report.dump_json(path) {
            eprintln!("cannot dump results: {:#}", err);
            return Err(1);
        }
    }

    let mismatches = report.total_mismatches();
    if mismatches > 0 {
        eprintln!("self-check FAILED: {} data mismatches", mismatches);
        return Err(mismatches);
    }
    Ok(())
}
