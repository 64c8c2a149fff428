//! UEP simulation driver
//!
//! Loads the run file (see [`RunConfig::load`]), simulates the configured
//! point on all workers and prints the aggregate result to stdout as YAML,
//! or as JSON when `UEP_SIM_OUTPUT=json`.

use std::process::ExitCode;

use tracing::error;

use uep_core::observe::init_logging;
use uep_core::{UepError, UepResult};
use uep_sim::{AggregateResult, RunConfig};

fn render(result: &AggregateResult) -> UepResult<String> {
    match std::env::var("UEP_SIM_OUTPUT").as_deref() {
        Ok("json") => {
            serde_json::to_string_pretty(result).map_err(|e| UepError::Config(e.to_string()))
        }
        _ => serde_yaml::to_string(result).map_err(|e| UepError::Config(e.to_string())),
    }
}

fn run(config: &RunConfig) -> UepResult<()> {
    let sim = config.build_simulation()?;
    tracing::info!(
        k = sim.params().code.k(),
        n = sim.n_slots(),
        nblocks = sim.nblocks(),
        seed = sim.seed(),
        channel = ?sim.params().channel,
        "simulation configured"
    );

    let result = config.reducer().run(&sim)?;
    println!("{}", render(&result)?);
    Ok(())
}

fn main() -> ExitCode {
    let config = match RunConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("uep-sim: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config.logging);

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "simulation failed");
            ExitCode::FAILURE
        }
    }
}
