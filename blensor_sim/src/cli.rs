// blensor_sim/src/cli.rs

use crate::error::SimError;
use crate::simulation::config::{load_catalog_from_disk, load_scenario, render_preset};
use crate::simulation::runner::{run_scenario, summarize_evd, RunOptions};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// BlenSor: range-sensor simulation against analytic scenes.
///
/// This struct defines the command-line arguments of the `blensor` binary.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run a scenario and write its point records.
    Scan {
        /// The path to the scenario TOML file to run.
        #[arg(short, long)]
        scenario: PathBuf,

        /// Directory of sensor presets that `from = "..."` keys refer to.
        #[arg(short, long, default_value = "assets/catalog")]
        catalog: PathBuf,

        /// Overrides the scenario's output file; the extension picks the format.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overrides the scenario's seed.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Summarize an EVD file.
    Inspect {
        file: PathBuf,
    },
    /// List the catalog presets, or print one resolved.
    Presets {
        #[arg(short, long, default_value = "assets/catalog")]
        catalog: PathBuf,

        /// Catalog key to print, e.g. `sensors.hdl64e`.
        #[arg(long)]
        show: Option<String>,
    },
}

pub fn execute(cli: &Cli) -> Result<(), SimError> {
    match &cli.command {
        Command::Scan {
            scenario,
            catalog,
            output,
            seed,
        } => {
            let catalog = load_catalog_from_disk(catalog);
            let config = load_scenario(scenario, &catalog)?;
            let options = RunOptions {
                output: output.clone(),
                seed: *seed,
                ..RunOptions::default()
            };
            let summary = run_scenario(&config, &options)?;
            println!(
                "{} scan: {} frame(s), {} records -> {}",
                summary.sensor,
                summary.frames,
                summary.records,
                summary.output.display()
            );
        }
        Command::Inspect { file } => {
            print!("{}", summarize_evd(file)?);
        }
        Command::Presets { catalog, show } => {
            let catalog = load_catalog_from_disk(catalog);
            match show {
                Some(key) => print!("{}", render_preset(key, &catalog)?),
                None => {
                    for key in catalog.keys() {
                        println!("{key}");
                    }
                }
            }
        }
    }
    Ok(())
}
