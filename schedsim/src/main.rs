/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info, warn};

use schedsim::config::SimulationConfig;
use schedsim::scheduler::SchedulerKind;
use schedsim::sim::{run_simulation, SimulationReport};
use schedsim::task::Task;
use schedsim::workload::{load_tasks, write_tasks, SyntheticWorkload};

// ── CLI argument definition ───────────────────────────────────────────────────

/// Discrete-event cluster scheduling simulator.
///
/// Example:
///   schedsim generate --tasks 5000 --output tasks.yaml
///   schedsim run --scheduler admission --config sim.yaml --workload tasks.yaml
///   schedsim compare --workload tasks.yaml --output report.yaml
#[derive(Debug, Parser)]
#[command(
    name = "schedsim",
    about = "Cluster scheduling simulator – DRF, Tetris, min-cost flow and risk-aware admission",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Simulate one scheduler.
    Run {
        /// drf, tetris, flow or admission.
        #[arg(short = 's', long = "scheduler", default_value = "admission")]
        scheduler: SchedulerKind,

        #[command(flatten)]
        input: InputArgs,
    },

    /// Simulate every scheduler on the same workload.
    Compare {
        #[command(flatten)]
        input: InputArgs,
    },

    /// Write a synthetic workload file.
    Generate {
        #[arg(short = 'n', long = "tasks", default_value_t = 1000)]
        tasks: usize,

        #[arg(short = 't', long = "tenants", default_value_t = 4)]
        tenants: usize,

        #[arg(long = "seed", default_value_t = 1024)]
        seed: u64,

        #[arg(short = 'o', long = "output")]
        output: PathBuf,
    },
}

#[derive(Debug, Args)]
struct InputArgs {
    /// Path to the YAML simulation configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Path to a YAML task file; a synthetic workload is used when absent.
    #[arg(short = 'w', long = "workload")]
    workload: Option<PathBuf>,

    /// Where to write the YAML report; stdout when absent.
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn load_inputs(input: &InputArgs) -> Result<(SimulationConfig, Vec<Task>)> {
    let config = match &input.config {
        Some(path) => SimulationConfig::load_from_file(path)?,
        None => {
            warn!("No configuration file provided, using default simulation settings");
            SimulationConfig::default()
        }
    };
    let tasks = match &input.workload {
        Some(path) => load_tasks(path)?,
        None => {
            let generator = SyntheticWorkload {
                seed: config.simulation.seed,
                ..SyntheticWorkload::default()
            };
            info!(tasks = generator.tasks, seed = generator.seed, "Generating synthetic workload");
            generator.validate()?;
            generator.generate()
        }
    };
    Ok((config, tasks))
}

fn emit<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let yaml = serde_yaml::to_string(value).context("Failed to serialise report")?;
    match output {
        Some(path) => {
            std::fs::write(path, yaml)
                .with_context(|| format!("Cannot write report: {}", path.display()))?;
            info!("Report written to: {}", path.display());
        }
        None => print!("{yaml}"),
    }
    Ok(())
}

fn run_one(kind: SchedulerKind, input: &InputArgs) -> Result<()> {
    let (config, tasks) = load_inputs(input)?;
    let report = run_simulation(&config, tasks, kind)
        .with_context(|| format!("Simulation with '{kind}' failed"))?;
    emit(&report, input.output.as_deref())
}

async fn compare(input: &InputArgs) -> Result<()> {
    let (config, tasks) = load_inputs(input)?;

    let handles: Vec<_> = SchedulerKind::ALL
        .into_iter()
        .map(|kind| {
            let config = config.clone();
            let tasks = tasks.clone();
            (kind, tokio::task::spawn_blocking(move || run_simulation(&config, tasks, kind)))
        })
        .collect();

    let mut reports: Vec<SimulationReport> = Vec::with_capacity(handles.len());
    for (kind, handle) in handles {
        let report = handle
            .await
            .with_context(|| format!("Simulation task for '{kind}' did not complete"))?
            .with_context(|| format!("Simulation with '{kind}' failed"))?;
        info!(
            scheduler = %kind,
            scheduled = report.scheduled,
            failed = report.failed,
            success_rate = report.success_rate,
            avg_utilization = report.time_weighted.dominant,
            imbalance = report.time_weighted.imbalance,
            violation_risk = report.time_weighted.violation_risk,
            "Comparison result"
        );
        reports.push(report);
    }
    emit(&reports, input.output.as_deref())
}

fn generate(tasks: usize, tenants: usize, seed: u64, output: &Path) -> Result<()> {
    let workload = SyntheticWorkload {
        tasks,
        tenants,
        seed,
        ..SyntheticWorkload::default()
    };
    workload.validate()?;
    write_tasks(output, &workload.generate())?;
    info!(tasks = tasks, "Synthetic workload written to: {}", output.display());
    Ok(())
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match &cli.command {
        Command::Run { scheduler, input } => run_one(*scheduler, input),
        Command::Compare { input } => compare(input).await,
        Command::Generate {
            tasks,
            tenants,
            seed,
            output,
        } => generate(*tasks, *tenants, *seed, output),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        process::exit(1);
    }
}
