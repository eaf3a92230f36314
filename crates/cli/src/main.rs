// TrackRig - Track Test Rig Co-Simulation
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use clap::{Parser, Subcommand};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info, warn};

use trackrig_config::RigConfig;
use trackrig_core::metrics::MetricsReport;
use trackrig_core::system::builder;
use trackrig_core::track::{m113, TrackAssembly, TrackVariant};
use trackrig_core::{
    FrameSnapshotWriter, LoopMetrics, ObserverSet, RigError, StopConditions, StopReason,
};

const EXIT_PASS: u8 = 0;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

const RESULT_SCHEMA_VERSION: &str = "1.0";

#[derive(Parser, Debug)]
#[command(author, version, about = "TrackRig track test rig", long_about = None)]
struct Cli {
    /// Log every macro-step (DEBUG level)
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the co-simulation loop described by a rig config (YAML).
    Run(RunArgs),

    /// Check a rig config without running it.
    Validate(ValidateArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Path to the rig config (YAML)
    #[arg(short, long)]
    config: PathBuf,

    /// Directory for result.json and frames (overrides output.directory)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Stop after this many macro-steps (overrides limits.max_steps)
    #[arg(long)]
    max_steps: Option<u64>,

    /// Stop once simulated time reaches this value (overrides limits.end_time)
    #[arg(long)]
    end_time: Option<f64>,

    /// Write render frames regardless of output.snapshots
    #[arg(long)]
    snapshots: bool,
}

#[derive(Parser, Debug)]
struct ValidateArgs {
    /// Path to the rig config (YAML)
    #[arg(short, long)]
    config: PathBuf,
}

#[derive(Debug, Serialize)]
struct RunResult {
    result_schema_version: String,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_reason: Option<StopReason>,
    steps_executed: u64,
    simulated_time: f64,
    frames: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    variant: Option<TrackVariant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    track: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metrics: Option<MetricsReport>,
    limits: RunLimits,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    config_hash: String,
    config: PathBuf,
    wall_time_ms: u128,
}

#[derive(Debug, Clone, Copy, Serialize)]
struct RunLimits {
    max_steps: Option<u64>,
    end_time: Option<f64>,
}

impl RunResult {
    fn new(status: &str, config_path: &Path, config_hash: String, limits: RunLimits) -> Self {
        Self {
            result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
            status: status.to_string(),
            stop_reason: None,
            steps_executed: 0,
            simulated_time: 0.0,
            frames: 0,
            variant: None,
            track: None,
            metrics: None,
            limits,
            message: None,
            config_hash,
            config: config_path.to_path_buf(),
            wall_time_ms: 0,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    match cli.command {
        Commands::Run(args) => run(args),
        Commands::Validate(args) => validate(args),
    }
}

fn validate(args: ValidateArgs) -> ExitCode {
    let config = match RigConfig::from_file(&args.config) {
        Ok(c) => c,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    match builder::track_variant(&config) {
        Ok(variant) => {
            info!(
                "{:?}: valid ({:?}, render every {} steps)",
                args.config,
                variant,
                config.render_steps()
            );
            ExitCode::from(EXIT_PASS)
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::from(EXIT_CONFIG_ERROR)
        }
    }
}

fn hash_file(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

fn run(args: RunArgs) -> ExitCode {
    let started = Instant::now();
    let cli_limits = RunLimits {
        max_steps: args.max_steps,
        end_time: args.end_time,
    };

    let config_hash = match hash_file(&args.config) {
        Ok(h) => h,
        Err(e) => {
            error!("Failed to read rig config {:?}: {}", args.config, e);
            let mut result = RunResult::new("config_error", &args.config, String::new(), cli_limits);
            result.message = Some(format!("Failed to read rig config: {}", e));
            write_result(args.output_dir.as_deref(), &result);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let mut config = match RigConfig::from_file(&args.config) {
        Ok(c) => c,
        Err(e) => {
            error!("{:#}", e);
            let mut result = RunResult::new("config_error", &args.config, config_hash, cli_limits);
            result.message = Some(format!("{:#}", e));
            write_result(args.output_dir.as_deref(), &result);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    if args.max_steps.is_some() {
        config.limits.max_steps = args.max_steps;
    }
    if args.end_time.is_some() {
        config.limits.end_time = args.end_time;
    }
    if args.snapshots {
        config.output.snapshots = true;
    }
    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.output.directory));
    let limits = RunLimits {
        max_steps: config.limits.max_steps,
        end_time: config.limits.end_time,
    };

    let mut result = RunResult::new("error", &args.config, config_hash, limits);

    // The only place the track variant is dispatched.
    let side = config.track.side;
    let outcome = match builder::track_variant(&config) {
        Ok(TrackVariant::Bushing) => {
            execute(&config, m113::bushing_track(side), &output_dir, &mut result)
        }
        Ok(TrackVariant::FiniteElementBand) => {
            execute(&config, m113::band_track(side), &output_dir, &mut result)
        }
        Err(e) => Err(e),
    };

    let code = match outcome {
        Ok(()) => {
            result.status = "pass".to_string();
            EXIT_PASS
        }
        Err(e) => {
            error!("{}", e);
            result.message = Some(e.to_string());
            match e {
                RigError::Configuration(_) => {
                    result.status = "config_error".to_string();
                    EXIT_CONFIG_ERROR
                }
                _ => {
                    result.status = "runtime_error".to_string();
                    EXIT_RUNTIME_ERROR
                }
            }
        }
    };
    result.wall_time_ms = started.elapsed().as_millis();
    write_result(Some(&output_dir), &result);
    ExitCode::from(code)
}

fn execute<T: TrackAssembly>(
    config: &RigConfig,
    track: T,
    output_dir: &Path,
    result: &mut RunResult,
) -> Result<(), RigError> {
    result.variant = Some(T::VARIANT);
    result.track = Some(track.name().to_string());

    let mut cosim = builder::build_loop(config, track)?;
    if config.limits.max_steps.is_none() && config.limits.end_time.is_none() {
        warn!("No max_steps or end_time set; the rig runs until interrupted");
    }

    let mut stop = StopConditions::new(config.limits.max_steps, config.limits.end_time);
    let mut metrics = LoopMetrics::new();
    let mut writer = if config.output.snapshots {
        Some(FrameSnapshotWriter::new(
            output_dir.join("frames"),
            config.output.snapshot_start_step,
        )?)
    } else {
        None
    };

    info!("Starting co-simulation ({:?})...", T::VARIANT);
    let outcome = {
        let mut observers = ObserverSet::new().with(&mut metrics).with(&mut stop);
        if let Some(w) = writer.as_mut() {
            observers.push(w);
        }
        cosim.run(&mut observers)
    };

    let summary = cosim.summary();
    result.steps_executed = summary.steps;
    result.simulated_time = summary.time;
    result.frames = summary.frames;
    result.metrics = Some(metrics.report());
    result.stop_reason = stop.reason();

    outcome.map(|summary| {
        info!(
            "Finished: {} steps, t = {:.6}s, stop reason {:?}",
            summary.steps,
            summary.time,
            stop.reason()
        );
    })
}

fn write_result(output_dir: Option<&Path>, result: &RunResult) {
    let Some(output_dir) = output_dir else {
        return;
    };
    if let Err(e) = std::fs::create_dir_all(output_dir) {
        error!("Failed to create output directory {:?}: {}", output_dir, e);
        return;
    }
    let result_path = output_dir.join("result.json");
    match std::fs::File::create(&result_path) {
        Ok(f) => {
            if let Err(e) = serde_json::to_writer_pretty(f, result) {
                error!("Failed to write result.json: {}", e);
            }
        }
        Err(e) => error!("Failed to create result.json: {}", e),
    }
}
