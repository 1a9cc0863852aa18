//! Wires configuration, simulated belt, sinks and the acquisition session

use crate::cli::Cli;
use crate::outlet::UdpOutlet;
use crate::plot::LivePlot;
use anyhow::{anyhow, Context, Result};
use breath_core::SystemClock;
use breath_processing::{AcquisitionSession, ProcessingConfig, SessionSummary};
use breath_simulation::{BeltConfig, BeltSimulator, BreathingPattern, NoiseConfig, SimulatedConnector};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// How the simulated belt behaves
#[derive(Debug, Clone)]
pub struct SimulationOptions {
    pub pattern: BreathingPattern,
    pub seed: Option<u64>,
    pub clean: bool,
    pub realtime: bool,
}

impl SimulationOptions {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let pattern = BreathingPattern::preset(&cli.pattern).ok_or_else(|| {
            let known: Vec<&str> = BreathingPattern::presets().iter().map(|(name, _)| *name).collect();
            anyhow!("Unknown pattern '{}', expected one of {}", cli.pattern, known.join(", "))
        })?;
        Ok(Self {
            pattern,
            seed: cli.seed,
            clean: cli.clean,
            realtime: !cli.no_realtime,
        })
    }
}

/// Load the optional config file and apply CLI overrides
pub fn build_config(cli: &Cli) -> Result<ProcessingConfig> {
    let mut config = match &cli.config {
        Some(path) => ProcessingConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => ProcessingConfig::breathing_belt(),
    };

    if let Some(device) = &cli.device {
        config.device.identifier = device.clone();
    }
    if cli.single_channel {
        config.device.channels.truncate(1);
        config.device.frame_offsets.truncate(1);
    }
    if cli.no_outlet {
        config.outlet.enabled = false;
    }
    if let Some(destination) = &cli.destination {
        config.outlet.destination = destination.clone();
    }
    if cli.plot {
        config.plot.enabled = true;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Set `stop` on interrupt or once `duration` has elapsed
pub async fn watch_stop(stop: Arc<AtomicBool>, duration: Option<Duration>) {
    let interrupted = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupt received, stopping"),
            Err(e) => {
                warn!(error = %e, "Cannot listen for interrupts");
                std::future::pending::<()>().await
            }
        }
    };
    let deadline = async {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        () = interrupted => {}
        () = deadline => info!("Run duration elapsed, stopping"),
    }
    stop.store(true, Ordering::SeqCst);
}

/// Run the blocking session on the blocking pool
pub async fn execute(
    config: ProcessingConfig,
    simulation: SimulationOptions,
    batch_limit: Option<u64>,
    stop: Arc<AtomicBool>,
) -> Result<SessionSummary> {
    tokio::task::spawn_blocking(move || run_session(config, simulation, batch_limit, &stop))
        .await
        .context("Acquisition task failed")?
}

fn run_session(
    config: ProcessingConfig,
    simulation: SimulationOptions,
    batch_limit: Option<u64>,
    stop: &AtomicBool,
) -> Result<SessionSummary> {
    let channel_count = config.channel_count();
    let simulator = BeltSimulator::new(BeltConfig {
        sampling_rate: config.sampling_rate_hz(),
        channel_count,
        pattern: simulation.pattern,
        noise: if simulation.clean {
            NoiseConfig::clean()
        } else {
            NoiseConfig::default()
        },
        seed: simulation.seed,
        ..BeltConfig::default()
    })
    .context("Failed to create belt simulator")?;
    let connector = SimulatedConnector::new(simulator).with_realtime(simulation.realtime);

    let mut session = AcquisitionSession::new(config.clone(), connector, Arc::new(SystemClock::new()))
        .context("Failed to build acquisition session")?;
    if config.outlet.enabled {
        let outlet = UdpOutlet::open(&config.outlet, channel_count).context("Failed to open outlet")?;
        session = session.with_publisher(Box::new(outlet));
    }
    if config.plot.enabled {
        session = session.with_plot(Box::new(LivePlot::stderr(config.plot.live)));
    }
    if let Some(limit) = batch_limit {
        session = session.with_batch_limit(limit);
    }

    session.run(stop).context("Acquisition session failed")
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = build_config(&cli)?;
    if cli.print_config {
        println!("{}", config.to_json()?);
        return Ok(());
    }
    let simulation = SimulationOptions::from_cli(&cli)?;

    let duration = match cli.duration {
        Some(secs) if secs.is_finite() && secs > 0.0 => Some(Duration::from_secs_f64(secs)),
        Some(secs) => return Err(anyhow!("Duration must be positive, got {}", secs)),
        None => None,
    };

    info!(
        profile = %config.name,
        pattern = simulation.pattern.description(),
        realtime = simulation.realtime,
        "Starting breath monitor"
    );

    let stop = Arc::new(AtomicBool::new(false));
    let watcher = tokio::spawn(watch_stop(stop.clone(), duration));
    let result = execute(config, simulation, cli.batches, stop).await;
    watcher.abort();

    let summary = result?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
