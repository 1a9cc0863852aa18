use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "breath-monitor",
    version,
    about = "Condition a breathing-belt stream and publish it",
    long_about = "Acquire a breathing-belt stream, filter out the sensor offset and drift,\n\
                  correct spikes and motion artifacts, normalize, and publish one value per\n\
                  sample. Without hardware the belt is simulated."
)]
pub struct Cli {
    /// JSON configuration file; CLI flags override it
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Device identifier
    #[arg(long)]
    pub device: Option<String>,

    /// Process only the first sensor channel
    #[arg(long)]
    pub single_channel: bool,

    /// Simulated respiration pattern (regular, slow, fast, variable, apnea, deep)
    #[arg(long, default_value = "regular")]
    pub pattern: String,

    /// Seed for the simulated belt
    #[arg(long)]
    pub seed: Option<u64>,

    /// Simulate a clean belt without noise, drift or artifacts
    #[arg(long)]
    pub clean: bool,

    /// Produce samples as fast as possible instead of at the sampling rate
    #[arg(long)]
    pub no_realtime: bool,

    /// Stop after this many seconds
    #[arg(long)]
    pub duration: Option<f64>,

    /// Stop after this many batches
    #[arg(long)]
    pub batches: Option<u64>,

    /// Do not publish to the network
    #[arg(long)]
    pub no_outlet: bool,

    /// Datagram destination (host:port, multicast allowed)
    #[arg(long)]
    pub destination: Option<String>,

    /// Draw the corrected series in the terminal
    #[arg(long)]
    pub plot: bool,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    pub print_config: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Decrease verbosity (-q, -qq)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub quiet: u8,
}

impl Cli {
    /// Max log level, INFO unless adjusted by -v/-q
    pub fn log_level(&self) -> tracing::Level {
        use tracing::Level;
        const LEVELS: [Level; 5] = [Level::ERROR, Level::WARN, Level::INFO, Level::DEBUG, Level::TRACE];
        let index = (2 + self.verbose as i32 - self.quiet as i32).clamp(0, 4);
        LEVELS[index as usize]
    }
}
