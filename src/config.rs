use crate::error::ConfigError;
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 12345;
pub const DEFAULT_CAPACITY: usize = 1000;
pub const DEFAULT_COLUMNS: usize = 2;
pub const DEFAULT_RATE_HZ: f64 = 2000.0;
pub const DEFAULT_SPLITTER_INTERVAL_MS: u64 = 500;
pub const DEFAULT_AGGREGATOR_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_STARTUP_STAGGER_MS: u64 = 100;
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 5000;
pub const DEFAULT_LOG_PATH: &str = "window_means.csv";

/// A sample rate must be finite and positive.
pub(crate) fn validate_rate(rate_hz: f64) -> Result<(), ConfigError> {
    if rate_hz.is_finite() && rate_hz > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidRate(rate_hz))
    }
}

/// How a commit changes the window, derived from batch size vs. capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// `batch_size == capacity`: every commit overwrites the whole window.
    Replace,
    /// `batch_size < capacity`: every commit shifts out the oldest rows.
    Rolling,
}

/// Fixed shape of the shared window and its update batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowOptions {
    pub capacity: usize,
    pub batch_size: usize,
    pub columns: usize,
}

impl WindowOptions {
    pub fn new(capacity: usize, batch_size: usize, columns: usize) -> Result<Self, ConfigError> {
        let options = Self {
            capacity,
            batch_size,
            columns,
        };
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatch);
        }
        if self.columns == 0 {
            return Err(ConfigError::ZeroColumns);
        }
        if self.batch_size > self.capacity {
            return Err(ConfigError::BatchExceedsCapacity {
                batch_size: self.batch_size,
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    pub fn mode(&self) -> UpdateMode {
        if self.batch_size == self.capacity {
            UpdateMode::Replace
        } else {
            UpdateMode::Rolling
        }
    }

    /// Number of `f64` cells in the window.
    pub fn cells(&self) -> usize {
        self.capacity * self.columns
    }
}

/// Every runtime knob of the engine. Each flag can also be set from the environment.
#[derive(Debug, Clone, Args)]
pub struct EngineConfig {
    /// Source feed host
    #[arg(long, env = "RODA_WINDOW_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Source feed port
    #[arg(long, env = "RODA_WINDOW_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Rows retained in the rolling window (W)
    #[arg(long = "window", env = "RODA_WINDOW_CAPACITY", default_value_t = DEFAULT_CAPACITY)]
    pub capacity: usize,

    /// Rows per committed batch (B); equal to the window means replace mode
    #[arg(long, env = "RODA_WINDOW_BATCH", default_value_t = DEFAULT_CAPACITY)]
    pub batch_size: usize,

    /// Values per record (C)
    #[arg(long, env = "RODA_WINDOW_COLUMNS", default_value_t = DEFAULT_COLUMNS)]
    pub columns: usize,

    /// Nominal sample rate of the feed in Hz
    #[arg(long, env = "RODA_WINDOW_RATE", default_value_t = DEFAULT_RATE_HZ)]
    pub nominal_rate: f64,

    #[arg(long, env = "RODA_WINDOW_SPLITTER_MS", default_value_t = DEFAULT_SPLITTER_INTERVAL_MS)]
    pub splitter_interval_ms: u64,

    #[arg(long, env = "RODA_WINDOW_AGGREGATOR_MS", default_value_t = DEFAULT_AGGREGATOR_INTERVAL_MS)]
    pub aggregator_interval_ms: u64,

    /// Delay between starting the ingestor and starting the readers
    #[arg(long, env = "RODA_WINDOW_STAGGER_MS", default_value_t = DEFAULT_STARTUP_STAGGER_MS)]
    pub startup_stagger_ms: u64,

    /// Time each worker gets to stop on its own before it is abandoned
    #[arg(long, env = "RODA_WINDOW_GRACE_MS", default_value_t = DEFAULT_SHUTDOWN_GRACE_MS)]
    pub shutdown_grace_ms: u64,

    /// Append-only CSV log of per-column window means
    #[arg(long, env = "RODA_WINDOW_LOG", default_value = DEFAULT_LOG_PATH)]
    pub log_path: PathBuf,

    /// Back the window with this file instead of anonymous memory
    #[arg(long, env = "RODA_WINDOW_BACKING")]
    pub backing_path: Option<PathBuf>,

    /// Analysis stage applied to the split channels (repeatable)
    #[arg(long = "stage")]
    pub stages: Vec<String>,

    #[arg(long)]
    pub pin_cores: bool,

    /// Print per-worker iteration latency histograms on exit
    #[arg(long)]
    pub latency_stats: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            capacity: DEFAULT_CAPACITY,
            batch_size: DEFAULT_CAPACITY,
            columns: DEFAULT_COLUMNS,
            nominal_rate: DEFAULT_RATE_HZ,
            splitter_interval_ms: DEFAULT_SPLITTER_INTERVAL_MS,
            aggregator_interval_ms: DEFAULT_AGGREGATOR_INTERVAL_MS,
            startup_stagger_ms: DEFAULT_STARTUP_STAGGER_MS,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
            backing_path: None,
            stages: vec![],
            pin_cores: false,
            latency_stats: false,
        }
    }
}

impl EngineConfig {
    pub fn window_options(&self) -> Result<WindowOptions, ConfigError> {
        WindowOptions::new(self.capacity, self.batch_size, self.columns)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.window_options()?;
        validate_rate(self.nominal_rate)
    }

    pub fn source_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Wall-clock time covered by a full window at the nominal rate.
    pub fn window_span(&self) -> Duration {
        Duration::from_secs_f64(self.capacity as f64 / self.nominal_rate)
    }

    pub fn splitter_interval(&self) -> Duration {
        Duration::from_millis(self.splitter_interval_ms)
    }

    pub fn aggregator_interval(&self) -> Duration {
        Duration::from_millis(self.aggregator_interval_ms)
    }

    pub fn startup_stagger(&self) -> Duration {
        Duration::from_millis(self.startup_stagger_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
