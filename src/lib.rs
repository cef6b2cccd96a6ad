mod aggregator;
mod config;
mod csv_log;
mod engine;
mod error;
mod feed;
mod ingestor;
pub mod measure;
mod record;
mod snapshot;
mod splitter;
mod stage;
pub mod stages;
mod storage;
mod window;

pub use crate::aggregator::Aggregator;
pub use crate::config::{EngineConfig, UpdateMode, WindowOptions};
pub use crate::csv_log::CsvLog;
pub use crate::engine::{ShutdownReport, WindowEngine, WorkerStatus, WorkerStep, sleep_while_running};
pub use crate::error::*;
pub use crate::feed::ReplayFeed;
pub use crate::ingestor::{IngestStats, IngestStep, Ingestor, READ_POLL_INTERVAL, connect};
pub use crate::record::{Batch, LineSplitter, MAX_PENDING_BYTES};
pub use crate::snapshot::Snapshot;
pub use crate::splitter::Splitter;
pub use crate::stage::{ChannelStage, StageFactory, StageRegistry};
pub use crate::window::SharedWindow;
