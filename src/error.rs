use std::io;
use std::num::ParseFloatError;
use std::str::Utf8Error;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("window capacity must be greater than 0")]
    ZeroCapacity,
    #[error("batch size must be greater than 0")]
    ZeroBatch,
    #[error("column count must be greater than 0")]
    ZeroColumns,
    #[error("batch size {batch_size} exceeds window capacity {capacity}")]
    BatchExceedsCapacity { batch_size: usize, capacity: usize },
    #[error("nominal rate must be a positive number, got {0}")]
    InvalidRate(f64),
    #[error("unknown analysis stage '{0}'")]
    UnknownStage(String),
}

#[derive(Debug, Error)]
pub enum WindowError {
    #[error("window backing memory has already been released")]
    Released,
    #[error("batch shape {rows}x{columns} does not match expected {expected_rows}x{expected_columns}")]
    ShapeMismatch {
        rows: usize,
        columns: usize,
        expected_rows: usize,
        expected_columns: usize,
    },
    #[error("cell ({row}, {column}) is outside the {rows}x{columns} window")]
    OutOfBounds {
        row: usize,
        column: usize,
        rows: usize,
        columns: usize,
    },
    #[error("{0} lock poisoned by a panicking worker")]
    Poisoned(&'static str),
    #[error("failed to allocate window arena: {0}")]
    Alloc(#[from] io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("expected {expected} fields, found {found}")]
    Arity { expected: usize, found: usize },
    #[error("field {index} is not a float: {source}")]
    Parse {
        index: usize,
        #[source]
        source: ParseFloatError,
    },
    #[error("record is not valid UTF-8: {0}")]
    Encoding(#[from] Utf8Error),
    #[error("record exceeds {0} bytes without a delimiter")]
    Oversized(usize),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to connect to source feed at {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("source feed read failed: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Window(#[from] WindowError),
}

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error(transparent)]
    Window(#[from] WindowError),
    #[error("failed to append to {path}: {source}")]
    Log {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("log lock poisoned by a panicking writer")]
    LogPoisoned,
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("failed to read feed rows: {0}")]
    Csv(#[from] csv::Error),
    #[error("feed row {row} field {index} is not a float: {value}")]
    Value { row: usize, index: usize, value: String },
    #[error("feed has no rows to send")]
    Empty,
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Window(#[from] WindowError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error("failed to spawn worker '{name}': {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
}
