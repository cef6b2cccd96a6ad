use clap::{Args, Parser, Subcommand};
use roda_window::{
    Aggregator, CsvLog, EngineConfig, EngineError, FeedError, Ingestor, ReplayFeed, Splitter,
    StageRegistry, WindowEngine, connect,
};
use spdlog::{Level, LevelFilter, error, info, warn};
use std::net::TcpListener;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const STATUS_POLL: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(name = "roda-window", version, about = "Rolling-window ingestion of multi-channel sample feeds")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a feed into the rolling window and run the splitter and aggregator
    Run(EngineConfig),
    /// Serve rows as a paced source feed
    Replay(ReplayArgs),
    /// List the registered analysis stages
    Stages,
}

#[derive(Args)]
struct ReplayArgs {
    #[arg(long, default_value = "localhost:12345")]
    bind: String,

    /// Headerless CSV file to replay; a synthetic sine feed is used when omitted
    #[arg(long)]
    file: Option<PathBuf>,

    /// Columns of the synthetic feed
    #[arg(long, default_value_t = 2)]
    columns: usize,

    #[arg(long, default_value_t = 2000.0)]
    rate: f64,

    /// Start over after the last row
    #[arg(long = "loop")]
    looping: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::Debug } else { Level::Info };
    spdlog::default_logger().set_level_filter(LevelFilter::MoreSevereEqual(level));

    let result = match cli.command {
        Command::Run(config) => run(config),
        Command::Replay(args) => replay(args),
        Command::Stages => {
            for key in StageRegistry::with_builtins().keys() {
                println!("{}", key);
            }
            Ok(ExitCode::SUCCESS)
        }
    };

    let code = result.unwrap_or_else(|err| {
        error!("{}", err);
        ExitCode::FAILURE
    });
    spdlog::default_logger().flush();
    code
}

fn run(config: EngineConfig) -> Result<ExitCode, EngineError> {
    let stages = StageRegistry::with_builtins().build_all(&config.stages)?;
    let mut engine = WindowEngine::new(&config)?;

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;

    let stream = match connect(&config.source_addr(), CONNECT_TIMEOUT) {
        Ok(stream) => stream,
        Err(err) => {
            engine.abort();
            return Err(err.into());
        }
    };

    let window = engine.window();
    let started = engine.start(
        Ingestor::new(stream, window.clone()),
        Splitter::new(window.clone()).with_stages(stages),
        Aggregator::new(window, CsvLog::new(&config.log_path)),
    );
    if let Err(err) = started {
        engine.abort();
        return Err(err);
    }

    loop {
        match rx.recv_timeout(STATUS_POLL) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                info!("[Main] interrupt received, shutting down");
                break;
            }
            Err(RecvTimeoutError::Timeout) if engine.any_worker_stopped() => {
                for (name, status) in engine.worker_statuses() {
                    if status.is_terminal() {
                        warn!("[Main] worker {} is {:?}, tearing down", name, status);
                    }
                }
                break;
            }
            Err(RecvTimeoutError::Timeout) => {}
        }
    }

    let failed = engine.any_worker_failed();
    let report = engine.shutdown();
    if !report.abandoned.is_empty() {
        warn!("[Main] abandoned workers: {:?}", report.abandoned);
    }
    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn replay(args: ReplayArgs) -> Result<ExitCode, EngineError> {
    let feed = match &args.file {
        Some(path) => ReplayFeed::from_csv_path(path, args.rate)?,
        None => ReplayFeed::synthetic(args.columns, args.rate)?,
    }
    .looping(args.looping);

    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || flag.store(false, Ordering::Release))?;

    let listener = TcpListener::bind(&args.bind).map_err(FeedError::from)?;
    info!("[Feed] listening on {} at {} Hz", args.bind, args.rate);
    feed.serve(&listener, || running.load(Ordering::Acquire))?;
    Ok(ExitCode::SUCCESS)
}
