use crate::error::{IngestError, RecordError};
use crate::record::{Batch, LineSplitter};
use crate::window::SharedWindow;
use spdlog::{debug, info, warn};
use std::io::{ErrorKind, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

pub const READ_CHUNK_SIZE: usize = 4096;

/// How long a blocking read waits before the worker re-checks cancellation.
pub const READ_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Records parsed and added to a batch.
    pub records: u64,
    /// Lines dropped because they could not be parsed.
    pub discarded: u64,
    /// Batches committed to the window.
    pub commits: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStep {
    /// Data was read, or the read timed out; call again.
    Continue,
    /// The feed closed the stream.
    Closed,
}

/// Turns a byte stream of CSV lines into batches committed to the shared window.
pub struct Ingestor<R> {
    source: R,
    window: Arc<SharedWindow>,
    lines: LineSplitter,
    batch: Batch,
    buf: Box<[u8]>,
    stats: IngestStats,
}

/// Opens the feed connection with a read timeout so cancellation stays responsive.
pub fn connect(addr: &str, timeout: Duration) -> Result<TcpStream, IngestError> {
    let connect_err = |source| IngestError::Connect {
        addr: addr.to_string(),
        source,
    };
    let mut last_err = None;
    for socket_addr in addr.to_socket_addrs().map_err(connect_err)? {
        match TcpStream::connect_timeout(&socket_addr, timeout) {
            Ok(stream) => {
                stream.set_read_timeout(Some(READ_POLL_INTERVAL))?;
                stream.set_nodelay(true)?;
                info!("[Ingestor] connected to {} ({})", addr, socket_addr);
                return Ok(stream);
            }
            Err(err) => last_err = Some(err),
        }
    }
    Err(connect_err(last_err.unwrap_or_else(|| {
        std::io::Error::new(ErrorKind::AddrNotAvailable, "address resolved to nothing")
    })))
}

impl<R: Read> Ingestor<R> {
    pub fn new(source: R, window: Arc<SharedWindow>) -> Self {
        let options = window.options();
        Self {
            source,
            window,
            lines: LineSplitter::new(),
            batch: Batch::new(options.batch_size, options.columns),
            buf: vec![0u8; READ_CHUNK_SIZE].into_boxed_slice(),
            stats: IngestStats::default(),
        }
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    /// Performs one read and commits every batch it completes.
    ///
    /// Read timeouts and interrupts are not errors; they return `Continue` so the
    /// caller can check for cancellation.
    pub fn step(&mut self) -> Result<IngestStep, IngestError> {
        let n = match self.source.read(&mut self.buf) {
            Ok(n) => n,
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) =>
            {
                return Ok(IngestStep::Continue);
            }
            Err(err) => return Err(err.into()),
        };

        let window = &*self.window;
        let batch = &mut self.batch;
        let stats = &mut self.stats;
        let mut result = Ok(());

        if n == 0 {
            self.lines.finish(|line| {
                if result.is_ok() {
                    result = accept(line, batch, window, stats);
                }
            });
            result?;
            debug!(
                "[Ingestor] feed closed with {} uncommitted records",
                batch.rows()
            );
            return Ok(IngestStep::Closed);
        }

        self.lines.feed(&self.buf[..n], |line| {
            if result.is_ok() {
                result = accept(line, batch, window, stats);
            }
        });
        result?;
        Ok(IngestStep::Continue)
    }

    /// Reads until the feed closes or `keep_running` returns false.
    pub fn run(&mut self, keep_running: impl Fn() -> bool) -> Result<IngestStats, IngestError> {
        while keep_running() {
            if self.step()? == IngestStep::Closed {
                break;
            }
        }
        Ok(self.stats)
    }
}

fn accept(
    line: Result<&str, RecordError>,
    batch: &mut Batch,
    window: &SharedWindow,
    stats: &mut IngestStats,
) -> Result<(), IngestError> {
    let parsed = match line {
        Ok(text) => batch.push_line(text).map_err(|err| {
            warn!("[Ingestor] discarding record {:?}: {}", text, err);
        }),
        Err(err) => {
            warn!("[Ingestor] discarding record: {}", err);
            Err(())
        }
    };
    if parsed.is_err() {
        stats.discarded += 1;
        return Ok(());
    }
    stats.records += 1;

    if batch.is_full() {
        window.commit(batch)?;
        batch.clear();
        stats.commits += 1;
    }
    Ok(())
}
