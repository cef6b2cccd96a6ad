use crate::config::validate_rate;
use crate::error::{ConfigError, FeedError};
use spdlog::{debug, info};
use std::borrow::Cow;
use std::f64::consts::TAU;
use std::io::{BufWriter, ErrorKind, Write};
use std::net::TcpListener;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

const PACE_SLICE: Duration = Duration::from_millis(1);
const ACCEPT_SLICE: Duration = Duration::from_millis(10);

enum Samples {
    Lines(Vec<String>),
    /// One sine per column, column `c` at `c + 1` Hz.
    Sine { columns: usize },
}

/// A source feed that streams rows as CSV lines at a nominal sample rate.
pub struct ReplayFeed {
    samples: Samples,
    rate_hz: f64,
    looping: bool,
}

impl ReplayFeed {
    /// Loads headerless CSV rows; every field must parse as a float.
    pub fn from_csv_path(path: impl AsRef<Path>, rate_hz: f64) -> Result<Self, FeedError> {
        validate_rate(rate_hz)?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path.as_ref())?;

        let mut lines = vec![];
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            for (index, field) in record.iter().enumerate() {
                if field.trim().parse::<f64>().is_err() {
                    return Err(FeedError::Value {
                        row,
                        index,
                        value: field.to_string(),
                    });
                }
            }
            lines.push(record.iter().map(str::trim).collect::<Vec<_>>().join(","));
        }
        info!(
            "[Feed] loaded {} rows from {}",
            lines.len(),
            path.as_ref().display()
        );
        Self::from_lines(lines, rate_hz)
    }

    pub fn from_rows(rows: &[Vec<f64>], rate_hz: f64) -> Result<Self, FeedError> {
        let lines = rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|v| format!("{:?}", v))
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .collect();
        Self::from_lines(lines, rate_hz)
    }

    fn from_lines(lines: Vec<String>, rate_hz: f64) -> Result<Self, FeedError> {
        validate_rate(rate_hz)?;
        if lines.is_empty() {
            return Err(FeedError::Empty);
        }
        Ok(Self {
            samples: Samples::Lines(lines),
            rate_hz,
            looping: false,
        })
    }

    /// An endless generator of sine samples, one column per channel.
    pub fn synthetic(columns: usize, rate_hz: f64) -> Result<Self, FeedError> {
        validate_rate(rate_hz)?;
        if columns == 0 {
            return Err(ConfigError::ZeroColumns.into());
        }
        Ok(Self {
            samples: Samples::Sine { columns },
            rate_hz,
            looping: false,
        })
    }

    /// Restart from the first row instead of ending after the last one.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    fn line(&self, index: u64) -> Option<Cow<'_, str>> {
        match &self.samples {
            Samples::Lines(lines) => {
                let len = lines.len() as u64;
                if index < len {
                    Some(Cow::Borrowed(&lines[index as usize]))
                } else if self.looping {
                    Some(Cow::Borrowed(&lines[(index % len) as usize]))
                } else {
                    None
                }
            }
            Samples::Sine { columns } => {
                let t = index as f64 / self.rate_hz;
                let line = (0..*columns)
                    .map(|c| format!("{:.6}", (TAU * (c + 1) as f64 * t).sin()))
                    .collect::<Vec<_>>()
                    .join(",");
                Some(Cow::Owned(line))
            }
        }
    }

    /// Waits for one client on `listener`, then streams to it.
    ///
    /// Returns the number of rows sent; 0 if cancelled before a client connected.
    pub fn serve(
        &self,
        listener: &TcpListener,
        keep_running: impl Fn() -> bool,
    ) -> Result<u64, FeedError> {
        listener.set_nonblocking(true)?;
        let stream = loop {
            if !keep_running() {
                return Ok(0);
            }
            match listener.accept() {
                Ok((stream, peer)) => {
                    info!("[Feed] connection from {}", peer);
                    break stream;
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_SLICE),
                Err(err) => return Err(err.into()),
            }
        };
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;
        self.stream_to(stream, keep_running)
    }

    /// Writes rows to `out`, paced so that `rate * elapsed` rows are sent at any time.
    ///
    /// A client hanging up ends the stream normally.
    pub fn stream_to<W: Write>(
        &self,
        out: W,
        keep_running: impl Fn() -> bool,
    ) -> Result<u64, FeedError> {
        let mut writer = BufWriter::new(out);
        let start = Instant::now();
        let mut sent = 0u64;

        let result = (|| -> std::io::Result<()> {
            while keep_running() {
                let owed = (self.rate_hz * start.elapsed().as_secs_f64()) as u64;
                if owed <= sent {
                    writer.flush()?;
                    thread::sleep(PACE_SLICE);
                    continue;
                }
                while sent < owed {
                    let Some(line) = self.line(sent) else {
                        return writer.flush();
                    };
                    writer.write_all(line.as_bytes())?;
                    writer.write_all(b"\n")?;
                    sent += 1;
                }
                writer.flush()?;
            }
            Ok(())
        })();

        match result {
            Ok(()) => {
                info!("[Feed] sent {} rows", sent);
                Ok(sent)
            }
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
                ) =>
            {
                debug!("[Feed] client disconnected: {}", err);
                info!("[Feed] sent {} rows", sent);
                Ok(sent)
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streams_all_rows_then_stops() {
        let feed = ReplayFeed::from_rows(&[vec![1.0, 2.0], vec![3.5, 4.0]], 10_000.0).unwrap();
        let mut out = vec![];
        let sent = feed.stream_to(&mut out, || true).unwrap();
        assert_eq!(sent, 2);
        assert_eq!(String::from_utf8(out).unwrap(), "1.0,2.0\n3.5,4.0\n");
    }

    #[test]
    fn test_looping_feed_wraps_around() {
        let feed = ReplayFeed::from_rows(&[vec![1.0], vec![2.0]], 1000.0)
            .unwrap()
            .looping(true);
        assert_eq!(feed.line(0).unwrap(), "1.0");
        assert_eq!(feed.line(3).unwrap(), "2.0");
    }

    #[test]
    fn test_synthetic_rows_have_every_column() {
        let feed = ReplayFeed::synthetic(3, 2000.0).unwrap();
        let line = feed.line(10).unwrap();
        assert_eq!(line.split(',').count(), 3);
        assert!(line.split(',').all(|v| v.parse::<f64>().is_ok()));
    }

    #[test]
    fn test_empty_feed_is_rejected() {
        assert!(matches!(
            ReplayFeed::from_rows(&[], 100.0),
            Err(FeedError::Empty)
        ));
    }

    #[test]
    fn test_synthetic_feed_needs_columns_and_rate() {
        assert!(matches!(
            ReplayFeed::synthetic(0, 2000.0),
            Err(FeedError::Config(ConfigError::ZeroColumns))
        ));
        assert!(matches!(
            ReplayFeed::synthetic(2, 0.0),
            Err(FeedError::Config(ConfigError::InvalidRate(_)))
        ));
        assert!(matches!(
            ReplayFeed::from_rows(&[vec![1.0]], f64::NAN),
            Err(FeedError::Config(ConfigError::InvalidRate(_)))
        ));
    }

    #[test]
    fn test_cancelled_stream_sends_nothing() {
        let feed = ReplayFeed::synthetic(2, 2000.0).unwrap();
        let mut out = vec![];
        assert_eq!(feed.stream_to(&mut out, || false).unwrap(), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_csv_file_is_loaded() {
        let path = std::env::temp_dir().join(format!("test_feed_{}.csv", std::process::id()));
        std::fs::write(&path, "1.0, 2.0\n3,4\n").unwrap();
        let feed = ReplayFeed::from_csv_path(&path, 1000.0).unwrap();
        assert_eq!(feed.line(0).unwrap(), "1.0,2.0");
        assert_eq!(feed.line(1).unwrap(), "3,4");
        assert!(feed.line(2).is_none());

        std::fs::write(&path, "1.0,x\n").unwrap();
        assert!(matches!(
            ReplayFeed::from_csv_path(&path, 1000.0),
            Err(FeedError::Value { row: 0, index: 1, .. })
        ));
        let _ = std::fs::remove_file(&path);
    }
}
