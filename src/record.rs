use crate::error::RecordError;

/// Longest fragment kept while waiting for its delimiter.
pub const MAX_PENDING_BYTES: usize = 64 * 1024;

/// Rows of parsed records waiting to be committed as one unit.
///
/// A record is one line of `columns` comma-separated floats. Records are stored
/// row-major, oldest first, exactly as they will land in the window.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    columns: usize,
    batch_size: usize,
    data: Vec<f64>,
}

impl Batch {
    pub fn new(batch_size: usize, columns: usize) -> Self {
        Self {
            columns,
            batch_size,
            data: Vec::with_capacity(batch_size * columns),
        }
    }

    /// A full batch made of row-major cells.
    ///
    /// # Panics
    /// Panics if `data.len()` is not a multiple of `columns`.
    pub fn from_cells(columns: usize, data: Vec<f64>) -> Self {
        assert!(
            columns > 0 && data.len().is_multiple_of(columns),
            "{} cells do not form rows of {} columns",
            data.len(),
            columns
        );
        Self {
            columns,
            batch_size: data.len() / columns,
            data,
        }
    }

    /// Parses one record and appends it. On error the batch is left unchanged.
    pub fn push_line(&mut self, line: &str) -> Result<(), RecordError> {
        let start = self.data.len();
        let mut found = 0;
        for (index, field) in line.split(',').enumerate() {
            found += 1;
            if found > self.columns {
                continue;
            }
            match field.trim().parse::<f64>() {
                Ok(value) => self.data.push(value),
                Err(source) => {
                    self.data.truncate(start);
                    return Err(RecordError::Parse { index, source });
                }
            }
        }
        if found != self.columns {
            self.data.truncate(start);
            return Err(RecordError::Arity {
                expected: self.columns,
                found,
            });
        }
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.data.len().checked_div(self.columns).unwrap_or(0)
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn is_full(&self) -> bool {
        self.rows() >= self.batch_size
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
}

/// Reassembles newline-delimited lines from arbitrarily split reads.
///
/// A fragment at the end of a read is held until the rest of its line arrives.
/// Once a fragment outgrows [`MAX_PENDING_BYTES`] it is reported once and the rest
/// of that line, up to its delimiter, is dropped.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
    discarding: bool,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk, calling `on_line` for every completed line without its
    /// delimiter (a trailing `\r` is stripped too).
    pub fn feed(&mut self, chunk: &[u8], mut on_line: impl FnMut(Result<&str, RecordError>)) {
        let mut rest = chunk;
        if self.discarding {
            let Some(pos) = rest.iter().position(|b| *b == b'\n') else {
                return;
            };
            rest = &rest[pos + 1..];
            self.discarding = false;
        }
        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            let (head, tail) = rest.split_at(pos);
            rest = &tail[1..];
            if self.pending.is_empty() {
                emit(head, &mut on_line);
            } else {
                self.pending.extend_from_slice(head);
                let line = std::mem::take(&mut self.pending);
                emit(&line, &mut on_line);
                self.pending = line;
                self.pending.clear();
            }
        }

        if rest.is_empty() {
            return;
        }
        if self.pending.len() + rest.len() > MAX_PENDING_BYTES {
            self.pending.clear();
            self.discarding = true;
            on_line(Err(RecordError::Oversized(MAX_PENDING_BYTES)));
            return;
        }
        self.pending.extend_from_slice(rest);
    }

    /// Flushes a final unterminated line once the stream has ended.
    pub fn finish(&mut self, mut on_line: impl FnMut(Result<&str, RecordError>)) {
        self.discarding = false;
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            emit(&line, &mut on_line);
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

fn emit(line: &[u8], on_line: &mut impl FnMut(Result<&str, RecordError>)) {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    match std::str::from_utf8(line) {
        Ok(text) if text.trim().is_empty() => {}
        Ok(text) => on_line(Ok(text)),
        Err(err) => on_line(Err(RecordError::Encoding(err))),
    }
}
