use crate::config::{UpdateMode, WindowOptions};
use crate::error::WindowError;
use crate::record::Batch;
use crate::snapshot::Snapshot;
use crate::storage::window_mmap::WindowMmap;
use spdlog::trace;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// The authoritative rolling buffer of the most recent `capacity` rows.
///
/// A single writer commits batches while any number of readers take snapshots.
/// Every access goes through the same two locks, always acquired outer then inner
/// and released inner then outer. The outer lock is the admission gate that keeps
/// readers queued behind a waiting writer; the inner lock guards the arena itself.
/// Releasing the arena is also done under both locks, after which every access
/// fails with [`WindowError::Released`].
pub struct SharedWindow {
    options: WindowOptions,
    outer: Mutex<()>,
    inner: Mutex<Option<WindowMmap>>,
    commits: AtomicU64,
}

/// Both window locks, held together.
///
/// Fields drop in declaration order, so `inner` is always released before `outer`.
struct WindowGuard<'a> {
    inner: MutexGuard<'a, Option<WindowMmap>>,
    _outer: MutexGuard<'a, ()>,
}

impl WindowGuard<'_> {
    fn arena(&self) -> Result<&WindowMmap, WindowError> {
        self.inner.as_ref().ok_or(WindowError::Released)
    }

    fn arena_mut(&mut self) -> Result<&mut WindowMmap, WindowError> {
        self.inner.as_mut().ok_or(WindowError::Released)
    }
}

impl SharedWindow {
    /// Allocates a zeroed window, backed by `backing_path` when given.
    ///
    /// Options built by hand are validated here too, so a window never has a shape
    /// that `commit` cannot apply.
    pub fn new(options: WindowOptions, backing_path: Option<PathBuf>) -> Result<Self, WindowError> {
        options.validate()?;
        let arena = WindowMmap::new(backing_path, options.cells())?;
        Ok(Self {
            options,
            outer: Mutex::new(()),
            inner: Mutex::new(Some(arena)),
            commits: AtomicU64::new(0),
        })
    }

    pub fn in_memory(options: WindowOptions) -> Result<Self, WindowError> {
        Self::new(options, None)
    }

    pub fn options(&self) -> WindowOptions {
        self.options
    }

    pub fn mode(&self) -> UpdateMode {
        self.options.mode()
    }

    /// Number of batches committed so far.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::Acquire)
    }

    fn lock(&self) -> Result<WindowGuard<'_>, WindowError> {
        let outer = self.outer.lock().map_err(|_| WindowError::Poisoned("outer"))?;
        let inner = self.inner.lock().map_err(|_| WindowError::Poisoned("inner"))?;
        Ok(WindowGuard {
            inner,
            _outer: outer,
        })
    }

    /// Applies one batch atomically with respect to every reader.
    ///
    /// In replace mode the batch becomes the whole window. In rolling mode the
    /// oldest `batch_size` rows are shifted out and the batch is appended as the
    /// newest rows.
    pub fn commit(&self, batch: &Batch) -> Result<(), WindowError> {
        let WindowOptions {
            capacity,
            batch_size,
            columns,
        } = self.options;
        if batch.rows() != batch_size || batch.columns() != columns {
            return Err(WindowError::ShapeMismatch {
                rows: batch.rows(),
                columns: batch.columns(),
                expected_rows: batch_size,
                expected_columns: columns,
            });
        }

        let mut guard = self.lock()?;
        let cells = guard.arena_mut()?.as_mut_slice();
        let incoming = batch.as_slice();
        match self.options.mode() {
            UpdateMode::Replace => cells.copy_from_slice(incoming),
            UpdateMode::Rolling => {
                let shift = incoming.len();
                cells.copy_within(shift.., 0);
                let tail = (capacity - batch_size) * columns;
                cells[tail..].copy_from_slice(incoming);
            }
        }
        let total = self.commits.fetch_add(1, Ordering::AcqRel) + 1;
        drop(guard);

        trace!("[Window] commit #{} of {} rows", total, batch_size);
        Ok(())
    }

    /// Copies the whole window into a fresh snapshot.
    pub fn snapshot(&self) -> Result<Snapshot, WindowError> {
        let mut snapshot = Snapshot::zeroed(self.options.capacity, self.options.columns);
        self.snapshot_into(&mut snapshot)?;
        Ok(snapshot)
    }

    /// Copies the whole window into a caller-owned snapshot of the same shape.
    pub fn snapshot_into(&self, out: &mut Snapshot) -> Result<(), WindowError> {
        if out.rows() != self.options.capacity || out.columns() != self.options.columns {
            return Err(WindowError::ShapeMismatch {
                rows: out.rows(),
                columns: out.columns(),
                expected_rows: self.options.capacity,
                expected_columns: self.options.columns,
            });
        }
        let guard = self.lock()?;
        out.as_mut_slice().copy_from_slice(guard.arena()?.as_slice());
        Ok(())
    }

    /// Reads a single cell. Row 0 is the oldest retained record.
    pub fn get(&self, row: usize, column: usize) -> Result<f64, WindowError> {
        let WindowOptions {
            capacity, columns, ..
        } = self.options;
        if row >= capacity || column >= columns {
            return Err(WindowError::OutOfBounds {
                row,
                column,
                rows: capacity,
                columns,
            });
        }
        let guard = self.lock()?;
        Ok(guard.arena()?.as_slice()[row * columns + column])
    }

    /// Unmaps the backing arena. Returns `false` when it was already released.
    ///
    /// Poisoned locks are recovered here so cleanup still runs after a worker panic.
    pub fn release(&self) -> bool {
        let outer = self.outer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let released = inner.take().is_some();
        drop(inner);
        drop(outer);
        released
    }

    pub fn is_released(&self) -> bool {
        let outer = self.outer.lock().unwrap_or_else(PoisonError::into_inner);
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let released = inner.is_none();
        drop(inner);
        drop(outer);
        released
    }
}
