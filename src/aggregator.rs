use crate::csv_log::CsvLog;
use crate::error::AggregateError;
use crate::snapshot::Snapshot;
use crate::window::SharedWindow;
use spdlog::debug;
use std::sync::Arc;

/// Periodically reduces the window to per-column means and appends them to a log.
pub struct Aggregator {
    window: Arc<SharedWindow>,
    log: CsvLog,
    scratch: Snapshot,
    means: Vec<f64>,
    appended: u64,
}

impl Aggregator {
    pub fn new(window: Arc<SharedWindow>, log: CsvLog) -> Self {
        let options = window.options();
        Self {
            scratch: Snapshot::zeroed(options.capacity, options.columns),
            means: vec![0.0; options.columns],
            appended: 0,
            window,
            log,
        }
    }

    /// Takes a snapshot, computes the column means and appends them as one row.
    ///
    /// The window locks are released before the log is touched.
    pub fn step(&mut self) -> Result<&[f64], AggregateError> {
        self.window.snapshot_into(&mut self.scratch)?;
        self.scratch.column_means_into(&mut self.means);
        self.log.append_row(&self.means)?;
        self.appended += 1;
        debug!(
            "[Aggregator] window means {:?} written to {}",
            self.means,
            self.log.path().display()
        );
        Ok(&self.means)
    }

    pub fn appended(&self) -> u64 {
        self.appended
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WindowOptions;
    use crate::record::Batch;

    #[test]
    fn test_step_appends_column_means() {
        let path = std::env::temp_dir().join(format!("test_aggregator_{}.csv", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let window =
            Arc::new(SharedWindow::in_memory(WindowOptions::new(3, 3, 2).unwrap()).unwrap());
        window
            .commit(&Batch::from_cells(2, vec![2.0, 4.0, 4.0, 6.0, 6.0, 8.0]))
            .unwrap();

        let mut aggregator = Aggregator::new(window, CsvLog::new(&path));
        assert_eq!(aggregator.step().unwrap(), &[4.0, 6.0]);
        assert_eq!(aggregator.appended(), 1);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "4.0,6.0\n");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_step_fails_after_release() {
        let window =
            Arc::new(SharedWindow::in_memory(WindowOptions::new(2, 2, 2).unwrap()).unwrap());
        let mut aggregator = Aggregator::new(window.clone(), CsvLog::new("unused.csv"));
        window.release();
        assert!(matches!(
            aggregator.step(),
            Err(AggregateError::Window(crate::error::WindowError::Released))
        ));
    }
}
