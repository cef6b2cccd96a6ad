use crate::error::AggregateError;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Append-only CSV table of derived statistics, one headerless row per append.
///
/// Clones share one write lock that is independent of the window locks. The file
/// is opened, written and closed within each append, never held across cycles.
#[derive(Debug, Clone)]
pub struct CsvLog {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl CsvLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append_row(&self, values: &[f64]) -> Result<(), AggregateError> {
        let _guard = self.lock.lock().map_err(|_| AggregateError::LogPoisoned)?;
        self.write_row(values).map_err(|source| AggregateError::Log {
            path: self.path.display().to_string(),
            source,
        })
    }

    fn write_row(&self, values: &[f64]) -> Result<(), csv::Error> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        // Debug keeps the decimal point on whole numbers ("4.0", not "4").
        writer.write_record(values.iter().map(|v| format!("{:?}", v)))?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_log(name: &str) -> CsvLog {
        let path = std::env::temp_dir().join(format!("{}_{}.csv", name, std::process::id()));
        let _ = std::fs::remove_file(&path);
        CsvLog::new(path)
    }

    #[test]
    fn test_append_rows() {
        let log = temp_log("test_csv_log_append");
        log.append_row(&[4.0, 6.0]).unwrap();
        log.append_row(&[1.5, -0.25]).unwrap();

        let content = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(content, "4.0,6.0\n1.5,-0.25\n");

        let _ = std::fs::remove_file(log.path());
    }

    #[test]
    fn test_clones_share_file() {
        let log = temp_log("test_csv_log_clones");
        let other = log.clone();
        log.append_row(&[1.0]).unwrap();
        other.append_row(&[2.0]).unwrap();

        let content = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(content.lines().count(), 2);

        let _ = std::fs::remove_file(log.path());
    }

    #[test]
    fn test_unwritable_path_is_reported() {
        let log = CsvLog::new(std::env::temp_dir().join("no_such_dir_roda").join("x.csv"));
        assert!(matches!(
            log.append_row(&[1.0]),
            Err(AggregateError::Log { .. })
        ));
    }
}
