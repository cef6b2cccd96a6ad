use crate::error::WindowError;
use crate::snapshot::Snapshot;
use crate::stage::ChannelStage;
use crate::window::SharedWindow;
use std::sync::Arc;

/// Periodically separates the window into one series per column.
///
/// Scratch buffers are allocated once and zeroed at the start of every cycle.
pub struct Splitter {
    window: Arc<SharedWindow>,
    scratch: Snapshot,
    channels: Vec<Vec<f64>>,
    stages: Vec<Box<dyn ChannelStage>>,
    cycles: u64,
}

impl Splitter {
    pub fn new(window: Arc<SharedWindow>) -> Self {
        let options = window.options();
        Self {
            scratch: Snapshot::zeroed(options.capacity, options.columns),
            channels: vec![vec![0.0; options.capacity]; options.columns],
            stages: vec![],
            cycles: 0,
            window,
        }
    }

    pub fn with_stages(mut self, stages: Vec<Box<dyn ChannelStage>>) -> Self {
        self.stages.extend(stages);
        self
    }

    pub fn add_stage(&mut self, stage: impl ChannelStage + 'static) {
        self.stages.push(Box::new(stage));
    }

    /// Snapshots the window, extracts every column and hands them to the stages.
    pub fn split(&mut self) -> Result<&[Vec<f64>], WindowError> {
        self.scratch.as_mut_slice().fill(0.0);
        for channel in &mut self.channels {
            channel.fill(0.0);
        }

        self.window.snapshot_into(&mut self.scratch)?;
        for (column, channel) in self.channels.iter_mut().enumerate() {
            self.scratch.column_into(column, channel);
        }

        for stage in &mut self.stages {
            stage.process(&self.channels);
        }
        self.cycles += 1;
        Ok(&self.channels)
    }

    pub fn channels(&self) -> &[Vec<f64>] {
        &self.channels
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WindowOptions;
    use crate::record::Batch;
    use std::sync::Mutex;

    #[test]
    fn test_split_columns_in_row_order() {
        let window =
            Arc::new(SharedWindow::in_memory(WindowOptions::new(3, 3, 2).unwrap()).unwrap());
        window
            .commit(&Batch::from_cells(2, vec![1.0, 10.0, 2.0, 20.0, 3.0, 30.0]))
            .unwrap();

        let mut splitter = Splitter::new(window);
        let channels = splitter.split().unwrap();
        assert_eq!(channels, &[vec![1.0, 2.0, 3.0], vec![10.0, 20.0, 30.0]]);
        assert_eq!(splitter.cycles(), 1);
    }

    #[test]
    fn test_stages_receive_every_cycle() {
        let window =
            Arc::new(SharedWindow::in_memory(WindowOptions::new(2, 1, 2).unwrap()).unwrap());
        let seen = Arc::new(Mutex::new(vec![]));
        let sink = seen.clone();

        let mut splitter = Splitter::new(window.clone());
        splitter.add_stage(move |channels: &[Vec<f64>]| {
            sink.lock().unwrap().push(channels[0].clone());
        });

        splitter.split().unwrap();
        window.commit(&Batch::from_cells(2, vec![7.0, 8.0])).unwrap();
        splitter.split().unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![vec![0.0, 0.0], vec![0.0, 7.0]]
        );
    }

    #[test]
    fn test_split_fails_after_release() {
        let window =
            Arc::new(SharedWindow::in_memory(WindowOptions::new(2, 1, 2).unwrap()).unwrap());
        let mut splitter = Splitter::new(window.clone());
        window.release();
        assert!(matches!(splitter.split(), Err(WindowError::Released)));
    }
}
