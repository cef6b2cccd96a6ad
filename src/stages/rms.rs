use crate::stage::ChannelStage;
use spdlog::debug;

/// Root mean square of a series; 0 for an empty one.
pub fn rms(series: &[f64]) -> f64 {
    if series.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = series.iter().map(|v| v * v).sum();
    (sum_sq / series.len() as f64).sqrt()
}

/// Computes the RMS level of every channel in the latest window.
#[derive(Debug, Default)]
pub struct Rms {
    last: Vec<f64>,
}

impl Rms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> &[f64] {
        &self.last
    }
}

impl ChannelStage for Rms {
    fn process(&mut self, channels: &[Vec<f64>]) {
        self.last.clear();
        self.last.extend(channels.iter().map(|series| rms(series)));
        debug!("[Stage:rms] {:?}", self.last);
    }
}
