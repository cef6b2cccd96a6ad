use crate::stage::ChannelStage;
use spdlog::info;
use std::time::Instant;

/// A stage that logs how many splitter cycles it has seen and at what rate.
pub struct Progress {
    name: String,
    interval: usize,
    count: usize,
    last_instant: Instant,
    start_instant: Instant,
}

impl Progress {
    pub fn new(name: impl Into<String>, interval: usize) -> Self {
        assert!(interval > 0, "interval must be greater than 0");
        let now = Instant::now();
        Self {
            name: name.into(),
            interval,
            count: 0,
            last_instant: now,
            start_instant: now,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

impl ChannelStage for Progress {
    fn process(&mut self, channels: &[Vec<f64>]) {
        self.count += 1;
        if self.count.is_multiple_of(self.interval) {
            let now = Instant::now();
            let elapsed = now.duration_since(self.last_instant);
            let total_elapsed = now.duration_since(self.start_instant);

            let rate = self.interval as f64 / elapsed.as_secs_f64();
            let total_rate = self.count as f64 / total_elapsed.as_secs_f64();
            let samples = channels.first().map_or(0, Vec::len);

            info!(
                "[{}] Processed {} windows of {} samples x {} channels, Rate: {} win/s, Avg: {} win/s",
                self.name,
                format_count(self.count as f64),
                samples,
                channels.len(),
                format_count(rate),
                format_count(total_rate)
            );
            self.last_instant = now;
        }
    }
}

pub fn progress(name: impl Into<String>, interval: usize) -> Progress {
    Progress::new(name, interval)
}

fn format_count(val: f64) -> String {
    if val < 1000.0 {
        if val == val.floor() {
            format!("{:.0}", val)
        } else {
            format!("{:.2}", val)
        }
    } else if val < 1_000_000.0 {
        format!("{:.2}k", val / 1000.0)
    } else if val < 1_000_000_000.0 {
        format!("{:.2}m", val / 1_000_000.0)
    } else {
        format!("{:.2}b", val / 1_000_000_000.0)
    }
}
