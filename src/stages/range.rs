use crate::stage::ChannelStage;
use spdlog::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelRange {
    pub min: f64,
    pub max: f64,
}

impl ChannelRange {
    /// Min and max of the non-NaN samples, `None` when there are none.
    pub fn of(series: &[f64]) -> Option<Self> {
        series
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .fold(None, |acc, v| match acc {
                None => Some(Self { min: v, max: v }),
                Some(r) => Some(Self {
                    min: r.min.min(v),
                    max: r.max.max(v),
                }),
            })
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}

/// Tracks the min/max of every channel in the latest window.
#[derive(Debug, Default)]
pub struct Range {
    last: Vec<Option<ChannelRange>>,
}

impl Range {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> &[Option<ChannelRange>] {
        &self.last
    }
}

impl ChannelStage for Range {
    fn process(&mut self, channels: &[Vec<f64>]) {
        self.last.clear();
        self.last
            .extend(channels.iter().map(|series| ChannelRange::of(series)));
        for (channel, range) in self.last.iter().enumerate() {
            if let Some(range) = range {
                debug!(
                    "[Stage:range] channel {} min={} max={} span={}",
                    channel,
                    range.min,
                    range.max,
                    range.span()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_per_channel() {
        let mut stage = Range::new();
        stage.process(&[vec![3.0, -1.0, 2.0], vec![f64::NAN, 5.0, 4.0]]);
        assert_eq!(
            stage.last(),
            &[
                Some(ChannelRange { min: -1.0, max: 3.0 }),
                Some(ChannelRange { min: 4.0, max: 5.0 }),
            ]
        );
    }

    #[test]
    fn test_range_of_all_nan_is_none() {
        assert_eq!(ChannelRange::of(&[f64::NAN, f64::NAN]), None);
        assert_eq!(ChannelRange::of(&[]), None);
    }
}
