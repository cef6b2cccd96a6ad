use crate::error::ConfigError;
use crate::stages::{Progress, Range, Rms};
use fxhash::FxHashMap;

/// A downstream consumer of the splitter's per-channel series.
///
/// `channels[c]` holds column `c` of the window, oldest sample first.
pub trait ChannelStage: Send {
    fn process(&mut self, channels: &[Vec<f64>]);
}

impl<F> ChannelStage for F
where
    F: FnMut(&[Vec<f64>]) + Send,
{
    #[inline(always)]
    fn process(&mut self, channels: &[Vec<f64>]) {
        (self)(channels);
    }
}

pub type StageFactory = fn() -> Box<dyn ChannelStage>;

/// Maps stable keys to analysis stages, resolved once at configuration time.
#[derive(Default)]
pub struct StageRegistry {
    factories: FxHashMap<&'static str, StageFactory>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the `progress`, `range` and `rms` stages.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("progress", || Box::new(Progress::new("splitter", 10)));
        registry.register("range", || Box::new(Range::new()));
        registry.register("rms", || Box::new(Rms::new()));
        registry
    }

    /// Registers a factory, replacing any previous one under the same key.
    pub fn register(&mut self, key: &'static str, factory: StageFactory) {
        self.factories.insert(key, factory);
    }

    pub fn build(&self, key: &str) -> Result<Box<dyn ChannelStage>, ConfigError> {
        self.factories
            .get(key)
            .map(|factory| factory())
            .ok_or_else(|| ConfigError::UnknownStage(key.to_string()))
    }

    pub fn build_all<S: AsRef<str>>(
        &self,
        keys: &[S],
    ) -> Result<Vec<Box<dyn ChannelStage>>, ConfigError> {
        keys.iter().map(|key| self.build(key.as_ref())).collect()
    }

    pub fn keys(&self) -> Vec<&'static str> {
        let mut keys: Vec<_> = self.factories.keys().copied().collect();
        keys.sort_unstable();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_builtin_keys() {
        let registry = StageRegistry::with_builtins();
        assert_eq!(registry.keys(), vec!["progress", "range", "rms"]);
        assert!(registry.build_all(&["range", "rms"]).is_ok());
    }

    #[test]
    fn test_unknown_stage_is_rejected() {
        let registry = StageRegistry::with_builtins();
        assert!(matches!(
            registry.build("fft"),
            Err(ConfigError::UnknownStage(key)) if key == "fft"
        ));
    }

    #[test]
    fn test_closure_is_a_stage() {
        let seen = Arc::new(Mutex::new(vec![]));
        let sink = seen.clone();
        let mut stage = move |channels: &[Vec<f64>]| {
            sink.lock().unwrap().push(channels.len());
        };
        ChannelStage::process(&mut stage, &[vec![1.0], vec![2.0]]);
        assert_eq!(*seen.lock().unwrap(), vec![2]);
    }
}
