//! Explicit strategy lookup, built once at composition time.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{AroonTrend, MaCross, RsiTrend, SignalGenerator};

#[derive(Clone, Default)]
pub struct StrategyRegistry {
    generators: BTreeMap<String, Arc<dyn SignalGenerator>>,
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("strategies", &self.names())
            .finish()
    }
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in strategy.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(RsiTrend));
        registry.register(Arc::new(MaCross));
        registry.register(Arc::new(AroonTrend));
        registry
    }

    /// Add or replace a generator under its own name.
    pub fn register(&mut self, generator: Arc<dyn SignalGenerator>) {
        self.generators.insert(generator.name().to_string(), generator);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SignalGenerator>> {
        self.generators.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.generators.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.generators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }
}
