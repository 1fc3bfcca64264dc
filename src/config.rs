use std::time::Duration;

/// Immutable, process-global-free configuration for an [`crate::Engine`].
///
/// The original source gates the whole interpolation subsystem behind a single
/// process-wide `bool`. We lift that into a value passed at construction time instead,
/// per the design note against process-globals.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Master switch for the whole subsystem. When `false`, callers are expected to bypass
    /// `ITree` entirely rather than pay for bookkeeping that nothing will read.
    pub interpolation_enabled: bool,
    /// Whether the [`crate::search_tree::SearchTree`] observer is maintained. Disabling this
    /// must not change any subsumption outcome (invariant 5), only diagnostic output.
    pub observer_enabled: bool,
    /// Default per-query timeout handed to the solver gateway on every `subsumed` call.
    pub default_solver_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interpolation_enabled: true,
            observer_enabled: true,
            default_solver_timeout: Duration::from_secs(10),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interpolation_enabled(mut self, enabled: bool) -> Self {
        self.interpolation_enabled = enabled;
        self
    }

    pub fn with_observer_enabled(mut self, enabled: bool) -> Self {
        self.observer_enabled = enabled;
        self
    }

    pub fn with_default_solver_timeout(mut self, timeout: Duration) -> Self {
        self.default_solver_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_enables_everything() {
        let config = EngineConfig::default();
        assert!(config.interpolation_enabled);
        assert!(config.observer_enabled);
    }

    #[test]
    fn builder_methods_compose() {
        let config = EngineConfig::new()
            .with_interpolation_enabled(false)
            .with_observer_enabled(false)
            .with_default_solver_timeout(Duration::from_millis(50));
        assert!(!config.interpolation_enabled);
        assert!(!config.observer_enabled);
        assert_eq!(config.default_solver_timeout, Duration::from_millis(50));
    }
}
