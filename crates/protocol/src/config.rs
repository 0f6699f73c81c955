use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Engine configuration, resolved once per engine by the caller.
///
/// There is no ambient lookup: hosts merge their own overlays over the
/// defaults via [`EngineConfig::resolve`] and hand the result to the
/// engine constructor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Quiet period before a burst of change events becomes one
    /// evaluation.
    pub debounce_delay: Duration,

    /// Budget for one remote evaluation call.
    pub request_timeout: Duration,

    /// Cache item budget.
    pub cache_max_items: usize,

    /// Cache byte budget (estimated sizes).
    pub cache_max_bytes: usize,

    /// How many times the retry affordance re-arms for the same
    /// failing form data before it is withheld.
    pub max_retries: u32,

    /// Emit debug-level diagnostics from the evaluation cycle.
    pub enable_debug_logging: bool,

    /// Record per-attempt duration samples.
    pub enable_performance_monitoring: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_delay: Duration::from_millis(100),
            request_timeout: Duration::from_secs(30),
            cache_max_items: 100,
            cache_max_bytes: 1024 * 1024,
            max_retries: 3,
            enable_debug_logging: false,
            enable_performance_monitoring: true,
        }
    }
}

impl EngineConfig {
    /// Merge layered overlays over the defaults. The host-injected
    /// overlay wins over the persisted one, which wins over defaults.
    pub fn resolve(host: Option<ConfigOverlay>, persisted: Option<ConfigOverlay>) -> Self {
        let mut config = Self::default();
        if let Some(overlay) = persisted {
            overlay.apply(&mut config);
        }
        if let Some(overlay) = host {
            overlay.apply(&mut config);
        }
        config
    }
}

/// Partial configuration as hosts supply it (all fields optional,
/// durations in milliseconds to match host-side conventions).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigOverlay {
    pub debounce_delay_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
    pub cache_max_items: Option<usize>,
    pub cache_max_bytes: Option<usize>,
    pub max_retries: Option<u32>,
    pub enable_debug_logging: Option<bool>,
    pub enable_performance_monitoring: Option<bool>,
}

impl ConfigOverlay {
    fn apply(&self, config: &mut EngineConfig) {
        if let Some(ms) = self.debounce_delay_ms {
            config.debounce_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = self.request_timeout_ms {
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(items) = self.cache_max_items {
            config.cache_max_items = items;
        }
        if let Some(bytes) = self.cache_max_bytes {
            config.cache_max_bytes = bytes;
        }
        if let Some(retries) = self.max_retries {
            config.max_retries = retries;
        }
        if let Some(flag) = self.enable_debug_logging {
            config.enable_debug_logging = flag;
        }
        if let Some(flag) = self.enable_performance_monitoring {
            config.enable_performance_monitoring = flag;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.debounce_delay, Duration::from_millis(100));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.cache_max_items, 100);
    }

    #[test]
    fn test_host_overlay_wins_over_persisted() {
        let host = ConfigOverlay {
            debounce_delay_ms: Some(250),
            ..Default::default()
        };
        let persisted = ConfigOverlay {
            debounce_delay_ms: Some(50),
            max_retries: Some(5),
            ..Default::default()
        };
        let config = EngineConfig::resolve(Some(host), Some(persisted));
        assert_eq!(config.debounce_delay, Duration::from_millis(250));
        assert_eq!(config.max_retries, 5);
    }

    #[test]
    fn test_overlay_from_json() {
        let overlay: ConfigOverlay =
            serde_json::from_str(r#"{"requestTimeoutMs": 5000, "enableDebugLogging": true}"#)
                .unwrap();
        let config = EngineConfig::resolve(Some(overlay), None);
        assert_eq!(config.request_timeout, Duration::from_millis(5000));
        assert!(config.enable_debug_logging);
    }
}
