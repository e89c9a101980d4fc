//! Explicit client configuration and base-URL resolution.
//!
//! The SDK never reads process environment variables on its own; the
//! [`ClientConfig::from_env`] adapter is the single place that does, so tests
//! and embedders can always inject configuration directly.

use tracing::debug;

use crate::discovery;

/// Environment variable that overrides discovery with a fixed base URL.
pub const BASE_URL_ENV: &str = "OSAURUS_BASE_URL";
/// Environment variable holding the bearer token attached to every request.
pub const API_KEY_ENV: &str = "OSAURUS_API_KEY";
/// Development fallback used by the lenient constructor when nothing else
/// resolves.
pub const DEFAULT_BASE_URL: &str = "http://localhost:1337";

#[derive(Clone, Debug, Default)]
pub struct ClientConfig {
    /// Explicit server endpoint; set, it bypasses discovery entirely.
    pub base_url: Option<String>,
    /// Bearer token for the `Authorization` header.
    pub api_key: Option<String>,
}

impl ClientConfig {
    /// Reads `OSAURUS_BASE_URL` and `OSAURUS_API_KEY` once. Empty values are
    /// treated as unset.
    pub fn from_env() -> Self {
        Self {
            base_url: non_empty(std::env::var(BASE_URL_ENV).ok()),
            api_key: non_empty(std::env::var(API_KEY_ENV).ok()),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// One named way of producing a base URL. Strategies are evaluated in order
/// and the first hit wins, which keeps resolution precedence a data structure
/// instead of branching logic.
pub(crate) struct Strategy {
    pub name: &'static str,
    pub resolve: fn(&ClientConfig) -> Option<String>,
}

fn configured(config: &ClientConfig) -> Option<String> {
    config.base_url.clone()
}

fn discovered(_config: &ClientConfig) -> Option<String> {
    discovery::discover_latest_running_instance()
        .ok()
        .map(|instance| instance.url)
}

fn local_default(_config: &ClientConfig) -> Option<String> {
    Some(DEFAULT_BASE_URL.to_string())
}

/// Fails when neither an explicit URL nor a running instance is available.
pub(crate) const STRICT_STRATEGIES: &[Strategy] = &[
    Strategy {
        name: "configured",
        resolve: configured,
    },
    Strategy {
        name: "discovery",
        resolve: discovered,
    },
];

/// Same precedence, but lands on localhost when nothing is found.
pub(crate) const LENIENT_STRATEGIES: &[Strategy] = &[
    Strategy {
        name: "configured",
        resolve: configured,
    },
    Strategy {
        name: "discovery",
        resolve: discovered,
    },
    Strategy {
        name: "local-default",
        resolve: local_default,
    },
];

pub(crate) fn resolve_base_url(config: &ClientConfig, strategies: &[Strategy]) -> Option<String> {
    for strategy in strategies {
        if let Some(url) = (strategy.resolve)(config) {
            debug!(strategy = strategy.name, url = %url, "resolved base URL");
            return Some(url);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn none_strategy(_config: &ClientConfig) -> Option<String> {
        None
    }

    fn fallback_strategy(_config: &ClientConfig) -> Option<String> {
        Some("http://fallback.test".to_string())
    }

    #[test]
    fn non_empty_treats_blank_values_as_unset() {
        assert_eq!(non_empty(None), None);
        assert_eq!(non_empty(Some(String::new())), None);
        assert_eq!(non_empty(Some("   ".to_string())), None);
        assert_eq!(
            non_empty(Some(" http://localhost:9000 ".to_string())),
            Some("http://localhost:9000".to_string())
        );
    }

    #[test]
    fn configured_url_wins_over_later_strategies() {
        let config = ClientConfig::default().with_base_url("http://explicit.test");
        let strategies = [
            Strategy {
                name: "configured",
                resolve: configured,
            },
            Strategy {
                name: "fallback",
                resolve: fallback_strategy,
            },
        ];
        assert_eq!(
            resolve_base_url(&config, &strategies).as_deref(),
            Some("http://explicit.test")
        );
    }

    #[test]
    fn resolution_falls_through_to_the_first_hit() {
        let config = ClientConfig::default();
        let strategies = [
            Strategy {
                name: "first",
                resolve: none_strategy,
            },
            Strategy {
                name: "second",
                resolve: fallback_strategy,
            },
        ];
        assert_eq!(
            resolve_base_url(&config, &strategies).as_deref(),
            Some("http://fallback.test")
        );
    }

    #[test]
    fn resolution_yields_none_when_every_strategy_misses() {
        let config = ClientConfig::default();
        let strategies = [Strategy {
            name: "first",
            resolve: none_strategy,
        }];
        assert_eq!(resolve_base_url(&config, &strategies), None);
    }

    #[test]
    fn lenient_strategies_end_on_the_local_default() {
        let last = LENIENT_STRATEGIES.last().expect("strategy list is fixed");
        assert_eq!(last.name, "local-default");
        assert_eq!(
            (last.resolve)(&ClientConfig::default()).as_deref(),
            Some(DEFAULT_BASE_URL)
        );
    }

    #[test]
    fn builder_style_setters_compose() {
        let config = ClientConfig::default()
            .with_base_url("http://localhost:4242")
            .with_api_key("secret");
        assert_eq!(config.base_url.as_deref(), Some("http://localhost:4242"));
        assert_eq!(config.api_key.as_deref(), Some("secret"));
    }
}
