//! Environment-driven settings, read once at startup. Nothing here is a
//! process-wide global: `Settings` is built explicitly and handed to the
//! components that need it.

use std::env;
use std::time::Duration;

use crate::battle::Tuning;
use crate::store::StoreConfig;

#[derive(Debug, Clone)]
pub struct Settings {
    /// `ARENA_BIND`
    pub bind_addr: String,
    /// `ARENA_WORKERS`; 0 uses the Rayon default (all cores).
    pub workers: usize,
    /// `ARENA_SESSION_POOL_SIZE`
    pub session_pool_size: usize,
    /// `ARENA_POOL_TIMEOUT_SECS`
    pub pool_checkout_timeout: Duration,
    /// `ARENA_HISTORY_STALENESS_SECS`; how far history reads trail commits.
    pub history_staleness: Duration,
    /// `ARENA_REQUEST_TIMEOUT_SECS`; per-request deadline.
    pub request_timeout: Duration,
    /// `ARENA_WIN_PROBABILITY` / `ARENA_LEVEL_UP_THRESHOLD`
    pub tuning: Tuning,
    /// `ARENA_SEED`; populate sample data at serve start (local runs).
    pub seed_on_start: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".to_string(),
            workers: 0,
            session_pool_size: 30,
            pool_checkout_timeout: Duration::from_secs(5),
            history_staleness: Duration::from_secs(15),
            request_timeout: Duration::from_secs(5),
            tuning: Tuning::default(),
            seed_on_start: false,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env::var("ARENA_BIND").unwrap_or(defaults.bind_addr),
            workers: parse_env("ARENA_WORKERS", defaults.workers),
            session_pool_size: parse_env("ARENA_SESSION_POOL_SIZE", defaults.session_pool_size),
            pool_checkout_timeout: Duration::from_secs(parse_env(
                "ARENA_POOL_TIMEOUT_SECS",
                defaults.pool_checkout_timeout.as_secs(),
            )),
            history_staleness: Duration::from_secs(parse_env(
                "ARENA_HISTORY_STALENESS_SECS",
                defaults.history_staleness.as_secs(),
            )),
            request_timeout: Duration::from_secs(parse_env(
                "ARENA_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )),
            tuning: Tuning {
                win_probability: parse_env(
                    "ARENA_WIN_PROBABILITY",
                    defaults.tuning.win_probability,
                ),
                level_up_threshold: parse_env(
                    "ARENA_LEVEL_UP_THRESHOLD",
                    defaults.tuning.level_up_threshold,
                ),
            },
            seed_on_start: env::var("ARENA_SEED").map(|v| v == "1" || v == "true").unwrap_or(false),
        }
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            session_pool_size: self.session_pool_size,
            checkout_timeout: self.pool_checkout_timeout,
            ..StoreConfig::default()
        }
    }
}

fn parse_env<T: std::str::FromStr + Copy>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            log::warn!("invalid {name} '{raw}', defaulting");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment_values() {
        let settings = Settings::default();
        assert_eq!(settings.session_pool_size, 30);
        assert_eq!(settings.history_staleness, Duration::from_secs(15));
        assert_eq!(settings.tuning.win_probability, 0.5);
    }
}
