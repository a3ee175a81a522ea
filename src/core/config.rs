/*!
 * Bridge Configuration
 *
 * Runtime configuration read from the environment
 */

use super::limits::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_MANAGER_BIND, DEFAULT_MAX_FRAME_LEN, MAX_POOL_WORKERS,
};
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;

/// Bridge configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Pool size for wrapper types that do not declare one
    pub default_pool_workers: usize,
    /// Largest frame accepted on a connection or manager channel
    pub max_frame_len: usize,
    /// Timeout for opening a manager channel
    pub connect_timeout: Duration,
    /// Address a started manager binds to
    pub manager_bind: SocketAddr,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            default_pool_workers: num_cpus::get().clamp(1, MAX_POOL_WORKERS),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            manager_bind: default_bind(),
        }
    }
}

impl BridgeConfig {
    /// Build configuration from environment variables
    ///
    /// Environment variables:
    /// - AIOBRIDGE_POOL_WORKERS: default offload pool size (default: CPU count)
    /// - AIOBRIDGE_MAX_FRAME: maximum frame length in bytes
    /// - AIOBRIDGE_CONNECT_TIMEOUT_MS: manager connect timeout
    /// - AIOBRIDGE_MANAGER_BIND: manager bind address (default: 127.0.0.1:0)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(workers) = env_parse::<usize>("AIOBRIDGE_POOL_WORKERS") {
            config.default_pool_workers = workers.clamp(1, MAX_POOL_WORKERS);
        }
        if let Some(len) = env_parse::<usize>("AIOBRIDGE_MAX_FRAME") {
            config.max_frame_len = len.max(1);
        }
        if let Some(ms) = env_parse::<u64>("AIOBRIDGE_CONNECT_TIMEOUT_MS") {
            config.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(addr) = env_parse::<SocketAddr>("AIOBRIDGE_MANAGER_BIND") {
            config.manager_bind = addr;
        }

        config
    }

    /// Process-wide configuration, read from the environment once
    pub fn global() -> &'static BridgeConfig {
        static CONFIG: OnceLock<BridgeConfig> = OnceLock::new();
        CONFIG.get_or_init(Self::from_env)
    }

    pub fn with_pool_workers(mut self, workers: usize) -> Self {
        self.default_pool_workers = workers.clamp(1, MAX_POOL_WORKERS);
        self
    }
}

fn default_bind() -> SocketAddr {
    DEFAULT_MANAGER_BIND
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 0)))
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparsable configuration value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert!(config.default_pool_workers >= 1);
        assert_eq!(config.max_frame_len, DEFAULT_MAX_FRAME_LEN);
        assert!(config.manager_bind.ip().is_loopback());
    }

    #[test]
    fn test_pool_workers_are_clamped() {
        let config = BridgeConfig::default().with_pool_workers(0);
        assert_eq!(config.default_pool_workers, 1);

        let config = BridgeConfig::default().with_pool_workers(100_000);
        assert_eq!(config.default_pool_workers, MAX_POOL_WORKERS);
    }
}
