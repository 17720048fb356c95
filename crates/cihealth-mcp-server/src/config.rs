use std::env;
use std::time::Duration;

/// Limits and cache policy for the MCP tools.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// How long a fetched results feed is reused.
    pub results_ttl: Duration,
    /// Cap on runs fetched for time-window tools.
    pub max_history: usize,
    /// Cap on runs fetched for trend analysis.
    pub max_trend_history: usize,
    /// Cap on `limit` for `get_job_failures`.
    pub max_job_runs: usize,
    /// Matches returned by `search_failure_patterns`.
    pub max_search_matches: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            results_ttl: Duration::from_secs(300),
            max_history: 1000,
            max_trend_history: 500,
            max_job_runs: 100,
            max_search_matches: 200,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `CIHEALTH_MCP_CACHE_TTL` (seconds) and
    /// `CIHEALTH_MCP_MAX_HISTORY`. Unparsable values are ignored.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(secs) = env::var("CIHEALTH_MCP_CACHE_TTL")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            cfg.results_ttl = Duration::from_secs(secs);
        }

        if let Some(max) = env::var("CIHEALTH_MCP_MAX_HISTORY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|v| *v > 0)
        {
            cfg.max_history = max;
            cfg.max_trend_history = cfg.max_trend_history.min(max);
        }

        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        env::set_var("CIHEALTH_MCP_CACHE_TTL", "5");
        env::set_var("CIHEALTH_MCP_MAX_HISTORY", "50");
        let cfg = ServerConfig::from_env();
        env::remove_var("CIHEALTH_MCP_CACHE_TTL");
        env::remove_var("CIHEALTH_MCP_MAX_HISTORY");

        assert_eq!(cfg.results_ttl, Duration::from_secs(5));
        assert_eq!(cfg.max_history, 50);
        assert_eq!(cfg.max_trend_history, 50);
    }

    #[test]
    #[serial]
    fn test_from_env_ignores_garbage() {
        env::set_var("CIHEALTH_MCP_CACHE_TTL", "soon");
        env::set_var("CIHEALTH_MCP_MAX_HISTORY", "0");
        let cfg = ServerConfig::from_env();
        env::remove_var("CIHEALTH_MCP_CACHE_TTL");
        env::remove_var("CIHEALTH_MCP_MAX_HISTORY");

        let default = ServerConfig::default();
        assert_eq!(cfg.results_ttl, default.results_ttl);
        assert_eq!(cfg.max_history, default.max_history);
    }
}
