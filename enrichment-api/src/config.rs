use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::time;

use envconfig::Envconfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(default = "127.0.0.1:3310")]
    pub address: SocketAddr,

    #[envconfig(default = "false")]
    pub export_prometheus: bool,

    /// Base url of the user lookup service. Lookups are simulated when unset.
    pub enricher_url: Option<String>,

    #[envconfig(from = "ENRICHER_TIMEOUT_MS", default = "5000")]
    pub enricher_timeout: EnvMsDuration,

    #[envconfig(from = "SIMULATED_LATENCY_MS", default = "10")]
    pub simulated_latency: EnvMsDuration,

    #[envconfig(default = "50")]
    pub default_concurrency: usize,

    #[envconfig(default = "1024")]
    pub max_concurrency: usize,

    #[envconfig(nested = true)]
    pub tenant_limits: TenantLimitConfig,
}

#[derive(Envconfig, Clone)]
pub struct TenantLimitConfig {
    #[envconfig(default = "100")]
    pub tenant_limit: NonZeroU32,

    #[envconfig(from = "TENANT_WINDOW_MS", default = "60000")]
    pub tenant_window: EnvMsDuration,
}

#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_millisecond_durations() {
        let parsed: EnvMsDuration = "1500".parse().unwrap();
        assert_eq!(parsed.0, time::Duration::from_millis(1500));

        assert_eq!(
            "1.5s".parse::<EnvMsDuration>().unwrap_err(),
            ParseEnvMsDurationError
        );
        assert_eq!(
            "-1".parse::<EnvMsDuration>().unwrap_err(),
            ParseEnvMsDurationError
        );
    }
}
