//! Configuration loading from environment.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use rust_decimal::Decimal;

use settlement_types::SplitRatios;

/// Application configuration.
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub gateway_base_url: String,
    pub gateway_api_key: String,
    pub gateway_timeout: Duration,
    pub ratios: SplitRatios,
    pub dispatch_poll_interval: Duration,
    /// Heartbeat age after which an operator resume may take a batch over
    pub resume_stale_after: Duration,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow::anyhow!("{key} environment variable is required"))
        };

        let port = parse_or(&lookup, "PORT", 3000u16)?;
        let database_url = required("DATABASE_URL")?;
        let gateway_base_url = required("GATEWAY_BASE_URL")?;
        let gateway_api_key = required("GATEWAY_API_KEY")?;
        let gateway_timeout = Duration::from_secs(parse_or(&lookup, "GATEWAY_TIMEOUT_SECS", 30u64)?);

        let merchant: Decimal = parse_or(&lookup, "MERCHANT_RATIO", Decimal::new(95, 2))?;
        let dividend: Decimal = parse_or(&lookup, "DIVIDEND_RATIO", Decimal::new(5, 2))?;
        let ratios = SplitRatios::new(merchant, dividend)?;

        let dispatch_poll_interval =
            Duration::from_millis(parse_or(&lookup, "DISPATCH_POLL_INTERVAL_MS", 2000u64)?);

        // A live run heartbeats between gateway calls, each bounded by the timeout.
        let resume_stale_after =
            Duration::from_secs(parse_or(&lookup, "RESUME_STALE_AFTER_SECS", 300u64)?);
        if resume_stale_after <= gateway_timeout {
            anyhow::bail!(
                "RESUME_STALE_AFTER_SECS must exceed GATEWAY_TIMEOUT_SECS ({}s)",
                gateway_timeout.as_secs()
            );
        }

        Ok(Self {
            port,
            database_url,
            gateway_base_url,
            gateway_api_key,
            gateway_timeout,
            ratios,
            dispatch_poll_interval,
            resume_stale_after,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("DATABASE_URL", "sqlite::memory:"),
        ("GATEWAY_BASE_URL", "https://api.example.test/v2"),
        ("GATEWAY_API_KEY", "secret"),
    ];

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&REQUIRED)).unwrap();

        assert_eq!(config.port, 3000);
        assert_eq!(config.gateway_timeout, Duration::from_secs(30));
        assert_eq!(config.dispatch_poll_interval, Duration::from_millis(2000));
        assert_eq!(config.ratios, SplitRatios::default());
        assert_eq!(config.resume_stale_after, Duration::from_secs(300));
    }

    #[test]
    fn test_overrides() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("PORT", "8080"),
            ("GATEWAY_TIMEOUT_SECS", "5"),
            ("MERCHANT_RATIO", "0.9"),
            ("DIVIDEND_RATIO", "0.1"),
            ("DISPATCH_POLL_INTERVAL_MS", "250"),
        ]);

        let config = Config::from_lookup(lookup(&vars)).unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.gateway_timeout, Duration::from_secs(5));
        assert_eq!(config.ratios.merchant(), Decimal::new(9, 1));
        assert_eq!(config.dispatch_poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_missing_gateway_key() {
        let vars = &REQUIRED[..2];

        let err = Config::from_lookup(lookup(vars)).err().unwrap();

        assert!(err.to_string().contains("GATEWAY_API_KEY"));
    }

    #[test]
    fn test_ratios_must_sum_to_one() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([("MERCHANT_RATIO", "0.9"), ("DIVIDEND_RATIO", "0.05")]);

        assert!(Config::from_lookup(lookup(&vars)).is_err());
    }

    #[test]
    fn test_resume_window_must_outlast_gateway_timeout() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([("GATEWAY_TIMEOUT_SECS", "60"), ("RESUME_STALE_AFTER_SECS", "30")]);

        let err = Config::from_lookup(lookup(&vars)).err().unwrap();

        assert!(err.to_string().contains("RESUME_STALE_AFTER_SECS"));
    }

    #[test]
    fn test_invalid_port() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("PORT", "eighty"));

        let err = Config::from_lookup(lookup(&vars)).err().unwrap();

        assert!(err.to_string().contains("PORT"));
    }
}
