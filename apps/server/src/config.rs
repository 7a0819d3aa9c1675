//! Server configuration from environment variables.

use anyhow::Context;
use chrono::FixedOffset;

use crate::scheduling::AvailabilityPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// Offset of the salon's local time from UTC. Every "today" and "now"
    /// the scheduling rules see is in this offset.
    pub utc_offset: FixedOffset,
    /// Behaviour when bookings cannot be re-read right before a write.
    pub booking_check_policy: AvailabilityPolicy,
    /// Allowed browser origin. Any origin when unset.
    pub cors_origin: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let port = match var("PORT") {
            Some(p) => p.parse().with_context(|| format!("PORT must be a number, got {p:?}"))?,
            None => 3000,
        };

        let offset_hours: i32 = match var("SALON_UTC_OFFSET_HOURS") {
            Some(h) => h
                .parse()
                .with_context(|| format!("SALON_UTC_OFFSET_HOURS must be whole hours, got {h:?}"))?,
            None => 0,
        };
        let utc_offset = FixedOffset::east_opt(offset_hours * 3600)
            .with_context(|| format!("SALON_UTC_OFFSET_HOURS out of range: {offset_hours}"))?;

        let booking_check_policy = match var("BOOKING_CHECK_POLICY") {
            Some(p) => p.parse().map_err(anyhow::Error::msg)?,
            None => AvailabilityPolicy::default(),
        };

        Ok(Self {
            database_url: var("DATABASE_URL").unwrap_or_else(|| "sqlite:salon.db?mode=rwc".into()),
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            utc_offset,
            booking_check_policy,
            cors_origin: var("CORS_ORIGIN").filter(|s| !s.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.database_url, "sqlite:salon.db?mode=rwc");
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.utc_offset.local_minus_utc(), 0);
        assert_eq!(config.booking_check_policy, AvailabilityPolicy::FailOpen);
        assert!(config.cors_origin.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "8080"),
            ("SALON_UTC_OFFSET_HOURS", "3"),
            ("BOOKING_CHECK_POLICY", "fail-closed"),
            ("CORS_ORIGIN", "https://salon.example"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.utc_offset.local_minus_utc(), 3 * 3600);
        assert_eq!(config.booking_check_policy, AvailabilityPolicy::FailClosed);
        assert_eq!(config.cors_origin.as_deref(), Some("https://salon.example"));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(config_from(&[("PORT", "http")]).is_err());
        assert!(config_from(&[("SALON_UTC_OFFSET_HOURS", "30")]).is_err());
        assert!(config_from(&[("BOOKING_CHECK_POLICY", "maybe")]).is_err());
    }

    #[test]
    fn test_empty_cors_origin_means_any() {
        let config = config_from(&[("CORS_ORIGIN", "")]).unwrap();
        assert!(config.cors_origin.is_none());
    }
}
