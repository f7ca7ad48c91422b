use std::env;
use std::time::Duration;

use hostpool_core::settings::{
    DEFAULT_CA1_FIREWALL, DEFAULT_CACHE_TTL, DEFAULT_ENVIRONMENT, DEFAULT_HYPERSTACK_URL,
    DEFAULT_LAUNCH_TIMEOUT, DEFAULT_MIGRATION_TIMEOUT, DEFAULT_PROPAGATION_WAIT, PlannerConfig,
    RegionPolicy, Settings, Timeouts,
};
use hostpool_core::{Error, Result};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_url: String,
    /// Pool opened first; every other pool is prefetched in the background.
    pub focus_pool: Option<String>,
    pub prefetch_interval: Duration,
    pub settings: Settings,
}

impl AppConfig {
    /// Read every `HOSTPOOL_*` / `HYPERSTACK_*` variable, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let seconds = |name: &str, default: Duration| -> Result<Duration> {
            match var(name) {
                None => Ok(default),
                Some(value) => value
                    .trim()
                    .parse()
                    .map(Duration::from_secs)
                    .map_err(|_| Error::InvalidEnv(format!("{name}={value}"))),
            }
        };
        let optional = |name: &str| var(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_url = var("HOSTPOOL_API_URL").unwrap_or_else(|| "http://127.0.0.1:5000".into());
        if api_url.trim().is_empty() {
            return Err(Error::MissingEnv("HOSTPOOL_API_URL".into()));
        }

        // Unset keeps the CA1 firewall, blank turns attachment off.
        let firewall_id = match var("HYPERSTACK_FIREWALL_CA1_ID") {
            None => Some(DEFAULT_CA1_FIREWALL.to_string()),
            Some(_) => optional("HYPERSTACK_FIREWALL_CA1_ID"),
        };

        let region = RegionPolicy {
            prefix: optional("HOSTPOOL_STORAGE_REGION_PREFIX").unwrap_or_else(|| "CA1-".into()),
            environment: None,
            storage_network: Some(
                optional("HOSTPOOL_STORAGE_NETWORK")
                    .unwrap_or_else(|| "RunPod-Storage-Canada-1".into()),
            ),
            firewall_id,
        };

        Ok(Self {
            api_url,
            focus_pool: optional("HOSTPOOL_FOCUS_POOL"),
            prefetch_interval: seconds("HOSTPOOL_PREFETCH_INTERVAL_SECS", Duration::from_secs(600))?,
            settings: Settings {
                cache_ttl: seconds("HOSTPOOL_CACHE_TTL_SECS", DEFAULT_CACHE_TTL)?,
                timeouts: Timeouts {
                    migration: seconds("HOSTPOOL_MIGRATION_TIMEOUT_SECS", DEFAULT_MIGRATION_TIMEOUT)?,
                    launch: seconds("HOSTPOOL_LAUNCH_TIMEOUT_SECS", DEFAULT_LAUNCH_TIMEOUT)?,
                },
                planner: PlannerConfig {
                    propagation_wait: seconds("HOSTPOOL_PROPAGATION_WAIT_SECS", DEFAULT_PROPAGATION_WAIT)?,
                    hyperstack_url: optional("HYPERSTACK_API_URL")
                        .unwrap_or_else(|| DEFAULT_HYPERSTACK_URL.into()),
                    environment: optional("HYPERSTACK_ENVIRONMENT")
                        .unwrap_or_else(|| DEFAULT_ENVIRONMENT.into()),
                    regions: vec![region],
                },
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config(&[]).unwrap();

        assert_eq!(cfg.api_url, "http://127.0.0.1:5000");
        assert_eq!(cfg.focus_pool, None);
        assert_eq!(cfg.settings.cache_ttl, Duration::from_secs(600));
        assert_eq!(cfg.settings.timeouts.migration, Duration::from_secs(45));
        assert_eq!(cfg.settings.timeouts.launch, Duration::from_secs(60));

        let region = &cfg.settings.planner.regions[0];
        assert_eq!(region.prefix, "CA1-");
        assert_eq!(region.storage_network.as_deref(), Some("RunPod-Storage-Canada-1"));
        assert_eq!(region.firewall_id.as_deref(), Some("971"));
        assert_eq!(cfg.settings.planner.environment, "CA1-RunPod");
    }

    #[test]
    fn blank_firewall_disables_attachment() {
        let cfg = config(&[
            ("HYPERSTACK_FIREWALL_CA1_ID", "  "),
            ("HYPERSTACK_ENVIRONMENT", "US1-RunPod"),
        ])
        .unwrap();

        assert_eq!(cfg.settings.planner.regions[0].firewall_id, None);
        assert_eq!(cfg.settings.planner.environment, "US1-RunPod");
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = config(&[
            ("HOSTPOOL_FOCUS_POOL", "H100"),
            ("HOSTPOOL_LAUNCH_TIMEOUT_SECS", " 90 "),
            ("HYPERSTACK_FIREWALL_CA1_ID", "971"),
            ("HOSTPOOL_PREFETCH_INTERVAL_SECS", "120"),
        ])
        .unwrap();

        assert_eq!(cfg.focus_pool.as_deref(), Some("H100"));
        assert_eq!(cfg.settings.timeouts.launch, Duration::from_secs(90));
        assert_eq!(cfg.prefetch_interval, Duration::from_secs(120));
        assert_eq!(cfg.settings.planner.regions[0].firewall_id.as_deref(), Some("971"));
    }

    #[test]
    fn bad_seconds_are_rejected() {
        let err = config(&[("HOSTPOOL_CACHE_TTL_SECS", "ten minutes")]).unwrap_err();
        assert!(matches!(err, Error::InvalidEnv(v) if v == "HOSTPOOL_CACHE_TTL_SECS=ten minutes"));
    }

    #[test]
    fn blank_api_url_is_missing() {
        let err = config(&[("HOSTPOOL_API_URL", "")]).unwrap_err();
        assert!(matches!(err, Error::MissingEnv(_)));
    }

    #[test]
    fn blank_focus_pool_means_none() {
        let cfg = config(&[("HOSTPOOL_FOCUS_POOL", "  ")]).unwrap();
        assert_eq!(cfg.focus_pool, None);
    }
}
