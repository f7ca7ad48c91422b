use std::time::Duration;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_MIGRATION_TIMEOUT: Duration = Duration::from_secs(45);
pub const DEFAULT_LAUNCH_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_PROPAGATION_WAIT: Duration = Duration::from_secs(60);
pub const DEFAULT_HYPERSTACK_URL: &str = "https://infrahub-api.nexgencloud.com/v1";
pub const DEFAULT_ENVIRONMENT: &str = "CA1-RunPod";
pub const DEFAULT_CA1_FIREWALL: &str = "971";

/// Per-session knobs for the core components.
#[derive(Debug, Clone)]
pub struct Settings {
    pub cache_ttl: Duration,
    pub timeouts: Timeouts,
    pub planner: PlannerConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            timeouts: Timeouts::default(),
            planner: PlannerConfig::default(),
        }
    }
}

/// Upper bound for a single remote mutation, by operation kind.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub migration: Duration,
    pub launch: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            migration: DEFAULT_MIGRATION_TIMEOUT,
            launch: DEFAULT_LAUNCH_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// How long a launch waits for aggregate membership to settle.
    pub propagation_wait: Duration,
    pub hyperstack_url: String,
    /// Hyperstack environment for hosts whose region sets none.
    pub environment: String,
    pub regions: Vec<RegionPolicy>,
}

impl PlannerConfig {
    /// First region whose hostname prefix matches.
    pub fn region_for(&self, host: &str) -> Option<&RegionPolicy> {
        self.regions.iter().find(|r| host.starts_with(&r.prefix))
    }

    pub fn environment_for(&self, host: &str) -> &str {
        self.region_for(host)
            .and_then(|r| r.environment.as_deref())
            .unwrap_or(self.environment.as_str())
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            propagation_wait: DEFAULT_PROPAGATION_WAIT,
            hyperstack_url: DEFAULT_HYPERSTACK_URL.into(),
            environment: DEFAULT_ENVIRONMENT.into(),
            regions: vec![RegionPolicy {
                prefix: "CA1-".into(),
                environment: None,
                storage_network: Some("RunPod-Storage-Canada-1".into()),
                firewall_id: Some(DEFAULT_CA1_FIREWALL.into()),
            }],
        }
    }
}

/// Post-launch networking a region requires, keyed by hostname prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionPolicy {
    pub prefix: String,
    pub environment: Option<String>,
    pub storage_network: Option<String>,
    pub firewall_id: Option<String>,
}
