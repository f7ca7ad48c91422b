//! Narrowing a pool snapshot for display.

use crate::types::{Host, OwnerGroup, PoolSnapshot, SubPool};

/// Criteria a host must meet to stay visible. Empty matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostFilter {
    /// Case-insensitive substring of the host name or tenant.
    pub text: Option<String>,
    pub owner: Option<OwnerGroup>,
    pub nvlink_only: bool,
    /// Only hosts with no running VMs.
    pub idle_only: bool,
}

impl HostFilter {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn matches(&self, host: &Host) -> bool {
        if let Some(text) = self.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let needle = text.to_lowercase();
            let in_name = host.name.to_lowercase().contains(&needle);
            let in_tenant = host
                .tenant
                .as_deref()
                .is_some_and(|t| t.to_lowercase().contains(&needle));
            if !in_name && !in_tenant {
                return false;
            }
        }
        if let Some(owner) = self.owner
            && host.owner != owner
        {
            return false;
        }
        if self.nvlink_only && !host.nvlink {
            return false;
        }
        !(self.idle_only && host.has_vms())
    }
}

/// New snapshot holding only matching hosts, with usage recomputed from them.
///
/// Sub-pool order and names are kept so columns stay put while filtering.
pub fn apply(snapshot: &PoolSnapshot, filter: &HostFilter) -> PoolSnapshot {
    if filter.is_empty() {
        return snapshot.clone();
    }

    let sub_pools: Vec<SubPool> = snapshot
        .sub_pools
        .iter()
        .map(|pool| {
            let hosts: Vec<Host> = pool
                .hosts
                .iter()
                .filter(|h| filter.matches(h))
                .cloned()
                .collect();
            SubPool {
                kind: pool.kind,
                name: pool.name.clone(),
                usage: hosts.iter().map(|h| h.gpu).sum(),
                hosts,
            }
        })
        .collect();

    PoolSnapshot {
        key: snapshot.key.clone(),
        usage: PoolSnapshot::computed_usage(&sub_pools),
        sub_pools,
        fetched_at: snapshot.fetched_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_snapshot;
    use crate::types::{GpuUsage, PoolKind};

    fn names(snap: &PoolSnapshot) -> Vec<&str> {
        snap.sub_pools
            .iter()
            .flat_map(|p| p.hosts.iter().map(|h| h.name.as_str()))
            .collect()
    }

    #[test]
    fn empty_filter_keeps_everything() {
        let snap = sample_snapshot("H100");
        assert_eq!(apply(&snap, &HostFilter::default()), snap);
    }

    #[test]
    fn text_matches_name_or_tenant_case_insensitively() {
        let snap = sample_snapshot("H100");

        let by_tenant = HostFilter { text: Some("acme".into()), ..Default::default() };
        assert_eq!(names(&apply(&snap, &by_tenant)), vec!["gpu-04"]);

        let by_name = HostFilter { text: Some(" GPU-0 ".into()), ..Default::default() };
        assert_eq!(apply(&snap, &by_name).host_count(), snap.host_count());
    }

    #[test]
    fn idle_and_owner_filters_combine() {
        let snap = sample_snapshot("H100");
        let filter = HostFilter {
            owner: Some(OwnerGroup::Investors),
            idle_only: true,
            ..Default::default()
        };

        assert_eq!(names(&apply(&snap, &filter)), vec!["gpu-02", "gpu-01", "gpu-09"]);
    }

    #[test]
    fn usage_is_recomputed_and_source_untouched() {
        let snap = sample_snapshot("H100");
        let before = snap.clone();
        let filter = HostFilter { nvlink_only: true, ..Default::default() };

        let out = apply(&snap, &filter);

        assert_eq!(snap, before);
        assert_eq!(out.sub_pools.len(), PoolKind::ALL.len());
        assert!(out.sub_pool(PoolKind::Spot).unwrap().hosts.is_empty());
        assert_eq!(out.sub_pool(PoolKind::Spot).unwrap().usage, GpuUsage::default());
        assert_eq!(out.usage, GpuUsage { used: 8, capacity: 8 });
    }
}
