//! Display model for the pool board.
//!
//! Every column is described by a [`ColumnKind`] and turned into a
//! [`ColumnView`] by [`render`]; there is no per-column type.

use serde::Serialize;

use crate::types::{GpuUsage, Host, OwnerGroup, PoolKind, PoolSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColumnKind {
    OnDemand,
    Runpod,
    Spot,
    Contract,
    OutOfStock,
    Summary,
}

impl ColumnKind {
    /// Board order, left to right.
    pub const ALL: [ColumnKind; 6] = [
        Self::OnDemand,
        Self::Runpod,
        Self::Spot,
        Self::Contract,
        Self::OutOfStock,
        Self::Summary,
    ];

    pub fn pool(&self) -> Option<PoolKind> {
        match self {
            Self::OnDemand => Some(PoolKind::OnDemand),
            Self::Runpod => Some(PoolKind::Runpod),
            Self::Spot => Some(PoolKind::Spot),
            Self::Contract => Some(PoolKind::Contract),
            Self::OutOfStock => Some(PoolKind::OutOfStock),
            Self::Summary => None,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::OnDemand => "On-Demand",
            Self::Runpod => "Runpod",
            Self::Spot => "Spot",
            Self::Contract => "Contracts",
            Self::OutOfStock => "Out of Stock",
            Self::Summary => "Summary",
        }
    }
}

impl From<PoolKind> for ColumnKind {
    fn from(kind: PoolKind) -> Self {
        match kind {
            PoolKind::OnDemand => Self::OnDemand,
            PoolKind::Runpod => Self::Runpod,
            PoolKind::Spot => Self::Spot,
            PoolKind::Contract => Self::Contract,
            PoolKind::OutOfStock => Self::OutOfStock,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostRow {
    pub name: String,
    /// `used/capacity`.
    pub gpu: String,
    pub vm_count: u32,
    pub owner: OwnerGroup,
    pub nvlink: bool,
    pub tenant: Option<String>,
    pub variant: Option<String>,
    /// Whether the host may be dragged into another pool.
    pub draggable: bool,
}

impl From<&Host> for HostRow {
    fn from(h: &Host) -> Self {
        Self {
            name: h.name.clone(),
            gpu: h.gpu.ratio(),
            vm_count: h.vm_count,
            owner: h.owner,
            nvlink: h.nvlink,
            tenant: h.tenant.clone(),
            variant: h.variant.clone(),
            draggable: h.can_leave_pool(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ColumnBody {
    Hosts { rows: Vec<HostRow> },
    Summary { breakdown: Vec<(PoolKind, GpuUsage)> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnView {
    pub kind: ColumnKind,
    pub title: &'static str,
    /// Aggregate label reported by the backend; empty for the summary.
    pub subtitle: String,
    pub usage: GpuUsage,
    pub percentage: f64,
    pub body: ColumnBody,
}

impl ColumnView {
    pub fn rows(&self) -> &[HostRow] {
        match &self.body {
            ColumnBody::Hosts { rows } => rows,
            ColumnBody::Summary { .. } => &[],
        }
    }
}

pub fn render(kind: ColumnKind, snapshot: &PoolSnapshot) -> ColumnView {
    match kind.pool() {
        Some(pool) => {
            let sub = snapshot.sub_pool(pool);
            let usage = sub.map(|p| p.usage).unwrap_or_default();
            ColumnView {
                kind,
                title: kind.title(),
                subtitle: sub.map(|p| p.name.clone()).unwrap_or_default(),
                usage,
                percentage: usage.percentage(),
                body: ColumnBody::Hosts {
                    rows: sub
                        .map(|p| p.hosts.iter().map(HostRow::from).collect())
                        .unwrap_or_default(),
                },
            }
        }
        None => {
            let breakdown: Vec<_> = snapshot
                .sub_pools
                .iter()
                .filter(|p| p.kind.counts_toward_usage())
                .map(|p| (p.kind, p.usage))
                .collect();
            let usage: GpuUsage = breakdown.iter().map(|(_, u)| *u).sum();
            ColumnView {
                kind,
                title: kind.title(),
                subtitle: String::new(),
                usage,
                percentage: usage.percentage(),
                body: ColumnBody::Summary { breakdown },
            }
        }
    }
}

/// Every column of the board in order.
pub fn render_all(snapshot: &PoolSnapshot) -> Vec<ColumnView> {
    ColumnKind::ALL.iter().map(|k| render(*k, snapshot)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_snapshot;

    #[test]
    fn summary_excludes_out_of_stock() {
        let mut snap = sample_snapshot("H100");
        for pool in &mut snap.sub_pools {
            if pool.kind == PoolKind::OutOfStock {
                pool.usage = GpuUsage { used: 0, capacity: 80 };
            }
        }

        let view = render(ColumnKind::Summary, &snap);

        // on-demand 8/8, runpod 0/8, spot 4/16
        assert_eq!(view.usage, GpuUsage { used: 12, capacity: 32 });
        assert_eq!(view.percentage, 37.5);
        assert!(view.rows().is_empty());
        match view.body {
            ColumnBody::Summary { breakdown } => {
                assert_eq!(breakdown.len(), 4);
                assert!(breakdown.iter().all(|(k, _)| *k != PoolKind::OutOfStock));
            }
            other => panic!("expected summary body, got {other:?}"),
        }
    }

    #[test]
    fn spot_rows_mark_busy_hosts_undraggable() {
        let view = render(ColumnKind::Spot, &sample_snapshot("H100"));

        assert_eq!(view.subtitle, "H100-n3-spot");
        let rows = view.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].name.as_str(), rows[0].draggable), ("gpu-01", true));
        assert_eq!((rows[1].name.as_str(), rows[1].draggable), ("gpu-03", false));
        assert_eq!(rows[1].gpu, "4/8");
    }

    #[test]
    fn on_demand_row_carries_variant_and_nvlink() {
        let view = render(ColumnKind::OnDemand, &sample_snapshot("H100"));
        let row = &view.rows()[0];

        assert!(row.nvlink);
        assert_eq!(row.owner, OwnerGroup::NexgenCloud);
        assert_eq!(row.variant.as_deref(), Some("H100-n3-NVLink"));
        assert_eq!(view.percentage, 100.0);
    }

    #[test]
    fn board_has_six_columns_in_order() {
        let kinds: Vec<_> = render_all(&sample_snapshot("H100"))
            .into_iter()
            .map(|v| v.kind)
            .collect();
        assert_eq!(kinds, ColumnKind::ALL.to_vec());
    }
}
