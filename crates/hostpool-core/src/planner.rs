//! Turns intents into ordered command plans.
//!
//! Planning is pure: the same intent and config always yield the same steps.
//! Nothing here talks to the backend; the steps describe what the backend
//! (or an operator following along) runs, in the order it must run.

use std::collections::HashSet;
use std::time::Duration;

use crate::settings::PlannerConfig;
use crate::types::{CommandStep, LaunchIntent, MigrationIntent, OperationKind, StepKind};
use crate::{Error, Result};

const API_KEY_PLACEHOLDER: &str = "<hyperstack-api-key>";

#[derive(Debug, Clone, Default)]
pub struct Planner {
    config: PlannerConfig,
}

impl Planner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn plan(&self, kind: &OperationKind) -> Vec<CommandStep> {
        match kind {
            OperationKind::Migration(m) => self.plan_migration(m),
            OperationKind::Launch(l) => self.plan_launch(l),
        }
    }

    /// Remove from the source aggregate, then add to the target.
    pub fn plan_migration(&self, m: &MigrationIntent) -> Vec<CommandStep> {
        vec![
            CommandStep {
                kind: StepKind::AggregateRemove,
                title: format!("Remove {} from {}", m.host, m.source_aggregate),
                description: format!(
                    "Take {} out of the {} pool aggregate",
                    m.host, m.source_pool
                ),
                command: format!(
                    "openstack aggregate remove host {} {}",
                    m.source_aggregate, m.host
                ),
                verify: vec![format!(
                    "openstack aggregate show {} -f value -c hosts",
                    m.source_aggregate
                )],
                estimate: Duration::from_secs(5),
                depends_on: Vec::new(),
            },
            CommandStep {
                kind: StepKind::AggregateAdd,
                title: format!("Add {} to {}", m.host, m.target_aggregate),
                description: format!(
                    "Place {} into the {} pool aggregate",
                    m.host, m.target_pool
                ),
                command: format!(
                    "openstack aggregate add host {} {}",
                    m.target_aggregate, m.host
                ),
                verify: vec![format!(
                    "openstack aggregate show {} -f value -c hosts",
                    m.target_aggregate
                )],
                estimate: Duration::from_secs(5),
                depends_on: vec![StepKind::AggregateRemove],
            },
        ]
    }

    /// Wait, deploy, then whatever networking the host's region requires.
    pub fn plan_launch(&self, l: &LaunchIntent) -> Vec<CommandStep> {
        let url = &self.config.hyperstack_url;
        let vm = &l.vm_name;
        let wait = self.config.propagation_wait;

        let mut steps = vec![
            CommandStep {
                kind: StepKind::WaitPropagation,
                title: "Wait for aggregate propagation".into(),
                description: format!(
                    "Give the scheduler {}s to pick up {} in the runpod aggregate",
                    wait.as_secs(),
                    l.host
                ),
                command: format!("sleep {}", wait.as_secs()),
                verify: Vec::new(),
                estimate: wait,
                depends_on: Vec::new(),
            },
            CommandStep {
                kind: StepKind::DeployVm,
                title: format!("Deploy VM {vm}"),
                description: format!("Launch the runpod VM on {}", l.host),
                command: deploy_command(url, self.config.environment_for(&l.host), l),
                verify: vec![format!("openstack server show {vm} -f value -c status")],
                estimate: Duration::from_secs(30),
                depends_on: vec![StepKind::WaitPropagation],
            },
        ];

        let region = self.config.region_for(&l.host);

        if let Some(network) = region.and_then(|r| r.storage_network.as_deref()) {
            let port = format!("{vm}-storage-port");
            steps.extend([
                CommandStep {
                    kind: StepKind::StorageNetworkDiscover,
                    title: format!("Find network {network}"),
                    description: "Resolve the dedicated storage network id".into(),
                    command: format!("openstack network show {network} -f value -c id"),
                    verify: Vec::new(),
                    estimate: Duration::from_secs(3),
                    depends_on: vec![StepKind::DeployVm],
                },
                CommandStep {
                    kind: StepKind::StoragePortCreate,
                    title: format!("Create port {port}"),
                    description: format!("Create a storage port for {vm} on {network}"),
                    command: format!("openstack port create --network {network} {port}"),
                    verify: vec![format!("openstack port show {port} -f value -c status")],
                    estimate: Duration::from_secs(5),
                    depends_on: vec![StepKind::StorageNetworkDiscover],
                },
                CommandStep {
                    kind: StepKind::StoragePortAttach,
                    title: format!("Attach {port} to {vm}"),
                    description: "Attach the storage port to the new VM".into(),
                    command: format!("openstack server add port {vm} {port}"),
                    verify: vec![format!("openstack server show {vm} -f value -c addresses")],
                    estimate: Duration::from_secs(10),
                    depends_on: vec![StepKind::StoragePortCreate],
                },
            ]);
        }

        if let Some(firewall) = region.and_then(|r| r.firewall_id.as_deref()) {
            steps.extend([
                CommandStep {
                    kind: StepKind::FirewallGet,
                    title: format!("Read firewall {firewall} attachments"),
                    description: "List the VMs currently attached to the region firewall".into(),
                    command: format!(
                        "curl -X GET {url}/core/firewalls/{firewall} -H 'api_key: {API_KEY_PLACEHOLDER}'"
                    ),
                    verify: Vec::new(),
                    estimate: Duration::from_secs(3),
                    depends_on: vec![StepKind::DeployVm],
                },
                CommandStep {
                    kind: StepKind::FirewallUpdate,
                    title: format!("Attach {vm} to firewall {firewall}"),
                    description: "Rewrite the attachment list with the new VM appended".into(),
                    command: format!(
                        "curl -X POST {url}/core/firewalls/{firewall}/update-attachments \
                         -H 'api_key: {API_KEY_PLACEHOLDER}' \
                         -H 'Content-Type: application/json' \
                         -d '{{\"vms\": [<existing vm ids>, <{vm} id>]}}'"
                    ),
                    verify: vec![format!(
                        "curl -X GET {url}/core/firewalls/{firewall} -H 'api_key: {API_KEY_PLACEHOLDER}'"
                    )],
                    estimate: Duration::from_secs(5),
                    depends_on: vec![StepKind::FirewallGet],
                },
            ]);
        }

        steps
    }
}

fn deploy_command(url: &str, environment: &str, l: &LaunchIntent) -> String {
    let mut body = format!(
        "{{\"name\": \"{}\", \"environment_name\": \"{environment}\", \"flavor_name\": \"{}\"",
        l.vm_name,
        l.flavor_name.as_deref().unwrap_or("<from preview>"),
    );
    if let Some(image) = &l.image_name {
        body.push_str(&format!(", \"image_name\": \"{image}\""));
    }
    body.push_str(", \"assign_floating_ip\": true, \"key_name\": \"Fleio\", \"count\": 1}");

    format!(
        "curl -X POST {url}/core/virtual-machines \
         -H 'api_key: {API_KEY_PLACEHOLDER}' \
         -H 'Content-Type: application/json' \
         -d '{body}'"
    )
}

/// Check that every dependency of every step appears earlier in the plan.
pub fn check_order(steps: &[CommandStep]) -> Result<()> {
    let mut seen = HashSet::new();
    for step in steps {
        if let Some(missing) = step.depends_on.iter().find(|d| !seen.contains(*d)) {
            return Err(Error::InvalidPlan(format!(
                "{:?} runs before its dependency {:?}",
                step.kind, missing
            )));
        }
        seen.insert(step.kind);
    }
    Ok(())
}
