//! In-process coordination store (§4.1).
//!
//! A plain `RwLock<BTreeMap<..>>` per entity family, a thin typed API
//! in front of it, and a `PoisonedLock`-style error mapped through
//! [`crate::error::ControlPlaneError`]. This is the one concrete
//! implementation the core ships of the `Store` contract — it stands in
//! for the real multi-replica backing store, not a production client.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::error::{ControlPlaneError, Result};
use crate::model::{LoadBalancer, Node, NodeState, Run, RunId, RoutingPolicy, RoutingPolicyId, ZoneRoutingPolicy};

use super::locks::LockRegistry;
use super::txn::Transaction;

/// Visible within `store` only so [`super::txn::Transaction`] can build
/// mutation closures that touch the tables directly — a closure going back
/// through [`Store`]'s own locking methods while the write guard in
/// [`Store::commit`] is already held would deadlock against itself, since
/// `parking_lot::RwLock` is not reentrant.
#[derive(Default)]
pub(super) struct Tables {
    pub(super) nodes: BTreeMap<String, Node>,
    pub(super) load_balancers: BTreeMap<(String, String, String), LoadBalancer>,
    pub(super) routing_policies: BTreeMap<RoutingPolicyId, RoutingPolicy>,
    pub(super) zone_routing_policies: BTreeMap<String, ZoneRoutingPolicy>,
    pub(super) runs: BTreeMap<RunId, Run>,
}

/// The coordination store: durable state plus the named-lock registry that
/// guards mutation of it (§4.1, §5).
pub struct Store {
    tables: RwLock<Tables>,
    pub locks: LockRegistry,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Store {
            tables: RwLock::new(Tables::default()),
            locks: LockRegistry::new(),
        }
    }

    // ---- nodes ----------------------------------------------------------

    pub fn read_node(&self, hostname: &str) -> Option<Node> {
        self.tables.read().nodes.get(hostname).cloned()
    }

    pub fn read_node_in_states(&self, hostname: &str, allowed: &[NodeState]) -> Option<Node> {
        self.tables.read().nodes.get(hostname).filter(|n| allowed.contains(&n.state)).cloned()
    }

    pub fn read_nodes(&self, states: Option<&[NodeState]>) -> Vec<Node> {
        let tables = self.tables.read();
        match states {
            Some(states) => tables.nodes.values().filter(|n| states.contains(&n.state)).cloned().collect(),
            None => tables.nodes.values().cloned().collect(),
        }
    }

    /// `addNodesInState`: fails (invariant violation) on any duplicate
    /// hostname within the batch or against the existing table.
    pub fn add_nodes_in_state(&self, mut nodes: Vec<Node>, state: NodeState) -> Result<()> {
        let mut tables = self.tables.write();
        let mut seen = std::collections::HashSet::new();
        for node in &nodes {
            if !seen.insert(node.hostname.clone()) {
                return Err(ControlPlaneError::invariant(
                    "duplicate hostname in batch",
                    node.hostname.clone(),
                ));
            }
            if tables.nodes.contains_key(&node.hostname) {
                return Err(ControlPlaneError::invariant("hostname already exists", node.hostname.clone()));
            }
        }
        for node in nodes.iter_mut() {
            node.state = state;
        }
        for node in nodes {
            tables.nodes.insert(node.hostname.clone(), node);
        }
        Ok(())
    }

    pub fn write_node(&self, node: Node) {
        self.tables.write().nodes.insert(node.hostname.clone(), node);
    }

    pub fn remove_nodes(&self, hostnames: &[String]) {
        let mut tables = self.tables.write();
        for hostname in hostnames {
            tables.nodes.remove(hostname);
        }
    }

    pub fn children_of(&self, parent_hostname: &str) -> Vec<Node> {
        self.tables
            .read()
            .nodes
            .values()
            .filter(|n| n.parent_hostname.as_deref() == Some(parent_hostname))
            .cloned()
            .collect()
    }

    // ---- load balancers ---------------------------------------------------

    pub fn read_load_balancers(&self, application: &str, zone: &str) -> Vec<LoadBalancer> {
        self.tables
            .read()
            .load_balancers
            .values()
            .filter(|lb| lb.application == application && lb.zone == zone)
            .cloned()
            .collect()
    }

    pub fn write_load_balancer(&self, lb: LoadBalancer) {
        self.tables.write().load_balancers.insert(lb.key(), lb);
    }

    // ---- routing policies ---------------------------------------------------

    pub fn read_routing_policies(&self, owner: Option<&str>) -> Vec<RoutingPolicy> {
        let tables = self.tables.read();
        match owner {
            Some(owner) => tables
                .routing_policies
                .values()
                .filter(|p| p.id.owner == owner)
                .cloned()
                .collect(),
            None => tables.routing_policies.values().cloned().collect(),
        }
    }

    pub fn write_routing_policies(&self, owner: &str, list: Vec<RoutingPolicy>) {
        let mut tables = self.tables.write();
        tables.routing_policies.retain(|id, _| id.owner != owner);
        for policy in list {
            tables.routing_policies.insert(policy.id.clone(), policy);
        }
    }

    pub fn read_zone_routing_policy(&self, zone: &str) -> Option<ZoneRoutingPolicy> {
        self.tables.read().zone_routing_policies.get(zone).cloned()
    }

    pub fn write_zone_routing_policy(&self, policy: ZoneRoutingPolicy) {
        self.tables.write().zone_routing_policies.insert(policy.zone.clone(), policy);
    }

    // ---- runs ---------------------------------------------------------

    pub fn read_runs(&self, application: &str, job_type: &str) -> Vec<Run> {
        self.tables
            .read()
            .runs
            .values()
            .filter(|r| r.id.application == application && r.id.job_type == job_type)
            .cloned()
            .collect()
    }

    pub fn read_run(&self, id: &RunId) -> Option<Run> {
        self.tables.read().runs.get(id).cloned()
    }

    /// Invariant: run numbers within a job are strictly increasing, and at
    /// most one is non-terminal.
    pub fn write_run(&self, run: Run) -> Result<()> {
        let mut tables = self.tables.write();
        if let Some(existing_max) = tables
            .runs
            .values()
            .filter(|r| r.id.application == run.id.application && r.id.job_type == run.id.job_type && r.id.number != run.id.number)
            .map(|r| r.id.number)
            .max()
        {
            if run.id.number < existing_max {
                return Err(ControlPlaneError::invariant(
                    "run numbers must be strictly increasing",
                    format!("{:?}", run.id),
                ));
            }
        }
        if !run.status.is_terminal() {
            let other_non_terminal = tables.runs.values().any(|r| {
                r.id.application == run.id.application
                    && r.id.job_type == run.id.job_type
                    && r.id.number != run.id.number
                    && !r.status.is_terminal()
            });
            if other_non_terminal {
                return Err(ControlPlaneError::invariant(
                    "at most one non-terminal run per job",
                    format!("{:?}", run.id),
                ));
            }
        }
        tables.runs.insert(run.id.clone(), run);
        Ok(())
    }

    // ---- transactions ---------------------------------------------------

    /// Apply every mutation in `txn` as a single atomic unit: the write
    /// lock is held for the whole batch so no reader observes a partial
    /// commit (§2). Each mutation closure touches `Tables` directly rather
    /// than calling back through `Store`'s own locking methods, which would
    /// deadlock while this guard is held.
    pub fn commit(&self, txn: Transaction) {
        let mut guard = self.tables.write();
        for mutation in txn.into_mutations() {
            mutation(&mut *guard);
        }
    }
}
