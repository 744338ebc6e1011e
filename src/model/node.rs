//! Node entity and its state machine (§3, §4.2).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The fixed node state machine from §4.2.
///
/// Legal transitions are enforced by [`NodeState::can_transition_to`], not
/// by matching on call sites — that keeps the one source of truth for the
/// diagram in one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeState {
    Provisioned,
    Ready,
    Reserved,
    Active,
    Inactive,
    Dirty,
    Failed,
    Parked,
    Deprovisioned,
    Breakfixed,
}

impl NodeState {
    /// Whether `self -> target` is one of the edges drawn in §4.2.
    ///
    /// `deprovisioned -> (forgotten)` is not a transition to another
    /// `NodeState` — it is record removal, handled by
    /// [`crate::nodes::manager::NodeLifecycleManager::forget`], not here.
    ///
    /// `{Provisioned, Dirty, Ready} -> Deprovisioned` are not part of the
    /// main lifecycle diagram but are the edges `removeRecursively` itself
    /// is specified to use on a non-dynamic-provisioning cloud: §4.2 lists
    /// `Provisioned` among a host's allowed source states, and
    /// `Provisioned/Dirty/Ready` for a recursively-removed child.
    pub fn can_transition_to(self, target: NodeState) -> bool {
        use NodeState::*;
        match (self, target) {
            (Deprovisioned, Provisioned) => true,
            (Provisioned, Dirty) => true,
            (Dirty, Ready) => true,
            (Ready, Reserved) => true,
            (Reserved, Active) => true,
            (Active, Inactive) => true,
            (Active, Dirty) => true,
            (Inactive, Dirty) => true,
            (Inactive, Reserved) => true,
            (Inactive, Parked) => true,
            (Reserved, Dirty) => true,
            (Failed, Dirty) => true,
            (Failed, Active) => true,
            (Failed, Deprovisioned) => true,
            (Failed, Breakfixed) => true,
            (Parked, Dirty) => true,
            (Parked, Active) => true,
            (Parked, Deprovisioned) => true,
            (Parked, Breakfixed) => true,
            (Breakfixed, Dirty) => true,
            (Provisioned, Deprovisioned) => true,
            (Dirty, Deprovisioned) => true,
            (Ready, Deprovisioned) => true,
            (_, Failed) => self != Deprovisioned,
            (_, Parked) => self != Deprovisioned,
            _ => false,
        }
    }

    /// Invariant (i): allocation is present iff state is one of these,
    /// optional in `Dirty`, forbidden elsewhere.
    pub fn allocation_required(self) -> bool {
        matches!(self, NodeState::Reserved | NodeState::Active | NodeState::Inactive)
    }

    pub fn allocation_allowed(self) -> bool {
        self.allocation_required() || self == NodeState::Dirty
    }
}

/// Node type and the capability predicate over what it may host (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeType {
    Tenant,
    Host,
    Proxy,
    Confighost,
    Controller,
}

impl NodeType {
    /// Whether a node of `self` may be hosted as a child of `parent_type`.
    pub fn can_be_child_of(self, parent_type: NodeType) -> bool {
        matches!(
            (parent_type, self),
            (NodeType::Host, NodeType::Tenant)
                | (NodeType::Host, NodeType::Proxy)
                | (NodeType::Host, NodeType::Confighost)
                | (NodeType::Host, NodeType::Controller)
        )
    }

    pub fn is_host(self) -> bool {
        self == NodeType::Host
    }
}

/// The binding of a node to an application's cluster membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub owner: String,
    pub cluster: String,
    pub membership_index: u32,
    pub removable: bool,
    pub restart_generation: u64,
    pub retired: bool,
}

/// Mutable status flags and counters carried alongside a node (§3).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub want_to_retire: bool,
    pub want_to_deprovision: bool,
    pub want_to_rebuild: bool,
    pub want_to_fail: bool,
    pub os_version_wanted: Option<String>,
    pub os_version_current: Option<String>,
    pub firmware_verified_at: Option<DateTime<Utc>>,
    pub fail_count: u32,
    pub reboot_generation: u64,
}

/// A single network configuration for a node. Never mutated in place — only
/// ever replaced wholesale, or cleared on entry to `Deprovisioned` (§5).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpConfig {
    pub primary: Vec<String>,
    pub pool: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryEventType {
    Provisioned,
    Readied,
    Reserved,
    Activated,
    Deactivated,
    Failed,
    Parked,
    Deprovisioned,
    Breakfixed,
    Rebuilt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub event_type: HistoryEventType,
    pub agent: String,
    pub at: DateTime<Utc>,
}

/// A single report attached to a node (health, inventory, etc.). Kept as an
/// opaque JSON blob — the core never interprets the contents, only stores
/// and forwards them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub name: String,
    pub at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// The full durable node record (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub hostname: String,
    pub parent_hostname: Option<String>,
    pub node_type: NodeType,
    pub state: NodeState,
    pub allocation: Option<Allocation>,
    pub status: NodeStatus,
    pub ip_config: IpConfig,
    pub history: Vec<HistoryEvent>,
    pub reports: Vec<Report>,
}

impl Node {
    pub fn new(hostname: impl Into<String>, node_type: NodeType, state: NodeState) -> Self {
        Node {
            hostname: hostname.into(),
            parent_hostname: None,
            node_type,
            state,
            allocation: None,
            status: NodeStatus::default(),
            ip_config: IpConfig::default(),
            history: Vec::new(),
            reports: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_hostname = Some(parent.into());
        self
    }

    pub fn with_allocation(mut self, allocation: Allocation) -> Self {
        self.allocation = Some(allocation);
        self
    }

    /// Invariant (i) check, used both by the manager before committing a
    /// write and by property tests asserting it holds after every op.
    pub fn allocation_invariant_holds(&self) -> bool {
        if self.state.allocation_required() {
            self.allocation.is_some()
        } else if self.state == NodeState::Dirty {
            true
        } else {
            self.allocation.is_none()
        }
    }

    pub fn record_event(&mut self, event_type: HistoryEventType, agent: impl Into<String>, at: DateTime<Utc>) {
        self.history.push(HistoryEvent {
            event_type,
            agent: agent.into(),
            at,
        });
    }

    pub fn is_stateful_cluster(&self) -> bool {
        self.allocation
            .as_ref()
            .map(|a| a.cluster == "content" || a.cluster == "storage")
            .unwrap_or(false)
    }
}

/// Aggregate counts by state, used by `isWorking()` and the metrics module.
pub fn count_by_state(nodes: impl IntoIterator<Item = NodeState>) -> BTreeMap<NodeState, usize> {
    let mut counts = BTreeMap::new();
    for state in nodes {
        *counts.entry(state).or_insert(0) += 1;
    }
    counts
}
