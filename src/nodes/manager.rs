//! Node Lifecycle Manager (§4.2).
//!
//! Owns the node state machine, host/child relationships, allocation,
//! retirement, rebuild, deprovision, and enforces the locking discipline
//! from §5: every write path acquires the application lock for allocated
//! nodes or the unallocated lock for unallocated nodes, and combined
//! operations take the application lock before the unallocated lock.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::error::{ControlPlaneError, Result};
use crate::model::{Allocation, HistoryEventType, Node, NodeState, NodeType};
use crate::store::{ApplicationLock, Store, UnallocatedLock};

use super::agent::Agent;

/// Bound on `lockAndGet`'s re-read-under-lock retry loop (§4.2).
pub const MAX_LOCK_RETRY: u32 = 4;

enum NodeLock {
    Application(ApplicationLock),
    Unallocated(UnallocatedLock),
}

/// Reason passed to [`NodeLifecycleManager::deallocate`], used only for the
/// history entry — it does not change which transition is taken.
#[derive(Debug, Clone)]
pub struct DeallocateReason(pub String);

pub struct NodeLifecycleManager {
    store: Arc<Store>,
    /// Whether the owning cloud performs dynamic host provisioning. Several
    /// operations (`breakfixRecursively`, `removeRecursively`) branch on
    /// this (§4.2).
    pub dynamic_provisioning: bool,
    /// Whether this is a CD (continuous deployment/test) zone: affects how
    /// `deactivate` splits stateful vs. stateless nodes (§4.2).
    pub is_cd_zone: bool,
}

impl NodeLifecycleManager {
    pub fn new(store: Arc<Store>, dynamic_provisioning: bool, is_cd_zone: bool) -> Self {
        NodeLifecycleManager { store, dynamic_provisioning, is_cd_zone }
    }

    fn owner_of(node: &Node) -> Option<String> {
        node.allocation.as_ref().map(|a| a.owner.clone())
    }

    /// `lockAndGet`: acquires the lock scope implied by the node's current
    /// owner, re-reads under that lock, and retries up to
    /// [`MAX_LOCK_RETRY`] times if the owner changed out from under it
    /// between the speculative read and the lock acquisition.
    async fn lock_and_get(&self, hostname: &str) -> Result<(Node, NodeLock)> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let speculative = self
                .store
                .read_node(hostname)
                .ok_or_else(|| ControlPlaneError::not_found("node", hostname))?;
            let owner = Self::owner_of(&speculative);

            let lock = match &owner {
                Some(owner) => NodeLock::Application(self.store.locks.lock_application(owner).await),
                None => NodeLock::Unallocated(self.store.locks.lock_unallocated().await),
            };

            let reread = self
                .store
                .read_node(hostname)
                .ok_or_else(|| ControlPlaneError::not_found("node", hostname))?;
            if Self::owner_of(&reread) == owner {
                return Ok((reread, lock));
            }
            if attempts >= MAX_LOCK_RETRY {
                return Err(ControlPlaneError::conflict(format!("lockAndGet({})", hostname), attempts));
            }
            drop(lock);
        }
    }

    fn require_transition(node: &Node, target: NodeState) -> Result<()> {
        if !node.state.can_transition_to(target) {
            return Err(ControlPlaneError::invariant(
                "illegal node state transition",
                format!("{:?} -> {:?} for {}", node.state, target, node.hostname),
            ));
        }
        Ok(())
    }

    fn apply_transition(node: &mut Node, target: NodeState, event: HistoryEventType, agent: &Agent) -> Result<()> {
        Self::require_transition(node, target)?;
        let from = node.state;
        node.state = target;
        crate::metrics::track_node_transition(&format!("{:?}", from), &format!("{:?}", target));
        if target == NodeState::Deprovisioned {
            node.ip_config = Default::default();
        }
        if !target.allocation_allowed() {
            node.allocation = None;
        }
        node.record_event(event, agent.as_str(), Utc::now());
        if !node.allocation_invariant_holds() {
            return Err(ControlPlaneError::invariant(
                "allocation presence invariant",
                format!("state={:?} allocation={:?}", node.state, node.allocation),
            ));
        }
        Ok(())
    }

    /// `addReservedNodes`: each must be a child with a populated
    /// allocation; fails on duplicate hostname. Invariant (iii): the parent
    /// must already exist in the store, since a `reserved` node is never
    /// `deprovisioned`.
    pub fn add_reserved_nodes(&self, nodes: Vec<Node>) -> Result<()> {
        for node in &nodes {
            let Some(parent) = &node.parent_hostname else {
                return Err(ControlPlaneError::invariant("reserved node must be a child", node.hostname.clone()));
            };
            if node.allocation.is_none() {
                return Err(ControlPlaneError::invariant("reserved node must carry an allocation", node.hostname.clone()));
            }
            if self.store.read_node(parent).is_none() {
                return Err(ControlPlaneError::invariant("child's parent must exist", node.hostname.clone()));
            }
        }
        self.store.add_nodes_in_state(nodes, NodeState::Reserved)
    }

    /// `addNodes`: deduplicates within the batch; merges history/reports/
    /// failCount/firmwareVerifiedAt (and, if rebuilding, the retire/rebuild
    /// flags) for hostnames that already exist as `Deprovisioned`.
    pub fn add_nodes(&self, nodes: Vec<Node>, agent: &Agent) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        let mut to_insert = Vec::new();
        for mut node in nodes {
            if !seen.insert(node.hostname.clone()) {
                continue;
            }
            if let Some(parent) = &node.parent_hostname {
                if self.store.read_node(parent).is_none() && !seen.contains(parent) {
                    return Err(ControlPlaneError::invariant("child's parent must exist", node.hostname.clone()));
                }
            }
            if let Some(existing) = self.store.read_node(&node.hostname) {
                if existing.state != NodeState::Deprovisioned {
                    return Err(ControlPlaneError::invariant("hostname already exists", node.hostname.clone()));
                }
                node.history = existing.history.into_iter().chain(node.history).collect();
                node.reports = existing.reports.into_iter().chain(node.reports).collect();
                node.status.fail_count = node.status.fail_count.max(existing.status.fail_count);
                node.status.firmware_verified_at = node.status.firmware_verified_at.or(existing.status.firmware_verified_at);
                if existing.status.want_to_rebuild {
                    node.status.want_to_retire = existing.status.want_to_retire;
                    node.status.want_to_rebuild = existing.status.want_to_rebuild;
                }
            }
            node.state = NodeState::Provisioned;
            node.record_event(HistoryEventType::Provisioned, agent.as_str(), Utc::now());
            to_insert.push(node);
        }
        for node in to_insert {
            self.store.write_node(node);
        }
        Ok(())
    }

    /// `setReady`: only from `Provisioned` or `Dirty`; clears the retire/
    /// rebuild/deprovision flags.
    pub async fn set_ready(&self, hostnames: &[String]) -> Result<()> {
        for hostname in hostnames {
            let (mut node, _lock) = self.lock_and_get(hostname).await?;
            if !matches!(node.state, NodeState::Provisioned | NodeState::Dirty) {
                return Err(ControlPlaneError::invariant(
                    "setReady requires provisioned or dirty",
                    format!("{} is {:?}", hostname, node.state),
                ));
            }
            Self::apply_transition(&mut node, NodeState::Ready, HistoryEventType::Readied, &Agent::System)?;
            node.status.want_to_retire = false;
            node.status.want_to_rebuild = false;
            node.status.want_to_deprovision = false;
            self.store.write_node(node);
        }
        Ok(())
    }

    pub async fn reserve(&self, hostname: &str, allocation: Allocation, agent: &Agent) -> Result<()> {
        let (mut node, _lock) = self.lock_and_get(hostname).await?;
        node.allocation = Some(allocation);
        Self::apply_transition(&mut node, NodeState::Reserved, HistoryEventType::Reserved, agent)?;
        self.store.write_node(node);
        Ok(())
    }

    /// Invariant (ii): at most one `active` node per (owner, cluster,
    /// membershipIndex). Checked here rather than in the store, since only
    /// the manager knows which transition is about to make a node active.
    fn require_membership_exclusivity(&self, node: &Node) -> Result<()> {
        let Some(allocation) = &node.allocation else { return Ok(()) };
        let conflict = self.store.read_nodes(Some(&[NodeState::Active])).into_iter().any(|other| {
            other.hostname != node.hostname
                && other
                    .allocation
                    .as_ref()
                    .map(|a| a.owner == allocation.owner && a.cluster == allocation.cluster && a.membership_index == allocation.membership_index)
                    .unwrap_or(false)
        });
        if conflict {
            return Err(ControlPlaneError::invariant(
                "at most one active node per (owner, cluster, membershipIndex)",
                format!("{}/{}/{}", allocation.owner, allocation.cluster, allocation.membership_index),
            ));
        }
        Ok(())
    }

    pub async fn activate(&self, hostname: &str, agent: &Agent) -> Result<()> {
        let (mut node, _lock) = self.lock_and_get(hostname).await?;
        self.require_membership_exclusivity(&node)?;
        Self::apply_transition(&mut node, NodeState::Active, HistoryEventType::Activated, agent)?;
        self.store.write_node(node);
        Ok(())
    }

    /// `deactivate`: stateful nodes go to `Inactive`, stateless to `Dirty`,
    /// but only in production; in a CD zone everything goes to `Dirty`
    /// (§4.2).
    pub async fn deactivate(&self, hostname: &str, agent: &Agent) -> Result<()> {
        let (mut node, _lock) = self.lock_and_get(hostname).await?;
        let target = if !self.is_cd_zone && node.is_stateful_cluster() {
            NodeState::Inactive
        } else {
            NodeState::Dirty
        };
        Self::apply_transition(&mut node, target, HistoryEventType::Deactivated, agent)?;
        self.store.write_node(node);
        Ok(())
    }

    pub async fn fail(&self, hostname: &str, agent: &Agent) -> Result<()> {
        let (mut node, _lock) = self.lock_and_get(hostname).await?;
        Self::apply_transition(&mut node, NodeState::Failed, HistoryEventType::Failed, agent)?;
        node.status.fail_count += 1;
        self.store.write_node(node);
        Ok(())
    }

    pub async fn park(&self, hostname: &str, agent: &Agent) -> Result<()> {
        let (mut node, _lock) = self.lock_and_get(hostname).await?;
        Self::apply_transition(&mut node, NodeState::Parked, HistoryEventType::Parked, agent)?;
        self.store.write_node(node);
        Ok(())
    }

    /// `deallocate`: the central "return to pool" operation. Parks instead
    /// of dirtying iff `wantToDeprovision`, `wantToRebuild`, or an
    /// operator-requested retirement holds, the agent is not the operator,
    /// and (for non-hosts) `wantToDeprovision` is not set because the
    /// node's host itself is being decommissioned (§4.2). `reason` is not
    /// durable state — history events carry no free text (§3) — it is only
    /// logged, for operators tracing why a node went to `Parked`.
    pub async fn deallocate(
        &self,
        hostname: &str,
        agent: &Agent,
        host_being_decommissioned: bool,
        reason: DeallocateReason,
    ) -> Result<()> {
        tracing::debug!(hostname, reason = %reason.0, "deallocating node");
        let (mut node, _lock) = self.lock_and_get(hostname).await?;

        let retirement_requested =
            node.status.want_to_deprovision || node.status.want_to_rebuild || node.status.want_to_retire;
        let host_decommission_exemption = !node.node_type.is_host() && node.status.want_to_deprovision && host_being_decommissioned;

        let should_park = retirement_requested && !agent.is_operator() && !host_decommission_exemption;

        let target = if should_park { NodeState::Parked } else { NodeState::Dirty };
        let event = if should_park { HistoryEventType::Parked } else { HistoryEventType::Deactivated };
        Self::apply_transition(&mut node, target, event, agent)?;
        self.store.write_node(node);
        Ok(())
    }

    /// `failOrMarkRecursively`: active children are marked `wantToFail`
    /// (state unchanged); non-active children move to `Failed`. The host
    /// itself moves to `Failed` only if none of its children remain
    /// active; otherwise it too is only marked `wantToFail` (§4.2, S5).
    pub async fn fail_or_mark_recursively(&self, host: &str, agent: &Agent) -> Result<()> {
        let children = self.store.children_of(host);
        let mut any_child_active = false;
        for child in children {
            if child.state == NodeState::Active {
                any_child_active = true;
                let (mut node, _lock) = self.lock_and_get(&child.hostname).await?;
                node.status.want_to_fail = true;
                self.store.write_node(node);
            } else {
                self.fail(&child.hostname, agent).await?;
            }
        }

        let (mut host_node, _lock) = self.lock_and_get(host).await?;
        if any_child_active {
            host_node.status.want_to_fail = true;
            self.store.write_node(host_node);
        } else {
            Self::apply_transition(&mut host_node, NodeState::Failed, HistoryEventType::Failed, agent)?;
            host_node.status.fail_count += 1;
            self.store.write_node(host_node);
        }
        Ok(())
    }

    /// `deprovision`/`rebuild`: mark host and all children with
    /// `wantToRetire` plus the corresponding flag, under the combined
    /// application-then-unallocated lock so no concurrent allocator
    /// schedules a new child on the host while this runs (§4.2, §5).
    async fn mark_host_and_children(&self, host: &str, set_flags: impl Fn(&mut crate::model::NodeStatus)) -> Result<()> {
        let host_node = self
            .store
            .read_node(host)
            .ok_or_else(|| ControlPlaneError::not_found("node", host))?;
        let owner = Self::owner_of(&host_node).unwrap_or_else(|| host.to_string());
        let (_app_lock, _unallocated_lock) = self.store.locks.lock_application_then_unallocated(&owner).await;

        let mut host_node = self
            .store
            .read_node(host)
            .ok_or_else(|| ControlPlaneError::not_found("node", host))?;
        set_flags(&mut host_node.status);
        self.store.write_node(host_node);

        for mut child in self.store.children_of(host) {
            set_flags(&mut child.status);
            self.store.write_node(child);
        }
        Ok(())
    }

    pub async fn deprovision(&self, host: &str) -> Result<()> {
        self.mark_host_and_children(host, |status| {
            status.want_to_retire = true;
            status.want_to_deprovision = true;
        })
        .await
    }

    pub async fn rebuild(&self, host: &str) -> Result<()> {
        self.mark_host_and_children(host, |status| {
            status.want_to_retire = true;
            status.want_to_rebuild = true;
        })
        .await
    }

    /// `breakfixRecursively`: only legal when the cloud does not do dynamic
    /// provisioning, the node is a tenant host, and its state is `Failed`
    /// or `Parked`. Removes all children, then moves the host to
    /// `Breakfixed` (§4.2).
    pub async fn breakfix_recursively(&self, host: &str, agent: &Agent) -> Result<()> {
        if self.dynamic_provisioning {
            return Err(ControlPlaneError::invariant(
                "breakfix is unavailable under dynamic provisioning",
                host.to_string(),
            ));
        }
        let (mut host_node, _lock) = self.lock_and_get(host).await?;
        if !host_node.node_type.is_host() {
            return Err(ControlPlaneError::invariant("breakfix target must be a host", host.to_string()));
        }
        if !matches!(host_node.state, NodeState::Failed | NodeState::Parked) {
            return Err(ControlPlaneError::invariant(
                "breakfix requires failed or parked",
                format!("{} is {:?}", host, host_node.state),
            ));
        }

        let children: Vec<String> = self.store.children_of(host).into_iter().map(|n| n.hostname).collect();
        self.store.remove_nodes(&children);

        Self::apply_transition(&mut host_node, NodeState::Breakfixed, HistoryEventType::Breakfixed, agent)?;
        self.store.write_node(host_node);
        Ok(())
    }

    /// `removeRecursively`: legal source states are `{Provisioned, Failed,
    /// Parked}` for hosts; for children, `{Ready}` unless `recursive` is
    /// set, in which case `{Provisioned, Failed, Parked, Dirty, Ready}`. In
    /// a dynamic-provisioning cloud the record is deleted outright;
    /// otherwise it moves to `Deprovisioned` (§4.2).
    pub async fn remove_recursively(&self, hostname: &str, recursive: bool, agent: &Agent) -> Result<()> {
        let (node, _lock) = self.lock_and_get(hostname).await?;
        let allowed: &[NodeState] = if node.node_type.is_host() {
            &[NodeState::Provisioned, NodeState::Failed, NodeState::Parked]
        } else if recursive {
            &[NodeState::Provisioned, NodeState::Failed, NodeState::Parked, NodeState::Dirty, NodeState::Ready]
        } else {
            &[NodeState::Ready]
        };
        if !allowed.contains(&node.state) {
            return Err(ControlPlaneError::invariant(
                "removeRecursively requires an allowed source state",
                format!("{} is {:?}", hostname, node.state),
            ));
        }

        if recursive && node.node_type.is_host() {
            for child in self.store.children_of(hostname) {
                Box::pin(self.remove_recursively(&child.hostname, true, agent)).await?;
            }
        }

        if self.dynamic_provisioning {
            self.store.remove_nodes(std::slice::from_ref(&hostname.to_string()));
        } else {
            let (mut node, _lock) = self.lock_and_get(hostname).await?;
            Self::apply_transition(&mut node, NodeState::Deprovisioned, HistoryEventType::Deprovisioned, agent)?;
            self.store.write_node(node);
        }
        Ok(())
    }

    /// `forget`: permitted only when state is `Deprovisioned` and
    /// `wantToRebuild` is false.
    pub fn forget(&self, hostname: &str) -> Result<()> {
        let node = self
            .store
            .read_node(hostname)
            .ok_or_else(|| ControlPlaneError::not_found("node", hostname))?;
        if node.state != NodeState::Deprovisioned {
            return Err(ControlPlaneError::invariant("forget requires deprovisioned", hostname.to_string()));
        }
        if node.status.want_to_rebuild {
            return Err(ControlPlaneError::invariant("forget refused while wantToRebuild", hostname.to_string()));
        }
        self.store.remove_nodes(std::slice::from_ref(&hostname.to_string()));
        Ok(())
    }

    pub async fn reactivate(&self, hostname: &str, agent: &Agent) -> Result<()> {
        let (mut node, _lock) = self.lock_and_get(hostname).await?;
        self.require_membership_exclusivity(&node)?;
        Self::apply_transition(&mut node, NodeState::Active, HistoryEventType::Activated, agent)?;
        self.store.write_node(node);
        Ok(())
    }

    /// `markAvailableForNewAllocation`: removes container-type nodes from
    /// the repository instead of readying them; for hosts, refuses if the
    /// host carries hard failure reasons (modeled here as `fail_count > 0`
    /// while still `Failed`). A host reaches this from `Failed` or `Parked`,
    /// neither of which has a direct edge to `Ready` in the main lifecycle
    /// diagram, so it goes through `Dirty` first, the same as any other
    /// `Failed`/`Parked` node returning to the pool.
    pub async fn mark_available_for_new_allocation(&self, hostname: &str) -> Result<()> {
        let (mut node, _lock) = self.lock_and_get(hostname).await?;
        if node.node_type == NodeType::Host {
            if node.state == NodeState::Failed && node.status.fail_count > 0 {
                return Err(ControlPlaneError::invariant(
                    "host has hard failure reasons",
                    hostname.to_string(),
                ));
            }
            if matches!(node.state, NodeState::Failed | NodeState::Parked) {
                Self::apply_transition(&mut node, NodeState::Dirty, HistoryEventType::Deactivated, &Agent::System)?;
            }
            Self::apply_transition(&mut node, NodeState::Ready, HistoryEventType::Readied, &Agent::System)?;
            self.store.write_node(node);
        } else {
            self.store.remove_nodes(std::slice::from_ref(&hostname.to_string()));
        }
        Ok(())
    }

    pub fn node_history(&self, hostname: &str) -> Option<Vec<crate::model::HistoryEvent>> {
        self.store.read_node(hostname).map(|n| n.history)
    }

    pub fn count_by_state(&self) -> std::collections::BTreeMap<NodeState, usize> {
        crate::model::count_by_state(self.store.read_nodes(None).into_iter().map(|n| n.state))
    }

    pub fn set_firmware_verified_at(&self, hostname: &str, instant: chrono::DateTime<Utc>) -> Result<()> {
        let mut node = self
            .store
            .read_node(hostname)
            .ok_or_else(|| ControlPlaneError::not_found("node", hostname))?;
        node.status.firmware_verified_at = Some(instant);
        self.store.write_node(node);
        Ok(())
    }

    pub fn increment_fail_count(&self, hostname: &str) -> Result<u32> {
        let mut node = self
            .store
            .read_node(hostname)
            .ok_or_else(|| ControlPlaneError::not_found("node", hostname))?;
        node.status.fail_count += 1;
        let count = node.status.fail_count;
        self.store.write_node(node);
        Ok(count)
    }

    pub fn reset_fail_count(&self, hostname: &str) -> Result<()> {
        let mut node = self
            .store
            .read_node(hostname)
            .ok_or_else(|| ControlPlaneError::not_found("node", hostname))?;
        node.status.fail_count = 0;
        self.store.write_node(node);
        Ok(())
    }

    /// `isWorking()`: false iff more than 20% of >= 6 active nodes are
    /// down, per the orchestrator's status oracle (§4.2).
    pub async fn is_working(&self, orchestrator: &dyn crate::external::Orchestrator) -> Result<bool> {
        let active: Vec<Node> = self.store.read_nodes(Some(&[NodeState::Active])).into_iter().collect();
        if active.len() < 6 {
            return Ok(true);
        }
        let mut down = 0usize;
        for node in &active {
            // Orchestrator unreachability is treated as "not suspended"
            // for allocation purposes (§4.2) — a transient error here
            // counts the node as up, never as down.
            if orchestrator.is_suspended(&node.hostname).await.unwrap_or(false) {
                down += 1;
            }
        }
        Ok((down as f64) / (active.len() as f64) <= 0.20)
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }
}

/// Small helper exposed for callers that want the bounded-retry behaviour
/// of `lockAndGet` without going through a higher-level operation.
pub fn retry_budget() -> Duration {
    Duration::from_millis(50)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Allocation, NodeType};

    fn allocation() -> Allocation {
        Allocation {
            owner: "tenant-a".into(),
            cluster: "default".into(),
            membership_index: 0,
            removable: false,
            restart_generation: 0,
            retired: false,
        }
    }

    #[test]
    fn add_reserved_nodes_rejects_missing_parent() {
        let store = Arc::new(Store::new());
        let manager = NodeLifecycleManager::new(store, false, false);
        let child = Node::new("tenant1.host1.example", NodeType::Tenant, NodeState::Provisioned)
            .with_parent("host1.example")
            .with_allocation(allocation());
        let err = manager.add_reserved_nodes(vec![child]).unwrap_err();
        assert!(matches!(err, ControlPlaneError::InvariantViolation(_)));
    }

    #[test]
    fn add_reserved_nodes_accepts_existing_parent() {
        let store = Arc::new(Store::new());
        store.write_node(Node::new("host1.example", NodeType::Host, NodeState::Active));
        let manager = NodeLifecycleManager::new(store, false, false);
        let child = Node::new("tenant1.host1.example", NodeType::Tenant, NodeState::Provisioned)
            .with_parent("host1.example")
            .with_allocation(allocation());
        manager.add_reserved_nodes(vec![child]).unwrap();
    }

    #[test]
    fn add_nodes_rejects_child_whose_parent_is_absent_from_store_and_batch() {
        let store = Arc::new(Store::new());
        let manager = NodeLifecycleManager::new(store, false, false);
        let child = Node::new("tenant1.host1.example", NodeType::Tenant, NodeState::Provisioned)
            .with_parent("host1.example");
        let err = manager.add_nodes(vec![child], &Agent::System).unwrap_err();
        assert!(matches!(err, ControlPlaneError::InvariantViolation(_)));
    }

    #[test]
    fn add_nodes_accepts_host_and_child_provisioned_in_the_same_batch() {
        let store = Arc::new(Store::new());
        let manager = NodeLifecycleManager::new(store, false, false);
        let host = Node::new("host1.example", NodeType::Host, NodeState::Provisioned);
        let child = Node::new("tenant1.host1.example", NodeType::Tenant, NodeState::Provisioned)
            .with_parent("host1.example");
        manager.add_nodes(vec![host, child], &Agent::System).unwrap();
    }

    /// §4.2: a host's allowed `removeRecursively` source states include
    /// `Provisioned` on a non-dynamic-provisioning cloud, even though
    /// `Provisioned -> Deprovisioned` is not part of the main lifecycle
    /// diagram.
    #[tokio::test]
    async fn remove_recursively_deprovisions_a_provisioned_host_on_a_static_cloud() {
        let store = Arc::new(Store::new());
        let manager = NodeLifecycleManager::new(store.clone(), false, false);
        store.write_node(Node::new("host1.example", NodeType::Host, NodeState::Provisioned));

        manager.remove_recursively("host1.example", false, &Agent::System).await.unwrap();
        assert_eq!(store.read_node("host1.example").unwrap().state, NodeState::Deprovisioned);
    }

    /// Recursive removal on a static cloud also deprovisions `Ready`/`Dirty`
    /// children, then the host itself.
    #[tokio::test]
    async fn remove_recursively_removes_ready_children_then_the_host() {
        let store = Arc::new(Store::new());
        let manager = NodeLifecycleManager::new(store.clone(), false, false);
        store.write_node(Node::new("host1.example", NodeType::Host, NodeState::Failed));
        store.write_node(Node::new("tenant1.host1.example", NodeType::Tenant, NodeState::Ready).with_parent("host1.example"));

        manager.remove_recursively("host1.example", true, &Agent::System).await.unwrap();
        assert_eq!(store.read_node("tenant1.host1.example").unwrap().state, NodeState::Deprovisioned);
        assert_eq!(store.read_node("host1.example").unwrap().state, NodeState::Deprovisioned);
    }

    /// On a dynamic-provisioning cloud the record is deleted outright rather
    /// than moved to `Deprovisioned`.
    #[tokio::test]
    async fn remove_recursively_deletes_the_record_under_dynamic_provisioning() {
        let store = Arc::new(Store::new());
        let manager = NodeLifecycleManager::new(store.clone(), true, false);
        store.write_node(Node::new("host1.example", NodeType::Host, NodeState::Failed));

        manager.remove_recursively("host1.example", false, &Agent::System).await.unwrap();
        assert!(store.read_node("host1.example").is_none());
    }

    /// §4.2: `markAvailableForNewAllocation` readies a host with no hard
    /// failure reasons (`fail_count == 0`), going through `Dirty` since
    /// `Failed -> Ready` is not a direct edge.
    #[tokio::test]
    async fn mark_available_for_new_allocation_readies_a_failed_host_with_no_hard_failures() {
        let store = Arc::new(Store::new());
        let manager = NodeLifecycleManager::new(store.clone(), false, false);
        store.write_node(Node::new("host1.example", NodeType::Host, NodeState::Failed));

        manager.mark_available_for_new_allocation("host1.example").await.unwrap();
        assert_eq!(store.read_node("host1.example").unwrap().state, NodeState::Ready);
    }

    #[tokio::test]
    async fn mark_available_for_new_allocation_refuses_a_host_with_hard_failures() {
        let store = Arc::new(Store::new());
        let manager = NodeLifecycleManager::new(store.clone(), false, false);
        let mut host = Node::new("host1.example", NodeType::Host, NodeState::Failed);
        host.status.fail_count = 1;
        store.write_node(host);

        let err = manager.mark_available_for_new_allocation("host1.example").await.unwrap_err();
        assert!(matches!(err, ControlPlaneError::InvariantViolation(_)));
    }

    /// Container-type (non-host) nodes are removed from the repository
    /// instead of readied.
    #[tokio::test]
    async fn mark_available_for_new_allocation_removes_container_nodes() {
        let store = Arc::new(Store::new());
        let manager = NodeLifecycleManager::new(store.clone(), false, false);
        store.write_node(Node::new("tenant1.example", NodeType::Tenant, NodeState::Failed));

        manager.mark_available_for_new_allocation("tenant1.example").await.unwrap();
        assert!(store.read_node("tenant1.example").is_none());
    }

    /// `reactivate` brings a `Parked` (or `Failed`) node straight back to
    /// `Active`, subject to the same membership-exclusivity check as
    /// `activate`.
    #[tokio::test]
    async fn reactivate_returns_a_parked_node_to_active() {
        let store = Arc::new(Store::new());
        let manager = NodeLifecycleManager::new(store.clone(), false, false);
        let mut node = Node::new("n1.example", NodeType::Tenant, NodeState::Parked);
        node.allocation = Some(allocation());
        store.write_node(node);

        manager.reactivate("n1.example", &Agent::System).await.unwrap();
        assert_eq!(store.read_node("n1.example").unwrap().state, NodeState::Active);
    }

    /// §4.2: `breakfixRecursively` is only legal on a non-dynamic cloud, for
    /// a `Failed`/`Parked` host; it removes all children before moving the
    /// host to `Breakfixed`.
    #[tokio::test]
    async fn breakfix_recursively_removes_children_then_breakfixes_the_host() {
        let store = Arc::new(Store::new());
        let manager = NodeLifecycleManager::new(store.clone(), false, false);
        store.write_node(Node::new("host1.example", NodeType::Host, NodeState::Failed));
        store.write_node(Node::new("tenant1.host1.example", NodeType::Tenant, NodeState::Dirty).with_parent("host1.example"));

        manager.breakfix_recursively("host1.example", &Agent::System).await.unwrap();
        assert!(store.read_node("tenant1.host1.example").is_none());
        assert_eq!(store.read_node("host1.example").unwrap().state, NodeState::Breakfixed);
    }

    #[tokio::test]
    async fn breakfix_recursively_is_unavailable_under_dynamic_provisioning() {
        let store = Arc::new(Store::new());
        let manager = NodeLifecycleManager::new(store.clone(), true, false);
        store.write_node(Node::new("host1.example", NodeType::Host, NodeState::Failed));

        let err = manager.breakfix_recursively("host1.example", &Agent::System).await.unwrap_err();
        assert!(matches!(err, ControlPlaneError::InvariantViolation(_)));
    }

    /// §4.2: `forget` succeeds on a `Deprovisioned` node with
    /// `wantToRebuild` false, removing its record entirely.
    #[test]
    fn forget_removes_a_deprovisioned_node() {
        let store = Arc::new(Store::new());
        let manager = NodeLifecycleManager::new(store.clone(), false, false);
        store.write_node(Node::new("n1.example", NodeType::Tenant, NodeState::Deprovisioned));

        manager.forget("n1.example").unwrap();
        assert!(store.read_node("n1.example").is_none());
    }

    #[test]
    fn forget_refuses_while_want_to_rebuild_is_set() {
        let store = Arc::new(Store::new());
        let manager = NodeLifecycleManager::new(store.clone(), false, false);
        let mut node = Node::new("n1.example", NodeType::Tenant, NodeState::Deprovisioned);
        node.status.want_to_rebuild = true;
        store.write_node(node);

        let err = manager.forget("n1.example").unwrap_err();
        assert!(matches!(err, ControlPlaneError::InvariantViolation(_)));
    }
}
