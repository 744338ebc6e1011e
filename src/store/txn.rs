//! The transaction object that composes multiple writes into one commit
//! (§2: "All writes that must be atomic with respect to readers go through
//! a transaction object the store composes into one commit").

use crate::model::{LoadBalancer, Node, RoutingPolicy, ZoneRoutingPolicy};

use super::memory::Tables;

type Mutation = Box<dyn FnOnce(&mut Tables) + Send>;

/// A buffered set of mutations applied atomically by [`super::memory::Store::commit`].
///
/// Keeps I/O and mutation at the edges: the
/// closures here never run until `commit`, so a caller can build up a
/// transaction speculatively and discard it without side effects. Every
/// builder method here touches `Tables` fields directly instead of calling
/// back through `Store`'s public (lock-acquiring) API — `commit` already
/// holds the single write guard these mutations run under.
#[derive(Default)]
pub struct Transaction {
    mutations: Vec<Mutation>,
}

impl Transaction {
    pub fn new() -> Self {
        Transaction { mutations: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn write_node(&mut self, node: Node) {
        self.mutations.push(Box::new(move |tables| {
            tables.nodes.insert(node.hostname.clone(), node);
        }));
    }

    pub fn remove_nodes(&mut self, hostnames: Vec<String>) {
        self.mutations.push(Box::new(move |tables| {
            for hostname in &hostnames {
                tables.nodes.remove(hostname);
            }
        }));
    }

    pub fn write_load_balancer(&mut self, lb: LoadBalancer) {
        self.mutations.push(Box::new(move |tables| {
            tables.load_balancers.insert(lb.key(), lb);
        }));
    }

    pub fn write_routing_policies(&mut self, owner: String, list: Vec<RoutingPolicy>) {
        self.mutations.push(Box::new(move |tables| {
            tables.routing_policies.retain(|id, _| id.owner != owner);
            for policy in list {
                tables.routing_policies.insert(policy.id.clone(), policy);
            }
        }));
    }

    pub fn write_zone_routing_policy(&mut self, policy: ZoneRoutingPolicy) {
        self.mutations.push(Box::new(move |tables| {
            tables.zone_routing_policies.insert(policy.zone.clone(), policy);
        }));
    }

    pub(super) fn into_mutations(self) -> Vec<Mutation> {
        self.mutations
    }
}

#[cfg(test)]
mod tests {
    use super::super::memory::Store;
    use super::*;
    use crate::model::{NodeState, NodeType};

    #[test]
    fn commit_applies_every_mutation_atomically() {
        let store = Store::new();
        let mut txn = Transaction::new();
        txn.write_node(Node::new("h1.example", NodeType::Tenant, NodeState::Provisioned));
        txn.write_node(Node::new("h2.example", NodeType::Tenant, NodeState::Provisioned));
        store.commit(txn);

        assert!(store.read_node("h1.example").is_some());
        assert!(store.read_node("h2.example").is_some());
    }
}
