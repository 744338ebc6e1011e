//! Wires [`super::diff::diff`] to the coordination store, the config
//! server, and the name-service forwarder (§4.3).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;

use crate::error::{ControlPlaneError, Result};
use crate::external::ConfigServer;
use crate::forwarder::NameServiceForwarder;
use crate::model::{LoadBalancer, LoadBalancerState, RoutingPolicyId, RoutingStatus, ZoneRoutingPolicy};
use crate::store::Store;

use super::diff::{diff, set_policy_routing_status, ApplicationEndpointSpec, ReconcileInput, ReconcileOutput};

pub struct RoutingPolicyReconciler {
    store: Arc<Store>,
    forwarder: Arc<NameServiceForwarder>,
}

impl RoutingPolicyReconciler {
    pub fn new(store: Arc<Store>, forwarder: Arc<NameServiceForwarder>) -> Self {
        RoutingPolicyReconciler { store, forwarder }
    }

    /// One full pass for one application: fetch live load balancers per
    /// zone from the config server, diff against stored policies, persist,
    /// and submit the resulting DNS change requests (§4.3).
    pub async fn reconcile(
        &self,
        config_server: &dyn ConfigServer,
        application: &str,
        cluster: &str,
        zones: &[String],
        inactive_zones: &HashSet<String>,
        application_endpoints: &[ApplicationEndpointSpec],
    ) -> Result<ReconcileOutput> {
        let started = std::time::Instant::now();
        let result = self.reconcile_inner(config_server, application, cluster, zones, inactive_zones, application_endpoints).await;
        let error_kind = result.as_ref().err().map(crate::metrics::error_kind_label);
        crate::metrics::track_pass("routing", started.elapsed(), error_kind);
        result
    }

    async fn reconcile_inner(
        &self,
        config_server: &dyn ConfigServer,
        application: &str,
        cluster: &str,
        zones: &[String],
        inactive_zones: &HashSet<String>,
        application_endpoints: &[ApplicationEndpointSpec],
    ) -> Result<ReconcileOutput> {
        let _lock = self.store.locks.lock_routing_policies().await;

        let mut load_balancers_by_zone = HashMap::new();
        for zone in zones {
            let lbs = config_server.get_load_balancers(application, zone).await?;
            load_balancers_by_zone.insert(zone.clone(), lbs);
        }

        let existing_policies = self.store.read_routing_policies(Some(application));
        let mut zone_routing_policies = HashMap::new();
        for zone in zones {
            if let Some(zrp) = self.store.read_zone_routing_policy(zone) {
                zone_routing_policies.insert(zone.clone(), zrp);
            }
        }

        let input = ReconcileInput {
            application: application.to_string(),
            cluster: cluster.to_string(),
            load_balancers_by_zone,
            inactive_zones: inactive_zones.clone(),
            existing_policies,
            zone_routing_policies,
            application_endpoints: application_endpoints.to_vec(),
        };

        let output = diff(&input);
        self.persist(application, &output);
        self.submit(&output);
        Ok(output)
    }

    fn persist(&self, application: &str, output: &ReconcileOutput) {
        let mut remaining: Vec<_> = self
            .store
            .read_routing_policies(Some(application))
            .into_iter()
            .filter(|p| !output.policies_to_remove.contains(&p.id))
            .collect();
        for written in &output.policies_to_write {
            remaining.retain(|p| p.id != written.id);
            remaining.push(written.clone());
        }
        self.store.write_routing_policies(application, remaining);
    }

    fn submit(&self, output: &ReconcileOutput) {
        for (request, priority) in &output.dns_requests {
            self.forwarder.submit(request.clone(), *priority);
        }
    }

    /// Recomputes region/global/application DNS state from whatever is
    /// already persisted, without consulting the config server again — used
    /// by the operator override entry points, which only change a status
    /// flag, not the underlying load-balancer set (§4.3: "re-derive every
    /// affected endpoint's DNS state in the same transaction").
    async fn rederive(&self, application: &str, cluster: &str) -> ReconcileOutput {
        let existing_policies: Vec<_> = self
            .store
            .read_routing_policies(Some(application))
            .into_iter()
            .filter(|p| p.id.cluster == cluster)
            .collect();

        let mut load_balancers_by_zone: HashMap<String, Vec<LoadBalancer>> = HashMap::new();
        let mut zone_routing_policies = HashMap::new();
        for policy in &existing_policies {
            if let Some(name) = &policy.canonical_name {
                load_balancers_by_zone.entry(policy.id.zone.clone()).or_default().push(LoadBalancer {
                    application: application.to_string(),
                    cluster: cluster.to_string(),
                    zone: policy.id.zone.clone(),
                    hostname: Some(name.clone()),
                    dns_zone: policy.dns_zone.clone(),
                    state: LoadBalancerState::Active,
                });
            }
            if let Some(zrp) = self.store.read_zone_routing_policy(&policy.id.zone) {
                zone_routing_policies.insert(policy.id.zone.clone(), zrp);
            }
        }

        let input = ReconcileInput {
            application: application.to_string(),
            cluster: cluster.to_string(),
            load_balancers_by_zone,
            inactive_zones: HashSet::new(),
            existing_policies,
            zone_routing_policies,
            application_endpoints: Vec::new(),
        };
        diff(&input)
    }

    /// `setRoutingStatus(zone, value)`: an operator-level override that
    /// applies to every policy in the zone, across every application.
    pub async fn set_zone_routing_status(&self, zone: &str, value: RoutingStatus) -> Result<Vec<ReconcileOutput>> {
        let _lock = self.store.locks.lock_routing_policies().await;
        self.store.write_zone_routing_policy(ZoneRoutingPolicy { zone: zone.to_string(), routing_status: value });

        let affected: HashSet<(String, String)> = self
            .store
            .read_routing_policies(None)
            .into_iter()
            .filter(|p| p.id.zone == zone)
            .map(|p| (p.id.owner.clone(), p.id.cluster.clone()))
            .collect();

        let mut outputs = Vec::new();
        for (application, cluster) in affected {
            let output = self.rederive(&application, &cluster).await;
            self.submit(&output);
            outputs.push(output);
        }
        Ok(outputs)
    }

    /// `setRoutingStatus(deployment, value, agent)`: overrides one policy's
    /// own status.
    pub async fn set_policy_routing_status(&self, id: &RoutingPolicyId, value: RoutingStatus, agent: &str) -> Result<ReconcileOutput> {
        let _lock = self.store.locks.lock_routing_policies().await;
        let mut policies = self.store.read_routing_policies(Some(&id.owner));
        let Some(policy) = policies.iter_mut().find(|p| &p.id == id) else {
            return Err(ControlPlaneError::not_found("routing policy", format!("{:?}", id)));
        };
        set_policy_routing_status(policy, value, agent, Utc::now());
        self.store.write_routing_policies(&id.owner, policies);

        let output = self.rederive(&id.owner, &id.cluster).await;
        self.submit(&output);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::fakes::FakeConfigServer;
    use crate::model::{LoadBalancer, LoadBalancerState};

    fn lb(application: &str, zone: &str, hostname: &str) -> LoadBalancer {
        LoadBalancer {
            application: application.to_string(),
            cluster: "default".to_string(),
            zone: zone.to_string(),
            hostname: Some(hostname.to_string()),
            dns_zone: Some(zone.to_string()),
            state: LoadBalancerState::Active,
        }
    }

    #[tokio::test]
    async fn happy_path_creates_zone_policy_and_global_endpoint() {
        let store = Arc::new(Store::new());
        let forwarder = Arc::new(NameServiceForwarder::new([]));
        let reconciler = RoutingPolicyReconciler::new(store.clone(), forwarder.clone());

        let config_server = FakeConfigServer::new();
        config_server.set_load_balancers("app-a", "prod.r1", vec![lb("app-a", "prod.r1", "lb1.example.net")]);

        let output = reconciler
            .reconcile(&config_server, "app-a", "default", &["prod.r1".to_string()], &HashSet::new(), &[])
            .await
            .unwrap();

        assert_eq!(output.policies_to_write.len(), 1);
        assert!(output.global_endpoint.is_some());
        assert!(!forwarder.is_empty());

        let stored = store.read_routing_policies(Some("app-a"));
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn set_routing_status_out_then_in_round_trips() {
        let store = Arc::new(Store::new());
        let forwarder = Arc::new(NameServiceForwarder::new([]));
        let reconciler = RoutingPolicyReconciler::new(store.clone(), forwarder.clone());

        let config_server = FakeConfigServer::new();
        config_server.set_load_balancers("app-a", "prod.r1", vec![lb("app-a", "prod.r1", "lb1.example.net")]);
        reconciler
            .reconcile(&config_server, "app-a", "default", &["prod.r1".to_string()], &HashSet::new(), &[])
            .await
            .unwrap();

        let id = RoutingPolicyId::new("app-a", "default", "prod.r1");
        let out = reconciler.set_policy_routing_status(&id, RoutingStatus::Out, "tester").await.unwrap();
        let weight = out.global_endpoint.as_ref().and_then(|e| match e {
            crate::model::Endpoint::Global { targets, .. } => Some(targets[0].zone_targets[0].weight),
            _ => None,
        });
        assert_eq!(weight, Some(1), "sole target must stay active under NXDOMAIN safety");

        reconciler.set_policy_routing_status(&id, RoutingStatus::In, "tester").await.unwrap();
        let stored = store.read_routing_policies(Some("app-a"));
        assert_eq!(stored[0].status.routing_status, RoutingStatus::In);
    }
}
