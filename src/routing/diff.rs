//! Pure diff computation for the Routing Policy Reconciler (§4.3).
//!
//! Kept free of store/forwarder/config-server I/O so the three record
//! layers, the configured-out predicate, and the NXDOMAIN-safety rule can
//! be tested as plain functions — [`super::reconciler`] is the thin layer
//! that feeds this from, and writes its output back to, the outside world.

use std::collections::{HashMap, HashSet};

use crate::forwarder::{DnsChangeRequest, Priority};
use crate::model::{
    Endpoint, LatencyTarget, LoadBalancer, PolicyStatus, RoutingPolicy, RoutingPolicyId,
    RoutingStatus, WeightedTarget, ZoneRoutingPolicy,
};

/// One endpoint declared in the application's deployment spec (§3:
/// "application-scoped endpoints").
#[derive(Debug, Clone)]
pub struct ApplicationEndpointSpec {
    pub id: String,
    pub dns_name: String,
    pub region: String,
}

/// Everything the reconciler observed for one application in one pass.
pub struct ReconcileInput {
    pub application: String,
    pub cluster: String,
    /// Load balancers the config server reports, per zone.
    pub load_balancers_by_zone: HashMap<String, Vec<LoadBalancer>>,
    pub inactive_zones: HashSet<String>,
    pub existing_policies: Vec<RoutingPolicy>,
    pub zone_routing_policies: HashMap<String, ZoneRoutingPolicy>,
    pub application_endpoints: Vec<ApplicationEndpointSpec>,
}

pub struct ReconcileOutput {
    pub policies_to_write: Vec<RoutingPolicy>,
    pub policies_to_remove: Vec<RoutingPolicyId>,
    pub dns_requests: Vec<(DnsChangeRequest, Priority)>,
    pub global_endpoint: Option<Endpoint>,
    pub application_endpoints: Vec<Endpoint>,
}

fn zone_endpoint_dns(owner: &str, cluster: &str, zone: &str) -> String {
    format!("{}.{}.{}.zone.example", owner, cluster, zone)
}

fn region_endpoint_dns(owner: &str, cluster: &str, region: &str) -> String {
    format!("{}.{}.{}.region.example", owner, cluster, region)
}

fn global_endpoint_dns(owner: &str, cluster: &str) -> String {
    format!("{}.{}.global.example", owner, cluster)
}

/// §4.3 "Configured-out predicate".
fn is_configured_out(
    policy: &RoutingPolicy,
    zone_routing_policies: &HashMap<String, ZoneRoutingPolicy>,
    inactive_zones: &HashSet<String>,
) -> bool {
    let zone_out = zone_routing_policies
        .get(&policy.id.zone)
        .map(|z| z.routing_status == RoutingStatus::Out)
        .unwrap_or(false);
    let policy_out = policy.status.routing_status == RoutingStatus::Out;
    let zone_inactive = inactive_zones.contains(&policy.id.zone);
    zone_out || policy_out || zone_inactive
}

/// §4.3 NXDOMAIN-safety rule: "If after classification every target for a
/// given endpoint is inactive, the reconciler promotes the inactive set to
/// active for that endpoint." Per the design-notes open question, this
/// never fires on a genuinely empty target list — only on an all-zero one.
fn apply_nxdomain_safety(targets: &mut [WeightedTarget]) {
    if !targets.is_empty() && targets.iter().all(|t| t.weight == 0) {
        for t in targets.iter_mut() {
            t.weight = 1;
        }
    }
}

fn live_canonical_name(load_balancers: &[LoadBalancer]) -> Option<&str> {
    load_balancers
        .iter()
        .find(|lb| lb.state.is_live())
        .and_then(|lb| lb.hostname.as_deref())
}

/// The whole reconciliation pass for one application, as a pure function of
/// its inputs.
pub fn diff(input: &ReconcileInput) -> ReconcileOutput {
    let mut policies_to_write = Vec::new();
    let mut policies_to_remove = Vec::new();
    let mut dns_requests = Vec::new();
    let mut live_zones = HashSet::new();

    for (zone, lbs) in &input.load_balancers_by_zone {
        let id = RoutingPolicyId::new(&input.application, &input.cluster, zone.clone());
        let Some(canonical_name) = live_canonical_name(lbs) else { continue };
        live_zones.insert(zone.clone());

        let mut policy = input
            .existing_policies
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .unwrap_or_else(|| RoutingPolicy::new(id.clone()));
        policy.canonical_name = Some(canonical_name.to_string());
        policy.dns_zone = Some(zone.clone());

        dns_requests.push((
            DnsChangeRequest::CreateCname {
                name: zone_endpoint_dns(&input.application, &input.cluster, zone),
                data: canonical_name.to_string(),
            },
            Priority::Normal,
        ));
        policies_to_write.push(policy);
    }

    for existing in &input.existing_policies {
        if live_zones.contains(&existing.id.zone) {
            continue;
        }
        if existing.referenced_by_endpoint() {
            // Can't remove — invariant 6 keeps it around, contributing no
            // weight because it is no longer backed by any load balancer.
            continue;
        }
        policies_to_remove.push(existing.id.clone());
        dns_requests.push((
            DnsChangeRequest::RemoveRecords {
                record_type: "CNAME".to_string(),
                name: zone_endpoint_dns(&input.application, &input.cluster, &existing.id.zone),
                data: None,
            },
            Priority::Normal,
        ));
    }

    // Group surviving policies by region to build region-weighted aliases.
    let mut by_region: HashMap<String, Vec<WeightedTarget>> = HashMap::new();
    for policy in &policies_to_write {
        let weight = if is_configured_out(policy, &input.zone_routing_policies, &input.inactive_zones) { 0 } else { 1 };
        let canonical_name = match &policy.canonical_name {
            Some(name) => name.clone(),
            None => continue,
        };
        by_region.entry(policy.id.region().to_string()).or_default().push(WeightedTarget {
            zone: policy.id.zone.clone(),
            canonical_name,
            weight,
        });
    }

    let mut latency_targets = Vec::new();
    for (region, mut targets) in by_region {
        apply_nxdomain_safety(&mut targets);
        let region_dns = region_endpoint_dns(&input.application, &input.cluster, &region);
        let live_names: Vec<String> = targets.iter().filter(|t| t.weight > 0).map(|t| t.canonical_name.clone()).collect();
        if !live_names.is_empty() {
            dns_requests.push((
                DnsChangeRequest::CreateAlias { name: region_dns.clone(), targets: live_names },
                Priority::Normal,
            ));
        }
        latency_targets.push(LatencyTarget { region, zone_targets: targets });
    }
    latency_targets.sort_by(|a, b| a.region.cmp(&b.region));

    let global_endpoint = if latency_targets.is_empty() {
        None
    } else {
        let global_dns = global_endpoint_dns(&input.application, &input.cluster);
        let active_region_names: Vec<String> = latency_targets
            .iter()
            .filter(|t| t.is_active())
            .map(|t| region_endpoint_dns(&input.application, &input.cluster, &t.region))
            .collect();
        if !active_region_names.is_empty() {
            dns_requests.push((
                DnsChangeRequest::CreateAlias { name: global_dns.clone(), targets: active_region_names },
                Priority::Normal,
            ));
        }
        Some(Endpoint::Global { dns_name: global_dns, targets: latency_targets })
    };

    let mut application_endpoints = Vec::new();
    for spec in &input.application_endpoints {
        let mut targets: Vec<WeightedTarget> = policies_to_write
            .iter()
            .filter(|p| p.id.region() == spec.region)
            .filter_map(|p| {
                let canonical_name = p.canonical_name.clone()?;
                let weight = if is_configured_out(p, &input.zone_routing_policies, &input.inactive_zones) { 0 } else { 1 };
                Some(WeightedTarget { zone: p.id.zone.clone(), canonical_name, weight })
            })
            .collect();
        apply_nxdomain_safety(&mut targets);

        let live_names: Vec<String> = targets.iter().filter(|t| t.weight > 0).map(|t| t.canonical_name.clone()).collect();
        if !live_names.is_empty() {
            dns_requests.push((
                DnsChangeRequest::CreateAlias { name: spec.dns_name.clone(), targets: live_names },
                Priority::Normal,
            ));
        }
        application_endpoints.push(Endpoint::Application {
            id: spec.id.clone(),
            dns_name: spec.dns_name.clone(),
            targets,
        });
    }

    ReconcileOutput {
        policies_to_write,
        policies_to_remove,
        dns_requests,
        global_endpoint,
        application_endpoints,
    }
}

/// Apply a single operator override to one policy's status in place,
/// returning whether anything changed (§4.3: `setRoutingStatus(deployment,
/// value, agent)`).
pub fn set_policy_routing_status(policy: &mut RoutingPolicy, value: RoutingStatus, agent: &str, at: chrono::DateTime<chrono::Utc>) {
    policy.status = PolicyStatus { active: policy.status.active, routing_status: value, agent: agent.to_string(), at };
}
