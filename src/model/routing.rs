//! RoutingPolicy, ZoneRoutingPolicy, and the derived Endpoint hierarchy (§3).
//!
//! The source's deep class hierarchy for endpoint kinds is recast, per §9,
//! as a tagged enum with shared operations rather than a trait object tree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoutingStatus {
    In,
    Out,
}

impl Default for RoutingStatus {
    fn default() -> Self {
        RoutingStatus::In
    }
}

/// Operator-set status on a single policy, carrying who set it and when.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyStatus {
    pub active: bool,
    pub routing_status: RoutingStatus,
    pub agent: String,
    pub at: DateTime<Utc>,
}

impl Default for PolicyStatus {
    fn default() -> Self {
        PolicyStatus {
            active: true,
            routing_status: RoutingStatus::In,
            agent: "system".to_string(),
            at: Utc::now(),
        }
    }
}

/// Identity of a routing policy: `(owner, cluster, zone)` (§3). Exactly one
/// policy exists per id (invariant).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoutingPolicyId {
    pub owner: String,
    pub cluster: String,
    pub zone: String,
}

impl RoutingPolicyId {
    pub fn new(owner: impl Into<String>, cluster: impl Into<String>, zone: impl Into<String>) -> Self {
        RoutingPolicyId {
            owner: owner.into(),
            cluster: cluster.into(),
            zone: zone.into(),
        }
    }

    /// Region is everything before the last `.` of the zone string in this
    /// core's zone naming (`environment.region`).
    pub fn region(&self) -> &str {
        self.zone.splitn(2, '.').nth(1).unwrap_or(&self.zone)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingPolicy {
    pub id: RoutingPolicyId,
    pub canonical_name: Option<String>,
    pub dns_zone: Option<String>,
    pub instance_endpoint_ids: Vec<String>,
    pub application_endpoint_ids: Vec<String>,
    pub status: PolicyStatus,
}

impl RoutingPolicy {
    pub fn new(id: RoutingPolicyId) -> Self {
        RoutingPolicy {
            id,
            canonical_name: None,
            dns_zone: None,
            instance_endpoint_ids: Vec::new(),
            application_endpoint_ids: Vec::new(),
            status: PolicyStatus::default(),
        }
    }

    pub fn referenced_by_endpoint(&self) -> bool {
        !self.instance_endpoint_ids.is_empty() || !self.application_endpoint_ids.is_empty()
    }
}

/// Operator-level override at the zone scope (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneRoutingPolicy {
    pub zone: String,
    pub routing_status: RoutingStatus,
}

impl ZoneRoutingPolicy {
    pub fn in_service(zone: impl Into<String>) -> Self {
        ZoneRoutingPolicy {
            zone: zone.into(),
            routing_status: RoutingStatus::In,
        }
    }
}

/// One target contributing to a weighted/latency record, after NXDOMAIN
/// classification has assigned it a live/dead weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedTarget {
    pub zone: String,
    pub canonical_name: String,
    pub weight: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyTarget {
    pub region: String,
    pub zone_targets: Vec<WeightedTarget>,
}

impl LatencyTarget {
    /// "A region endpoint is *active* iff any of its zone targets has
    /// weight > 0" (§4.3).
    pub fn is_active(&self) -> bool {
        self.zone_targets.iter().any(|t| t.weight > 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointScope {
    Zone,
    Region,
    Global,
    Application,
}

/// The derived Endpoint hierarchy, recast as a tagged enum (§9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Endpoint {
    Zone {
        id: RoutingPolicyId,
        dns_name: String,
        canonical_name: String,
    },
    Region {
        region: String,
        dns_name: String,
        targets: Vec<WeightedTarget>,
    },
    Global {
        dns_name: String,
        targets: Vec<LatencyTarget>,
    },
    Application {
        id: String,
        dns_name: String,
        targets: Vec<WeightedTarget>,
    },
}

impl Endpoint {
    pub fn dns_name(&self) -> &str {
        match self {
            Endpoint::Zone { dns_name, .. } => dns_name,
            Endpoint::Region { dns_name, .. } => dns_name,
            Endpoint::Global { dns_name, .. } => dns_name,
            Endpoint::Application { dns_name, .. } => dns_name,
        }
    }

    pub fn scope(&self) -> EndpointScope {
        match self {
            Endpoint::Zone { .. } => EndpointScope::Zone,
            Endpoint::Region { .. } => EndpointScope::Region,
            Endpoint::Global { .. } => EndpointScope::Global,
            Endpoint::Application { .. } => EndpointScope::Application,
        }
    }

    /// Whether at least one target currently carries positive weight.
    pub fn has_active_target(&self) -> bool {
        match self {
            Endpoint::Zone { .. } => true,
            Endpoint::Region { targets, .. } => targets.iter().any(|t| t.weight > 0),
            Endpoint::Global { targets, .. } => targets.iter().any(|t| t.is_active()),
            Endpoint::Application { targets, .. } => targets.iter().any(|t| t.weight > 0),
        }
    }
}
