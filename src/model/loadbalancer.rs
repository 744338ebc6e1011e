//! LoadBalancer entity (§3).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadBalancerState {
    Reserved,
    Active,
    Inactive,
    Removable,
}

impl LoadBalancerState {
    /// "A load balancer in reserved or active is treated as live for
    /// routing purposes" (§3).
    pub fn is_live(self) -> bool {
        matches!(self, LoadBalancerState::Reserved | LoadBalancerState::Active)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadBalancer {
    pub application: String,
    pub cluster: String,
    pub zone: String,
    pub hostname: Option<String>,
    pub dns_zone: Option<String>,
    pub state: LoadBalancerState,
}

impl LoadBalancer {
    pub fn key(&self) -> (String, String, String) {
        (self.application.clone(), self.cluster.clone(), self.zone.clone())
    }
}
