//! Durable entities and their invariants (§3).

pub mod loadbalancer;
pub mod node;
pub mod routing;
pub mod run;

pub use loadbalancer::{LoadBalancer, LoadBalancerState};
pub use node::{
    count_by_state, Allocation, HistoryEvent, HistoryEventType, IpConfig, Node, NodeState,
    NodeStatus, NodeType, Report,
};
pub use routing::{
    Endpoint, EndpointScope, LatencyTarget, PolicyStatus, RoutingPolicy, RoutingPolicyId,
    RoutingStatus, WeightedTarget, ZoneRoutingPolicy,
};
pub use run::{
    ConvergenceSummary, Run, RunId, RunStatus, SourceRevision, Step, StepInfo, StepStatus,
    VersionInfo, Versions,
};
