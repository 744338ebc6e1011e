//! Routing Policy Reconciler (§4.3).

pub mod diff;
pub mod reconciler;

pub use diff::{diff, ApplicationEndpointSpec, ReconcileInput, ReconcileOutput};
pub use reconciler::RoutingPolicyReconciler;
