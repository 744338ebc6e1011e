//! Meridian control plane core.
//!
//! Three reconciliation engines share one coordination store, one
//! serialization discipline, and one idempotent DNS-forwarding substrate:
//!
//! * [`nodes`] — the Node Lifecycle Manager, owning the node state machine
//!   and host/child allocation.
//! * [`routing`] — the Routing Policy Reconciler, deriving zone/region/
//!   global/application DNS records from live load balancers.
//! * [`pipeline`] — the Deployment Pipeline Runner, advancing each run's
//!   ordered step list.
//!
//! [`store`] is the coordination-store contract plus its one in-process
//! implementation; [`forwarder`] is the name-service request queue;
//! [`external`] holds the traits for every collaborator this core only
//! consumes (config server, cloud API, orchestrator, certificate provider,
//! archive bucket service); [`model`] is the shared durable data model;
//! [`serialization`] documents and tests the compatibility rules those
//! models are held to; [`config`] and [`metrics`] are the ambient stack
//! (typed configuration, Prometheus counters) every reconciler runs under.

pub mod config;
pub mod error;
pub mod external;
pub mod forwarder;
pub mod metrics;
pub mod model;
pub mod nodes;
pub mod pipeline;
pub mod routing;
pub mod serialization;
pub mod store;

pub use error::{ControlPlaneError, Result};
