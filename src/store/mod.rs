//! Coordination Store Client (§4.1).
//!
//! Ordered, lock-scoped key-value access backing all durable state. Exposes
//! named mutexes, transactional multi-write, and (via [`memory::Store`]) the
//! one concrete backing implementation the core ships.

pub mod locks;
pub mod memory;
pub mod txn;

pub use locks::{ApplicationLock, DeployerLock, LockRegistry, ProbeToken, RoutingPoliciesLock, UnallocatedLock};
pub use memory::Store;
pub use txn::Transaction;
