//! Named, re-entrant locks backing the coordination store (§4.1, §5).
//!
//! Re-entrancy is modeled with guard tokens rather than a recursive mutex:
//! a function that must already hold the application lock takes
//! `&ApplicationLock` as a parameter, so the type system proves the caller
//! holds it instead of a runtime recursion counter. The mandatory order
//! (application before unallocated; routing-policies independent) is
//! enforced by making [`LockRegistry::lock_application_then_unallocated`]
//! the only way to hold both at once.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Evidence that the caller holds the named application lock.
pub struct ApplicationLock {
    application: String,
    _guard: OwnedMutexGuard<()>,
}

impl ApplicationLock {
    pub fn application(&self) -> &str {
        &self.application
    }
}

/// Evidence that the caller holds the single unallocated-nodes lock.
pub struct UnallocatedLock {
    _guard: OwnedMutexGuard<()>,
}

/// Evidence that the caller holds the single routing-policies lock. Must
/// never be nested inside an `ApplicationLock` (§5 lock-order rule).
pub struct RoutingPoliciesLock {
    _guard: OwnedMutexGuard<()>,
}

/// Evidence that the caller holds the per-application deployer lock (used
/// by the pipeline runner so only one run per job advances at a time).
pub struct DeployerLock {
    application: String,
    _guard: OwnedMutexGuard<()>,
}

impl DeployerLock {
    pub fn application(&self) -> &str {
        &self.application
    }
}

/// A non-blocking read-only token for speculative computations. Carries no
/// guarantee of exclusivity — any caller that wants to commit a mutation
/// based on what it read under a probe must re-validate under a real lock
/// first (§4.1).
#[derive(Debug, Clone, Copy)]
pub struct ProbeToken {
    _private: (),
}

/// Registry of named mutexes keyed by application (or a handful of
/// singleton scopes). New named mutexes are created lazily on first use.
#[derive(Default)]
pub struct LockRegistry {
    application_locks: SyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    unallocated_lock: Arc<AsyncMutex<()>>,
    routing_policies_lock: Arc<AsyncMutex<()>>,
    deployer_locks: SyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        LockRegistry {
            application_locks: SyncMutex::new(HashMap::new()),
            unallocated_lock: Arc::new(AsyncMutex::new(())),
            routing_policies_lock: Arc::new(AsyncMutex::new(())),
            deployer_locks: SyncMutex::new(HashMap::new()),
        }
    }

    fn named(map: &SyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>, key: &str) -> Arc<AsyncMutex<()>> {
        map.lock()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    pub async fn lock_application(&self, application: &str) -> ApplicationLock {
        let mutex = Self::named(&self.application_locks, application);
        let guard = mutex.lock_owned().await;
        ApplicationLock {
            application: application.to_string(),
            _guard: guard,
        }
    }

    /// `lock(application, timeout)` from §4.1: bounded wait, surfaced as a
    /// `Transient` timeout rather than blocking forever.
    pub async fn lock_application_timeout(
        &self,
        application: &str,
        timeout: Duration,
    ) -> crate::error::Result<ApplicationLock> {
        let mutex = Self::named(&self.application_locks, application);
        match tokio::time::timeout(timeout, mutex.lock_owned()).await {
            Ok(guard) => Ok(ApplicationLock {
                application: application.to_string(),
                _guard: guard,
            }),
            Err(_) => Err(crate::error::ControlPlaneError::transient(format!(
                "lock(application={})",
                application
            ))),
        }
    }

    pub async fn lock_unallocated(&self) -> UnallocatedLock {
        UnallocatedLock {
            _guard: self.unallocated_lock.clone().lock_owned().await,
        }
    }

    pub async fn lock_routing_policies(&self) -> RoutingPoliciesLock {
        RoutingPoliciesLock {
            _guard: self.routing_policies_lock.clone().lock_owned().await,
        }
    }

    pub async fn lock_deployer(&self, application: &str) -> DeployerLock {
        let mutex = Self::named(&self.deployer_locks, application);
        DeployerLock {
            application: application.to_string(),
            _guard: mutex.lock_owned().await,
        }
    }

    /// The only sanctioned way to hold both the application and unallocated
    /// locks at once, always in this order (§5 lock-order rule).
    pub async fn lock_application_then_unallocated(
        &self,
        application: &str,
    ) -> (ApplicationLock, UnallocatedLock) {
        let app_lock = self.lock_application(application).await;
        let unallocated_lock = self.lock_unallocated().await;
        (app_lock, unallocated_lock)
    }

    /// Non-blocking probe: never waits, never denies. Exists so speculative
    /// reconciliation math can run ahead of a real lock acquisition.
    pub fn probe(&self) -> ProbeToken {
        ProbeToken { _private: () }
    }
}
