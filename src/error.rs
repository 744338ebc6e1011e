//! Error taxonomy shared by every reconciler.
//!
//! One outer enum whose variants wrap small
//! context-carrying structs, plus hand-written `Display`/`Error` impls for
//! the variants that need formatted detail, and `derive_more`-driven
//! conversions for the mechanical ones.

use std::fmt;
use std::sync::PoisonError;
use std::time::Duration;

/// Error kind produced anywhere in the control plane core.
///
/// Every reconciler maps whatever underlying failure it hit onto one of
/// these. The mapping is what lets the pipeline runner turn a failed step
/// into the right run status, and what lets a reconciliation loop decide
/// whether to retry within the tick or let the tick end.
#[derive(Debug, derive_more::From)]
pub enum ControlPlaneError {
    /// Illegal state transition, duplicate hostname, broken lock order.
    /// Fatal for the request that raised it, never fatal for the process.
    InvariantViolation(InvariantViolation),
    /// Requested entity does not exist. Not retried by the core.
    NotFound(NotFound),
    /// Optimistic re-read under lock revealed a change since the probe.
    /// Retried a bounded number of times inside the core.
    Conflict(Conflict),
    /// Store unavailable, external API timeout, network error. Retried
    /// with exponential backoff up to a configured ceiling, then surfaced.
    Transient(Transient),
    /// External API returned a definitive error (quota exceeded,
    /// forbidden, ...). Surfaced immediately.
    Permanent(Permanent),
    /// Allocation cannot be satisfied.
    Capacity(Capacity),
}

#[derive(Debug)]
pub struct InvariantViolation {
    pub what: String,
    pub detail: String,
}

#[derive(Debug)]
pub struct NotFound {
    pub kind: &'static str,
    pub key: String,
}

#[derive(Debug)]
pub struct Conflict {
    pub operation: String,
    pub attempts: u32,
}

#[derive(Debug)]
pub struct Transient {
    pub operation: String,
    pub retry_after: Option<Duration>,
    pub source: Option<String>,
}

#[derive(Debug)]
pub struct Permanent {
    pub operation: String,
    pub reason: String,
}

#[derive(Debug)]
pub struct Capacity {
    pub group: String,
    pub wanted: usize,
    pub available: usize,
}

impl fmt::Display for ControlPlaneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlPlaneError::InvariantViolation(e) => {
                write!(f, "invariant violation: {} ({})", e.what, e.detail)
            }
            ControlPlaneError::NotFound(e) => write!(f, "{} not found: {}", e.kind, e.key),
            ControlPlaneError::Conflict(e) => {
                write!(f, "conflict during {} after {} attempts", e.operation, e.attempts)
            }
            ControlPlaneError::Transient(e) => {
                write!(f, "transient failure during {}", e.operation)?;
                if let Some(d) = e.retry_after {
                    write!(f, ", retry after {:?}", d)?;
                }
                Ok(())
            }
            ControlPlaneError::Permanent(e) => {
                write!(f, "permanent failure during {}: {}", e.operation, e.reason)
            }
            ControlPlaneError::Capacity(e) => write!(
                f,
                "out of capacity for {}: wanted {}, available {}",
                e.group, e.wanted, e.available
            ),
        }
    }
}

impl std::error::Error for ControlPlaneError {}

impl<T> From<PoisonError<T>> for ControlPlaneError {
    fn from(_: PoisonError<T>) -> Self {
        ControlPlaneError::InvariantViolation(InvariantViolation {
            what: "lock poisoned".to_string(),
            detail: "a lock was poisoned by a panicked holder".to_string(),
        })
    }
}

impl ControlPlaneError {
    pub fn invariant(what: impl Into<String>, detail: impl Into<String>) -> Self {
        ControlPlaneError::InvariantViolation(InvariantViolation {
            what: what.into(),
            detail: detail.into(),
        })
    }

    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        ControlPlaneError::NotFound(NotFound { kind, key: key.into() })
    }

    pub fn conflict(operation: impl Into<String>, attempts: u32) -> Self {
        ControlPlaneError::Conflict(Conflict {
            operation: operation.into(),
            attempts,
        })
    }

    pub fn transient(operation: impl Into<String>) -> Self {
        ControlPlaneError::Transient(Transient {
            operation: operation.into(),
            retry_after: None,
            source: None,
        })
    }

    pub fn capacity(group: impl Into<String>, wanted: usize, available: usize) -> Self {
        ControlPlaneError::Capacity(Capacity {
            group: group.into(),
            wanted,
            available,
        })
    }

    /// True for kinds the core is expected to retry on its own (§7).
    pub fn is_retryable(&self) -> bool {
        matches!(self, ControlPlaneError::Transient(_) | ControlPlaneError::Conflict(_))
    }
}

pub type Result<T> = std::result::Result<T, ControlPlaneError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = ControlPlaneError::capacity("tenant-a/default/r1", 3, 1);
        let text = format!("{}", err);
        assert!(text.contains("tenant-a/default/r1"));
        assert!(text.contains("3"));
        assert!(text.contains("1"));
    }

    #[test]
    fn retryable_kinds() {
        assert!(ControlPlaneError::transient("probe").is_retryable());
        assert!(ControlPlaneError::conflict("write", 2).is_retryable());
        assert!(!ControlPlaneError::not_found("node", "h1").is_retryable());
    }
}
