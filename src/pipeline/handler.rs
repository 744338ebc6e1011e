//! The step-handler seam (§4.4: "the handler is external to this
//! component"). The runner only knows how to sequence steps and interpret
//! their outcomes — what a step actually does (talk to the config server,
//! the orchestrator, the tester) lives behind this trait.

use async_trait::async_trait;

use crate::model::{Run, Step};

/// What dispatching one step produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step completed; the runner marks it `succeeded` and advances.
    Success,
    /// A transient condition (store contention, a slow orchestrator) — the
    /// step stays `unfinished` and the runner backs off before retrying
    /// (§4.4: "Retry-on-transient-error ... leaves the step unfinished").
    Retry,
    /// The step is done for good and the run must take the mapped terminal
    /// status.
    Failed(FailureKind),
}

/// The terminal run statuses a failed step can map onto (§4.4, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    OutOfCapacity,
    EndpointCertificateTimeout,
    /// Covers both genuine deployment errors and the invalid-JVM-options
    /// path noted as an open question in the design notes: that path is
    /// resolved as terminal-permanent, which is exactly what this variant
    /// already is — it is never retried by the runner.
    DeploymentFailed,
    InstallationFailed,
    TestFailure,
    Error,
}

impl FailureKind {
    pub fn into_run_status(self) -> crate::model::RunStatus {
        use crate::model::RunStatus;
        match self {
            FailureKind::OutOfCapacity => RunStatus::OutOfCapacity,
            FailureKind::EndpointCertificateTimeout => RunStatus::EndpointCertificateTimeout,
            FailureKind::DeploymentFailed => RunStatus::DeploymentFailed,
            FailureKind::InstallationFailed => RunStatus::InstallationFailed,
            FailureKind::TestFailure => RunStatus::TestFailure,
            FailureKind::Error => RunStatus::Error,
        }
    }
}

/// Executes one step of one run. Implementations talk to whatever external
/// collaborator that step needs; the runner never calls them directly
/// (§6).
#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn execute(&self, run: &Run, step: Step) -> StepOutcome;
}

/// A handler that succeeds every step immediately, with no side effects —
/// used by tests that exercise the runner's sequencing rather than any
/// particular step's behavior, and by dry runs of steps flagged
/// destructive (§4.4: "avoid side-effects flagged as destructive").
pub struct NoopStepHandler;

#[async_trait]
impl StepHandler for NoopStepHandler {
    async fn execute(&self, _run: &Run, _step: Step) -> StepOutcome {
        StepOutcome::Success
    }
}
