//! The Deployment Pipeline Runner (§4.4).
//!
//! One lock-scoped pass per call, advancing exactly one step, persisting, and returning —
//! callers drive the tick loop (see the `meridian-controller` binary).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::error::{ControlPlaneError, Result};
use crate::model::{Run, RunId, RunStatus, StepStatus};
use crate::store::Store;

use super::handler::{StepHandler, StepOutcome};

pub struct PipelineRunner {
    store: Arc<Store>,
    handler: Arc<dyn StepHandler>,
    backoff: Duration,
}

impl PipelineRunner {
    pub fn new(store: Arc<Store>, handler: Arc<dyn StepHandler>, backoff: Duration) -> Self {
        PipelineRunner { store, handler, backoff }
    }

    /// `self.backoff` plus up to 20% jitter, so a fleet of runs retrying
    /// after the same transient condition does not all wake up and retry
    /// in lockstep.
    fn jittered_backoff(&self) -> Duration {
        let jitter_range = self.backoff.as_millis() as f32 * 0.2;
        self.backoff + Duration::from_millis((rand::random::<f32>() * jitter_range) as u64)
    }

    /// `writeRun` for a newly-created run. The store itself enforces the
    /// "strictly increasing" and "at most one non-terminal" invariants.
    pub fn submit_run(&self, run: Run) -> Result<()> {
        self.store.write_run(run)
    }

    fn non_terminal_run(&self, application: &str, job_type: &str) -> Option<Run> {
        self.store
            .read_runs(application, job_type)
            .into_iter()
            .find(|r| !r.status.is_terminal())
    }

    fn finalize(run: &mut Run) {
        run.status = if run.is_aborting() { RunStatus::Aborted } else { RunStatus::Success };
        run.end = Some(Utc::now());
    }

    /// Advances the (application, jobType)'s current non-terminal run by at
    /// most one step (§5: "advances at most one step per run per tick").
    /// Returns the run id touched, or `None` if there was nothing to do.
    pub async fn advance(&self, application: &str, job_type: &str) -> Result<Option<RunId>> {
        let _lock = self.store.locks.lock_deployer(application).await;

        let Some(mut run) = self.non_terminal_run(application, job_type) else {
            return Ok(None);
        };

        if let Some(sleeping_until) = run.sleeping_until {
            if Utc::now() < sleeping_until {
                return Ok(Some(run.id));
            }
        }

        let Some(step) = run.first_unfinished_step() else {
            Self::finalize(&mut run);
            crate::metrics::track_run_termination(job_type, &format!("{:?}", run.status));
            let id = run.id.clone();
            self.store.write_run(run)?;
            return Ok(Some(id));
        };

        {
            let info = run.steps.get_mut(&step).expect("Run::new populates every Step::ALL entry");
            if info.start_time.is_none() {
                info.start_time = Some(Utc::now());
            }
        }

        let outcome = self.handler.execute(&run, step).await;
        match outcome {
            StepOutcome::Success => {
                run.steps.get_mut(&step).unwrap().status = StepStatus::Succeeded;
                run.sleeping_until = None;
                if run.first_unfinished_step().is_none() {
                    Self::finalize(&mut run);
                }
            }
            StepOutcome::Retry => {
                run.sleeping_until = Some(Utc::now() + chrono::Duration::from_std(self.jittered_backoff()).unwrap_or_default());
            }
            StepOutcome::Failed(kind) => {
                run.steps.get_mut(&step).unwrap().status = StepStatus::Failed;
                run.status = kind.into_run_status();
                run.end = Some(Utc::now());
            }
        }

        if run.status.is_terminal() {
            crate::metrics::track_run_termination(job_type, &format!("{:?}", run.status));
        }
        let id = run.id.clone();
        self.store.write_run(run)?;
        Ok(Some(id))
    }

    /// Aborting is legal "from any non-terminal state" (§4.4) — it never
    /// touches a run that has already reached a terminal status, it only
    /// swaps in the cleanup plan; the run only actually becomes `aborted`
    /// once that plan drains, via [`Self::advance`].
    pub async fn abort(&self, application: &str, job_type: &str) -> Result<()> {
        let _lock = self.store.locks.lock_deployer(application).await;
        let mut run = self.non_terminal_run(application, job_type).ok_or_else(|| {
            ControlPlaneError::not_found("non-terminal run", format!("{}/{}", application, job_type))
        })?;
        run.switch_to_abort_plan();
        run.sleeping_until = None;
        self.store.write_run(run)
    }
}
