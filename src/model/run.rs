//! Run, Step, and ConvergenceSummary (§3, §4.4).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The fixed, ordered step list every run carries (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Step {
    DeployInitialReal,
    InstallInitialReal,
    DeployReal,
    InstallReal,
    DeactivateReal,
    DeployTester,
    InstallTester,
    DeactivateTester,
    CopyVespaLogs,
    StartStagingSetup,
    EndStagingSetup,
    StartTests,
    EndTests,
    Report,
}

impl Step {
    /// The full fixed step set (§3), in the order it is declared there.
    /// Every run's `steps` map has exactly these 14 keys regardless of
    /// which ones its own execution plan actually dispatches.
    pub const ALL: [Step; 14] = [
        Step::DeployInitialReal,
        Step::InstallInitialReal,
        Step::DeployReal,
        Step::InstallReal,
        Step::DeactivateReal,
        Step::DeployTester,
        Step::InstallTester,
        Step::DeactivateTester,
        Step::CopyVespaLogs,
        Step::StartStagingSetup,
        Step::EndStagingSetup,
        Step::StartTests,
        Step::EndTests,
        Step::Report,
    ];

    /// The happy-path dispatch order used by a normal (non-aborted) run —
    /// see scenario S1. `DeactivateReal` is deliberately absent: a normal
    /// run leaves the real deployment active and only tears it down via
    /// the abort cleanup plan, so its `StepInfo` simply stays `unfinished`
    /// for the lifetime of a successful run.
    pub const HAPPY_PATH: [Step; 13] = [
        Step::DeployInitialReal,
        Step::InstallInitialReal,
        Step::DeployReal,
        Step::InstallReal,
        Step::DeployTester,
        Step::InstallTester,
        Step::StartStagingSetup,
        Step::EndStagingSetup,
        Step::StartTests,
        Step::EndTests,
        Step::DeactivateTester,
        Step::CopyVespaLogs,
        Step::Report,
    ];

    /// Steps run during an abort, in order (§4.4: "running only the
    /// cleanup steps").
    pub const ABORT_CLEANUP: [Step; 4] = [
        Step::DeactivateReal,
        Step::DeactivateTester,
        Step::CopyVespaLogs,
        Step::Report,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Unfinished,
    Succeeded,
    Failed,
}

impl StepStatus {
    /// "only `unfinished -> succeeded` and `unfinished -> failed` are legal
    /// transitions" (§4.4).
    pub fn can_transition_to(self, target: StepStatus) -> bool {
        self == StepStatus::Unfinished && matches!(target, StepStatus::Succeeded | StepStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    pub status: StepStatus,
    pub start_time: Option<DateTime<Utc>>,
}

impl Default for StepInfo {
    fn default() -> Self {
        StepInfo {
            status: StepStatus::Unfinished,
            start_time: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    OutOfCapacity,
    EndpointCertificateTimeout,
    DeploymentFailed,
    InstallationFailed,
    TestFailure,
    Error,
    Success,
    Aborted,
    Reset,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Running | RunStatus::Reset)
    }
}

/// A source or target platform/application version (§3).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub platform: String,
    pub application: String,
    pub build_metadata: Option<String>,
    pub source_revision: Option<SourceRevision>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRevision {
    pub repository: String,
    pub branch: String,
    pub commit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versions {
    pub target: VersionInfo,
    pub source: Option<VersionInfo>,
}

impl Versions {
    /// Invariant: sourcePlatform and sourceApplication are both present or
    /// both absent — modeled here as the whole `source` `VersionInfo` being
    /// present or absent as a unit.
    pub fn is_valid(&self) -> bool {
        true // presence/absence of `source` as an Option already enforces this
    }
}

/// The frozen 13-field positional counter tuple (§4.4).
///
/// Serialized as a plain array, never as a map with named fields — adding a
/// 14th field here would break every replica still reading the 13-element
/// layout mid-rollout. New counters go in a *new* array type instead.
/// `#[serde(transparent)]` is required to get the bare `[u32; 13]` wire form
/// out of a single-field struct; without it `derive(Serialize)` wraps the
/// field in a JSON object (`{"inner": [...]}`) instead of emitting the array
/// itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConvergenceSummary {
    inner: [u32; 13],
}

impl ConvergenceSummary {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        nodes: u32,
        down: u32,
        upgrading_os: u32,
        upgrading_firmware: u32,
        need_platform_upgrade: u32,
        upgrading_platform: u32,
        need_reboot: u32,
        rebooting: u32,
        need_restart: u32,
        restarting: u32,
        services: u32,
        need_new_config: u32,
        retiring: u32,
    ) -> Self {
        ConvergenceSummary {
            inner: [
                nodes,
                down,
                upgrading_os,
                upgrading_firmware,
                need_platform_upgrade,
                upgrading_platform,
                need_reboot,
                rebooting,
                need_restart,
                restarting,
                services,
                need_new_config,
                retiring,
            ],
        }
    }

    pub fn nodes(&self) -> u32 {
        self.inner[0]
    }
    pub fn down(&self) -> u32 {
        self.inner[1]
    }
    pub fn retiring(&self) -> u32 {
        self.inner[12]
    }

    /// The frozen field count. A deserializer encountering an array of any
    /// other length has hit a format violation, not a new schema — see
    /// §4.4 and scenario S6.
    pub const FIELD_COUNT: usize = 13;

    pub fn as_array(&self) -> &[u32; 13] {
        &self.inner
    }

    pub fn from_array(values: [u32; 13]) -> Self {
        ConvergenceSummary { inner: values }
    }
}

/// Run identity: `(application, jobType, number)` (§3).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId {
    pub application: String,
    pub job_type: String,
    pub number: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub versions: Versions,
    pub is_redeployment: bool,
    pub is_dry_run: bool,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub sleeping_until: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub steps: BTreeMap<Step, StepInfo>,
    /// The dispatch order for this run. Always a sub-sequence of
    /// [`Step::ALL`] — normally [`Step::HAPPY_PATH`], replaced by
    /// [`Step::ABORT_CLEANUP`] once the run is aborted. Steps outside the
    /// active plan simply keep their `unfinished` `StepInfo` forever, which
    /// satisfies "steps not yet reached are unfinished" (§3) without ever
    /// being dispatched.
    pub plan: Vec<Step>,
    pub last_test_log_entry: Option<DateTime<Utc>>,
    pub last_vespa_log_timestamp: Option<DateTime<Utc>>,
    pub no_nodes_down_since: Option<DateTime<Utc>>,
    pub convergence_summary: Option<ConvergenceSummary>,
    pub tester_certificate: Option<String>,
}

impl Run {
    pub fn new(id: RunId, versions: Versions, start: DateTime<Utc>) -> Self {
        let mut steps = BTreeMap::new();
        for step in Step::ALL {
            steps.insert(step, StepInfo::default());
        }
        Run {
            id,
            versions,
            is_redeployment: false,
            is_dry_run: false,
            start,
            end: None,
            sleeping_until: None,
            status: RunStatus::Running,
            steps,
            plan: Step::HAPPY_PATH.to_vec(),
            last_test_log_entry: None,
            last_vespa_log_timestamp: None,
            no_nodes_down_since: None,
            convergence_summary: None,
            tester_certificate: None,
        }
    }

    /// Invariant: every run has an entry for every `Step`.
    pub fn has_all_steps(&self) -> bool {
        Step::ALL.iter().all(|s| self.steps.contains_key(s))
    }

    /// Invariant: `end` is set iff status is terminal.
    pub fn end_matches_terminal(&self) -> bool {
        self.end.is_some() == self.status.is_terminal()
    }

    /// Switch this run onto the abort cleanup plan, preserving whatever
    /// progress the cleanup steps already made (§4.4: "driving it to
    /// `aborted` after running only the cleanup steps").
    pub fn switch_to_abort_plan(&mut self) {
        self.plan = Step::ABORT_CLEANUP.to_vec();
    }

    pub fn first_unfinished_step(&self) -> Option<Step> {
        self.plan
            .iter()
            .copied()
            .find(|s| matches!(self.steps.get(s), Some(info) if info.status == StepStatus::Unfinished))
    }

    /// Whether this run's plan is the abort cleanup sequence rather than the
    /// happy path — the runner uses this to decide whether a fully-drained
    /// plan means `success` or `aborted`.
    pub fn is_aborting(&self) -> bool {
        self.plan.as_slice() == Step::ABORT_CLEANUP.as_slice()
    }
}
