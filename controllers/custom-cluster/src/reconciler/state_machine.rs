//! Lifecycle phase transitions.
//!
//! `next_transition` is a pure function of what one reconcile pass observed:
//! the current phase, whether deletion was requested, whether committed
//! artifacts exist, the pending delta, and the state of the job for the
//! relevant action. It returns the next phase plus the single effect the
//! reconciler must carry out. The phase doubles as the per-cluster mutex:
//! a job is only started from a steady phase, and a transient phase only
//! waits on the job it started.

use super::diff::Delta;
use crds::{ConditionType, LifecyclePhase};
use kubespray::is_upgrade_supported;
use std::fmt;

/// Installer actions, one job each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleAction {
    Init,
    ScaleUp,
    ScaleDown,
    Upgrade,
    Terminate,
}

impl LifecycleAction {
    pub const ALL: [LifecycleAction; 5] = [
        LifecycleAction::Init,
        LifecycleAction::ScaleUp,
        LifecycleAction::ScaleDown,
        LifecycleAction::Upgrade,
        LifecycleAction::Terminate,
    ];

    /// Name used in job names, labels and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleAction::Init => "init",
            LifecycleAction::ScaleUp => "scale-up",
            LifecycleAction::ScaleDown => "scale-down",
            LifecycleAction::Upgrade => "upgrade",
            LifecycleAction::Terminate => "terminate",
        }
    }

    /// Condition that records the outcome of this action.
    pub fn condition_type(&self) -> ConditionType {
        match self {
            LifecycleAction::Init => ConditionType::Ready,
            LifecycleAction::ScaleUp => ConditionType::ScaledUp,
            LifecycleAction::ScaleDown => ConditionType::ScaledDown,
            LifecycleAction::Upgrade => ConditionType::Upgraded,
            LifecycleAction::Terminate => ConditionType::Terminated,
        }
    }

    /// Phase held while the job runs.
    pub fn running_phase(&self) -> LifecyclePhase {
        match self {
            LifecycleAction::Init => LifecyclePhase::Provisioning,
            LifecycleAction::ScaleUp => LifecyclePhase::ScalingUp,
            LifecycleAction::ScaleDown => LifecyclePhase::ScalingDown,
            LifecycleAction::Upgrade => LifecyclePhase::Upgrading,
            LifecycleAction::Terminate => LifecyclePhase::Deleting,
        }
    }

    /// Phase entered when the job fails.
    pub fn failed_phase(&self) -> LifecyclePhase {
        match self {
            LifecycleAction::Init => LifecyclePhase::ProvisionFailed,
            LifecycleAction::ScaleUp | LifecycleAction::ScaleDown => LifecyclePhase::Provisioned,
            LifecycleAction::Upgrade => LifecyclePhase::Unknown,
            LifecycleAction::Terminate => LifecyclePhase::Deleting,
        }
    }

    /// Phase entered when the job succeeds.
    pub fn succeeded_phase(&self) -> LifecyclePhase {
        match self {
            LifecycleAction::Terminate => LifecyclePhase::Deleting,
            _ => LifecyclePhase::Provisioned,
        }
    }

    /// The action whose job a phase is tied to, if any.
    ///
    /// `Unknown` still watches the failed upgrade job so it can return to
    /// `Provisioned` once an operator removes it.
    pub fn for_phase(phase: LifecyclePhase) -> Option<LifecycleAction> {
        match phase {
            LifecyclePhase::Pending | LifecyclePhase::Provisioning | LifecyclePhase::ProvisionFailed => {
                Some(LifecycleAction::Init)
            }
            LifecyclePhase::ScalingUp => Some(LifecycleAction::ScaleUp),
            LifecyclePhase::ScalingDown => Some(LifecycleAction::ScaleDown),
            LifecyclePhase::Upgrading | LifecyclePhase::Unknown => Some(LifecycleAction::Upgrade),
            LifecyclePhase::Deleting => Some(LifecycleAction::Terminate),
            LifecyclePhase::Provisioned => None,
        }
    }
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observed state of the job for one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Absent,
    Running,
    Succeeded,
    Failed(String),
}

/// Everything a pass observed before deciding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub phase: LifecyclePhase,
    pub deletion_requested: bool,
    /// Committed artifacts exist (and parse, outside deletion)
    pub provisioned: bool,
    /// Pending change; `None` when nothing has been provisioned
    pub delta: Option<Delta>,
    /// Job for `LifecycleAction::for_phase(phase)`, or for the delta's action
    /// while `Provisioned`
    pub job: JobState,
}

/// The one side effect a pass performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Nothing to do
    None,
    /// Delete every management job and enter `Deleting`
    BeginDeletion,
    /// Stage artifacts and create the job
    StartJob(LifecycleAction),
    /// Job still running
    AwaitJob(LifecycleAction),
    /// Job succeeded: commit staged artifacts and delete the job
    CommitJob(LifecycleAction),
    /// Job failed: record it and keep the job until an operator deletes it
    RecordFailure(LifecycleAction, String),
    /// Version jump is not a single minor step
    RejectUpgrade { from: String, to: String },
    /// Committed artifacts found without a recorded phase; take them as provisioned
    Adopt,
    /// Remove artifacts, credentials and jobs, then release the finalizer
    CleanUp,
}

/// Next phase plus the effect that gets there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: LifecyclePhase,
    pub effect: Effect,
}

impl Transition {
    fn new(next: LifecyclePhase, effect: Effect) -> Self {
        Self { next, effect }
    }
}

/// The action a `Provisioned` cluster should run for a delta, if any.
pub fn action_for_delta(delta: &Delta) -> Option<LifecycleAction> {
    match delta {
        Delta::None => None,
        Delta::ScaleUp(_) => Some(LifecycleAction::ScaleUp),
        Delta::ScaleDown(_) => Some(LifecycleAction::ScaleDown),
        Delta::Upgrade { .. } => Some(LifecycleAction::Upgrade),
    }
}

/// Decides the next phase and effect for one pass.
pub fn next_transition(obs: &Observation) -> Transition {
    if obs.deletion_requested && obs.phase != LifecyclePhase::Deleting {
        return Transition::new(LifecyclePhase::Deleting, Effect::BeginDeletion);
    }

    match obs.phase {
        LifecyclePhase::Pending | LifecyclePhase::Provisioning | LifecyclePhase::ProvisionFailed => {
            init_transition(obs)
        }
        LifecyclePhase::Provisioned => provisioned_transition(obs),
        LifecyclePhase::ScalingUp | LifecyclePhase::ScalingDown | LifecyclePhase::Upgrading => {
            match LifecycleAction::for_phase(obs.phase) {
                Some(action) => running_transition(action, obs),
                None => Transition::new(obs.phase, Effect::None),
            }
        }
        LifecyclePhase::Unknown => match &obs.job {
            // The failed upgrade job was deleted: re-evaluate from Provisioned
            JobState::Absent => Transition::new(LifecyclePhase::Provisioned, Effect::None),
            _ => running_transition(LifecycleAction::Upgrade, obs),
        },
        LifecyclePhase::Deleting => deleting_transition(obs),
    }
}

fn init_transition(obs: &Observation) -> Transition {
    let action = LifecycleAction::Init;
    match &obs.job {
        JobState::Absent if obs.provisioned => Transition::new(LifecyclePhase::Provisioned, Effect::Adopt),
        JobState::Absent => Transition::new(action.running_phase(), Effect::StartJob(action)),
        _ => running_transition(action, obs),
    }
}

fn provisioned_transition(obs: &Observation) -> Transition {
    let Some(delta) = &obs.delta else {
        return Transition::new(LifecyclePhase::Provisioned, Effect::None);
    };

    if let Delta::Upgrade { from, to } = delta {
        if !is_upgrade_supported(from, to) {
            return Transition::new(
                LifecyclePhase::Provisioned,
                Effect::RejectUpgrade {
                    from: from.clone(),
                    to: to.clone(),
                },
            );
        }
    }

    let Some(action) = action_for_delta(delta) else {
        return Transition::new(LifecyclePhase::Provisioned, Effect::None);
    };

    match &obs.job {
        JobState::Absent => Transition::new(action.running_phase(), Effect::StartJob(action)),
        // A failed job of this kind is still around: the operator has to delete it first
        JobState::Failed(message) => Transition::new(
            action.failed_phase(),
            Effect::RecordFailure(action, message.clone()),
        ),
        _ => running_transition(action, obs),
    }
}

fn running_transition(action: LifecycleAction, obs: &Observation) -> Transition {
    match &obs.job {
        JobState::Running => Transition::new(action.running_phase(), Effect::AwaitJob(action)),
        JobState::Succeeded => Transition::new(action.succeeded_phase(), Effect::CommitJob(action)),
        JobState::Failed(message) => Transition::new(
            action.failed_phase(),
            Effect::RecordFailure(action, message.clone()),
        ),
        // Job vanished mid-flight; nothing was committed, so re-diff from the steady phase
        JobState::Absent => Transition::new(LifecyclePhase::Provisioned, Effect::None),
    }
}

fn deleting_transition(obs: &Observation) -> Transition {
    let action = LifecycleAction::Terminate;
    match &obs.job {
        JobState::Absent if obs.provisioned => Transition::new(LifecyclePhase::Deleting, Effect::StartJob(action)),
        JobState::Absent | JobState::Succeeded => Transition::new(LifecyclePhase::Deleting, Effect::CleanUp),
        JobState::Running => Transition::new(LifecyclePhase::Deleting, Effect::AwaitJob(action)),
        JobState::Failed(message) => Transition::new(
            LifecyclePhase::Deleting,
            Effect::RecordFailure(action, message.clone()),
        ),
    }
}
