use std::fmt;

use serde::{Deserialize, Serialize};

use super::job::Job;

/// The states of the job state machine.
///
/// Each job flows through:
/// PENDING → DOWNLOADING → PROCESSING → UPLOADING → COMPLETED,
/// with CANCELLED and FAILED reachable from any non-terminal state.
///
/// The enum value set and transition rules are part of the persisted-state
/// contract and must remain stable across orchestrator versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Downloading,
    Processing,
    Uploading,
    Completed,
    Cancelled,
    Failed,
}

impl JobState {
    /// Terminal states absorb every further outcome.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Cancelled | JobState::Failed
        )
    }

    /// The next state along the success chain, if any.
    pub fn next_in_chain(&self) -> Option<JobState> {
        match self {
            JobState::Pending => Some(JobState::Downloading),
            JobState::Downloading => Some(JobState::Processing),
            JobState::Processing => Some(JobState::Uploading),
            JobState::Uploading => Some(JobState::Completed),
            _ => None,
        }
    }

    /// Whether a transition from `self` to `to` is legal. Forward moves
    /// follow the chain; `Cancelled` and `Failed` are reachable from any
    /// non-terminal state; nothing leaves a terminal state.
    pub fn can_transition(&self, to: JobState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match to {
            JobState::Cancelled | JobState::Failed => true,
            _ => self.next_in_chain() == Some(to),
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Pending => write!(f, "PENDING"),
            JobState::Downloading => write!(f, "DOWNLOADING"),
            JobState::Processing => write!(f, "PROCESSING"),
            JobState::Uploading => write!(f, "UPLOADING"),
            JobState::Completed => write!(f, "COMPLETED"),
            JobState::Cancelled => write!(f, "CANCELLED"),
            JobState::Failed => write!(f, "FAILED"),
        }
    }
}

/// The result of running one stage of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Success,
    Failure(String),
    Cancelled,
}

/// The result of applying a stage outcome to a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Advance to the next state in the chain.
    Next(JobState),
    /// The job reached a terminal state.
    Terminal(JobState),
}

/// Drives a [`Job`] through the state machine. Pure logic, no I/O.
pub struct StateMachine;

impl StateMachine {
    /// Apply a stage outcome to the job and return the resulting transition.
    ///
    /// - `Success` advances one step along the chain; reaching `Completed`
    ///   is terminal.
    /// - `Failure` records the error and enters `Failed`.
    /// - `Cancelled` enters `Cancelled`.
    /// - Applying any outcome to a terminal job is a no-op that reports the
    ///   stored terminal state.
    pub fn apply(job: &mut Job, outcome: StageOutcome) -> Transition {
        if job.state.is_terminal() {
            return Transition::Terminal(job.state);
        }

        let transition = match outcome {
            StageOutcome::Success => {
                // Every non-terminal state has a chain successor.
                let next = job.state.next_in_chain().unwrap_or(JobState::Completed);
                if next.is_terminal() {
                    Transition::Terminal(next)
                } else {
                    Transition::Next(next)
                }
            }
            StageOutcome::Failure(msg) => {
                job.last_error = Some(msg);
                Transition::Terminal(JobState::Failed)
            }
            StageOutcome::Cancelled => Transition::Terminal(JobState::Cancelled),
        };

        let target = match transition {
            Transition::Next(s) | Transition::Terminal(s) => s,
        };
        job.state_history.push(job.state);
        job.state = target;
        job.touch();

        transition
    }
}
