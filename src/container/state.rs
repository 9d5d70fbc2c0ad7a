//! Lifecycle state classification.
//!
//! Maps the daemon's view of a container onto what the reuse state machine can do
//! about it: use it, nudge it, wait for it, or give up.

use std::fmt;

/// Lifecycle state of a container at inspection time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleState {
    /// Container is running
    Running,
    /// Container is paused
    Paused,
    /// Container has exited
    Exited,
    /// Daemon is restarting the container
    Restarting,
    /// Container was killed by the OOM killer
    OomKilled,
    /// Container is dead
    Dead,
    /// Daemon is removing the container
    RemovalInProgress,
    /// Any other daemon status, e.g. `created`
    Unknown(String),
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Running => write!(f, "running"),
            LifecycleState::Paused => write!(f, "paused"),
            LifecycleState::Exited => write!(f, "exited"),
            LifecycleState::Restarting => write!(f, "restarting"),
            LifecycleState::OomKilled => write!(f, "oom-killed"),
            LifecycleState::Dead => write!(f, "dead"),
            LifecycleState::RemovalInProgress => write!(f, "removal in progress"),
            LifecycleState::Unknown(status) => write!(f, "{}", status),
        }
    }
}

/// Corrective action that moves a recovering container towards running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Paused container, unpause it
    Unpause,
    /// Exited container, start it
    Start,
    /// Restarting container, nothing to do but wait
    Wait,
}

/// Outcome of classifying a lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateVerdict {
    /// Running, usable as is
    Ready,
    /// Not running yet, but fixable
    Recovering(Recovery),
    /// Can never become ready
    Unusable(LifecycleState),
    /// Not modeled; treated as retryable
    Unexpected(String),
}

impl StateVerdict {
    /// Whether waiting or retrying can never help.
    pub fn is_permanent(&self) -> bool {
        matches!(self, StateVerdict::Unusable(_))
    }
}

/// Classify a lifecycle state.
pub fn classify(state: &LifecycleState) -> StateVerdict {
    match state {
        LifecycleState::Running => StateVerdict::Ready,
        LifecycleState::Paused => StateVerdict::Recovering(Recovery::Unpause),
        LifecycleState::Exited => StateVerdict::Recovering(Recovery::Start),
        LifecycleState::Restarting => StateVerdict::Recovering(Recovery::Wait),
        LifecycleState::OomKilled | LifecycleState::Dead | LifecycleState::RemovalInProgress => {
            StateVerdict::Unusable(state.clone())
        }
        LifecycleState::Unknown(status) => StateVerdict::Unexpected(status.clone()),
    }
}
