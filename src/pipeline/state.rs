//! Stage and pipeline state management

use std::time::Instant;

use super::error::StageError;

/// Stage state machine
///
/// A stage starts `Idle`, enters `Running` when its loop starts, and ends in
/// exactly one of the terminal states: `Stopped` after observing the stop
/// sentinel, or `Failed` after a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    /// Stage constructed but not started
    Idle,

    /// Stage loop is active
    Running {
        /// When the stage started running
        started_at: Instant,
    },

    /// Stage observed the sentinel and returned
    Stopped {
        /// When the stage stopped
        stopped_at: Instant,
    },

    /// Stage hit a fatal error
    Failed,
}

impl StageState {
    /// Check if this state transition is valid
    pub fn can_transition_to(&self, target: &StageState) -> bool {
        use StageState::*;

        match (self, target) {
            (Idle, Running { .. }) => true,
            (Idle, Failed) => true,
            (Running { .. }, Stopped { .. }) => true,
            (Running { .. }, Failed) => true,

            // Stopped and Failed are terminal; everything else is invalid
            _ => false,
        }
    }

    /// Move to `target`, rejecting transitions the state machine forbids
    pub fn transition(&mut self, target: StageState) -> Result<(), StageError> {
        if !self.can_transition_to(&target) {
            return Err(StageError::InvalidTransition {
                from: self.description(),
                to: target.description(),
            });
        }
        *self = target;
        Ok(())
    }

    /// Enter `Running` now
    pub fn start(&mut self) -> Result<(), StageError> {
        self.transition(StageState::Running {
            started_at: Instant::now(),
        })
    }

    /// Enter `Stopped` now
    pub fn stop(&mut self) -> Result<(), StageError> {
        self.transition(StageState::Stopped {
            stopped_at: Instant::now(),
        })
    }

    /// Record a fatal error. Has no effect on a terminal state.
    pub fn fail(&mut self) {
        if self.can_transition_to(&StageState::Failed) {
            *self = StageState::Failed;
        }
    }

    /// Get a human-readable description of this state
    pub fn description(&self) -> &'static str {
        match self {
            StageState::Idle => "Idle",
            StageState::Running { .. } => "Running",
            StageState::Stopped { .. } => "Stopped",
            StageState::Failed => "Failed",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, StageState::Running { .. })
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, StageState::Stopped { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StageState::Stopped { .. } | StageState::Failed)
    }
}

impl std::fmt::Display for StageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Lifecycle of a whole pipeline run, as seen by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// No run started yet
    Idle,

    /// Stages are spawned and being joined
    Running {
        /// When the stages were spawned
        started_at: Instant,
    },

    /// Every stage returned normally after observing its sentinel
    Completed,

    /// At least one stage failed, panicked, or timed out
    Failed,
}

impl PipelineState {
    pub fn description(&self) -> &'static str {
        match self {
            PipelineState::Idle => "Idle",
            PipelineState::Running { .. } => "Running",
            PipelineState::Completed => "Completed",
            PipelineState::Failed => "Failed",
        }
    }

    /// Get the duration since the pipeline started (if running)
    pub fn running_duration(&self) -> Option<std::time::Duration> {
        if let PipelineState::Running { started_at } = self {
            Some(started_at.elapsed())
        } else {
            None
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}
