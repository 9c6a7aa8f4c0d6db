//! Observable run state of a step sequence.

use crate::AppError;

/// Cursor value before the first step has been reached.
pub const NOT_STARTED: isize = -1;

/// Snapshot of a sequencer's progress and flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunState {
    /// Index of the current step; [`NOT_STARTED`] before the first one and
    /// the sequence length once the run has passed the end.
    pub cursor: isize,
    /// A step is awaiting its result or the advance loop is running.
    pub is_active: bool,
    /// A step subscription is currently held.
    pub is_observing: bool,
    /// The run passed the end of the sequence and is neither active nor
    /// cancelled.
    pub is_completed: bool,
    /// The run was stopped by an external request.
    pub is_cancelled: bool,
    /// A fault halted the run.
    pub has_error: bool,
    /// Most recent fault, kept after `retry()` for diagnostics.
    pub last_error: Option<AppError>,
    /// A step asked for the whole sequence to restart on the next
    /// `start()` or `resume()`.
    pub reset_on_resume: bool,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            cursor: NOT_STARTED,
            is_active: false,
            is_observing: false,
            is_completed: false,
            is_cancelled: false,
            has_error: false,
            last_error: None,
            reset_on_resume: false,
        }
    }
}

impl RunState {
    /// Clear the error, cancellation, completion and reset flags.
    pub(crate) fn clear_flags(&mut self) {
        self.is_completed = false;
        self.is_cancelled = false;
        self.has_error = false;
        self.last_error = None;
        self.reset_on_resume = false;
    }
}
