//! Ordered pipeline of asynchronous steps advanced one step at a time.
//!
//! A [`StepSequencer`] owns a sequence of [`Step`]s and a cursor. Advancing
//! moves the cursor forward, begins the step under it and either awaits its
//! future on the tokio runtime or, when the step has nothing to await,
//! hands `None` to its result handler and keeps going. At most one step
//! subscription is held at a time; the completion of that subscription is
//! the only thing that moves the cursor forward asynchronously.
//!
//! Control verbs:
//! - [`start`](StepSequencer::start) rewinds and clears every flag.
//! - [`resume`](StepSequencer::resume) continues from the cursor and keeps
//!   the error state.
//! - [`retry`](StepSequencer::retry) re-executes the step under the cursor.
//! - [`reset`](StepSequencer::reset) drops any in-flight step and rewinds.
//!
//! Step outcomes other than success halt the run: [`Outcome::AutoReset`]
//! arms a full restart, [`Outcome::Fault`] records the error and keeps the
//! position for `retry()`, [`Outcome::Cancelled`] marks the run cancelled
//! and surfaces [`AppError::Cancelled`] to the caller.

pub mod run_state;
pub mod step;

pub use run_state::{RunState, NOT_STARTED};
pub use step::{Outcome, Step, StepFuture};

use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::{AppError, Result};

type EndHook = Arc<dyn Fn() + Send + Sync>;

/// Handle of the step currently being awaited.
struct Subscription {
    generation: u64,
    cancel: CancellationToken,
}

struct SequenceState<R> {
    steps: Vec<Step<R>>,
    run: RunState,
    /// Bumped by every control verb. Advance loops and completions that
    /// carry an older generation stop without touching the state.
    generation: u64,
    active: Option<Subscription>,
    /// A result handler is running. Nested `advance()`/`resume()` calls
    /// return immediately and the delivering loop carries on.
    delivering: bool,
    last_capture: Option<R>,
    end_hook: Option<EndHook>,
}

impl<R> SequenceState<R> {
    fn len(&self) -> isize {
        to_cursor(self.steps.len())
    }

    fn current_step(&self) -> Option<Step<R>> {
        usize::try_from(self.run.cursor)
            .ok()
            .and_then(|index| self.steps.get(index))
            .cloned()
    }

    /// Drop the active subscription, if any. Returns whether one was held.
    fn release_active(&mut self) -> bool {
        self.run.is_observing = false;
        match self.active.take() {
            Some(subscription) => {
                subscription.cancel.cancel();
                true
            }
            None => false,
        }
    }

    fn pending_range(&self) -> Range<usize> {
        let start = usize::try_from(self.run.cursor + 1).unwrap_or(0);
        start..self.steps.len()
    }
}

struct Shared<R> {
    label: String,
    state: Mutex<SequenceState<R>>,
    watch: watch::Sender<RunState>,
}

impl<R> Drop for Shared<R> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        state.release_active();
    }
}

/// Cooperative step scheduler with retry-via-reset semantics.
///
/// Cloning yields another handle to the same sequence.
pub struct StepSequencer<R> {
    shared: Arc<Shared<R>>,
}

impl<R> Clone for StepSequencer<R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<R> StepSequencer<R> {
    fn lock(&self) -> MutexGuard<'_, SequenceState<R>> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &SequenceState<R>) {
        self.shared.watch.send_replace(state.run.clone());
    }

    /// Label used in log output.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.shared.label
    }

    /// Snapshot of the current run state.
    #[must_use]
    pub fn run_state(&self) -> RunState {
        self.lock().run.clone()
    }

    /// Current cursor; [`NOT_STARTED`] before the first step.
    #[must_use]
    pub fn cursor(&self) -> isize {
        self.lock().run.cursor
    }

    /// Number of steps in the sequence.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().steps.len()
    }

    /// Whether the sequence holds no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().steps.is_empty()
    }

    /// Whether a step is pending or the advance loop is running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lock().run.is_active
    }

    /// Whether the last run went past the end of the sequence.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.lock().run.is_completed
    }

    /// Whether the last run was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.lock().run.is_cancelled
    }

    /// Whether a fault halted the last run.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.lock().run.has_error
    }

    /// Most recent fault.
    #[must_use]
    pub fn last_error(&self) -> Option<AppError> {
        self.lock().run.last_error.clone()
    }

    /// Whether an identical step (same closures) is already in the sequence.
    #[must_use]
    pub fn contains(&self, step: &Step<R>) -> bool {
        let state = self.lock();
        scan(&state.steps, 0..state.steps.len(), step)
    }

    /// Install the hook invoked whenever a run passes the end of the sequence.
    pub fn set_end_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.lock().end_hook = Some(Arc::new(hook));
    }

    // ── Insertion ────────────────────────────────────────

    /// Append a step at the end of the sequence.
    pub fn attach(&self, step: Step<R>) {
        self.lock().steps.push(step);
    }

    /// Insert a step immediately before the cursor. The cursor shifts so it
    /// keeps pointing at the same step.
    pub fn attach_before(&self, step: Step<R>) {
        insert_before(&mut self.lock(), step);
    }

    /// Insert a step immediately after the cursor, so it runs next.
    pub fn attach_after(&self, step: Step<R>) {
        insert_after(&mut self.lock(), step);
    }

    /// Append unless an identical step is already anywhere in the sequence.
    pub fn attach_once(&self, step: Step<R>) -> bool {
        let mut state = self.lock();
        if scan(&state.steps, 0..state.steps.len(), &step) {
            return false;
        }
        state.steps.push(step);
        true
    }

    /// [`attach_before`](Self::attach_before) unless already present.
    pub fn attach_before_once(&self, step: Step<R>) -> bool {
        let mut state = self.lock();
        if scan(&state.steps, 0..state.steps.len(), &step) {
            return false;
        }
        insert_before(&mut state, step);
        true
    }

    /// [`attach_after`](Self::attach_after) unless already present.
    pub fn attach_after_once(&self, step: Step<R>) -> bool {
        let mut state = self.lock();
        if scan(&state.steps, 0..state.steps.len(), &step) {
            return false;
        }
        insert_after(&mut state, step);
        true
    }

    /// Append unless an identical step sits inside `range`.
    pub fn attach_once_in(&self, range: Range<usize>, step: Step<R>) -> bool {
        let mut state = self.lock();
        if scan(&state.steps, range, &step) {
            return false;
        }
        state.steps.push(step);
        true
    }

    /// Append unless an identical step is still waiting to run.
    ///
    /// Steps already consumed by the cursor do not count, so a recurring
    /// step can be queued again once its previous occurrence has run.
    pub fn attach_once_pending(&self, step: Step<R>) -> bool {
        let mut state = self.lock();
        let range = state.pending_range();
        if scan(&state.steps, range, &step) {
            return false;
        }
        state.steps.push(step);
        true
    }

    // ── Truncation ───────────────────────────────────────

    /// Drop every step strictly before the cursor.
    ///
    /// The cursor is rebased to before the remaining tail, or onto its first
    /// step while that step is still being awaited. Nothing is dropped while
    /// a full restart is armed.
    pub fn unload(&self) {
        let mut state = self.lock();
        if state.run.reset_on_resume || state.run.cursor <= 0 {
            return;
        }
        let consumed = usize::try_from(state.run.cursor)
            .unwrap_or(0)
            .min(state.steps.len());
        state.steps.drain(..consumed);
        state.run.cursor = if state.active.is_some() { 0 } else { NOT_STARTED };
        debug!(sequence = %self.shared.label, consumed, "unloaded consumed steps");
        self.publish(&state);
    }

    /// Discard every step after the cursor.
    pub fn clear(&self) {
        let mut state = self.lock();
        let keep = usize::try_from(state.run.cursor + 1).unwrap_or(0);
        let dropped = state.steps.len().saturating_sub(keep);
        state.steps.truncate(keep);
        debug!(sequence = %self.shared.label, dropped, "cleared pending steps");
        self.publish(&state);
    }
}

impl<R: Clone + Send + 'static> StepSequencer<R> {
    /// Create an empty sequence.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        let (watch, _) = watch::channel(RunState::default());
        Self {
            shared: Arc::new(Shared {
                label: label.into(),
                state: Mutex::new(SequenceState {
                    steps: Vec::new(),
                    run: RunState::default(),
                    generation: 0,
                    active: None,
                    delivering: false,
                    last_capture: None,
                    end_hook: None,
                }),
                watch,
            }),
        }
    }

    /// Value returned by the most recent successful result handler.
    #[must_use]
    pub fn last_capture(&self) -> Option<R> {
        self.lock().last_capture.clone()
    }

    /// Wait until the run is no longer active and return its state.
    pub async fn settled(&self) -> RunState {
        let mut rx = self.shared.watch.subscribe();
        loop {
            {
                let state = rx.borrow_and_update();
                if !state.is_active {
                    return state.clone();
                }
            }
            if rx.changed().await.is_err() {
                return self.run_state();
            }
        }
    }

    // ── Control ──────────────────────────────────────────

    /// Rewind to before the first step, clear every flag and advance.
    ///
    /// Returns `true` when a step is now pending and `false` when the run
    /// finished or halted synchronously.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Cancelled` if a step cancelled the run.
    pub fn start(&self) -> Result<bool> {
        let generation = {
            let mut state = self.lock();
            state.release_active();
            state.generation += 1;
            state.delivering = false;
            state.run.clear_flags();
            state.run.cursor = NOT_STARTED;
            state.generation
        };
        debug!(sequence = %self.shared.label, "sequence started");
        self.drive(generation)
    }

    /// Continue after the cursor without clearing the error state.
    ///
    /// A pending step is left alone. An armed restart rewinds first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Cancelled` if a step cancelled the run.
    pub fn resume(&self) -> Result<bool> {
        self.resume_from(None)
    }

    /// Move the cursor to `at` and continue with the step after it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Cancelled` if a step cancelled the run.
    pub fn resume_at(&self, at: isize) -> Result<bool> {
        self.resume_from(Some(at))
    }

    fn resume_from(&self, at: Option<isize>) -> Result<bool> {
        let generation = {
            let mut state = self.lock();
            if state.active.is_some() || state.delivering {
                return Ok(true);
            }
            state.generation += 1;
            if state.run.reset_on_resume {
                state.run.reset_on_resume = false;
                state.run.cursor = NOT_STARTED;
            } else if let Some(at) = at {
                state.run.cursor = at.clamp(NOT_STARTED, state.len());
            }
            state.run.is_cancelled = false;
            state.run.is_completed = false;
            state.generation
        };
        self.drive(generation)
    }

    /// Re-execute the step under the cursor.
    ///
    /// Drops a pending subscription first. Clears `has_error` but keeps
    /// `last_error`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Cancelled` if a step cancelled the run.
    pub fn retry(&self) -> Result<bool> {
        let generation = {
            let mut state = self.lock();
            state.release_active();
            state.generation += 1;
            state.delivering = false;
            if state.run.reset_on_resume {
                state.run.reset_on_resume = false;
                state.run.cursor = NOT_STARTED;
            } else {
                state.run.cursor = (state.run.cursor - 1).clamp(NOT_STARTED, state.len());
            }
            state.run.has_error = false;
            state.run.is_cancelled = false;
            state.run.is_completed = false;
            state.generation
        };
        debug!(sequence = %self.shared.label, "retrying step");
        self.drive(generation)
    }

    /// Advance from the cursor. A pending step is left alone.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Cancelled` if a step cancelled the run.
    pub fn advance(&self) -> Result<bool> {
        let generation = {
            let state = self.lock();
            if state.active.is_some() || state.delivering {
                return Ok(true);
            }
            state.generation
        };
        self.drive(generation)
    }

    /// Drop any in-flight step without delivering its result and rewind to
    /// a pristine run state. Steps are kept.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.release_active();
        state.generation += 1;
        state.delivering = false;
        state.run = RunState::default();
        self.publish(&state);
        debug!(sequence = %self.shared.label, "sequence reset");
    }

    /// Stop an active run on behalf of the lifecycle owner.
    ///
    /// The in-flight step is abandoned: its result handler never runs and
    /// the cursor steps back so a later `resume()` begins it afresh.
    /// Returns whether anything was running.
    pub fn cancel(&self) -> bool {
        let mut state = self.lock();
        if !state.run.is_active {
            return false;
        }
        state.generation += 1;
        state.delivering = false;
        if state.release_active() {
            state.run.cursor = (state.run.cursor - 1).max(NOT_STARTED);
        }
        state.run.is_active = false;
        state.run.is_cancelled = true;
        state.run.is_completed = false;
        self.publish(&state);
        info!(sequence = %self.shared.label, cursor = state.run.cursor, "sequence cancelled");
        true
    }

    /// Advance loop. Returns `Ok(true)` once a step is pending.
    fn drive(&self, generation: u64) -> Result<bool> {
        loop {
            let step = {
                let mut state = self.lock();
                if state.generation != generation {
                    return Ok(state.active.is_some());
                }
                state.run.cursor += 1;
                if let Some(step) = state.current_step() {
                    state.run.is_active = true;
                    step
                } else {
                    state.run.cursor = state.len();
                    state.run.is_active = false;
                    state.run.is_completed = true;
                    self.publish(&state);
                    let hook = state.end_hook.clone();
                    drop(state);
                    debug!(sequence = %self.shared.label, "sequence finished");
                    if let Some(hook) = hook {
                        hook();
                    }
                    return Ok(false);
                }
            };

            match step.begin() {
                Outcome::Success(Some(work)) => return self.subscribe(generation, work),
                Outcome::Success(None) => {
                    if !self.deliver(generation, &step, None)? {
                        return Ok(self.lock().active.is_some());
                    }
                }
                other => return self.halt(generation, other.map(drop)),
            }
        }
    }

    /// Hand a value to the step's result handler and release the
    /// subscription. Returns whether the loop may continue.
    ///
    /// The handler runs unlocked, so it may attach steps or call control
    /// verbs. A nested `advance()` is absorbed by this loop.
    fn deliver(&self, generation: u64, step: &Step<R>, value: Option<R>) -> Result<bool> {
        {
            let mut state = self.lock();
            if state.generation != generation {
                return Ok(false);
            }
            state.delivering = true;
        }
        let outcome = step.finish(value);
        let mut state = self.lock();
        if state.generation != generation {
            return Ok(false);
        }
        state.delivering = false;
        state.release_active();
        match outcome {
            Outcome::Success(capture) => {
                state.last_capture = capture;
                Ok(true)
            }
            other => {
                drop(state);
                self.halt(generation, other.map(drop)).map(|_| false)
            }
        }
    }

    /// Stop the run for a non-success outcome.
    fn halt(&self, generation: u64, outcome: Outcome<()>) -> Result<bool> {
        let mut state = self.lock();
        if state.generation != generation {
            return Ok(state.active.is_some());
        }
        state.release_active();
        state.run.is_active = false;
        let cursor = state.run.cursor;
        let label = &self.shared.label;
        let result = match outcome {
            Outcome::Success(()) => Ok(false),
            Outcome::AutoReset => {
                state.run.reset_on_resume = true;
                info!(sequence = %label, cursor, "step requested a full restart");
                Ok(false)
            }
            Outcome::Fault(err) => {
                warn!(sequence = %label, cursor, %err, "step failed; sequence halted");
                state.run.has_error = true;
                state.run.last_error = Some(err);
                Ok(false)
            }
            Outcome::Cancelled => {
                info!(sequence = %label, cursor, "step cancelled the sequence");
                state.run.cursor = (cursor - 1).max(NOT_STARTED);
                state.run.is_cancelled = true;
                Err(AppError::Cancelled)
            }
        };
        self.publish(&state);
        result
    }

    /// Await `work` on the runtime and feed its outcome back through
    /// [`complete`](Self::complete).
    fn subscribe(&self, generation: u64, work: StepFuture<R>) -> Result<bool> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return self.halt(
                generation,
                Outcome::Fault(AppError::Step("no async runtime to await the step".into())),
            );
        };

        let cancel = CancellationToken::new();
        let index = {
            let mut state = self.lock();
            if state.generation != generation {
                return Ok(state.active.is_some());
            }
            state.active = Some(Subscription {
                generation,
                cancel: cancel.clone(),
            });
            state.run.is_observing = true;
            self.publish(&state);
            state.run.cursor
        };

        let weak = Arc::downgrade(&self.shared);
        let span = info_span!("sequencer_step", sequence = %self.shared.label, index);
        runtime.spawn(
            async move {
                let outcome = tokio::select! {
                    () = cancel.cancelled() => return,
                    outcome = work => outcome,
                };
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                if let Err(err) = (StepSequencer { shared }).complete(generation, outcome) {
                    debug!(%err, "sequence stopped after step completion");
                }
            }
            .instrument(span),
        );
        Ok(true)
    }

    /// Re-entry point for a finished subscription.
    fn complete(&self, generation: u64, outcome: Outcome<Option<R>>) -> Result<bool> {
        let step = {
            let state = self.lock();
            let current = state.generation == generation
                && state
                    .active
                    .as_ref()
                    .is_some_and(|subscription| subscription.generation == generation);
            if !current {
                return Ok(false);
            }
            state.current_step()
        };
        let Some(step) = step else {
            return self.halt(
                generation,
                Outcome::Fault(AppError::Step("pending step is no longer in the sequence".into())),
            );
        };

        match outcome {
            Outcome::Success(value) => {
                if self.deliver(generation, &step, value)? {
                    self.drive(generation)
                } else {
                    Ok(false)
                }
            }
            other => self.halt(generation, other.map(drop)),
        }
    }
}

fn to_cursor(len: usize) -> isize {
    isize::try_from(len).unwrap_or(isize::MAX)
}

fn scan<R>(steps: &[Step<R>], range: Range<usize>, step: &Step<R>) -> bool {
    let end = range.end.min(steps.len());
    let start = range.start.min(end);
    steps[start..end].iter().any(|existing| existing.same_as(step))
}

fn insert_before<R>(state: &mut SequenceState<R>, step: Step<R>) {
    let index = usize::try_from(state.run.cursor)
        .unwrap_or(0)
        .min(state.steps.len());
    state.steps.insert(index, step);
    if state.run.cursor >= 0 {
        state.run.cursor += 1;
    }
}

fn insert_after<R>(state: &mut SequenceState<R>, step: Step<R>) {
    let index = usize::try_from(state.run.cursor + 1)
        .unwrap_or(0)
        .min(state.steps.len());
    state.steps.insert(index, step);
}
