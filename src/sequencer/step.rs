//! Step and outcome types driven by the [`StepSequencer`](super::StepSequencer).

use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::{AppError, Result};

/// Result of a step body or a step result handler.
#[derive(Debug)]
pub enum Outcome<T> {
    /// The work finished and produced a value.
    Success(T),
    /// Recoverable failure: the whole sequence restarts from the first
    /// step on the next `start()` or `resume()`.
    AutoReset,
    /// Unexpected failure: advancement halts with the cursor preserved so
    /// the same step can be retried.
    Fault(AppError),
    /// Externally requested stop; not recorded as an error.
    Cancelled,
}

impl<T> Outcome<T> {
    /// Transform the success value, leaving the control variants untouched.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Success(value) => Outcome::Success(f(value)),
            Self::AutoReset => Outcome::AutoReset,
            Self::Fault(err) => Outcome::Fault(err),
            Self::Cancelled => Outcome::Cancelled,
        }
    }

    /// Whether this outcome carries a value.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl<T> From<Result<T>> for Outcome<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(AppError::Cancelled) => Self::Cancelled,
            Err(err) => Self::Fault(err),
        }
    }
}

/// Asynchronous work issued by a step. Resolves to the produced value, or
/// `None` when nothing was produced.
pub type StepFuture<R> = BoxFuture<'static, Outcome<Option<R>>>;

type BeginFn<R> = dyn Fn() -> Outcome<Option<StepFuture<R>>> + Send + Sync;
type ResultFn<R> = dyn Fn(Option<R>) -> Outcome<Option<R>> + Send + Sync;

/// One unit of asynchronous work plus its completion handler.
///
/// The closures are reference counted, so cloning a step keeps its
/// identity: two steps are the same step when both closures are the same
/// allocation. Idempotent attachment relies on this.
pub struct Step<R> {
    begin: Arc<BeginFn<R>>,
    on_result: Arc<ResultFn<R>>,
}

impl<R> Clone for Step<R> {
    fn clone(&self) -> Self {
        Self {
            begin: Arc::clone(&self.begin),
            on_result: Arc::clone(&self.on_result),
        }
    }
}

impl<R> Debug for Step<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("begin", &Arc::as_ptr(&self.begin).cast::<()>())
            .field("on_result", &Arc::as_ptr(&self.on_result).cast::<()>())
            .finish()
    }
}

impl<R: Send + 'static> Step<R> {
    /// Build a step from a raw `begin` closure and a result handler.
    ///
    /// `begin` returns `Success(None)` when the step has nothing to await;
    /// the handler then receives `None` immediately.
    pub fn new(
        begin: impl Fn() -> Outcome<Option<StepFuture<R>>> + Send + Sync + 'static,
        on_result: impl Fn(Option<R>) -> Outcome<Option<R>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            begin: Arc::new(begin),
            on_result: Arc::new(on_result),
        }
    }

    /// Build a step whose work is a future created fresh on every run.
    pub fn task<F, Fut>(
        work: F,
        on_result: impl Fn(Option<R>) -> Outcome<Option<R>> + Send + Sync + 'static,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome<Option<R>>> + Send + 'static,
    {
        Self::new(
            move || {
                let future: StepFuture<R> = Box::pin(work());
                Outcome::Success(Some(future))
            },
            on_result,
        )
    }

    /// Build a step with no asynchronous work; only the handler runs.
    pub fn capture(on_result: impl Fn(Option<R>) -> Outcome<Option<R>> + Send + Sync + 'static) -> Self {
        Self::new(|| Outcome::Success(None), on_result)
    }
}

impl<R> Step<R> {
    /// Identity comparison: same `begin` and same result handler.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.begin, &other.begin) && Arc::ptr_eq(&self.on_result, &other.on_result)
    }

    pub(crate) fn begin(&self) -> Outcome<Option<StepFuture<R>>> {
        (self.begin)()
    }

    pub(crate) fn finish(&self, value: Option<R>) -> Outcome<Option<R>> {
        (self.on_result)(value)
    }
}
