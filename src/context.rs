//! Request-scoped cancellation, deadline and values.
//!
//! Every [`Request`](crate::Request) carries a [`RequestContext`]. Middleware
//! derives narrower contexts from it (a timeout adds a deadline) and attaches
//! per-request metadata (the request id) for handlers further down the chain.
//!
//! Cancellation is advisory. A context never stops a handler on its own; it
//! only tells the handler that nobody is waiting for its answer any more.
//! Handlers that do expensive work should race it against
//! [`RequestContext::done`]:
//!
//! ```rust,ignore
//! tokio::select! {
//!     rows = db.query(sql) => Response::success(rows),
//!     () = req.context().done() => Response::error(StatusCode::REQUEST_TIMEOUT, "timeout", "gave up"),
//! }
//! ```

use std::fmt;
use std::time::Duration;

use http::Extensions;
use tokio::time::{self, Instant};
use tokio_util::sync::{CancellationToken, DropGuard};

/// Why a context is done.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContextError {
    /// The context (or one of its parents) was cancelled explicitly.
    Cancelled,
    /// The context's deadline has passed.
    DeadlineExceeded,
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled        => f.write_str("context cancelled"),
            Self::DeadlineExceeded => f.write_str("context deadline exceeded"),
        }
    }
}

/// Cancellation signal, optional deadline and key-value store for one request.
///
/// Cloning is cheap and every clone observes the same cancellation. Values
/// are keyed by type, the same way [`http::Extensions`] works.
#[derive(Clone, Debug)]
pub struct RequestContext {
    token: CancellationToken,
    deadline: Option<Instant>,
    values: Extensions,
}

impl RequestContext {
    /// A root context: never cancelled unless [`cancel`](Self::cancel) is
    /// called, no deadline, no values.
    pub fn background() -> Self {
        Self { token: CancellationToken::new(), deadline: None, values: Extensions::new() }
    }

    /// Derives a child that is done at `now + timeout`, or earlier if this
    /// context is done first. Cancelling the child does not affect `self`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derives a child whose deadline is the earlier of `deadline` and this
    /// context's own deadline.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(parent) => parent.min(deadline),
            None => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
            values: self.values.clone(),
        }
    }

    /// Derives a child carrying `value` in addition to the inherited values.
    /// Shares cancellation with `self`.
    pub fn with_value<T>(&self, value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut child = self.clone();
        child.values.insert(value);
        child
    }

    /// Returns the value of type `T`, if one was attached.
    pub fn value<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.values.get::<T>()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancels this context and every context derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns a guard that cancels this context when dropped.
    pub fn cancel_on_drop(&self) -> DropGuard {
        self.token.clone().drop_guard()
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    () = self.token.cancelled() => {}
                    () = time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Non-blocking check of [`done`](Self::done).
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// `None` while the context is live; otherwise the reason it is done.
    ///
    /// A passed deadline takes precedence: the timeout guard cancels the
    /// token right after the deadline fires, and callers care about the
    /// original cause.
    pub fn err(&self) -> Option<ContextError> {
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Some(ContextError::DeadlineExceeded);
        }
        if self.token.is_cancelled() {
            return Some(ContextError::Cancelled);
        }
        None
    }
}

impl Default for RequestContext {
    fn default() -> Self { Self::background() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Tenant(&'static str);

    #[tokio::test(start_paused = true)]
    async fn deadline_fires_done() {
        let ctx = RequestContext::background().with_timeout(Duration::from_millis(50));
        assert_eq!(ctx.err(), None);

        let start = Instant::now();
        ctx.done().await;

        assert!(start.elapsed() >= Duration::from_millis(50));
        assert!(start.elapsed() < Duration::from_millis(60));
        assert_eq!(ctx.err(), Some(ContextError::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn child_deadline_never_exceeds_parent() {
        let parent = RequestContext::background().with_timeout(Duration::from_millis(20));
        let child = parent.with_timeout(Duration::from_secs(5));
        assert_eq!(child.deadline(), parent.deadline());
    }

    #[tokio::test]
    async fn parent_cancel_reaches_child_but_not_back() {
        let parent = RequestContext::background();
        let child = parent.with_timeout(Duration::from_secs(60));

        child.cancel();
        assert_eq!(child.err(), Some(ContextError::Cancelled));
        assert!(!parent.is_done());

        let other = parent.with_timeout(Duration::from_secs(60));
        parent.cancel();
        other.done().await;
        assert_eq!(other.err(), Some(ContextError::Cancelled));
    }

    #[test]
    fn values_are_inherited_by_children() {
        let root = RequestContext::background().with_value(Tenant("acme"));
        let child = root.with_deadline(Instant::now() + Duration::from_secs(1));
        assert_eq!(child.value::<Tenant>(), Some(&Tenant("acme")));
        assert_eq!(RequestContext::background().value::<Tenant>(), None);
    }

    #[test]
    fn drop_guard_cancels() {
        let ctx = RequestContext::background();
        drop(ctx.cancel_on_drop());
        assert!(ctx.is_done());
    }
}
