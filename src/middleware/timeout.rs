//! Request timeout enforcement.
//!
//! ```text
//!            ┌── spawn ──▶ handler task ──write──┐
//! request ──▶│                                   ├──▶ ResponseSink ──▶ response
//!            └── select! on ctx.done() ──write───┘     (first write wins)
//! ```
//!
//! The guard never kills the handler. When the deadline fires it answers
//! `408` and cancels the handler's context; the handler keeps running until
//! it notices (or finishes), and whatever it writes afterwards is refused by
//! the sink and logged.

use std::panic;
use std::time::Duration;

use http::StatusCode;
use tracing::{debug, warn};

use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;
use crate::sink::{Committed, ResponseSink, SinkError};

/// Outcome of racing a handler against its deadline.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RaceResult {
    Completed,
    DeadlineExceeded,
}

/// Bounds the wall-clock time of everything inside it.
///
/// On timeout the client gets
/// `408 {"success":false,"error":{"code":"timeout","message":"Request timeout"}}`.
/// A handler that panics has its panic re-raised here, so put
/// [`Recover`](crate::middleware::Recover) outside this layer.
#[derive(Clone, Copy, Debug)]
pub struct TimeoutGuard {
    duration: Duration,
}

impl TimeoutGuard {
    /// A zero `duration` times out every request that is not answered on the
    /// handler task's very first poll.
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Runs `next` under the deadline, committing exactly one response into
    /// `sink`, and returns the committed response.
    pub(crate) async fn guard(
        self,
        mut req: Request,
        next: Next,
        sink: ResponseSink,
        committed: Committed,
    ) -> Response {
        let ctx = req.context().with_timeout(self.duration);
        // Cancels the handler's context however this function exits.
        let _cancel = ctx.cancel_on_drop();
        req.set_context(ctx.clone());

        let writer = sink.clone();
        let mut task = tokio::spawn(async move {
            let res = next.run(req).await;
            if let Err(e) = writer.write(res) {
                debug!(error = %e, "handler response discarded");
            }
        });

        let race = tokio::select! {
            // Prefer the handler's answer when both are ready.
            biased;

            joined = &mut task => match joined {
                Ok(()) => RaceResult::Completed,
                Err(e) if e.is_panic() => panic::resume_unwind(e.into_panic()),
                Err(_) => RaceResult::Completed,
            },
            () = ctx.done() => RaceResult::DeadlineExceeded,
        };

        if race == RaceResult::DeadlineExceeded {
            match sink.write(timeout_response()) {
                Ok(()) | Err(SinkError::Closed(_)) => {
                    warn!(timeout = ?self.duration, cause = ?ctx.err(), "request timed out");
                }
                Err(SinkError::AlreadyCommitted(_)) => {
                    debug!("handler committed just before the deadline");
                }
            }
        }
        drop(sink);

        // A task cancelled by runtime shutdown never writes.
        committed.recv().await.unwrap_or_else(Response::internal_error)
    }
}

fn timeout_response() -> Response {
    Response::error(StatusCode::REQUEST_TIMEOUT, "timeout", "Request timeout")
}

impl Middleware for TimeoutGuard {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        let guard = *self;
        Box::pin(async move {
            let (sink, committed) = ResponseSink::channel();
            guard.guard(req, next, sink, committed).await
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use http::Method;
    use tokio::time::{self, Instant};

    use super::*;
    use crate::context::ContextError;
    use crate::middleware::{Recover, Stack};

    fn get() -> Request {
        Request::builder(Method::GET, "/slow").build()
    }

    async fn sleep_then_ok(delay: Duration) -> Response {
        time::sleep(delay).await;
        Response::success("ok")
    }

    #[tokio::test(start_paused = true)]
    async fn fast_handler_response_passes_through() {
        let stack = Stack::new(|_req: Request| sleep_then_ok(Duration::from_millis(10)))
            .layer(TimeoutGuard::new(Duration::from_millis(50)));

        let start = Instant::now();
        let res = stack.call(get()).await;

        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(&res.body()[..], br#"{"success":true,"data":"ok"}"#);
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handler_gets_timeout_at_deadline() {
        let stack = Stack::new(|_req: Request| sleep_then_ok(Duration::from_millis(200)))
            .layer(TimeoutGuard::new(Duration::from_millis(50)));

        let start = Instant::now();
        let res = stack.call(get()).await;
        let elapsed = start.elapsed();

        assert_eq!(res.status_code(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(
            &res.body()[..],
            br#"{"success":false,"error":{"code":"timeout","message":"Request timeout"}}"#,
        );
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(60), "took {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn lagging_handler_write_is_refused() {
        let guard = TimeoutGuard::new(Duration::from_millis(50));
        let next = Stack::new(|_req: Request| sleep_then_ok(Duration::from_millis(200))).entry();
        let (sink, committed) = ResponseSink::channel();

        let res = guard.guard(get(), next, sink.clone(), committed).await;
        assert_eq!(res.status_code(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(sink.rejected_writes(), 0);

        // Let the detached handler finish and try to answer.
        time::sleep(Duration::from_millis(200)).await;
        assert_eq!(sink.rejected_writes(), 1);
        assert!(sink.is_committed());
    }

    #[tokio::test(start_paused = true)]
    async fn committed_response_wins_over_late_timeout() {
        let guard = TimeoutGuard::new(Duration::from_millis(50));
        let next = Stack::new(|_req: Request| sleep_then_ok(Duration::from_millis(200))).entry();
        let (sink, committed) = ResponseSink::channel();

        // The slot is already taken when the deadline fires.
        sink.write(Response::status(StatusCode::ACCEPTED)).unwrap();
        let res = guard.guard(get(), next, sink.clone(), committed).await;

        assert_eq!(res.status_code(), StatusCode::ACCEPTED);
        assert_eq!(sink.rejected_writes(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn boundary_races_commit_exactly_one_response() {
        let deadline = Duration::from_millis(5);
        for _ in 0..50 {
            let stack = Stack::new(move |_req: Request| sleep_then_ok(deadline))
                .layer(TimeoutGuard::new(deadline));
            let res = stack.call(get()).await;

            match res.status_code() {
                StatusCode::OK => assert_eq!(&res.body()[..], br#"{"success":true,"data":"ok"}"#),
                StatusCode::REQUEST_TIMEOUT => assert_eq!(
                    &res.body()[..],
                    br#"{"success":false,"error":{"code":"timeout","message":"Request timeout"}}"#,
                ),
                other => panic!("unexpected status {other}"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn handler_observes_cancellation() {
        let observed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&observed);
        let stack = Stack::new(move |req: Request| {
            let flag = Arc::clone(&flag);
            async move {
                req.context().done().await;
                let cause = req.context().err();
                flag.store(cause == Some(ContextError::DeadlineExceeded), Ordering::SeqCst);
                time::sleep(Duration::from_millis(10)).await;
                Response::success("too late")
            }
        })
        .layer(TimeoutGuard::new(Duration::from_millis(30)));

        let res = stack.call(get()).await;
        assert_eq!(res.status_code(), StatusCode::REQUEST_TIMEOUT);

        time::sleep(Duration::from_millis(1)).await;
        assert!(observed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn context_is_cancelled_after_completion() {
        let seen = Arc::new(std::sync::Mutex::new(None));
        let slot = Arc::clone(&seen);
        let stack = Stack::new(move |req: Request| {
            *slot.lock().unwrap() = Some(req.context().clone());
            async { Response::success("ok") }
        })
        .layer(TimeoutGuard::new(Duration::from_secs(10)));

        stack.call(get()).await;

        let ctx = seen.lock().unwrap().take().unwrap();
        assert_eq!(ctx.err(), Some(ContextError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn parent_deadline_is_respected() {
        let stack = Stack::new(|_req: Request| sleep_then_ok(Duration::from_secs(1)))
            .layer(TimeoutGuard::new(Duration::from_secs(30)));

        let mut req = get();
        let tight = req.context().with_timeout(Duration::from_millis(20));
        req.set_context(tight);

        let start = Instant::now();
        let res = stack.call(req).await;
        assert_eq!(res.status_code(), StatusCode::REQUEST_TIMEOUT);
        assert!(start.elapsed() < Duration::from_millis(30));
    }

    #[tokio::test]
    async fn handler_panic_reaches_recover() {
        let stack = Stack::new(|_req: Request| async {
            if true {
                panic!("boom");
            }
            Response::success("unreachable")
        })
        .layer(Recover)
        .layer(TimeoutGuard::new(Duration::from_secs(5)));

        let res = stack.call(get()).await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
