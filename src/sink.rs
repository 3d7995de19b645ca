//! One-shot response sink.
//!
//! When a handler runs on a background task and a timer runs alongside it,
//! both may want to answer the same request. The sink is the single place
//! where that is decided: the first [`write`](ResponseSink::write) commits,
//! every later write is refused and handed back to the caller.
//!
//! ```text
//! handler task ──write──┐
//!                       ├──▶ ResponseSink ──(first only)──▶ Committed
//! timeout guard ─write──┘
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::oneshot;

use crate::response::Response;

/// Why a write to a [`ResponseSink`] was refused.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Another writer already committed a response for this request.
    #[error("response already committed")]
    AlreadyCommitted(Response),

    /// Nobody is waiting for the response any more (the receiving side was
    /// dropped, usually because the client went away).
    #[error("response receiver dropped")]
    Closed(Response),
}

impl SinkError {
    /// The response that was not delivered.
    pub fn into_response(self) -> Response {
        match self {
            Self::AlreadyCommitted(res) | Self::Closed(res) => res,
        }
    }
}

/// Cloneable single-writer handle. Every clone writes to the same slot.
#[derive(Clone, Debug)]
pub struct ResponseSink {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    slot: Mutex<Option<oneshot::Sender<Response>>>,
    rejected: AtomicUsize,
}

/// The receiving half: resolves to the committed response.
#[derive(Debug)]
pub struct Committed(oneshot::Receiver<Response>);

impl ResponseSink {
    pub fn channel() -> (Self, Committed) {
        let (tx, rx) = oneshot::channel();
        let inner = Arc::new(Inner { slot: Mutex::new(Some(tx)), rejected: AtomicUsize::new(0) });
        (Self { inner }, Committed(rx))
    }

    /// Commits `res` if nothing has been committed yet.
    ///
    /// A refused write is counted and the response returned inside the error;
    /// the already committed response is never touched.
    pub fn write(&self, res: Response) -> Result<(), SinkError> {
        // The slot is only ever `take`n, so a poisoned lock still holds a
        // consistent value.
        let sender = self.inner.slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        match sender {
            Some(tx) => tx.send(res).map_err(SinkError::Closed),
            None => {
                self.inner.rejected.fetch_add(1, Ordering::Relaxed);
                Err(SinkError::AlreadyCommitted(res))
            }
        }
    }

    pub fn is_committed(&self) -> bool {
        self.inner.slot.lock().unwrap_or_else(PoisonError::into_inner).is_none()
    }

    /// Number of writes refused because a response was already committed.
    pub fn rejected_writes(&self) -> usize {
        self.inner.rejected.load(Ordering::Relaxed)
    }
}

impl Committed {
    /// Waits for the committed response. `None` if every sink handle was
    /// dropped without writing.
    pub async fn recv(self) -> Option<Response> {
        self.0.await.ok()
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use super::*;

    #[tokio::test]
    async fn first_write_wins() {
        let (sink, committed) = ResponseSink::channel();
        let other = sink.clone();

        assert!(!sink.is_committed());
        sink.write(Response::status(StatusCode::REQUEST_TIMEOUT)).unwrap();
        assert!(other.is_committed());

        let refused = other.write(Response::text("late")).unwrap_err();
        assert!(matches!(refused, SinkError::AlreadyCommitted(_)));
        assert_eq!(&refused.into_response().body()[..], b"late");
        assert_eq!(sink.rejected_writes(), 1);

        let res = committed.recv().await.unwrap();
        assert_eq!(res.status_code(), StatusCode::REQUEST_TIMEOUT);
    }

    #[tokio::test]
    async fn dropped_receiver_is_reported() {
        let (sink, committed) = ResponseSink::channel();
        drop(committed);
        let err = sink.write(Response::text("nobody listens")).unwrap_err();
        assert!(matches!(err, SinkError::Closed(_)));
        // Still counts as the one commit.
        assert!(sink.is_committed());
        assert_eq!(sink.rejected_writes(), 0);
    }

    #[tokio::test]
    async fn no_writer_yields_none() {
        let (sink, committed) = ResponseSink::channel();
        drop(sink);
        assert!(committed.recv().await.is_none());
    }
}
