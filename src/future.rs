//! Single-shot delivery of a response from the session's message thread to
//! the caller that sent the request.

use std::sync::mpsc;
use std::thread::ThreadId;
use std::time::Duration;

use crate::errors::{Error, SessionError};

/// Creates a connected sink/future pair. The sink resolves at most once;
/// dropping the future makes resolution a silent no-op, dropping the sink
/// unresolved makes the future yield a session-closed error.
pub(crate) fn response_channel<T>(
    pump_thread: Option<ThreadId>,
) -> (ResponseSink<T>, ResponseFuture<T>) {
    let (tx, rx) = mpsc::sync_channel(1);
    (
        ResponseSink { tx },
        ResponseFuture { rx, pump_thread },
    )
}

/// Producer half: resolves the paired [`ResponseFuture`] exactly once.
pub(crate) struct ResponseSink<T> {
    tx: mpsc::SyncSender<Result<T, Error>>,
}

impl<T> ResponseSink<T> {
    pub(crate) fn resolve(self, result: Result<T, Error>) {
        // The receiver may already be gone; that just means nobody is
        // waiting anymore.
        let _ = self.tx.send(result);
    }
}

/// The pending result of a [`send`](crate::Session::send) call, resolved by
/// the session's read pump when the matching response arrives (or with an
/// [`Error`] if the session closes first).
#[must_use = "dropping the future discards the response"]
pub struct ResponseFuture<T> {
    rx: mpsc::Receiver<Result<T, Error>>,
    pump_thread: Option<ThreadId>,
}

impl<T> ResponseFuture<T> {
    /// Blocks until the response arrives and yields it by move.
    ///
    /// Calling this from a request or event handler deadlocks by
    /// construction (the thread that would deliver the response is the one
    /// blocking), so that case fails fast with an error instead.
    pub fn wait(self) -> Result<T, Error> {
        if self.pump_thread == Some(std::thread::current().id()) {
            return Err(Error::new(
                "wait() on the session's message thread would deadlock; \
                 handlers must not block on their own session",
            ));
        }
        self.rx
            .recv()
            .unwrap_or_else(|_| Err(Error::from(SessionError::Closed)))
    }

    /// Like [`wait`](Self::wait), giving up after `timeout`.
    pub fn wait_timeout(self, timeout: Duration) -> Result<T, Error> {
        if self.pump_thread == Some(std::thread::current().id()) {
            return Err(Error::new(
                "wait() on the session's message thread would deadlock; \
                 handlers must not block on their own session",
            ));
        }
        match self.rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                Err(Error::new("timed out waiting for response"))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(Error::from(SessionError::Closed))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn resolves_across_threads() {
        let (sink, future) = response_channel::<i64>(None);
        let producer = thread::spawn(move || sink.resolve(Ok(7)));
        assert_eq!(future.wait(), Ok(7));
        producer.join().unwrap();
    }

    #[test]
    fn dropped_future_does_not_block_or_poison_the_producer() {
        let (sink, future) = response_channel::<i64>(None);
        drop(future);
        sink.resolve(Ok(1));
    }

    #[test]
    fn dropped_sink_yields_session_closed() {
        let (sink, future) = response_channel::<i64>(None);
        drop(sink);
        let err = future.wait().unwrap_err();
        assert!(err.message.contains("closed"));
    }

    #[test]
    fn wait_on_the_pump_thread_fails_fast() {
        let (_sink, future) = response_channel::<i64>(Some(thread::current().id()));
        let err = future.wait().unwrap_err();
        assert!(err.message.contains("deadlock"));
    }

    #[test]
    fn timeout_reports_instead_of_hanging() {
        let (_sink, future) = response_channel::<i64>(None);
        let err = future.wait_timeout(Duration::from_millis(10)).unwrap_err();
        assert!(err.message.contains("timed out"));
    }
}
