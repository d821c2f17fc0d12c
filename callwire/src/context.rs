//! Per-call deadline and cancellation.
//!
//! A [`CallContext`] is created by the transport when a call begins and is
//! shared (cheap clones) by the transport, the channels of the call and the
//! handler. Only the transport cancels it: on deadline expiry, on peer
//! disconnect, or when the client side cancels explicitly. Once cancelled it
//! stays cancelled and the first recorded cause wins.
//!
//! Cancellation is cooperative. Every channel send and receive races the
//! context, and multi-step handlers are expected to call
//! [`CallContext::check`] between steps or wait with [`CallContext::sleep`].
//! A handler that never reaches a suspension point cannot be interrupted.

mod timeout;

pub use timeout::{CONNECT_TIMEOUT_MS_HEADER, compute_effective_timeout, parse_timeout_ms};

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use callwire_core::{Code, Status};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a call stopped early.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelCause {
    /// The caller (or its connection) went away.
    Cancelled,
    /// The deadline passed.
    DeadlineExceeded,
}

impl CancelCause {
    pub fn code(&self) -> Code {
        match self {
            CancelCause::Cancelled => Code::Canceled,
            CancelCause::DeadlineExceeded => Code::DeadlineExceeded,
        }
    }

    pub fn into_status(self) -> Status {
        let message = match self {
            CancelCause::Cancelled => "call was cancelled",
            CancelCause::DeadlineExceeded => "deadline exceeded",
        };
        Status::new(self.code(), message)
    }
}

impl From<CancelCause> for Status {
    fn from(cause: CancelCause) -> Self {
        cause.into_status()
    }
}

/// Deadline and cancellation state of one call.
#[derive(Clone, Debug)]
pub struct CallContext {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    deadline: Option<Instant>,
    token: CancellationToken,
    cause: OnceLock<CancelCause>,
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}

impl CallContext {
    /// A context without deadline.
    pub fn new() -> Self {
        Self::with_deadline(None)
    }

    /// A context expiring `timeout` from now, or never for `None`.
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self::with_deadline(timeout.map(|timeout| Instant::now() + timeout))
    }

    pub fn with_deadline(deadline: Option<Instant>) -> Self {
        Self {
            inner: Arc::new(Inner {
                deadline,
                token: CancellationToken::new(),
                cause: OnceLock::new(),
            }),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Time left until the deadline; zero once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Cancel the call. No-op if it is already cancelled or expired.
    pub fn cancel(&self) {
        self.abort(CancelCause::Cancelled);
    }

    pub(crate) fn expire(&self) {
        self.abort(CancelCause::DeadlineExceeded);
    }

    fn abort(&self, cause: CancelCause) {
        if self.inner.cause.set(cause).is_ok() {
            tracing::debug!(?cause, "call context cancelled");
        }
        self.inner.token.cancel();
    }

    /// The recorded cause, noticing an elapsed deadline on the way.
    pub fn cause(&self) -> Option<CancelCause> {
        if let Some(cause) = self.inner.cause.get() {
            return Some(*cause);
        }
        match self.inner.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.expire();
                self.inner.cause.get().copied()
            }
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cause().is_some()
    }

    /// `Err` with the cancellation status once the call was cancelled or expired.
    pub fn check(&self) -> Result<(), Status> {
        match self.cause() {
            Some(cause) => Err(cause.into_status()),
            None => Ok(()),
        }
    }

    /// Resolves when the call is cancelled or its deadline passes.
    pub async fn cancelled(&self) -> CancelCause {
        if let Some(cause) = self.cause() {
            return cause;
        }
        match self.inner.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.inner.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => self.expire(),
                }
            }
            None => self.inner.token.cancelled().await,
        }
        self.cause().unwrap_or(CancelCause::Cancelled)
    }

    /// Wait for `duration`, returning early with the cancellation status.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Status> {
        tokio::select! {
            biased;
            cause = self.cancelled() => Err(cause.into_status()),
            _ = tokio::time::sleep(duration) => self.check(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_cause_status() {
        for cause in [CancelCause::Cancelled, CancelCause::DeadlineExceeded] {
            let status = Status::from(cause);
            assert_eq!(status.code(), cause.code());
            assert!(status.code().is_cancellation());
        }
        assert_eq!(
            CancelCause::DeadlineExceeded.into_status().message(),
            Some("deadline exceeded")
        );
    }

    #[tokio::test]
    async fn test_fresh_context_is_live() {
        let ctx = CallContext::new();
        assert!(ctx.check().is_ok());
        assert_eq!(ctx.deadline(), None);
        assert_eq!(ctx.remaining(), None);
    }

    #[tokio::test]
    async fn test_cancel_is_shared_by_clones() {
        let ctx = CallContext::new();
        let clone = ctx.clone();
        clone.cancel();

        assert_eq!(ctx.cause(), Some(CancelCause::Cancelled));
        assert_eq!(ctx.check().unwrap_err().code(), Code::Canceled);
        assert_eq!(ctx.cancelled().await, CancelCause::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires() {
        let ctx = CallContext::with_timeout(Some(Duration::from_millis(100)));
        assert!(ctx.check().is_ok());

        tokio::time::advance(Duration::from_millis(150)).await;
        assert_eq!(ctx.cause(), Some(CancelCause::DeadlineExceeded));
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_cause_wins() {
        let ctx = CallContext::with_timeout(Some(Duration::from_millis(100)));
        assert_eq!(ctx.cancelled().await, CancelCause::DeadlineExceeded);

        ctx.cancel();
        assert_eq!(ctx.cause(), Some(CancelCause::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_is_interrupted_by_deadline() {
        let ctx = CallContext::with_timeout(Some(Duration::from_secs(1)));
        let started = Instant::now();

        let err = ctx.sleep(Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(err.code(), Code::DeadlineExceeded);
        assert_eq!(started.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_is_interrupted_by_cancel() {
        let ctx = CallContext::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let err = ctx.sleep(Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(err.code(), Code::Canceled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_completes_within_deadline() {
        let ctx = CallContext::with_timeout(Some(Duration::from_secs(5)));
        assert!(ctx.sleep(Duration::from_secs(1)).await.is_ok());
    }
}
