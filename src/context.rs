//! Cancellation for remote calls: a token plus an optional deadline.
//!
//! Transfers hand one [`Context`] to every create, append, and verify call.
//! Cleanup after a failure makes a brand new one with [`Context::with_timeout`]
//! so that cancelling the transfer can't also cancel the cleanup.

use std::time::{Duration, Instant};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum Interrupted {
    #[error("cancelled")]
    Cancelled,
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context with no deadline that's only done once someone cancels it.
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh context (not derived from any other) that expires after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// A context that's cancelled whenever this one is, but can also be cancelled on its own.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, if there is one. Zero once it's passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn is_done(&self) -> bool {
        self.check().is_err()
    }

    /// Remote calls should bail with this before doing any work.
    pub fn check(&self) -> Result<(), Interrupted> {
        if self.token.is_cancelled() {
            return Err(Interrupted::Cancelled);
        }
        match self.remaining() {
            Some(left) if left.is_zero() => Err(Interrupted::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn children_follow_parents() {
        let parent = Context::new();
        let child = parent.child();
        assert!(child.check().is_ok());

        parent.cancel();
        assert_eq!(child.check(), Err(Interrupted::Cancelled));
    }

    #[test]
    fn parents_ignore_children() {
        let parent = Context::new();
        let child = parent.child();
        child.cancel();
        assert!(child.is_done());
        assert!(!parent.is_done());
    }

    #[test]
    fn fresh_timeouts_are_detached() {
        let transfer = Context::new();
        transfer.cancel();

        let cleanup = Context::with_timeout(Duration::from_secs(120));
        assert!(cleanup.check().is_ok());
        assert!(cleanup.remaining().unwrap() <= Duration::from_secs(120));
    }

    #[test]
    fn deadlines_expire() {
        let ctx = Context::with_timeout(Duration::ZERO);
        assert_eq!(ctx.check(), Err(Interrupted::DeadlineExceeded));
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }
}
