//! What a sender needs from the transfer it belongs to:
//! its status, its source, and permission to use bandwidth.

use std::error::Error;
use std::sync::Mutex;

use anyhow::Result;
use tracing::*;

use crate::context::Context;
use crate::remote::Headers;
use crate::target::EntityKind;

/// The bits of a transfer a sender is built from.
#[derive(Debug, Clone)]
pub struct TransferInfo {
    pub destination: String,
    pub source_size: u64,
    /// Zero means "use the configured default".
    pub block_size: u32,
    pub entity_kind: EntityKind,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Status {
    InProgress,
    Succeeded,
    Failed,
    Cancelled,
}

impl Status {
    /// Failed or cancelled while we were still working on it.
    pub fn is_dead(self) -> bool {
        matches!(self, Status::Failed | Status::Cancelled)
    }
}

pub trait TransferStatus: Send + Sync {
    /// Cancelled once the transfer fails or is cancelled.
    fn context(&self) -> &Context;

    fn info(&self) -> &TransferInfo;

    fn status(&self) -> Status;

    fn is_dead_inflight(&self) -> bool {
        self.status().is_dead()
    }

    /// Mark the transfer as failed during `stage`.
    fn fail_active_upload(&self, stage: &str, err: &(dyn Error + 'static));

    fn mark_succeeded(&self);
}

/// Source-side properties, carried over to the destination when it's created.
#[derive(Debug, Clone, Default)]
pub struct SourceProperties {
    pub headers: Headers,
}

pub trait SourceInfoProvider {
    fn properties(&self) -> Result<SourceProperties>;
}

/// Hands out bandwidth. Chunk appenders ask before each request.
pub trait Pacer: Send + Sync {
    fn request(&self, ctx: &Context, bytes: u64) -> Result<()>;
}

/// Go as fast as you like.
pub struct Unpaced;

impl Pacer for Unpaced {
    fn request(&self, ctx: &Context, _bytes: u64) -> Result<()> {
        ctx.check()?;
        Ok(())
    }
}

/// Why (and where) a transfer failed.
#[derive(Debug, Clone)]
pub struct Failure {
    pub stage: String,
    pub message: String,
}

/// An in-process [`TransferStatus`].
pub struct Tracker {
    ctx: Context,
    info: TransferInfo,
    state: Mutex<(Status, Vec<Failure>)>,
}

impl Tracker {
    pub fn new(info: TransferInfo) -> Self {
        Self {
            ctx: Context::new(),
            info,
            state: Mutex::new((Status::InProgress, vec![])),
        }
    }

    /// Cancel the transfer (e.g., the user hit ^C).
    pub fn cancel(&self) {
        let mut s = self.state.lock().unwrap();
        if s.0 == Status::InProgress {
            debug!("Cancelling transfer to {}", self.info.destination);
            s.0 = Status::Cancelled;
        }
        self.ctx.cancel();
    }

    pub fn failures(&self) -> Vec<Failure> {
        self.state.lock().unwrap().1.clone()
    }
}

impl TransferStatus for Tracker {
    fn context(&self) -> &Context {
        &self.ctx
    }

    fn info(&self) -> &TransferInfo {
        &self.info
    }

    fn status(&self) -> Status {
        self.state.lock().unwrap().0
    }

    fn fail_active_upload(&self, stage: &str, err: &(dyn Error + 'static)) {
        let message = format_chain(err);
        error!("{stage} {} failed: {message}", self.info.destination);

        let mut s = self.state.lock().unwrap();
        // A cancelled transfer stays cancelled; everything after that is fallout.
        if s.0 == Status::InProgress {
            s.0 = Status::Failed;
        }
        s.1.push(Failure {
            stage: stage.to_owned(),
            message,
        });
        drop(s);
        // Stop everybody else working on this transfer.
        self.ctx.cancel();
    }

    fn mark_succeeded(&self) {
        let mut s = self.state.lock().unwrap();
        if s.0 == Status::InProgress {
            s.0 = Status::Succeeded;
        } else {
            warn!(
                "Can't mark {:?} transfer to {} as succeeded",
                s.0, self.info.destination
            );
        }
    }
}

/// `outer: inner: innermost`, like anyhow's `{:#}`
fn format_chain(err: &(dyn Error + 'static)) -> String {
    let mut s = err.to_string();
    let mut cur = err.source();
    while let Some(e) = cur {
        s.push_str(": ");
        s.push_str(&e.to_string());
        cur = e.source();
    }
    s
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::remote::RemoteError;

    fn info() -> TransferInfo {
        TransferInfo {
            destination: "https://acct.dfs.example.net/fs/f".to_owned(),
            source_size: 10,
            block_size: 4,
            entity_kind: EntityKind::File,
        }
    }

    #[test]
    fn failing_cancels() {
        let t = Tracker::new(info());
        assert!(!t.is_dead_inflight());

        let e = RemoteError::NotFound {
            path: "somewhere".to_owned(),
        };
        t.fail_active_upload("Creating file", &e);
        assert_eq!(t.status(), Status::Failed);
        assert!(t.is_dead_inflight());
        assert!(t.context().is_cancelled());

        let f = t.failures();
        assert_eq!(f.len(), 1);
        assert_eq!(f[0].stage, "Creating file");
        assert_eq!(f[0].message, "Couldn't find somewhere");
    }

    #[test]
    fn cancelled_stays_cancelled() {
        let t = Tracker::new(info());
        t.cancel();
        t.fail_active_upload("Appending chunk", &crate::context::Interrupted::Cancelled);
        assert_eq!(t.status(), Status::Cancelled);
        t.mark_succeeded();
        assert_eq!(t.status(), Status::Cancelled);
        assert!(t.is_dead_inflight());
    }

    #[test]
    fn success_is_not_dead() {
        let t = Tracker::new(info());
        t.mark_succeeded();
        assert_eq!(t.status(), Status::Succeeded);
        assert!(!t.is_dead_inflight());
    }
}
