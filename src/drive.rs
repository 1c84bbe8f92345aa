//! Drive one [`Sender`] through a whole transfer.
//!
//! The ordering rules are what matter here:
//! the prologue finishes before any chunk is scheduled,
//! and every chunk finishes (or fails) before cleanup.
//! The sender trusts whoever calls it to get this right.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use anyhow::{Context as _, Result, anyhow};
use tokio::task::JoinSet;
use tracing::*;

use crate::chunk::ChunkRange;
use crate::context::Context;
use crate::flush::FlushTracker;
use crate::sender::{PrologueOutcome, Sender};
use crate::status::Status;
use crate::target::Target;

/// Moves bytes. Each call may block on the network.
pub trait ChunkAppender: Send + Sync + 'static {
    /// Write the given range of the source to the same range of the target.
    fn append(&self, ctx: &Context, target: &Target, range: ChunkRange) -> Result<()>;

    /// Commit everything before `position`.
    fn flush(&self, ctx: &Context, target: &Target, position: u64) -> Result<()>;
}

/// Send the whole source, returning how the transfer ended.
///
/// Failures along the way (panics in the prologue or epilogue included)
/// are reported to the sender's [status](crate::status::TransferStatus),
/// and cleanup runs regardless.
/// Errors returned here mean a blocking task was dropped or cleanup panicked.
pub async fn send<A: ChunkAppender>(sender: Sender, appender: Arc<A>) -> Result<Status> {
    let status = sender.status().clone();

    let (mut sender, outcome) = blocking(sender, |s| s.prologue()).await?;
    let proceed = match outcome {
        Ok(PrologueOutcome { error: None, .. }) => true,
        Ok(PrologueOutcome { error: Some(e), .. }) => {
            debug!("Not sending chunks to {:?}: {e}", sender.target());
            false
        }
        Err(p) => {
            // The create might have made it out before things went sideways.
            let e = anyhow!("Prologue panicked: {}", panic_message(&*p));
            status.fail_active_upload("Creating file", &*e);
            false
        }
    };

    if proceed {
        if let Err(e) = append_all(&sender, &appender).await {
            status.fail_active_upload("Appending chunk", &*e);
        }

        if !status.is_dead_inflight() {
            let a = appender.clone();
            let (s, res) = blocking(sender, move |s| epilogue(s, &*a)).await?;
            sender = s;
            if let Err(p) = res {
                let e = anyhow!("Epilogue panicked: {}", panic_message(&*p));
                status.fail_active_upload("Flushing", &*e);
            }
        }
    }

    // Every chunk task has been joined by now.
    let action = tokio::task::spawn_blocking(move || sender.cleanup())
        .await
        .context("Cleanup panicked")?;
    let end = status.status();
    debug!("Transfer to {} ended {end:?} ({action:?})", status.info().destination);
    Ok(end)
}

/// Run `f` on the blocking pool, handing the sender back even if `f` panics,
/// so that it can still be cleaned up.
async fn blocking<T, F>(sender: Sender, f: F) -> Result<(Sender, thread::Result<T>)>
where
    T: Send + 'static,
    F: FnOnce(&mut Sender) -> T + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut sender = sender;
        let res = panic::catch_unwind(AssertUnwindSafe(|| f(&mut sender)));
        (sender, res)
    })
    .await
    .context("Blocking task was cancelled")
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("no message")
}

async fn append_all<A: ChunkAppender>(sender: &Sender, appender: &Arc<A>) -> Result<()> {
    let status = sender.status();
    let source_size = status.info().source_size;
    let threshold = sender
        .flush_threshold()
        .ok_or_else(|| anyhow!("No flush threshold; did the prologue run?"))?;
    let tracker = Arc::new(FlushTracker::new(threshold, source_size));

    let mut ts = JoinSet::new();
    for range in sender.plan().ranges() {
        let status = status.clone();
        let target = sender.target().clone();
        let pacer = sender.pacer().clone();
        let appender = appender.clone();
        let tracker = tracker.clone();
        ts.spawn_blocking(move || -> Result<()> {
            let ctx = status.context();
            ctx.check()?;
            pacer.request(ctx, range.len)?;
            appender
                .append(ctx, &target, range)
                .with_context(|| format!("Couldn't append chunk {}", range.index))?;
            if let Some(position) = tracker.record(range.offset, range.len) {
                tracker.deliver(position, |p| {
                    appender
                        .flush(ctx, &target, p)
                        .with_context(|| format!("Couldn't flush to {p}"))
                })?;
            }
            Ok(())
        });
    }

    while let Some(res) = ts.join_next().await {
        match res {
            Ok(Ok(())) => {}
            // Once one chunk fails, the rest fail because we cancelled them.
            // Only the first one is interesting.
            Ok(Err(e)) if status.is_dead_inflight() => trace!("{e:#}"),
            Ok(Err(e)) => status.fail_active_upload("Appending chunk", &*e),
            Err(join) => status.fail_active_upload("Appending chunk", &join),
        }
    }
    Ok(())
}

/// Final flush, then check that the remote agrees on how big the file is.
fn epilogue<A: ChunkAppender>(sender: &Sender, appender: &A) {
    let status = sender.status();
    let ctx = status.context();
    let size = status.info().source_size;

    if size > 0 {
        if let Err(e) = appender.flush(ctx, sender.target(), size) {
            status.fail_active_upload("Flushing", &*e);
            return;
        }
    }

    match sender.get_destination_length() {
        Ok(len) if len == size => status.mark_succeeded(),
        Ok(len) => {
            let e = anyhow!("Destination is {len} bytes; expected {size}");
            status.fail_active_upload("Checking length", &*e);
        }
        Err(e) => status.fail_active_upload("Checking length", &e),
    }
}
