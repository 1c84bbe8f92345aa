//! Decides when appended chunks should be flushed (committed).
//!
//! Chunks finish in whatever order they like, but a flush commits everything
//! before its position, so we can only flush up to the point where every byte
//! before it has been appended. Flushing after each chunk is slow;
//! we wait until that contiguous prefix crosses another multiple of the
//! sender's flush threshold.
//!
//! Positions are handed out in increasing order, but the tasks that get them
//! can race to the remote. [`FlushTracker::deliver`] serializes them there
//! and drops any that a later flush already covered.

use std::collections::BTreeMap;
use std::sync::Mutex;

use tracing::*;

pub struct FlushTracker {
    threshold: u64,
    total: u64,
    progress: Mutex<Progress>,
    /// The furthest flush that reached the remote
    delivered: Mutex<u64>,
}

#[derive(Default)]
struct Progress {
    /// Every byte before this has been appended.
    contiguous: u64,
    /// Appended ranges past `contiguous`, start -> end
    pending: BTreeMap<u64, u64>,
    flushed: u64,
}

impl FlushTracker {
    pub fn new(threshold: u64, total: u64) -> Self {
        assert!(threshold > 0, "Flush threshold must be positive");
        Self {
            threshold,
            total,
            progress: Mutex::new(Progress::default()),
            delivered: Mutex::new(0),
        }
    }

    /// Note that `[offset, offset + len)` was appended.
    ///
    /// Returns the position to flush to, if it's time.
    /// The final flush (to the full length) is the caller's job once everything is appended.
    pub fn record(&self, offset: u64, len: u64) -> Option<u64> {
        let mut guard = self.progress.lock().unwrap();
        let p = &mut *guard;
        if len == 0 {
            return None;
        }
        p.pending.insert(offset, offset + len);

        // Soak up whatever's now contiguous.
        while let Some(end) = p.pending.remove(&p.contiguous) {
            p.contiguous = end;
        }

        // Stop short of the end; that flush is the epilogue's.
        let limit = p.contiguous.min(self.total.saturating_sub(1));
        let boundary = (limit / self.threshold) * self.threshold;
        if boundary > p.flushed {
            trace!("{} bytes contiguous; flushing to {boundary}", p.contiguous);
            p.flushed = boundary;
            Some(boundary)
        } else {
            None
        }
    }

    /// Send a flush position from [`record`](Self::record) to the remote with `flush`,
    /// one at a time and in order.
    ///
    /// Returns `Ok(false)` without calling `flush` if a flush at or past
    /// `position` already went out.
    pub fn deliver<E, F>(&self, position: u64, flush: F) -> Result<bool, E>
    where
        F: FnOnce(u64) -> Result<(), E>,
    {
        let mut delivered = self.delivered.lock().unwrap();
        if position <= *delivered {
            trace!("Flush to {position} is stale; {} already went out", *delivered);
            return Ok(false);
        }
        flush(position)?;
        *delivered = position;
        Ok(true)
    }

    /// The furthest position [`deliver`](Self::deliver) got to the remote.
    pub fn delivered(&self) -> u64 {
        *self.delivered.lock().unwrap()
    }

    /// Bytes from the start that have been appended.
    pub fn contiguous(&self) -> u64 {
        self.progress.lock().unwrap().contiguous
    }

    /// The last position [`record`](Self::record) told us to flush to.
    pub fn flushed(&self) -> u64 {
        self.progress.lock().unwrap().flushed
    }
}
