#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::*;

use hnsend::chunk::ChunkRange;
use hnsend::config::SenderConfig;
use hnsend::context::Context;
use hnsend::drive::ChunkAppender;
use hnsend::remote::Headers;
use hnsend::remote::memory::MemoryRemote;
use hnsend::sender::Sender;
use hnsend::status::*;
use hnsend::target::{EntityKind, Target};

pub const DEST: &str = "https://acct.dfs.example.net/fs/backups/big.bin";

pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

/// Some bytes that aren't all the same.
pub fn source_bytes(len: usize) -> Arc<Vec<u8>> {
    Arc::new((0..len).map(|i| (i % 251) as u8).collect())
}

pub struct StaticSource(pub Headers);

impl SourceInfoProvider for StaticSource {
    fn properties(&self) -> Result<SourceProperties> {
        Ok(SourceProperties {
            headers: self.0.clone(),
        })
    }
}

/// Appends straight into a [`MemoryRemote`].
pub struct MemoryAppender {
    pub remote: Arc<MemoryRemote>,
    pub source: Arc<Vec<u8>>,
    /// Fail the append of this chunk, if any.
    pub fail_chunk: Option<u32>,
    pub appends: AtomicUsize,
    pub flushes: AtomicUsize,
}

impl MemoryAppender {
    pub fn new(remote: Arc<MemoryRemote>, source: Arc<Vec<u8>>) -> Self {
        Self {
            remote,
            source,
            fail_chunk: None,
            appends: AtomicUsize::new(0),
            flushes: AtomicUsize::new(0),
        }
    }
}

impl ChunkAppender for MemoryAppender {
    fn append(&self, ctx: &Context, target: &Target, range: ChunkRange) -> Result<()> {
        ensure!(
            self.fail_chunk != Some(range.index),
            "connection reset appending chunk {}",
            range.index
        );
        let bytes = &self.source[range.offset as usize..range.end() as usize];
        self.remote.append(ctx, target.url(), range.offset, bytes)?;
        self.appends.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn flush(&self, ctx: &Context, target: &Target, position: u64) -> Result<()> {
        self.remote.flush(ctx, target.url(), position)?;
        self.flushes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

pub fn file_info(source_size: u64, block_size: u32) -> TransferInfo {
    TransferInfo {
        destination: DEST.to_owned(),
        source_size,
        block_size,
        entity_kind: EntityKind::File,
    }
}

pub fn sender(
    info: TransferInfo,
    config: &SenderConfig,
) -> Result<(Sender, Arc<Tracker>, Arc<MemoryRemote>)> {
    let tracker = Arc::new(Tracker::new(info));
    let remote = Arc::new(MemoryRemote::new());
    let s = Sender::new(
        tracker.clone(),
        remote.clone(),
        Arc::new(Unpaced),
        &StaticSource(Headers::default()),
        config,
    )?;
    Ok((s, tracker, remote))
}
