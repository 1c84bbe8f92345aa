//! Splits a source into fixed-size [chunks](ChunkRange).

use tracing::*;

use crate::error::SendError;

/// How a transfer is cut up. Computed once, before we touch the network.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    source_size: u64,
    chunk_size: u32,
    num_chunks: u32,
}

/// One contiguous byte range of the source, sent as a single unit of work.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ChunkRange {
    pub index: u32,
    pub offset: u64,
    pub len: u64,
}

impl ChunkRange {
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }
}

/// Chunk `source_size` bytes into `block_size` pieces.
///
/// An empty source has no chunks at all.
pub fn plan(source_size: u64, block_size: u32) -> Result<ChunkPlan, SendError> {
    if block_size == 0 {
        return Err(SendError::ZeroBlockSize);
    }
    let num_chunks = source_size.div_ceil(u64::from(block_size));
    let num_chunks = u32::try_from(num_chunks).map_err(|_| SendError::TooManyChunks {
        source_size,
        block_size,
    })?;
    trace!("{source_size} bytes -> {num_chunks} chunks of {block_size}");
    Ok(ChunkPlan {
        source_size,
        chunk_size: block_size,
        num_chunks,
    })
}

impl ChunkPlan {
    pub fn source_size(&self) -> u64 {
        self.source_size
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    pub fn num_chunks(&self) -> u32 {
        self.num_chunks
    }

    /// The byte ranges of each chunk. The last one might be short.
    pub fn ranges(&self) -> impl Iterator<Item = ChunkRange> + use<> {
        let source_size = self.source_size;
        let chunk_size = u64::from(self.chunk_size);
        (0..self.num_chunks).map(move |index| {
            let offset = u64::from(index) * chunk_size;
            ChunkRange {
                index,
                offset,
                len: chunk_size.min(source_size - offset),
            }
        })
    }
}
