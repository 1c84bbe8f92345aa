//! The [`Sender`]: creates the remote file before any chunk lands in it,
//! and deletes it again if the transfer dies partway.
//!
//! An orchestrator drives each sender through the same steps:
//!
//! 1. [`Sender::new`]
//! 2. [`Sender::prologue`], exactly once, before scheduling any chunks
//! 3. Chunk appends (not ours), each to a disjoint range of the file,
//!    flushing every [`Sender::flush_threshold`] bytes
//! 4. Optionally, [`Sender::get_destination_length`] to verify the result
//! 5. [`Sender::cleanup`], exactly once, after every chunk is done one way or another

use std::sync::Arc;
use std::time::Duration;

use tracing::*;

use crate::chunk::{self, ChunkPlan};
use crate::config::SenderConfig;
use crate::context::Context;
use crate::error::SendError;
use crate::remote::{Headers, Remote, RemoteError};
use crate::status::{Pacer, SourceInfoProvider, Status, TransferStatus};
use crate::target::{EntityKind, Target};

/// Where a sender is in its life.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Lifecycle {
    Constructed,
    Prologued,
    Succeeded,
    Failed,
    CleanedUp,
}

/// What the prologue did.
#[derive(Debug)]
pub struct PrologueOutcome {
    /// Something might exist at the destination now, so cleanup is owed
    /// if the transfer fails. True even if creation failed;
    /// the service may have gotten partway.
    ///
    /// False for folder targets (and for a repeated prologue):
    /// those fail before any call reaches the remote.
    pub destination_modified: bool,
    pub error: Option<SendError>,
}

impl PrologueOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// What cleanup did.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CleanupAction {
    /// The transfer is still alive (or succeeded); nothing to undo.
    NotNeeded,
    Deleted,
    /// There was nothing there to delete.
    AlreadyGone,
    /// Logged and otherwise ignored: the transfer already failed.
    DeleteFailed,
    /// Cleaning up folders isn't a thing yet.
    Unsupported,
    AlreadyCleanedUp,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Stage {
    Constructed,
    Prologued,
    CleanedUp,
}

impl Stage {
    fn name(self) -> &'static str {
        match self {
            Stage::Constructed => "constructed",
            Stage::Prologued => "prologued",
            Stage::CleanedUp => "cleaned up",
        }
    }
}

pub struct Sender {
    status: Arc<dyn TransferStatus>,
    target: Target,
    plan: ChunkPlan,
    pacer: Arc<dyn Pacer>,
    creation_headers: Headers,
    flush_multiplier: u32,
    cleanup_timeout: Duration,
    flush_threshold: Option<u64>,
    stage: Stage,
}

impl Sender {
    /// Plan the chunks, resolve the target, and snapshot the source's headers.
    ///
    /// Doesn't talk to the remote, so a failure here leaves nothing to clean up.
    pub fn new(
        status: Arc<dyn TransferStatus>,
        remote: Arc<dyn Remote>,
        pacer: Arc<dyn Pacer>,
        source: &dyn SourceInfoProvider,
        config: &SenderConfig,
    ) -> Result<Self, SendError> {
        config.validate().map_err(SendError::Config)?;

        let info = status.info();
        let block_size = match info.block_size {
            0 => config.fallback_block_size().map_err(SendError::Config)?,
            b => b,
        };
        let plan = chunk::plan(info.source_size, block_size)?;

        let target = Target::resolve(&info.destination, info.entity_kind, remote)?;

        let props = source.properties().map_err(SendError::MetadataFetch)?;
        let creation_headers = props.headers;

        debug!(
            "Sending {} bytes to {target:?} in {} chunks of {}",
            info.source_size,
            plan.num_chunks(),
            plan.chunk_size()
        );

        Ok(Self {
            status,
            target,
            plan,
            pacer,
            creation_headers,
            flush_multiplier: config.flush_multiplier,
            cleanup_timeout: config.cleanup_timeout(),
            flush_threshold: None,
            stage: Stage::Constructed,
        })
    }

    pub fn chunk_size(&self) -> u32 {
        self.plan.chunk_size()
    }

    pub fn num_chunks(&self) -> u32 {
        self.plan.num_chunks()
    }

    pub fn plan(&self) -> &ChunkPlan {
        &self.plan
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn pacer(&self) -> &Arc<dyn Pacer> {
        &self.pacer
    }

    pub fn status(&self) -> &Arc<dyn TransferStatus> {
        &self.status
    }

    pub fn creation_headers(&self) -> &Headers {
        &self.creation_headers
    }

    /// How many appended bytes may pile up between flushes.
    /// `None` until the prologue runs.
    pub fn flush_threshold(&self) -> Option<u64> {
        self.flush_threshold
    }

    /// What we send. Only files so far.
    pub fn sendable_entity_kind(&self) -> Result<EntityKind, SendError> {
        match self.target {
            Target::File(_) => Ok(EntityKind::File),
            Target::Folder(_) => Err(SendError::Unsupported {
                what: "Sending folders",
            }),
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        match self.stage {
            Stage::Constructed => Lifecycle::Constructed,
            Stage::CleanedUp => Lifecycle::CleanedUp,
            Stage::Prologued => match self.status.status() {
                Status::InProgress => Lifecycle::Prologued,
                Status::Succeeded => Lifecycle::Succeeded,
                Status::Failed | Status::Cancelled => Lifecycle::Failed,
            },
        }
    }

    fn ctx(&self) -> &Context {
        self.status.context()
    }

    fn file(&self, what: &'static str) -> Result<&Target, SendError> {
        match self.target {
            Target::File(_) => Ok(&self.target),
            Target::Folder(_) => Err(SendError::Unsupported { what }),
        }
    }

    /// Does the destination file already exist?
    pub fn remote_file_exists(&self) -> Result<bool, SendError> {
        let file = self.file("Checking for existing folders")?;
        match file.properties(self.ctx()) {
            Ok(_) => Ok(true),
            Err(RemoteError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Create the destination file, sized for the whole source,
    /// so chunks can be appended to it concurrently.
    ///
    /// A creation failure is reported to the transfer (failing it)
    /// _and_ returned in the outcome.
    pub fn prologue(&mut self) -> PrologueOutcome {
        if self.stage != Stage::Constructed {
            warn!(
                "Prologue called on {} sender for {:?}",
                self.stage.name(),
                self.target
            );
            return PrologueOutcome {
                destination_modified: false,
                error: Some(SendError::OutOfOrder {
                    op: "run the prologue of",
                    stage: self.stage.name(),
                }),
            };
        }
        self.stage = Stage::Prologued;

        // Chunk size is final by now.
        self.flush_threshold =
            Some(u64::from(self.plan.chunk_size()) * u64::from(self.flush_multiplier));

        let file = match self.file("Creating folders") {
            Ok(f) => f,
            Err(e) => {
                self.status.fail_active_upload("Creating folder", &e);
                return PrologueOutcome {
                    destination_modified: false,
                    error: Some(e),
                };
            }
        };

        let size = self.status.info().source_size;
        trace!("Creating {file:?} for {size} bytes");
        match file.create(self.ctx(), &self.creation_headers, size) {
            Ok(()) => PrologueOutcome {
                destination_modified: true,
                error: None,
            },
            Err(source) => {
                let e = SendError::Create {
                    path: file.identity().to_owned(),
                    source,
                };
                self.status.fail_active_upload("Creating file", &e);
                PrologueOutcome {
                    destination_modified: true,
                    error: Some(e),
                }
            }
        }
    }

    /// If the transfer failed or was cancelled, delete whatever we left behind;
    /// its contents are at some unknown stage of partial completeness.
    ///
    /// Call once every chunk is done. Never fails: the transfer's fate is already sealed.
    pub fn cleanup(&mut self) -> CleanupAction {
        if self.stage == Stage::CleanedUp {
            warn!("Cleanup called twice for {:?}", self.target);
            return CleanupAction::AlreadyCleanedUp;
        }
        self.stage = Stage::CleanedUp;

        if !self.status.is_dead_inflight() {
            return CleanupAction::NotNeeded;
        }

        let file = match self.file("Cleaning up folders") {
            Ok(f) => f,
            Err(e) => {
                warn!("Not cleaning up {:?}: {e}", self.target);
                return CleanupAction::Unsupported;
            }
        };

        // The transfer's context is probably cancelled;
        // that's why we're here. Get a fresh one.
        let deletion = Context::with_timeout(self.cleanup_timeout);
        match file.delete(&deletion) {
            Ok(()) => {
                debug!("Deleted incomplete {file:?}");
                CleanupAction::Deleted
            }
            Err(RemoteError::NotFound { .. }) => {
                debug!("Incomplete {file:?} was already gone");
                CleanupAction::AlreadyGone
            }
            Err(e) => {
                error!(
                    "Error deleting the (incomplete) file {}: {e:#}",
                    file.identity()
                );
                CleanupAction::DeleteFailed
            }
        }
    }

    /// Ask the remote how long the destination ended up.
    pub fn get_destination_length(&self) -> Result<u64, SendError> {
        let file = self.file("Measuring folders")?;
        let props = file.properties(self.ctx())?;
        Ok(props.content_length)
    }
}
