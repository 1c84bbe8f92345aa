//! Everything a [`Sender`](crate::sender::Sender) can fail with.

use thiserror::Error;

use crate::remote::RemoteError;

#[derive(Error, Debug)]
pub enum SendError {
    #[error("Malformed destination {destination}")]
    MalformedDestination {
        destination: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Couldn't fetch source properties")]
    MetadataFetch(#[source] anyhow::Error),
    #[error("Bad sender configuration")]
    Config(#[source] anyhow::Error),
    #[error("Block size must be positive")]
    ZeroBlockSize,
    #[error("{source_size} bytes in {block_size}-byte chunks is too many chunks")]
    TooManyChunks { source_size: u64, block_size: u32 },
    #[error("{what} isn't supported for folder targets yet")]
    Unsupported { what: &'static str },
    #[error("Can't {op} a sender that's already {stage}")]
    OutOfOrder {
        op: &'static str,
        stage: &'static str,
    },
    #[error("Creating {path} failed")]
    Create {
        path: String,
        #[source]
        source: RemoteError,
    },
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl SendError {
    /// True if this error comes from the remote service saying the path doesn't exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SendError::Remote(RemoteError::NotFound { .. })
                | SendError::Create {
                    source: RemoteError::NotFound { .. },
                    ..
                }
        )
    }
}
