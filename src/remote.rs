//! The remote object service: create, delete, and stat paths in a
//! hierarchical-namespace store.
//!
//! The wire protocol lives in whatever client implements [`Remote`];
//! senders only care about these three calls and whether something wasn't found.

use thiserror::Error;
use url::Url;

use crate::context::{Context, Interrupted};

pub mod memory;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Couldn't find {path}")]
    NotFound { path: String },
    #[error("Remote call {0}")]
    Interrupted(#[from] Interrupted),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Is the path a file or a directory?
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Resource {
    File,
    Directory,
}

/// Content headers set when a path is created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
    pub content_disposition: Option<String>,
    pub cache_control: Option<String>,
    pub content_md5: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Properties {
    pub resource: Resource,
    pub content_length: u64,
    pub headers: Headers,
}

pub trait Remote: Send + Sync {
    /// Create (or overwrite) the path, expecting `size` bytes to be appended to it.
    fn create(
        &self,
        ctx: &Context,
        path: &Url,
        resource: Resource,
        headers: &Headers,
        size: u64,
    ) -> Result<(), RemoteError>;

    fn delete(&self, ctx: &Context, path: &Url, resource: Resource) -> Result<(), RemoteError>;

    fn properties(&self, ctx: &Context, path: &Url) -> Result<Properties, RemoteError>;
}
