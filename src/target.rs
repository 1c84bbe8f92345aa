//! Resolves a destination into the thing we're sending to: a file or a folder.

use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::context::Context;
use crate::error::SendError;
use crate::remote::{Headers, Properties, Remote, RemoteError, Resource};

/// What a transfer says it's moving.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EntityKind {
    File,
    Folder,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::File => f.write_str("file"),
            EntityKind::Folder => f.write_str("folder"),
        }
    }
}

/// A path in the remote store, plus the service that can act on it.
#[derive(Clone)]
pub struct RemotePath {
    url: Url,
    remote: Arc<dyn Remote>,
}

/// The remote end of a transfer.
///
/// Picked once when the sender is built and never changes after.
#[derive(Clone)]
pub enum Target {
    File(RemotePath),
    Folder(RemotePath),
}

impl Target {
    pub fn resolve(
        destination: &str,
        kind: EntityKind,
        remote: Arc<dyn Remote>,
    ) -> Result<Self, SendError> {
        let url = Url::parse(destination).map_err(|source| SendError::MalformedDestination {
            destination: destination.to_owned(),
            source,
        })?;
        let path = RemotePath { url, remote };
        Ok(match kind {
            EntityKind::File => Target::File(path),
            EntityKind::Folder => Target::Folder(path),
        })
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Target::File(_) => EntityKind::File,
            Target::Folder(_) => EntityKind::Folder,
        }
    }

    fn path(&self) -> &RemotePath {
        match self {
            Target::File(p) | Target::Folder(p) => p,
        }
    }

    fn resource(&self) -> Resource {
        match self {
            Target::File(_) => Resource::File,
            Target::Folder(_) => Resource::Directory,
        }
    }

    pub fn url(&self) -> &Url {
        &self.path().url
    }

    /// A stable string naming the target, suitable for logs and comparison.
    pub fn identity(&self) -> &str {
        self.path().url.as_str()
    }

    pub fn create(&self, ctx: &Context, headers: &Headers, size: u64) -> Result<(), RemoteError> {
        let p = self.path();
        p.remote.create(ctx, &p.url, self.resource(), headers, size)
    }

    pub fn delete(&self, ctx: &Context) -> Result<(), RemoteError> {
        let p = self.path();
        p.remote.delete(ctx, &p.url, self.resource())
    }

    pub fn properties(&self, ctx: &Context) -> Result<Properties, RemoteError> {
        let p = self.path();
        p.remote.properties(ctx, &p.url)
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind(), self.identity())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use anyhow::Result;

    use crate::remote::memory::MemoryRemote;

    const DEST: &str = "https://acct.dfs.example.net/fs/dir/some%20file.bin?sv=2020&sig=abc";

    #[test]
    fn files_and_folders() -> Result<()> {
        let remote = Arc::new(MemoryRemote::new());
        let f = Target::resolve(DEST, EntityKind::File, remote.clone())?;
        let d = Target::resolve(DEST, EntityKind::Folder, remote)?;
        assert_eq!(f.kind(), EntityKind::File);
        assert_eq!(d.kind(), EntityKind::Folder);
        assert_eq!(f.resource(), Resource::File);
        assert_eq!(d.resource(), Resource::Directory);
        Ok(())
    }

    #[test]
    fn resolving_is_idempotent() -> Result<()> {
        let remote = Arc::new(MemoryRemote::new());
        let a = Target::resolve(DEST, EntityKind::File, remote.clone())?;
        let b = Target::resolve(DEST, EntityKind::File, remote)?;
        assert_eq!(a.identity(), b.identity());
        assert_eq!(a.kind(), b.kind());
        assert_eq!(a.url(), b.url());
        Ok(())
    }

    #[test]
    fn garbage_destination() {
        let remote = Arc::new(MemoryRemote::new());
        let e = Target::resolve("not a url at all", EntityKind::File, remote).unwrap_err();
        assert!(matches!(e, SendError::MalformedDestination { .. }));
    }

    #[test]
    fn capabilities_hit_the_remote() -> Result<()> {
        let remote = Arc::new(MemoryRemote::new());
        let ctx = Context::new();
        let t = Target::resolve(DEST, EntityKind::File, remote.clone())?;

        t.create(&ctx, &Headers::default(), 0)?;
        assert!(remote.exists(t.url()));
        assert_eq!(t.properties(&ctx)?.resource, Resource::File);
        t.delete(&ctx)?;
        assert!(!remote.exists(t.url()));
        Ok(())
    }
}
