use super::*;

use std::sync::Mutex;
use std::time::Instant;

use anyhow::anyhow;
use rustc_hash::FxHashMap;
use tracing::*;

/// A remote that stores everything as URL-addressed buffers.
///
/// Great for testing: it writes down every call it gets
/// and can be told to fail the next call of a given kind.
#[derive(Default)]
pub struct MemoryRemote {
    paths: Mutex<FxHashMap<String, Entry>>,
    calls: Mutex<Vec<Call>>,
    faults: Mutex<Vec<(Op, String)>>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Op {
    Create,
    Delete,
    Properties,
}

/// A call as the remote saw it.
#[derive(Debug, Clone)]
pub struct Call {
    pub op: Op,
    pub path: String,
    pub deadline: Option<Instant>,
    pub cancelled: bool,
}

struct Entry {
    resource: Resource,
    headers: Headers,
    /// How big the creator said it would get
    size: u64,
    data: Vec<u8>,
    /// Bytes committed so far; what `properties()` reports as the length.
    flushed: u64,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `op` fail with the given message.
    pub fn fail_next(&self, op: Op, why: &str) {
        self.faults.lock().unwrap().push((op, why.to_owned()));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, op: Op) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.op == op).count()
    }

    pub fn exists(&self, path: &Url) -> bool {
        self.paths.lock().unwrap().contains_key(path.as_str())
    }

    /// Everything appended to the path so far, committed or not.
    pub fn contents(&self, path: &Url) -> Option<Vec<u8>> {
        self.paths
            .lock()
            .unwrap()
            .get(path.as_str())
            .map(|e| e.data.clone())
    }

    pub fn headers(&self, path: &Url) -> Option<Headers> {
        self.paths
            .lock()
            .unwrap()
            .get(path.as_str())
            .map(|e| e.headers.clone())
    }

    /// Write `bytes` at `offset` of an existing file.
    pub fn append(
        &self,
        ctx: &Context,
        path: &Url,
        offset: u64,
        bytes: &[u8],
    ) -> Result<(), RemoteError> {
        ctx.check()?;
        let mut paths = self.paths.lock().unwrap();
        let entry = paths
            .get_mut(path.as_str())
            .ok_or_else(|| RemoteError::NotFound {
                path: path.to_string(),
            })?;
        if offset + bytes.len() as u64 > entry.size {
            return Err(anyhow!(
                "Can't append {} bytes at {offset}; {path} was created for {}",
                bytes.len(),
                entry.size
            )
            .into());
        }
        let start = offset as usize;
        let end = start + bytes.len();
        if entry.data.len() < end {
            entry.data.resize(end, 0);
        }
        entry.data[start..end].copy_from_slice(bytes);
        trace!("Appended {} bytes to {path} at {offset}", bytes.len());
        Ok(())
    }

    /// Commit everything before `position`.
    pub fn flush(&self, ctx: &Context, path: &Url, position: u64) -> Result<(), RemoteError> {
        ctx.check()?;
        let mut paths = self.paths.lock().unwrap();
        let entry = paths
            .get_mut(path.as_str())
            .ok_or_else(|| RemoteError::NotFound {
                path: path.to_string(),
            })?;
        if position > entry.data.len() as u64 {
            return Err(anyhow!(
                "Can't flush {path} to {position}; only {} bytes were appended",
                entry.data.len()
            )
            .into());
        }
        // Committed data can't be uncommitted.
        if position < entry.flushed {
            return Err(anyhow!(
                "Can't flush {path} to {position}; it's already flushed to {}",
                entry.flushed
            )
            .into());
        }
        entry.flushed = position;
        trace!("Flushed {path} to {position}");
        Ok(())
    }

    /// Record the call, then see if we should fail it.
    fn begin(&self, ctx: &Context, op: Op, path: &Url) -> Result<(), RemoteError> {
        self.calls.lock().unwrap().push(Call {
            op,
            path: path.to_string(),
            deadline: ctx.deadline(),
            cancelled: ctx.is_cancelled(),
        });
        ctx.check()?;

        let mut faults = self.faults.lock().unwrap();
        if let Some(i) = faults.iter().position(|(o, _)| *o == op) {
            let (_, why) = faults.remove(i);
            return Err(anyhow!(why).into());
        }
        Ok(())
    }
}

impl Remote for MemoryRemote {
    fn create(
        &self,
        ctx: &Context,
        path: &Url,
        resource: Resource,
        headers: &Headers,
        size: u64,
    ) -> Result<(), RemoteError> {
        self.begin(ctx, Op::Create, path)?;
        let entry = Entry {
            resource,
            headers: headers.clone(),
            size,
            data: vec![],
            flushed: 0,
        };
        self.paths
            .lock()
            .unwrap()
            .insert(path.to_string(), entry);
        Ok(())
    }

    fn delete(&self, ctx: &Context, path: &Url, _resource: Resource) -> Result<(), RemoteError> {
        self.begin(ctx, Op::Delete, path)?;
        match self.paths.lock().unwrap().remove(path.as_str()) {
            Some(_) => Ok(()),
            None => Err(RemoteError::NotFound {
                path: path.to_string(),
            }),
        }
    }

    fn properties(&self, ctx: &Context, path: &Url) -> Result<Properties, RemoteError> {
        self.begin(ctx, Op::Properties, path)?;
        let paths = self.paths.lock().unwrap();
        let entry = paths.get(path.as_str()).ok_or_else(|| RemoteError::NotFound {
            path: path.to_string(),
        })?;
        Ok(Properties {
            resource: entry.resource,
            content_length: entry.flushed,
            headers: entry.headers.clone(),
        })
    }
}
