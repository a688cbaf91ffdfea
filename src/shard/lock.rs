//! Exclusive per-shard locks backed by the node file system

use std::collections::HashMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use fs2::FileExt;
use parking_lot::{Condvar, Mutex};

use crate::error::Error;
use crate::types::ShardId;
use crate::Result;

/// Name of the marker file written into a locked shard directory
pub const SHARD_LOCK_FILE: &str = "shard.lock";

/// Retry interval while another process or manager holds the lock file
const FOREIGN_LOCK_POLL: Duration = Duration::from_millis(10);

/// Releases a lock previously handed out by a lock manager
pub trait LockReleaser: Send + Sync {
    /// Give up ownership of `shard_id`
    fn release(&self, shard_id: &ShardId);
}

/// Grants exclusive, timeout-bounded ownership of shard locations
pub trait ShardLockManager: Send + Sync {
    /// Acquire the lock for `shard_id`, waiting at most `timeout`
    fn acquire(&self, shard_id: &ShardId, timeout: Duration) -> Result<ShardLock>;

    /// Release a lock obtained from this manager
    fn release(&self, lock: ShardLock) {
        lock.release();
    }

    /// Whether `shard_id` is currently locked
    fn is_locked(&self, shard_id: &ShardId) -> bool;
}

/// Token representing exclusive ownership of a shard location.
///
/// The lock is released exactly once: through [`ShardLock::release`], or when
/// the token is dropped without having been released.
pub struct ShardLock {
    shard_id: ShardId,
    releaser: Option<Arc<dyn LockReleaser>>,
}

impl ShardLock {
    /// Create a token that calls back into `releaser` on release
    pub fn new(shard_id: ShardId, releaser: Arc<dyn LockReleaser>) -> Self {
        Self {
            shard_id,
            releaser: Some(releaser),
        }
    }

    /// Locked shard
    pub fn shard_id(&self) -> &ShardId {
        &self.shard_id
    }

    /// Release the lock
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(releaser) = self.releaser.take() {
            releaser.release(&self.shard_id);
        }
    }
}

impl Drop for ShardLock {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl fmt::Debug for ShardLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardLock")
            .field("shard_id", &self.shard_id)
            .field("released", &self.releaser.is_none())
            .finish()
    }
}

/// Node-wide shard lock table.
///
/// Two layers: the in-process table serializes threads sharing this manager,
/// and an exclusive `flock` on the shard's lock file excludes other managers
/// and other processes using the same `data_dir`.
struct LockTable {
    /// Root data directory
    data_dir: PathBuf,
    /// Currently held shards with their flocked lock files
    held: Mutex<HashMap<ShardId, File>>,
    /// Signalled whenever a lock is released
    released: Condvar,
}

impl LockTable {
    fn lock_path(&self, shard_id: &ShardId) -> PathBuf {
        shard_path(&self.data_dir, shard_id).join(SHARD_LOCK_FILE)
    }

    /// Try to flock the lock file once; `Ok(None)` if another holder has it
    fn try_lock_file(&self, shard_id: &ShardId) -> std::io::Result<Option<File>> {
        let path = self.lock_path(shard_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.kind() == fs2::lock_contended_error().kind() {
                return Ok(None);
            }
            return Err(e);
        }

        file.set_len(0)?;
        write!(
            file,
            "index={}\nuuid={}\nshard={}\npid={}\n",
            shard_id.index().name(),
            shard_id.index().uuid(),
            shard_id.ordinal(),
            std::process::id()
        )?;
        Ok(Some(file))
    }
}

impl LockReleaser for LockTable {
    fn release(&self, shard_id: &ShardId) {
        let mut held = self.held.lock();
        // The file stays on disk; only the flock marks ownership
        if let Some(file) = held.remove(shard_id) {
            if let Err(e) = file.unlock() {
                tracing::debug!("{} failed to unlock lock file: {}", shard_id, e);
            }
        }
        self.released.notify_all();
        tracing::trace!("{} shard lock released", shard_id);
    }
}

/// Shard lock manager for one node, backed by lock files under `data_dir`
#[derive(Clone)]
pub struct NodeShardLocks {
    table: Arc<LockTable>,
}

impl NodeShardLocks {
    /// Create a lock manager rooted at `data_dir`
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            table: Arc::new(LockTable {
                data_dir: data_dir.into(),
                held: Mutex::new(HashMap::new()),
                released: Condvar::new(),
            }),
        }
    }

    /// Root data directory
    pub fn data_dir(&self) -> &Path {
        &self.table.data_dir
    }

    /// Location of the lock file for `shard_id`
    pub fn lock_file(&self, shard_id: &ShardId) -> PathBuf {
        self.table.lock_path(shard_id)
    }

    /// Number of locks currently held through this manager
    pub fn held_count(&self) -> usize {
        self.table.held.lock().len()
    }
}

impl ShardLockManager for NodeShardLocks {
    fn acquire(&self, shard_id: &ShardId, timeout: Duration) -> Result<ShardLock> {
        let deadline = Instant::now() + timeout;
        let mut held = self.table.held.lock();

        loop {
            if !held.contains_key(shard_id) {
                if let Some(file) = self.table.try_lock_file(shard_id)? {
                    held.insert(shard_id.clone(), file);
                    break;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(Error::ShardLockTimeout {
                    shard_id: shard_id.clone(),
                    timeout,
                });
            }
            // Local releases wake us; a foreign holder is polled
            let wake = deadline.min(now + FOREIGN_LOCK_POLL);
            self.table.released.wait_until(&mut held, wake);
        }

        tracing::trace!("{} shard lock acquired", shard_id);
        let releaser: Arc<dyn LockReleaser> = self.table.clone();
        Ok(ShardLock::new(shard_id.clone(), releaser))
    }

    /// Whether `shard_id` is held through this manager
    fn is_locked(&self, shard_id: &ShardId) -> bool {
        self.table.held.lock().contains_key(shard_id)
    }
}

/// Directory holding the on-disk data of `shard_id`
pub fn shard_path(data_dir: &Path, shard_id: &ShardId) -> PathBuf {
    data_dir
        .join("indices")
        .join(shard_id.index().name())
        .join(shard_id.index().uuid())
        .join(shard_id.ordinal().to_string())
}
