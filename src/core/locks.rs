//! Per-module write serialization.
//!
//! Every load-modify-save cycle on a module's spec runs while holding that
//! module's mutex and, across processes, its lease file. Different modules
//! map to different mutexes and leases and proceed in parallel. Readers do
//! not take the lock; they read the last persisted document.

use crate::core::error::ModsetError;
use crate::core::time;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::warn;

/// How long a writer waits on a lease held by another process.
const LEASE_WAIT: Duration = Duration::from_secs(10);
/// A lease older than this was left behind by a crashed writer.
const LEASE_STALE: Duration = Duration::from_secs(60);
const LEASE_RETRY_MS: u64 = 5;

/// Registry of one write mutex per module name.
#[derive(Default)]
pub struct ModuleLocks {
    entries: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ModuleLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn get_entry(&self, module: &str) -> Result<Arc<Mutex<()>>, ModsetError> {
        let mut entries = self.entries.lock().map_err(|_| {
            ModsetError::Persistence("module lock registry poisoned".to_string())
        })?;
        let entry = entries
            .entry(module.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())));
        Ok(Arc::clone(entry))
    }

    /// Run `f` while holding the write lock of `module`.
    ///
    /// The lock is released when `f` returns, on success and on failure.
    pub fn with_module<F, R>(&self, module: &str, f: F) -> Result<R, ModsetError>
    where
        F: FnOnce() -> Result<R, ModsetError>,
    {
        let entry = self.get_entry(module)?;
        let _guard: MutexGuard<'_, ()> = entry.lock().map_err(|_| {
            ModsetError::Persistence(format!("write lock for module '{}' poisoned", module))
        })?;
        f()
    }

    /// Like [`ModuleLocks::with_module`], additionally holding the
    /// cross-process lease at `lease_path` until `f` returns.
    pub fn with_module_lease<F, R>(
        &self,
        module: &str,
        lease_path: &Path,
        f: F,
    ) -> Result<R, ModsetError>
    where
        F: FnOnce() -> Result<R, ModsetError>,
    {
        self.with_module(module, || {
            let _lease = ModuleLease::acquire(lease_path, LEASE_WAIT)?;
            f()
        })
    }
}

/// Cross-process write lease: a lock file only one writer can create.
/// The file is removed when the lease is dropped.
pub struct ModuleLease {
    path: PathBuf,
    file: File,
}

impl ModuleLease {
    pub fn acquire(path: &Path, wait: Duration) -> Result<Self, ModsetError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let deadline = Instant::now() + wait;
        loop {
            if let Some(lease) = try_acquire_lease(path)? {
                return Ok(lease);
            }
            if lease_is_stale(path) {
                warn!(path = %path.display(), "removing stale module lease");
                let _ = fs::remove_file(path);
                continue;
            }
            if Instant::now() >= deadline {
                return Err(ModsetError::Persistence(format!(
                    "module lease {} is held by another writer",
                    path.display()
                )));
            }
            thread::sleep(Duration::from_millis(LEASE_RETRY_MS + jitter_ms(LEASE_RETRY_MS)));
        }
    }
}

impl Drop for ModuleLease {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn try_acquire_lease(path: &Path) -> Result<Option<ModuleLease>, ModsetError> {
    // create_new gives single-winner semantics per path.
    let file = match OpenOptions::new()
        .create_new(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
    {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => return Ok(None),
        Err(err) => return Err(ModsetError::IoError(err)),
    };
    let mut lease = ModuleLease {
        path: path.to_path_buf(),
        file,
    };
    writeln!(lease.file, "{} {}", std::process::id(), time::new_event_id())?;
    Ok(Some(lease))
}

fn lease_is_stale(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.elapsed().ok())
        .is_some_and(|age| age > LEASE_STALE)
}

fn jitter_ms(max_exclusive: u64) -> u64 {
    if max_exclusive <= 1 {
        return 0;
    }
    let now_nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as u64;
    now_nanos % max_exclusive
}
