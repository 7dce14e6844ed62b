//! Per-slides-directory locking.
//!
//! Concurrent extraction runs for the same source must not interleave writes
//! into one directory. The lock table is a keyed map of mutexes behind an
//! outer mutex; waiters are observable so callers can report "queued".

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Keyed lock table over slide directories.
#[derive(Default)]
pub struct DirLocks {
    table: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl DirLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `dir`.
    ///
    /// Returns the guard plus whether this caller had to wait behind another
    /// extraction ("queued").
    pub async fn acquire(&self, dir: &Path) -> (OwnedMutexGuard<()>, bool) {
        let entry = {
            let mut table = self.table.lock().await;
            Arc::clone(
                table
                    .entry(dir.to_path_buf())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };

        match Arc::clone(&entry).try_lock_owned() {
            Ok(guard) => (guard, false),
            Err(_) => {
                debug!(dir = %dir.display(), "Slides directory busy, queued behind another run");
                (entry.lock_owned().await, true)
            }
        }
    }
}
