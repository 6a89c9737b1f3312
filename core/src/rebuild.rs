//! Snapshot holder with a single-flight rebuild.
//!
//! Readers clone an `Arc` to the current snapshot and never block on a
//! rebuild: the new value is built outside any lock and installed with one
//! pointer swap. At most one rebuild runs at a time; a request that arrives
//! while one is in flight is coalesced into it.

use anyhow::Result;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildState {
    Empty,
    Building,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildOutcome {
    Installed,
    /// Another rebuild was already running; nothing was done.
    Coalesced,
}

pub struct IndexHandle<T> {
    current: RwLock<Option<Arc<T>>>,
    building: AtomicBool,
}

impl<T> Default for IndexHandle<T> {
    fn default() -> Self {
        Self::new()
    }
}

struct BuildingGuard<'a>(&'a AtomicBool);

impl Drop for BuildingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<T> IndexHandle<T> {
    pub fn new() -> Self {
        Self { current: RwLock::new(None), building: AtomicBool::new(false) }
    }

    pub fn with_snapshot(snapshot: T) -> Self {
        Self { current: RwLock::new(Some(Arc::new(snapshot))), building: AtomicBool::new(false) }
    }

    pub fn snapshot(&self) -> Option<Arc<T>> {
        self.current.read().clone()
    }

    /// `Building` whenever a rebuild is in flight, even if an older snapshot
    /// is still being served.
    pub fn state(&self) -> RebuildState {
        if self.building.load(Ordering::Acquire) {
            RebuildState::Building
        } else if self.current.read().is_some() {
            RebuildState::Ready
        } else {
            RebuildState::Empty
        }
    }

    pub fn install(&self, snapshot: T) {
        let fresh = Arc::new(snapshot);
        *self.current.write() = Some(fresh);
    }

    /// Run `build` and install its result. On error the previous snapshot
    /// stays in place and the error is returned.
    pub fn rebuild<F>(&self, build: F) -> Result<RebuildOutcome>
    where
        F: FnOnce() -> Result<T>,
    {
        if self.building.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            tracing::info!("rebuild already in flight, coalescing");
            return Ok(RebuildOutcome::Coalesced);
        }
        let _guard = BuildingGuard(&self.building);

        let start = std::time::Instant::now();
        match build() {
            Ok(snapshot) => {
                self.install(snapshot);
                tracing::info!(elapsed_ms = start.elapsed().as_millis() as u64, "installed rebuilt index");
                Ok(RebuildOutcome::Installed)
            }
            Err(e) => {
                tracing::warn!(error = %e, "rebuild failed, keeping previous index");
                Err(e)
            }
        }
    }
}
