use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use super::sandbox::{Sandbox, SandboxLauncher};
use crate::foundation::error::{StickerError, StickerResult};

/// Pool counters since construction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SandboxPoolStats {
    /// Sessions started.
    pub launched: u64,
    /// Unhealthy sessions dropped on release.
    pub discarded: u64,
    /// Successful acquisitions.
    pub acquired: u64,
    /// Healthy sessions waiting for work.
    pub idle: usize,
    /// Sessions currently leased out.
    pub leased: usize,
}

struct PoolState {
    idle: Vec<Box<dyn Sandbox>>,
    leased: usize,
    stats: SandboxPoolStats,
}

/// Fixed-capacity pool of sandbox sessions.
///
/// Sessions are launched lazily up to `capacity` and reused across requests. Callers beyond
/// capacity block until a lease is returned, so `capacity == 1` serializes every render. A
/// session that reports itself unhealthy on release is dropped, freeing its slot for a fresh
/// launch on the next acquire.
pub struct SandboxPool {
    launcher: Arc<dyn SandboxLauncher>,
    capacity: usize,
    state: Mutex<PoolState>,
    returned: Condvar,
}

impl SandboxPool {
    /// Create an empty pool. `capacity` is clamped to at least 1.
    pub fn new(launcher: Arc<dyn SandboxLauncher>, capacity: usize) -> Self {
        Self {
            launcher,
            capacity: capacity.max(1),
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                leased: 0,
                stats: SandboxPoolStats::default(),
            }),
            returned: Condvar::new(),
        }
    }

    /// Maximum number of live sessions.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Counters snapshot.
    pub fn stats(&self) -> SandboxPoolStats {
        let st = self.lock();
        SandboxPoolStats {
            idle: st.idle.len(),
            leased: st.leased,
            ..st.stats
        }
    }

    /// Borrow a session, launching one if the pool has a free slot.
    pub fn acquire(&self) -> StickerResult<SandboxLease<'_>> {
        let mut st = self.lock();
        loop {
            if let Some(sandbox) = st.idle.pop() {
                st.leased += 1;
                st.stats.acquired += 1;
                return Ok(SandboxLease {
                    pool: self,
                    sandbox: Some(sandbox),
                });
            }
            if st.leased + st.idle.len() < self.capacity {
                // Reserve the slot, then launch without holding the lock.
                st.leased += 1;
                drop(st);
                return match self.launcher.launch() {
                    Ok(sandbox) => {
                        let mut st = self.lock();
                        st.stats.launched += 1;
                        st.stats.acquired += 1;
                        Ok(SandboxLease {
                            pool: self,
                            sandbox: Some(sandbox),
                        })
                    }
                    Err(e) => {
                        self.lock().leased -= 1;
                        self.returned.notify_one();
                        tracing::warn!(error = %e, "sandbox launch failed");
                        Err(StickerError::render(format!("sandbox launch failed: {e}")))
                    }
                };
            }
            st = self
                .returned
                .wait(st)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn release(&self, sandbox: Box<dyn Sandbox>) {
        let discarded = {
            let mut st = self.lock();
            st.leased -= 1;
            if sandbox.is_healthy() {
                st.idle.push(sandbox);
                None
            } else {
                st.stats.discarded += 1;
                Some(sandbox)
            }
        };
        if discarded.is_some() {
            tracing::info!("discarding unhealthy sandbox session");
        }
        // Drop outside the lock; closing a session may block briefly.
        drop(discarded);
        self.returned.notify_one();
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Scoped access to one session. Returned to the pool on drop, on every exit path.
pub struct SandboxLease<'a> {
    pool: &'a SandboxPool,
    sandbox: Option<Box<dyn Sandbox>>,
}

impl Deref for SandboxLease<'_> {
    type Target = dyn Sandbox;

    fn deref(&self) -> &Self::Target {
        match &self.sandbox {
            Some(s) => s.as_ref(),
            None => unreachable!("sandbox taken before drop"),
        }
    }
}

impl DerefMut for SandboxLease<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.sandbox {
            Some(s) => s.as_mut(),
            None => unreachable!("sandbox taken before drop"),
        }
    }
}

impl Drop for SandboxLease<'_> {
    fn drop(&mut self) {
        if let Some(s) = self.sandbox.take() {
            self.pool.release(s);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/pool.rs"]
mod tests;
