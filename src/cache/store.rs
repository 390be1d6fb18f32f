use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use anyhow::Context as _;

use super::Fingerprint;
use crate::foundation::error::{StickerError, StickerResult};
use crate::foundation::fs::{is_tmp_file, write_atomic};

type Shared = StickerResult<Arc<Vec<u8>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

struct InFlight {
    result: Mutex<Option<Shared>>,
    cv: Condvar,
}

impl InFlight {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            cv: Condvar::new(),
        }
    }

    fn set(&self, result: Shared) {
        *lock(&self.result) = Some(result);
        self.cv.notify_all();
    }

    fn wait(&self) -> Shared {
        let mut slot = lock(&self.result);
        loop {
            if let Some(r) = slot.as_ref() {
                return r.clone();
            }
            slot = self
                .cv
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

enum Backing {
    Disk(PathBuf),
    Memory(Mutex<HashMap<Fingerprint, Arc<Vec<u8>>>>),
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    computes: AtomicU64,
    joins: AtomicU64,
}

/// Cache counters since construction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Served from the store.
    pub hits: u64,
    /// `compute` invocations.
    pub computes: u64,
    /// Callers that waited on another caller's computation.
    pub joins: u64,
}

/// Content-addressed store of rendered images with single-flight computation.
///
/// At most one `compute` runs per fingerprint at a time. Callers arriving while it runs block on
/// it and receive the same outcome, success or failure. Failures are never stored, so the next
/// request after a failed computation tries again.
pub struct RenderCache {
    enabled: bool,
    backing: Backing,
    in_flight: Mutex<HashMap<Fingerprint, Arc<InFlight>>>,
    counters: Counters,
}

impl RenderCache {
    /// Open a disk-backed cache under `dir`.
    ///
    /// Leftover temp files from interrupted writes are always removed; `clear` also purges every
    /// persisted entry.
    pub fn open(dir: impl Into<PathBuf>, enabled: bool, clear: bool) -> StickerResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create cache dir '{}'", dir.display()))?;
        let removed = purge(&dir, clear)?;
        if removed > 0 {
            tracing::info!(dir = %dir.display(), removed, clear, "cache directory swept");
        }
        Ok(Self {
            enabled,
            backing: Backing::Disk(dir),
            in_flight: Mutex::new(HashMap::new()),
            counters: Counters::default(),
        })
    }

    /// In-memory cache, gone when dropped.
    pub fn in_memory(enabled: bool) -> Self {
        Self {
            enabled,
            backing: Backing::Memory(Mutex::new(HashMap::new())),
            in_flight: Mutex::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    /// `false` when every call computes.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Counters snapshot.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            computes: self.counters.computes.load(Ordering::Relaxed),
            joins: self.counters.joins.load(Ordering::Relaxed),
        }
    }

    /// Return `true` when a complete entry for `fp` is stored.
    pub fn contains(&self, fp: Fingerprint) -> bool {
        match &self.backing {
            Backing::Disk(dir) => entry_path(dir, fp).is_file(),
            Backing::Memory(m) => lock(m).contains_key(&fp),
        }
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        match &self.backing {
            Backing::Disk(dir) => std::fs::read_dir(dir)
                .map(|rd| {
                    rd.filter_map(Result::ok)
                        .filter(|e| !is_tmp_file(&e.path()) && e.path().is_file())
                        .count()
                })
                .unwrap_or(0),
            Backing::Memory(m) => lock(m).len(),
        }
    }

    /// Return `true` when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the stored bytes for `fp`, or run `compute` once and store its output.
    #[tracing::instrument(skip(self, compute), fields(fp = %fp))]
    pub fn get_or_compute<F>(&self, fp: Fingerprint, compute: F) -> StickerResult<Arc<Vec<u8>>>
    where
        F: FnOnce() -> StickerResult<Vec<u8>>,
    {
        if !self.enabled {
            self.counters.computes.fetch_add(1, Ordering::Relaxed);
            return compute().map(Arc::new);
        }

        if let Some(bytes) = self.load(fp) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(bytes);
        }

        let (flight, owner) = self.join_in_flight(fp);
        if !owner {
            self.counters.joins.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("waiting on in-flight render");
            return flight.wait();
        }

        let mut guard = OwnerGuard {
            cache: self,
            fp,
            flight,
            finished: false,
        };

        // The previous owner may have stored the entry between our lookup and registration.
        if let Some(bytes) = self.load(fp) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            guard.finish(Ok(Arc::clone(&bytes)));
            return Ok(bytes);
        }

        self.counters.computes.fetch_add(1, Ordering::Relaxed);
        let result = compute().map(|bytes| {
            let bytes = Arc::new(bytes);
            // The render is already paid for; a failed write only costs the next lookup.
            if let Err(e) = self.store(fp, &bytes) {
                tracing::warn!(error = %e, "cache write failed, serving uncached result");
            }
            bytes
        });
        if let Err(e) = &result {
            tracing::debug!(error = %e, "computation failed; not cached");
        }
        guard.finish(result.clone());
        result
    }

    fn join_in_flight(&self, fp: Fingerprint) -> (Arc<InFlight>, bool) {
        let mut map = lock(&self.in_flight);
        if let Some(existing) = map.get(&fp) {
            return (Arc::clone(existing), false);
        }
        let flight = Arc::new(InFlight::new());
        map.insert(fp, Arc::clone(&flight));
        (flight, true)
    }

    fn finish_in_flight(&self, fp: Fingerprint, flight: &InFlight, result: Shared) {
        flight.set(result);
        lock(&self.in_flight).remove(&fp);
    }

    fn load(&self, fp: Fingerprint) -> Option<Arc<Vec<u8>>> {
        match &self.backing {
            Backing::Memory(m) => lock(m).get(&fp).cloned(),
            Backing::Disk(dir) => {
                let path = entry_path(dir, fp);
                match std::fs::read(&path) {
                    Ok(bytes) => Some(Arc::new(bytes)),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "unreadable cache entry");
                        None
                    }
                }
            }
        }
    }

    fn store(&self, fp: Fingerprint, bytes: &Arc<Vec<u8>>) -> StickerResult<()> {
        match &self.backing {
            Backing::Memory(m) => {
                lock(m).insert(fp, Arc::clone(bytes));
                Ok(())
            }
            Backing::Disk(dir) => write_atomic(&entry_path(dir, fp), bytes),
        }
    }
}

// Publishes a failure if the owner unwinds before finishing, so waiters never hang.
struct OwnerGuard<'a> {
    cache: &'a RenderCache,
    fp: Fingerprint,
    flight: Arc<InFlight>,
    finished: bool,
}

impl OwnerGuard<'_> {
    fn finish(&mut self, result: Shared) {
        self.finished = true;
        self.cache.finish_in_flight(self.fp, &self.flight, result);
    }
}

impl Drop for OwnerGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.cache.finish_in_flight(
                self.fp,
                &self.flight,
                Err(StickerError::render("render aborted before completion")),
            );
        }
    }
}

fn entry_path(dir: &Path, fp: Fingerprint) -> PathBuf {
    dir.join(format!("{}.png", fp.to_hex()))
}

fn purge(dir: &Path, everything: bool) -> StickerResult<usize> {
    let mut removed = 0;
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("read cache dir '{}'", dir.display()))?;
    for entry in entries {
        let path = entry
            .with_context(|| format!("read cache dir '{}'", dir.display()))?
            .path();
        if !path.is_file() || !(everything || is_tmp_file(&path)) {
            continue;
        }
        std::fs::remove_file(&path)
            .with_context(|| format!("remove cache entry '{}'", path.display()))?;
        removed += 1;
    }
    Ok(removed)
}

#[cfg(test)]
#[path = "../../tests/unit/cache/store.rs"]
mod tests;
