//! Per-site assistant session registry.
//!
//! A session caches what is expensive to rediscover for a site (its editable
//! file list) and owns the cancellation token of any assistant process running
//! for it. Sessions are evicted after an idle period, torn down explicitly
//! before history-rewriting operations, and all cancelled on shutdown.
//!
//! Eviction and teardown are best-effort: `terminate` removes a session even
//! while a lease is active (that run is cancelled), while the idle sweep never
//! removes a session with an active lease.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct SessionEntry {
    generation: u64,
    last_used: Instant,
    active: usize,
    cancel: CancellationToken,
    files: Option<Vec<PathBuf>>,
}

#[derive(Debug, Default)]
pub struct AssistantPool {
    sessions: DashMap<String, SessionEntry>,
    next_generation: AtomicU64,
    shutdown: CancellationToken,
}

impl AssistantPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the site's session in use, creating it if needed.
    pub fn checkout(self: &Arc<Self>, site_id: &str) -> SessionLease {
        let mut entry = self
            .sessions
            .entry(site_id.to_string())
            .or_insert_with(|| SessionEntry {
                generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
                last_used: Instant::now(),
                active: 0,
                cancel: self.shutdown.child_token(),
                files: None,
            });
        entry.active += 1;
        entry.last_used = Instant::now();
        let lease = SessionLease {
            pool: Arc::clone(self),
            site_id: site_id.to_string(),
            generation: entry.generation,
            cancel: entry.cancel.clone(),
        };
        drop(entry);
        tracing::debug!(site_id, generation = lease.generation, "assistant session checked out");
        lease
    }

    /// Remove the site's session and cancel anything running in it.
    /// Returns `true` if a session existed.
    pub fn terminate(&self, site_id: &str) -> bool {
        match self.sessions.remove(site_id) {
            Some((_, entry)) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Evict sessions idle for at least `idle` with no active lease.
    /// Returns the number evicted.
    pub fn sweep(&self, idle: Duration) -> usize {
        let mut evicted = 0;
        self.sessions.retain(|site_id, entry| {
            let keep = entry.active > 0 || entry.last_used.elapsed() < idle;
            if !keep {
                entry.cancel.cancel();
                evicted += 1;
                tracing::debug!(site_id = %site_id, "evicting idle assistant session");
            }
            keep
        });
        evicted
    }

    /// Run [`sweep`](Self::sweep) every `interval` until [`shutdown`](Self::shutdown).
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration, idle: Duration) -> JoinHandle<()> {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = pool.shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = pool.sweep(idle);
                        if evicted > 0 {
                            tracing::info!(evicted, "swept idle assistant sessions");
                        }
                    }
                }
            }
        })
    }

    /// Cancel every session and stop the sweeper.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let count = self.sessions.len();
        self.sessions.clear();
        if count > 0 {
            tracing::info!(count, "assistant sessions shut down");
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, site_id: &str) -> bool {
        self.sessions.contains_key(site_id)
    }

    fn with_current<R>(
        &self,
        site_id: &str,
        generation: u64,
        f: impl FnOnce(&mut SessionEntry) -> R,
    ) -> Option<R> {
        let mut entry = self.sessions.get_mut(site_id)?;
        (entry.generation == generation).then(|| f(&mut entry))
    }
}

/// An in-use claim on a site's session. Dropping it marks the session idle.
pub struct SessionLease {
    pool: Arc<AssistantPool>,
    site_id: String,
    generation: u64,
    cancel: CancellationToken,
}

impl SessionLease {
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    /// Cancelled when the session is terminated, evicted or shut down.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cached_files(&self) -> Option<Vec<PathBuf>> {
        self.pool
            .with_current(&self.site_id, self.generation, |e| e.files.clone())
            .flatten()
    }

    pub fn cache_files(&self, files: Vec<PathBuf>) {
        self.pool
            .with_current(&self.site_id, self.generation, |e| e.files = Some(files));
    }

    pub fn invalidate_files(&self) {
        self.pool
            .with_current(&self.site_id, self.generation, |e| e.files = None);
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        // A terminated session may have been replaced; only touch our own.
        self.pool.with_current(&self.site_id, self.generation, |e| {
            e.active = e.active.saturating_sub(1);
            e.last_used = Instant::now();
        });
    }
}
