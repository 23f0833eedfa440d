//! Pool of authenticated sessions keyed by server identity.
//!
//! The pool amortizes connect + authenticate cost across operations on the
//! same `host:port:username`. Two eviction paths bound it:
//!
//! - **Capacity eviction**: before a new session is created on a full pool,
//!   the least recently used entry is closed and removed.
//! - **Idle eviction**: a background sweep removes entries unused for longer
//!   than the idle timeout.
//!
//! Entries are removed from the map before their session is closed, so a
//! concurrent borrow never observes a half-removed entry. A borrowed session is
//! handed out as an `Arc`; callers never close it themselves.
//!
//! Reused sessions are not probed for liveness. A session that died between
//! borrows fails on its next use and the caller sees that failure.

use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::join_all;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::remote::config::PoolSettings;
use crate::remote::error::RemoteResult;
use crate::remote::session::{Connector, RemoteSession};
use crate::remote::types::{PoolStats, PooledConnectionInfo, ServerDescriptor};

struct PooledSession<S> {
    session: Arc<S>,
    last_used: Instant,
    last_used_at: DateTime<Utc>,
}

impl<S> PooledSession<S> {
    fn new(session: Arc<S>) -> Self {
        Self {
            session,
            last_used: Instant::now(),
            last_used_at: Utc::now(),
        }
    }

    fn touch(&mut self) {
        self.last_used = Instant::now();
        self.last_used_at = Utc::now();
    }
}

/// Session pool over any [`Connector`].
pub struct SessionPool<C: Connector> {
    connector: C,
    settings: PoolSettings,
    sessions: DashMap<String, PooledSession<C::Session>>,
    sweeper: StdMutex<Option<CancellationToken>>,
}

impl<C: Connector> SessionPool<C> {
    /// Create an empty pool. The idle sweep is not running until
    /// [`start_idle_sweep`](Self::start_idle_sweep) is called.
    pub fn new(connector: C, settings: PoolSettings) -> Arc<Self> {
        Arc::new(Self {
            connector,
            settings,
            sessions: DashMap::new(),
            sweeper: StdMutex::new(None),
        })
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// Spawn the periodic idle sweep. Restarting replaces a running sweep.
    ///
    /// The sweep task holds only a weak reference and ends on its own once the
    /// pool is dropped.
    pub fn start_idle_sweep(self: &Arc<Self>) {
        let token = CancellationToken::new();
        if let Some(previous) = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(token.clone())
        {
            previous.cancel();
        }

        let pool = Arc::downgrade(self);
        let period = self.settings.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    biased;

                    _ = token.cancelled() => break,

                    _ = ticker.tick() => {
                        let Some(pool) = pool.upgrade() else { break };
                        let evicted = pool.evict_idle().await;
                        if evicted > 0 {
                            info!("Idle sweep closed {} pooled session(s)", evicted);
                        }
                    }
                }
            }
            debug!("Session pool idle sweep stopped");
        });
    }

    fn stop_idle_sweep(&self) {
        if let Some(token) = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            token.cancel();
        }
    }

    /// Borrow the session for `server`, connecting if none is pooled.
    ///
    /// Connect failures propagate and leave no entry behind.
    pub async fn get_connection(&self, server: &ServerDescriptor) -> RemoteResult<Arc<C::Session>> {
        let key = server.key();

        if let Some(session) = self.touch(&key) {
            debug!("Reusing pooled session {}", key);
            return Ok(session);
        }

        while self.sessions.len() >= self.settings.capacity {
            if !self.evict_oldest(None).await {
                break;
            }
        }

        let session = Arc::new(self.connector.connect(server).await?);

        // Another borrower may have connected the same key while we were awaiting.
        let existing = match self.sessions.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let pooled = occupied.get_mut();
                pooled.touch();
                Some(pooled.session.clone())
            }
            Entry::Vacant(vacant) => {
                vacant.insert(PooledSession::new(session.clone()));
                None
            }
        };
        if let Some(existing) = existing {
            debug!("Discarding duplicate session for {}", key);
            close_quietly(&key, session.as_ref()).await;
            return Ok(existing);
        }

        // Concurrent misses can overshoot capacity; never evict the entry just added.
        while self.sessions.len() > self.settings.capacity {
            if !self.evict_oldest(Some(&key)).await {
                break;
            }
        }

        info!(
            "Pooled new session {} ({}/{})",
            key,
            self.sessions.len(),
            self.settings.capacity
        );
        Ok(session)
    }

    fn touch(&self, key: &str) -> Option<Arc<C::Session>> {
        self.sessions.get_mut(key).map(|mut pooled| {
            pooled.touch();
            pooled.session.clone()
        })
    }

    /// Close and remove the least recently used entry. Returns `false` when
    /// there was nothing to evict.
    async fn evict_oldest(&self, exclude: Option<&str>) -> bool {
        let oldest = self
            .sessions
            .iter()
            .filter(|entry| exclude.is_none_or(|key| entry.key() != key))
            .min_by_key(|entry| entry.last_used)
            .map(|entry| entry.key().clone());

        let Some(key) = oldest else {
            return false;
        };

        if let Some((key, pooled)) = self.sessions.remove(&key) {
            info!("Evicting least recently used session {}", key);
            close_quietly(&key, pooled.session.as_ref()).await;
        }
        true
    }

    /// Close and remove every entry idle longer than the idle timeout.
    /// Returns how many were removed.
    pub async fn evict_idle(&self) -> usize {
        let threshold = self.settings.idle_timeout;
        let stale: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.last_used.elapsed() > threshold)
            .map(|entry| entry.key().clone())
            .collect();

        let mut evicted = 0;
        for key in stale {
            // Re-checked under the shard lock: a borrow since the scan keeps the entry.
            let removed = self
                .sessions
                .remove_if(&key, |_, pooled| pooled.last_used.elapsed() > threshold);
            if let Some((key, pooled)) = removed {
                debug!("Closing idle session {}", key);
                close_quietly(&key, pooled.session.as_ref()).await;
                evicted += 1;
            }
        }
        evicted
    }

    /// Close and remove the entry for `server`, if any.
    pub async fn release_connection(&self, server: &ServerDescriptor) {
        if let Some((key, pooled)) = self.sessions.remove(&server.key()) {
            debug!("Releasing pooled session {}", key);
            close_quietly(&key, pooled.session.as_ref()).await;
        }
    }

    /// Close and remove every entry.
    pub async fn release_all(&self) {
        let keys: Vec<String> = self
            .sessions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        let removed: Vec<_> = keys
            .into_iter()
            .filter_map(|key| self.sessions.remove(&key))
            .collect();
        if removed.is_empty() {
            return;
        }

        info!("Releasing {} pooled session(s)", removed.len());
        join_all(
            removed
                .iter()
                .map(|(key, pooled)| close_quietly(key, pooled.session.as_ref())),
        )
        .await;
    }

    /// Stop the idle sweep and release every session.
    pub async fn shutdown(&self) {
        self.stop_idle_sweep();
        self.release_all().await;
    }

    /// Snapshot of the pooled entries.
    pub fn stats(&self) -> PoolStats {
        let mut connections: Vec<PooledConnectionInfo> = self
            .sessions
            .iter()
            .map(|entry| PooledConnectionInfo {
                server_key: entry.key().clone(),
                last_used: entry.last_used_at.to_rfc3339(),
            })
            .collect();
        connections.sort_by(|a, b| a.server_key.cmp(&b.server_key));

        PoolStats {
            total_connections: connections.len(),
            connections,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, server: &ServerDescriptor) -> bool {
        self.sessions.contains_key(&server.key())
    }
}

impl<C: Connector> Drop for SessionPool<C> {
    fn drop(&mut self) {
        self.stop_idle_sweep();
    }
}

/// Close a session that is already out of the map. Close errors are not
/// actionable for the caller and are only logged.
async fn close_quietly<S: RemoteSession>(key: &str, session: &S) {
    if let Err(e) = session.close().await {
        debug!("Ignoring close error for {}: {}", key, e);
    }
}
