//! Session lookup, idle-timeout sweeping, and graceful shutdown.
//!
//! The registry is a concurrent map from session key to a mutex-guarded
//! [`Session`]: lookups run concurrently, insertion for a given key is
//! serialized by the map's entry API, and all session mutation happens
//! under the per-session lock. A background sweeper finalizes sessions
//! that have been idle past the configured timeout; it is the sole
//! reclamation mechanism.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::{Session, now_ns};
use crate::{langfuse::TelemetrySink, otlp::AttrBag};

pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Mutex<Session>>>,
    sink: Arc<dyn TelemetrySink>,
    idle_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(sink: Arc<dyn TelemetrySink>, idle_timeout: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            sink,
            idle_timeout,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[allow(dead_code)] // Used in tests
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn sink(&self) -> &Arc<dyn TelemetrySink> {
        &self.sink
    }

    /// Look up a session, creating and initializing it on first sight.
    ///
    /// Identity fields are populated from `first_seen` only on creation;
    /// later records go through the session's own first-write-wins merge.
    pub fn get_or_create(&self, key: &str, first_seen: &AttrBag) -> Arc<Mutex<Session>> {
        if let Some(existing) = self.sessions.get(key) {
            return Arc::clone(existing.value());
        }

        let entry = self.sessions.entry(key.to_string()).or_insert_with(|| {
            tracing::info!(session = %key, "Session created");
            Arc::new(Mutex::new(Session::new(key, first_seen, now_ns())))
        });
        Arc::clone(entry.value())
    }

    /// Finalize a session and drop it from the registry.
    ///
    /// The session is removed even if summary emission misbehaves; there
    /// is no redelivery.
    pub fn finalize_and_remove(&self, key: &str) {
        if let Some((_, session)) = self.sessions.remove(key) {
            session.lock().finalize(self.sink.as_ref());
        }
    }

    /// Finalize every session idle for at least the configured timeout.
    pub fn sweep(&self, now: u64) {
        let timeout_ns = self.idle_timeout.as_nanos() as u64;
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| now.saturating_sub(entry.value().lock().last_activity_ns()) >= timeout_ns)
            .map(|entry| entry.key().clone())
            .collect();

        for key in expired {
            tracing::info!(session = %key, "Finalizing idle session");
            self.finalize_and_remove(&key);
        }
    }

    /// Finalize all sessions and flush the sink, bounded by `flush_timeout`.
    pub async fn shutdown(&self, flush_timeout: Duration) {
        let keys: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        if !keys.is_empty() {
            tracing::info!(count = keys.len(), "Finalizing all sessions for shutdown");
        }
        for key in keys {
            self.finalize_and_remove(&key);
        }
        self.sink.flush(flush_timeout).await;
    }
}

/// Run the sweeper until cancelled.
pub async fn start_sweeper(
    registry: Arc<SessionRegistry>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    tracing::info!(
        interval_secs = interval.as_secs(),
        idle_timeout_secs = registry.idle_timeout.as_secs(),
        "Starting session sweeper"
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately; skip it.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::debug!("Session sweeper stopped");
                break;
            }
            _ = ticker.tick() => {
                registry.sweep(now_ns());
            }
        }
    }
}
