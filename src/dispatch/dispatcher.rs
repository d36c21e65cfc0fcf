use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::dispatch::backend::{saturating_millis, BackendStatus, LoadModel};
use crate::dispatch::pool::Pool;
use crate::dispatch::selector::{SelectionPolicy, Selector};
use crate::error::{BalancerError, Result};
use crate::transport::{BackendLink, JobCodec, TagCodec};

/// Request counters since startup.
#[derive(Debug)]
struct DispatchStats {
    started_at: DateTime<Utc>,
    received: AtomicU64,
    completed: AtomicU64,
    malformed: AtomicU64,
    unavailable: AtomicU64,
}

impl DispatchStats {
    fn new() -> Self {
        Self {
            started_at: Utc::now(),
            received: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            unavailable: AtomicU64::new(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub policy: SelectionPolicy,
    pub load_model: LoadModel,
    pub started_at: DateTime<Utc>,
    pub received: u64,
    pub completed: u64,
    pub malformed: u64,
    pub unavailable: u64,
}

/// Read-only view of a running dispatcher, independent of its link type.
pub trait StatusSource: Send + Sync {
    fn backends(&self) -> Vec<BackendStatus>;
    fn stats(&self) -> StatsSnapshot;
}

/// Runs one request lifecycle per [`Dispatcher::dispatch`] call.
///
/// Safe to call from many tasks at once: the only shared mutable state is
/// each backend's load, guarded by that backend's own lock.
#[derive(Debug)]
pub struct Dispatcher<L, C = TagCodec> {
    pool: Pool<L>,
    selector: Selector,
    codec: C,
    forward_timeout: Duration,
    stats: DispatchStats,
}

impl<L: BackendLink> Dispatcher<L> {
    pub fn new(pool: Pool<L>, selector: Selector, forward_timeout: Duration) -> Self {
        Self::with_codec(pool, selector, TagCodec, forward_timeout)
    }
}

impl<L: BackendLink, C: JobCodec> Dispatcher<L, C> {
    pub fn with_codec(
        pool: Pool<L>,
        selector: Selector,
        codec: C,
        forward_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            selector,
            codec,
            forward_timeout,
            stats: DispatchStats::new(),
        }
    }

    pub fn pool(&self) -> &Pool<L> {
        &self.pool
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn forward_timeout(&self) -> Duration {
        self.forward_timeout
    }

    /// Routes one raw client request and returns the backend's reply.
    ///
    /// # Errors
    ///
    /// - [`BalancerError::MalformedRequest`] if `request` does not decode; no
    ///   backend is touched.
    /// - [`BalancerError::BackendUnavailable`] if the chosen backend fails or
    ///   does not answer within the forward timeout. Its load is released
    ///   before the error is returned.
    pub async fn dispatch(&self, request: &[u8]) -> Result<Vec<u8>> {
        let request_id = Uuid::new_v4();
        self.stats.received.fetch_add(1, Ordering::Relaxed);

        let job = match self.codec.decode(request) {
            Ok(job) => job,
            Err(e) => {
                self.stats.malformed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(request_id = %request_id, error = %e, "Rejected request");
                return Err(e);
            }
        };

        let selection = self.selector.select(&self.pool, &job)?;
        let backend = Arc::clone(selection.backend);
        tracing::debug!(
            request_id = %request_id,
            kind = %job.kind(),
            size = job.size(),
            backend = %backend.endpoint(),
            cost = selection.cost,
            score = selection.score,
            "Selected backend"
        );

        let reservation = backend.reserve(selection.cost);
        let outcome =
            tokio::time::timeout(self.forward_timeout, backend.link().forward(request)).await;
        drop(reservation);

        match outcome {
            Ok(Ok(reply)) => {
                self.stats.completed.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    request_id = %request_id,
                    kind = %job.kind(),
                    size = job.size(),
                    backend = %backend.endpoint(),
                    "Request completed"
                );
                Ok(reply)
            }
            Ok(Err(e)) => {
                self.stats.unavailable.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    request_id = %request_id,
                    backend = %backend.endpoint(),
                    error = %e,
                    "Forward failed"
                );
                Err(BalancerError::unavailable(backend.endpoint(), e))
            }
            Err(_) => {
                self.stats.unavailable.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    request_id = %request_id,
                    backend = %backend.endpoint(),
                    timeout_ms = saturating_millis(self.forward_timeout),
                    "Backend timed out"
                );
                Err(BalancerError::unavailable(
                    backend.endpoint(),
                    format!("no reply within {:?}", self.forward_timeout),
                ))
            }
        }
    }
}

impl<L: BackendLink, C: JobCodec> StatusSource for Dispatcher<L, C> {
    fn backends(&self) -> Vec<BackendStatus> {
        self.pool.status()
    }

    fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            policy: self.selector.policy(),
            load_model: self.selector.load_model(),
            started_at: self.stats.started_at,
            received: self.stats.received.load(Ordering::Relaxed),
            completed: self.stats.completed.load(Ordering::Relaxed),
            malformed: self.stats.malformed.load(Ordering::Relaxed),
            unavailable: self.stats.unavailable.load(Ordering::Relaxed),
        }
    }
}
