use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::dispatch::job::BackendKind;

/// How a backend's current load is estimated during selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LoadModel {
    /// Sum of the costs of all reserved jobs.
    Outstanding,
    /// Time left until the backend is expected to drain its queue, in cost units.
    Drain,
}

impl std::fmt::Display for LoadModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadModel::Outstanding => write!(f, "outstanding"),
            LoadModel::Drain => write!(f, "drain"),
        }
    }
}

/// Whole milliseconds in `duration`, clamped to `u64::MAX`.
pub(crate) fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Debug)]
struct LoadState {
    outstanding_cost: u64,
    in_flight: usize,
    /// Only meaningful while `in_flight > 0`.
    busy_until: Instant,
}

/// Point-in-time view of one backend, for logs and the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendStatus {
    pub id: usize,
    pub endpoint: String,
    pub kind: BackendKind,
    pub outstanding_cost: u64,
    pub in_flight: usize,
    pub busy_for_ms: u64,
}

/// A pool member: its identity, its link and its load bookkeeping.
///
/// Load fields sit behind a per-backend mutex and are only changed through
/// [`Backend::reserve`] and the drop of the returned [`Reservation`].
#[derive(Debug)]
pub struct Backend<L> {
    id: usize,
    endpoint: String,
    kind: BackendKind,
    cost_unit: Duration,
    load: Mutex<LoadState>,
    link: L,
}

impl<L> Backend<L> {
    pub fn new(
        id: usize,
        endpoint: String,
        kind: BackendKind,
        cost_unit: Duration,
        link: L,
    ) -> Self {
        Self {
            id,
            endpoint,
            kind,
            cost_unit,
            load: Mutex::new(LoadState {
                outstanding_cost: 0,
                in_flight: 0,
                busy_until: Instant::now(),
            }),
            link,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    // A panic elsewhere while the lock was held cannot leave the counters
    // half-written: every critical section below is plain arithmetic.
    fn lock(&self) -> MutexGuard<'_, LoadState> {
        self.load.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn units_to_duration(&self, units: u64) -> Duration {
        let units = u32::try_from(units).unwrap_or(u32::MAX);
        self.cost_unit.checked_mul(units).unwrap_or(Duration::MAX)
    }

    fn duration_to_units(&self, remaining: Duration) -> u64 {
        let unit = self.cost_unit.as_nanos().max(1);
        let units = remaining.as_nanos().div_ceil(unit);
        u64::try_from(units).unwrap_or(u64::MAX)
    }

    pub fn outstanding_cost(&self) -> u64 {
        self.lock().outstanding_cost
    }

    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    /// Current load under `model`, read as a single locked snapshot.
    pub fn current_load(&self, model: LoadModel) -> u64 {
        let state = self.lock();
        match model {
            LoadModel::Outstanding => state.outstanding_cost,
            LoadModel::Drain => {
                if state.in_flight == 0 {
                    return 0;
                }
                let remaining = state.busy_until.saturating_duration_since(Instant::now());
                self.duration_to_units(remaining)
            }
        }
    }

    /// Load the backend would carry after accepting a job of `cost`.
    pub fn peek_cost(&self, cost: u64, model: LoadModel) -> u64 {
        self.current_load(model).saturating_add(cost)
    }

    pub fn status(&self) -> BackendStatus {
        let state = self.lock();
        let busy_for = if state.in_flight == 0 {
            Duration::ZERO
        } else {
            state.busy_until.saturating_duration_since(Instant::now())
        };
        BackendStatus {
            id: self.id,
            endpoint: self.endpoint.clone(),
            kind: self.kind,
            outstanding_cost: state.outstanding_cost,
            in_flight: state.in_flight,
            busy_for_ms: saturating_millis(busy_for),
        }
    }

    fn release(&self, cost: u64) {
        let mut state = self.lock();
        debug_assert!(state.outstanding_cost >= cost, "release exceeds reservation");
        debug_assert!(state.in_flight > 0, "release without reservation");
        state.outstanding_cost = state.outstanding_cost.saturating_sub(cost);
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.in_flight == 0 {
            state.outstanding_cost = 0;
            state.busy_until = Instant::now();
        }
    }

    /// Reserves `cost` units on this backend until the returned guard drops.
    pub fn reserve(self: &Arc<Self>, cost: u64) -> Reservation<L> {
        {
            let mut state = self.lock();
            let now = Instant::now();
            if state.in_flight == 0 {
                state.busy_until = now;
            }
            state.outstanding_cost = state.outstanding_cost.saturating_add(cost);
            state.in_flight += 1;
            let advance = self.units_to_duration(cost);
            state.busy_until = state
                .busy_until
                .checked_add(advance)
                .unwrap_or(state.busy_until);
        }
        Reservation {
            backend: Arc::clone(self),
            cost,
        }
    }
}

/// In-flight load held on a backend. Dropping it releases the load.
#[must_use = "dropping a reservation releases it immediately"]
#[derive(Debug)]
pub struct Reservation<L> {
    backend: Arc<Backend<L>>,
    cost: u64,
}

impl<L> Reservation<L> {
    pub fn backend(&self) -> &Arc<Backend<L>> {
        &self.backend
    }

    pub fn cost(&self) -> u64 {
        self.cost
    }
}

impl<L> Drop for Reservation<L> {
    fn drop(&mut self) {
        self.backend.release(self.cost);
    }
}
