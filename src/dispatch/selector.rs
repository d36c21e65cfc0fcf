use std::sync::Arc;

use rand::Rng;
use serde::Serialize;

use crate::dispatch::backend::{Backend, LoadModel};
use crate::dispatch::cost::CostModel;
use crate::dispatch::job::Job;
use crate::dispatch::pool::Pool;
use crate::error::{BalancerError, Result};

/// Candidate-selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Score every backend and take the minimum. Ties go to pool order.
    FullScan,
    /// Score two distinct random backends and take the lower.
    PowerOfTwo,
}

impl std::fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectionPolicy::FullScan => write!(f, "full_scan"),
            SelectionPolicy::PowerOfTwo => write!(f, "power_of_two"),
        }
    }
}

/// Outcome of a selection: the backend, the job's cost there and the score
/// (load plus cost) it won with.
#[derive(Debug)]
pub struct Selection<'p, L> {
    pub backend: &'p Arc<Backend<L>>,
    pub cost: u64,
    pub score: u64,
}

impl<L> Clone for Selection<'_, L> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<L> Copy for Selection<'_, L> {}

#[derive(Debug, Clone, Copy)]
pub struct Selector {
    policy: SelectionPolicy,
    load_model: LoadModel,
    cost_model: CostModel,
}

impl Selector {
    pub fn new(policy: SelectionPolicy, load_model: LoadModel) -> Self {
        Self {
            policy,
            load_model,
            cost_model: CostModel::new(),
        }
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    pub fn load_model(&self) -> LoadModel {
        self.load_model
    }

    pub fn cost_model(&self) -> &CostModel {
        &self.cost_model
    }

    pub fn select<'p, L>(&self, pool: &'p Pool<L>, job: &Job) -> Result<Selection<'p, L>> {
        self.select_with_rng(pool, job, &mut rand::thread_rng())
    }

    /// Same as [`Selector::select`] with a caller-supplied random source.
    pub fn select_with_rng<'p, L, R: Rng + ?Sized>(
        &self,
        pool: &'p Pool<L>,
        job: &Job,
        rng: &mut R,
    ) -> Result<Selection<'p, L>> {
        let selection = match self.policy {
            SelectionPolicy::FullScan => self.full_scan(pool, job),
            SelectionPolicy::PowerOfTwo => self.sampled_pair(pool, job, rng),
        };
        selection.ok_or_else(|| {
            BalancerError::Configuration("cannot select from an empty backend pool".to_string())
        })
    }

    fn score<'p, L>(&self, backend: &'p Arc<Backend<L>>, job: &Job) -> Selection<'p, L> {
        let cost = self.cost_model.cost(backend.kind(), job);
        Selection {
            backend,
            cost,
            score: backend.peek_cost(cost, self.load_model),
        }
    }

    fn full_scan<'p, L>(&self, pool: &'p Pool<L>, job: &Job) -> Option<Selection<'p, L>> {
        // min_by_key keeps the first of equal minimums.
        pool.iter()
            .map(|backend| self.score(backend, job))
            .min_by_key(|candidate| candidate.score)
    }

    fn sampled_pair<'p, L, R: Rng + ?Sized>(
        &self,
        pool: &'p Pool<L>,
        job: &Job,
        rng: &mut R,
    ) -> Option<Selection<'p, L>> {
        if pool.len() < 2 {
            return pool.get(0).map(|backend| self.score(backend, job));
        }
        let (first, second) = sample_pair(pool.len(), rng);
        let first = self.score(pool.get(first)?, job);
        let second = self.score(pool.get(second)?, job);
        if second.score < first.score {
            Some(second)
        } else {
            Some(first)
        }
    }
}

/// Draws two distinct indices in `0..len` uniformly without replacement.
///
/// `len` must be at least 2.
pub fn sample_pair<R: Rng + ?Sized>(len: usize, rng: &mut R) -> (usize, usize) {
    let picked = rand::seq::index::sample(rng, len, 2);
    (picked.index(0), picked.index(1))
}
