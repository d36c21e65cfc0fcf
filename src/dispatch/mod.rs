//! Cost-aware dispatch engine.
//!
//! Everything that decides where a request goes and tracks what each backend
//! is currently carrying:
//! - **Jobs**: what a client asked for ([`Job`], [`JobKind`])
//! - **Cost model**: how expensive a job is on each backend type ([`CostModel`])
//! - **Backend state**: per-backend in-flight load with a reserve/release
//!   protocol ([`Backend`], [`Reservation`])
//! - **Selection**: full-scan minimum or power of two choices ([`Selector`])
//! - **Dispatcher**: one request lifecycle end to end ([`Dispatcher`])
//!
//! # Request Lifecycle
//!
//! 1. Decode the client bytes into a [`Job`]
//! 2. Score candidate backends with `current_load + cost`
//! 3. Reserve the job's cost on the winner
//! 4. Forward the raw request and wait for the reply (with a timeout)
//! 5. Release the reservation, whatever the outcome
//!
//! Nothing in steps 1-3 performs I/O.

pub mod backend;
pub mod cost;
pub mod dispatcher;
pub mod job;
pub mod pool;
pub mod selector;

pub use backend::{Backend, BackendStatus, LoadModel, Reservation};
pub use cost::CostModel;
pub use dispatcher::{Dispatcher, StatsSnapshot, StatusSource};
pub use job::{BackendKind, Job, JobKind, MAX_JOB_SIZE};
pub use pool::Pool;
pub use selector::{Selection, SelectionPolicy, Selector};
