pub mod balancer;
pub mod config;
pub mod dashboard;
pub mod dispatch;
pub mod error;
pub mod shutdown;
pub mod transport;
