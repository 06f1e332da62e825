//! HTTP request handlers.

pub mod health;
pub mod metrics;
pub mod problem;
pub mod runs;
pub mod schedules;
pub mod targets;

pub use problem::{ApiError, ApiResult};
