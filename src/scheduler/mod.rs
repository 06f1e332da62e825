//! Scheduler engine: the durable execution loop.
//!
//! A single tick task polls the database for due schedules, admits each one
//! through the [`ActiveExecutions`] registry, and spawns a run executor per
//! admitted schedule. All authoritative state lives in the store; the
//! registry only suppresses duplicate in-flight dispatch within this process.

mod active;
mod engine;
mod executor;

pub use active::ActiveExecutions;
pub use engine::{Engine, EngineConfig, EngineHandle};
