//! # marlvec
//!
//! Vectorized multi-agent environments backed by one worker process per slot.
//!
//! ## Overview
//!
//! marlvec provides:
//! - The `MultiAgentEnv` trait plus an explicit capability interface
//!   (`get_attr`/`set_attr`/`call_method`) in place of runtime reflection
//! - A duplex request/reply `Channel` to each worker (OS process or thread)
//! - `MultiAgentVecEnv`, a dispatcher that scatters flat agent-indexed actions
//!   to N slots and gathers their results back into flat `N * A` batches
//! - Pure flattening functions that hold the addressing invariant
//!   `global = slot * agents_per_env + local_agent`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use marlvec::prelude::*;
//!
//! let config = PoolConfig::new(EnvSpec::new("reach", 2), 4)
//!     .with_worker_program("/path/to/marlvec", ["worker"]);
//! let mut pool = MultiAgentVecEnv::spawn(&config)?;
//!
//! let obs = pool.reset()?;
//! let actions = Array2::zeros((pool.num_envs(), 3));
//! let batch = pool.step(&actions)?;
//! assert_eq!(batch.rewards.len(), pool.num_envs());
//! pool.close()?;
//! ```

pub mod config;
pub mod env;
pub mod log;
pub mod spaces;
pub mod vector;

#[cfg(test)]
mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::PoolConfig;
    pub use crate::env::{
        EnvInfo, EnvRegistry, EnvSpec, Frame, MultiAgentEnv, MultiAgentStep, Observation,
        RenderMode, Value,
    };
    pub use crate::log::{CompositeLogger, ConsoleLogger, MetricLogger, NoOpLogger};
    pub use crate::spaces::*;
    pub use crate::vector::{
        AgentInfo, BatchedObservation, Channel, Indices, MultiAgentVecEnv, ProcessChannel,
        StepBatch, ThreadChannel,
    };
    pub use ndarray::{Array2, ArrayD, IxDyn};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error types for the library
#[derive(Debug, thiserror::Error)]
pub enum MarlError {
    /// A call arrived in the wrong dispatcher state (e.g. `step_wait` without `step_async`).
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// Observation structure does not match the declared schema.
    #[error("Schema mismatch: {0}")]
    Schema(String),

    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Slot index {index} out of range for {num_slots} slots")]
    IndexOutOfRange { index: usize, num_slots: usize },

    /// The channel to a worker broke (crash, EOF, or a malformed frame).
    #[error("Channel to slot {slot} failed: {message}")]
    Channel { slot: usize, message: String },

    /// The worker handled the command but the environment rejected it.
    #[error("Worker {slot} failed: {message}")]
    Worker { slot: usize, message: String },

    #[error("Vectorized environment is closed")]
    Closed,

    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Environment error: {0}")]
    EnvError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = core::result::Result<T, MarlError>;
