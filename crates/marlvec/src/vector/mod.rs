//! Vectorized multi-agent environments.
//!
//! - `MultiAgentVecEnv` - dispatcher over `N` slots of `A` agents each
//! - `ProcessChannel` / `ThreadChannel` - transports to a slot's worker
//! - `Worker` - the command loop every slot runs
//! - `flatten` - pure scatter/gather between agent batches and slot results

mod batch;
mod channel;
pub mod flatten;
mod pool;
pub mod protocol;
mod worker;

pub use batch::{AgentInfo, BatchedObservation, StepBatch};
pub use channel::{Channel, ProcessChannel, ThreadChannel};
pub use pool::{Indices, MultiAgentVecEnv};
pub use protocol::{Command, Reply};
pub use worker::{serve_stdio, StreamEndpoint, Worker, WorkerEndpoint};
