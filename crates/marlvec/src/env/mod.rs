//! Environment traits and wrappers.
//!
//! Provides the `MultiAgentEnv` trait every slot environment implements, the
//! closed `Value` type used by the capability interface, common wrappers, and
//! the registry workers use to build environments by name.

mod registry;
mod traits;
mod value;
mod wrappers;

pub use registry::{EnvFactory, EnvRegistry, EnvSpec};
pub use traits::{Frame, MultiAgentEnv, MultiAgentStep, Observation, RenderMode, ResetOptions};
pub use value::{EnvInfo, Value};
pub use wrappers::{ClipAction, EpisodeStats, TimeLimit};
