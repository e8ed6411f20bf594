//! Core environment trait definitions.

use super::{EnvInfo, Value};
use crate::spaces::DynSpace;
use crate::{MarlError, Result};
use ndarray::{Array2, ArrayD};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Options passed to the next reset of one slot
pub type ResetOptions = BTreeMap<String, Value>;

/// One slot's observation.
///
/// Every field stacks the slot's agents along axis 0, so a field of length
/// `L` holds `L / num_agents` rows per agent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Observation {
    /// Primitive array
    Array(ArrayD<f32>),
    /// Named fields
    Dict(BTreeMap<String, ArrayD<f32>>),
    /// Positional fields
    Tuple(Vec<ArrayD<f32>>),
}

impl Observation {
    /// Variant name, for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Observation::Array(_) => "array",
            Observation::Dict(_) => "dict",
            Observation::Tuple(_) => "tuple",
        }
    }

    /// Field lookup for dict observations
    pub fn field(&self, name: &str) -> Option<&ArrayD<f32>> {
        match self {
            Observation::Dict(fields) => fields.get(name),
            _ => None,
        }
    }
}

/// Result of stepping every agent of one slot
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MultiAgentStep {
    /// Observation after the step, agents stacked along axis 0
    pub observation: Observation,
    /// One reward per agent
    pub rewards: Vec<f32>,
    /// Per-agent terminal flags (goal reached, failure, ...)
    pub terminated: Vec<bool>,
    /// Per-agent truncation flags (time limit)
    pub truncated: Vec<bool>,
}

/// An RGB image, row-major `height x width x 3`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub height: usize,
    pub width: usize,
    pub pixels: Vec<u8>,
}

impl Frame {
    /// Blank frame of the given size
    pub fn new(height: usize, width: usize) -> Self {
        Self {
            height,
            width,
            pixels: vec![0; height * width * 3],
        }
    }

    /// Paint one pixel; out-of-bounds writes are dropped
    pub fn put(&mut self, row: usize, col: usize, rgb: [u8; 3]) {
        if row < self.height && col < self.width {
            let i = (row * self.width + col) * 3;
            self.pixels[i..i + 3].copy_from_slice(&rgb);
        }
    }
}

/// How an environment renders
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    #[default]
    None,
    Human,
    RgbArray,
}

impl FromStr for RenderMode {
    type Err = MarlError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(RenderMode::None),
            "human" => Ok(RenderMode::Human),
            "rgb_array" => Ok(RenderMode::RgbArray),
            other => Err(MarlError::EnvError(format!("unknown render mode `{}`", other))),
        }
    }
}

impl std::fmt::Display for RenderMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RenderMode::None => "none",
            RenderMode::Human => "human",
            RenderMode::RgbArray => "rgb_array",
        })
    }
}

/// Core trait for slot environments.
///
/// One instance lives in each worker and hosts `num_agents()` agents. Agents
/// that finish an episode are expected to be re-initialized by the environment
/// itself; the dispatcher never resets a slot on its own.
///
/// The attribute and method hooks replace runtime reflection: an environment
/// lists what it exposes by matching on the name and rejects everything else
/// with `UnknownAttribute` / `UnknownMethod`.
///
/// # Example
///
/// ```rust,ignore
/// impl MultiAgentEnv for Walkers {
///     fn observation_space(&self) -> DynSpace {
///         DynSpace::Box(BoxSpace::uniform(&[self.n, 1], -10.0, 10.0))
///     }
///
///     fn get_attr(&self, name: &str) -> Result<Value> {
///         match name {
///             "speed" => Ok(Value::Float(self.speed)),
///             other => Err(MarlError::UnknownAttribute(other.to_string())),
///         }
///     }
///     // ...
/// }
/// ```
pub trait MultiAgentEnv: Send {
    /// Observation space of the whole slot (agents stacked along axis 0)
    fn observation_space(&self) -> DynSpace;

    /// Action space of a single agent
    fn action_space(&self) -> DynSpace;

    /// Number of agents hosted by this environment
    fn num_agents(&self) -> usize;

    /// Reset the environment; `seed` and `options` apply to this reset only
    fn reset(&mut self, seed: Option<u64>, options: &ResetOptions) -> Result<(Observation, EnvInfo)>;

    /// Step every agent. `actions` has one row per agent.
    fn step(&mut self, actions: &Array2<f32>) -> Result<MultiAgentStep>;

    /// Optional: render the current state
    fn render(&mut self) -> Option<Frame> {
        None
    }

    /// Optional: release resources
    fn close(&mut self) {}

    /// Re-initialize one agent whose episode was ended from outside the
    /// environment (a time limit). The agent starts fresh on the next step.
    fn reset_agent(&mut self, _agent: usize) {}

    /// Read a named attribute
    fn get_attr(&self, name: &str) -> Result<Value> {
        Err(MarlError::UnknownAttribute(name.to_string()))
    }

    /// Write a named attribute, returning its previous value
    fn set_attr(&mut self, name: &str, _value: Value) -> Result<Value> {
        Err(MarlError::UnknownAttribute(name.to_string()))
    }

    /// Invoke a named method
    fn call_method(
        &mut self,
        name: &str,
        _args: &[Value],
        _kwargs: &BTreeMap<String, Value>,
    ) -> Result<Value> {
        Err(MarlError::UnknownMethod(name.to_string()))
    }

    /// Whether a wrapper with this marker sits anywhere in the stack
    fn is_wrapped(&self, _marker: &str) -> bool {
        false
    }
}

impl<E: MultiAgentEnv + ?Sized> MultiAgentEnv for Box<E> {
    fn observation_space(&self) -> DynSpace {
        (**self).observation_space()
    }

    fn action_space(&self) -> DynSpace {
        (**self).action_space()
    }

    fn num_agents(&self) -> usize {
        (**self).num_agents()
    }

    fn reset(&mut self, seed: Option<u64>, options: &ResetOptions) -> Result<(Observation, EnvInfo)> {
        (**self).reset(seed, options)
    }

    fn step(&mut self, actions: &Array2<f32>) -> Result<MultiAgentStep> {
        (**self).step(actions)
    }

    fn render(&mut self) -> Option<Frame> {
        (**self).render()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn reset_agent(&mut self, agent: usize) {
        (**self).reset_agent(agent)
    }

    fn get_attr(&self, name: &str) -> Result<Value> {
        (**self).get_attr(name)
    }

    fn set_attr(&mut self, name: &str, value: Value) -> Result<Value> {
        (**self).set_attr(name, value)
    }

    fn call_method(
        &mut self,
        name: &str,
        args: &[Value],
        kwargs: &BTreeMap<String, Value>,
    ) -> Result<Value> {
        (**self).call_method(name, args, kwargs)
    }

    fn is_wrapped(&self, marker: &str) -> bool {
        (**self).is_wrapped(marker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_mode_parse_and_display() {
        for mode in [RenderMode::None, RenderMode::Human, RenderMode::RgbArray] {
            assert_eq!(mode.to_string().parse::<RenderMode>().unwrap(), mode);
        }
        assert!("rgb".parse::<RenderMode>().is_err());
    }

    #[test]
    fn test_frame_put_ignores_out_of_bounds() {
        let mut frame = Frame::new(2, 2);
        frame.put(1, 1, [255, 0, 0]);
        frame.put(5, 0, [1, 1, 1]);
        assert_eq!(&frame.pixels[9..12], &[255, 0, 0]);
        assert_eq!(frame.pixels.iter().filter(|&&p| p != 0).count(), 1);
    }
}
