//! Agents walking towards the end of a line.

use marlvec::env::{EnvInfo, MultiAgentEnv, MultiAgentStep, Observation, ResetOptions, Value};
use marlvec::spaces::{Box as BoxSpace, DynSpace};
use marlvec::{MarlError, Result};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

/// LineWalkers environment
///
/// Each agent starts near the origin of `[-length, length]` and is rewarded
/// for closing the distance to `+length`. Reaching it terminates that agent,
/// which then restarts near the origin.
///
/// Observation: one position per agent, `[A]`
/// Action: step size in `[-1, 1]`
pub struct LineWalkers {
    num_agents: usize,
    length: f32,
    positions: Vec<f32>,
    rng: StdRng,
}

impl LineWalkers {
    pub fn new(num_agents: usize) -> Self {
        Self {
            num_agents,
            length: 5.0,
            positions: vec![0.0; num_agents],
            rng: StdRng::seed_from_u64(0),
        }
    }

    pub fn with_length(mut self, length: f32) -> Self {
        self.length = length.max(1.0);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    fn start(&mut self) -> f32 {
        self.rng.gen_range(-0.5..=0.5)
    }

    fn observe(&self) -> Observation {
        Observation::Array(
            Array1::from(self.positions.clone()).into_dyn(),
        )
    }
}

impl MultiAgentEnv for LineWalkers {
    fn observation_space(&self) -> DynSpace {
        DynSpace::Box(BoxSpace::uniform(&[self.num_agents], -self.length, self.length))
    }

    fn action_space(&self) -> DynSpace {
        DynSpace::Box(BoxSpace::symmetric(&[1]))
    }

    fn num_agents(&self) -> usize {
        self.num_agents
    }

    fn reset(&mut self, seed: Option<u64>, options: &ResetOptions) -> Result<(Observation, EnvInfo)> {
        if let Some(s) = seed {
            self.rng = StdRng::seed_from_u64(s);
        }
        if let Some(length) = options.get("length").and_then(Value::as_f64) {
            self.length = (length as f32).max(1.0);
        }
        for i in 0..self.num_agents {
            self.positions[i] = self.start();
        }
        Ok((self.observe(), EnvInfo::new().with_extra("length", self.length)))
    }

    fn step(&mut self, actions: &Array2<f32>) -> Result<MultiAgentStep> {
        if actions.nrows() != self.num_agents || actions.ncols() != 1 {
            return Err(MarlError::InvalidAction(format!(
                "expected actions of shape [{}, 1], got {:?}",
                self.num_agents,
                actions.shape()
            )));
        }

        let mut rewards = Vec::with_capacity(self.num_agents);
        let mut terminated = Vec::with_capacity(self.num_agents);
        for (i, &a) in actions.column(0).iter().enumerate() {
            let before = self.length - self.positions[i];
            self.positions[i] = (self.positions[i] + a.clamp(-1.0, 1.0)).clamp(-self.length, self.length);
            let after = self.length - self.positions[i];
            let done = after <= f32::EPSILON;
            rewards.push(before - after);
            terminated.push(done);
            if done {
                self.positions[i] = self.start();
            }
        }

        Ok(MultiAgentStep {
            observation: self.observe(),
            rewards,
            terminated,
            truncated: vec![false; self.num_agents],
        })
    }

    fn reset_agent(&mut self, agent: usize) {
        if agent < self.num_agents {
            self.positions[agent] = self.start();
        }
    }

    fn get_attr(&self, name: &str) -> Result<Value> {
        match name {
            "length" => Ok(Value::Float(self.length as f64)),
            "positions" => Ok(Value::Floats(self.positions.clone())),
            other => Err(MarlError::UnknownAttribute(other.to_string())),
        }
    }

    fn call_method(
        &mut self,
        name: &str,
        _args: &[Value],
        _kwargs: &BTreeMap<String, Value>,
    ) -> Result<Value> {
        match name {
            "distance_to_end" => Ok(Value::Floats(
                self.positions.iter().map(|p| self.length - p).collect(),
            )),
            other => Err(MarlError::UnknownMethod(other.to_string())),
        }
    }
}
