//! Small deterministic environment shared by unit tests.

use crate::env::{EnvInfo, MultiAgentEnv, MultiAgentStep, Observation, ResetOptions, Value};
use crate::spaces::{Box as BoxSpace, Dict, DynSpace};
use crate::{MarlError, Result};
use ndarray::{Array2, ArrayD, IxDyn};
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Layout {
    /// Box observation, one value per agent
    Flat,
    /// Dict observation with fields `a` and `b`
    Dict,
    /// Declares the dict space but only emits field `a`
    BrokenDict,
}

/// Every agent observes `ticks * 10 + local_agent`; agent 0 terminates every third tick.
pub struct Counter {
    agents: usize,
    ticks: i64,
    layout: Layout,
}

impl Counter {
    pub fn new(agents: usize) -> Self {
        Self::with_layout(agents, Layout::Flat)
    }

    pub fn with_layout(agents: usize, layout: Layout) -> Self {
        Self {
            agents,
            ticks: 0,
            layout,
        }
    }

    fn column(&self, offset: f32) -> ArrayD<f32> {
        ArrayD::from_shape_fn(IxDyn(&[self.agents]), |idx| {
            self.ticks as f32 * 10.0 + idx[0] as f32 + offset
        })
    }

    fn observe(&self) -> Observation {
        match self.layout {
            Layout::Flat => Observation::Array(self.column(0.0)),
            Layout::Dict => Observation::Dict(
                [("a".to_string(), self.column(0.0)), ("b".to_string(), self.column(0.5))]
                    .into_iter()
                    .collect(),
            ),
            Layout::BrokenDict => {
                Observation::Dict([("a".to_string(), self.column(0.0))].into_iter().collect())
            }
        }
    }
}

impl MultiAgentEnv for Counter {
    fn observation_space(&self) -> DynSpace {
        let column = DynSpace::Box(BoxSpace::unbounded(&[self.agents]));
        match self.layout {
            Layout::Flat => column,
            Layout::Dict | Layout::BrokenDict => DynSpace::Dict(Dict::from_pairs(vec![
                ("a", column.clone()),
                ("b", column),
            ])),
        }
    }

    fn action_space(&self) -> DynSpace {
        DynSpace::Box(BoxSpace::symmetric(&[1]))
    }

    fn num_agents(&self) -> usize {
        self.agents
    }

    fn reset(&mut self, seed: Option<u64>, options: &ResetOptions) -> Result<(Observation, EnvInfo)> {
        self.ticks = seed.map_or(0, |s| s as i64);
        let mut info = EnvInfo::new();
        if let Some(start) = options.get("start").and_then(Value::as_i64) {
            self.ticks = start;
            info.insert("start", start);
        }
        Ok((self.observe(), info))
    }

    fn step(&mut self, actions: &Array2<f32>) -> Result<MultiAgentStep> {
        if actions.nrows() != self.agents {
            return Err(MarlError::InvalidAction(format!(
                "expected {} action rows, got {}",
                self.agents,
                actions.nrows()
            )));
        }
        self.ticks += 1;
        let mut terminated = vec![false; self.agents];
        terminated[0] = self.ticks % 3 == 0;
        Ok(MultiAgentStep {
            observation: self.observe(),
            rewards: actions.column(0).to_vec(),
            terminated,
            truncated: vec![false; self.agents],
        })
    }

    fn get_attr(&self, name: &str) -> Result<Value> {
        match name {
            "ticks" => Ok(Value::Int(self.ticks)),
            other => Err(MarlError::UnknownAttribute(other.to_string())),
        }
    }

    fn set_attr(&mut self, name: &str, value: Value) -> Result<Value> {
        match name {
            "ticks" => {
                let ticks = value
                    .as_i64()
                    .ok_or_else(|| MarlError::EnvError("ticks must be an integer".into()))?;
                Ok(Value::Int(std::mem::replace(&mut self.ticks, ticks)))
            }
            other => Err(MarlError::UnknownAttribute(other.to_string())),
        }
    }

    fn call_method(
        &mut self,
        name: &str,
        args: &[Value],
        kwargs: &BTreeMap<String, Value>,
    ) -> Result<Value> {
        match name {
            "advance" => {
                let by = args
                    .first()
                    .or_else(|| kwargs.get("by"))
                    .and_then(Value::as_i64)
                    .unwrap_or(1);
                self.ticks += by;
                Ok(Value::Int(self.ticks))
            }
            other => Err(MarlError::UnknownMethod(other.to_string())),
        }
    }

    fn is_wrapped(&self, marker: &str) -> bool {
        marker == "Counter"
    }
}
