//! Environment wrappers for common functionality.
//!
//! Each wrapper answers `is_wrapped` for its own marker, serves the attributes
//! it owns, and forwards everything else to the inner environment.

use super::{EnvInfo, MultiAgentEnv, MultiAgentStep, Observation, ResetOptions, Value};
use crate::spaces::{Box as BoxSpace, DynSpace};
use crate::{MarlError, Result};
use ndarray::Array2;
use std::collections::BTreeMap;

/// Wrapper that tracks per-agent episode statistics (return and length).
///
/// Completed episodes are exposed through the `episode_returns` and
/// `episode_lengths` attributes (one entry per agent, last finished episode).
pub struct EpisodeStats<E: MultiAgentEnv> {
    env: E,
    running_return: Vec<f32>,
    running_length: Vec<u32>,
    last_return: Vec<f32>,
    last_length: Vec<u32>,
}

impl<E: MultiAgentEnv> EpisodeStats<E> {
    pub const MARKER: &'static str = "EpisodeStats";

    /// Wrap an environment with episode statistics tracking
    pub fn new(env: E) -> Self {
        let n = env.num_agents();
        Self {
            env,
            running_return: vec![0.0; n],
            running_length: vec![0; n],
            last_return: vec![0.0; n],
            last_length: vec![0; n],
        }
    }

    /// Get a reference to the inner environment
    pub fn inner(&self) -> &E {
        &self.env
    }

    /// Get a mutable reference to the inner environment
    pub fn inner_mut(&mut self) -> &mut E {
        &mut self.env
    }
}

impl<E: MultiAgentEnv> MultiAgentEnv for EpisodeStats<E> {
    fn observation_space(&self) -> DynSpace {
        self.env.observation_space()
    }

    fn action_space(&self) -> DynSpace {
        self.env.action_space()
    }

    fn num_agents(&self) -> usize {
        self.env.num_agents()
    }

    fn reset(&mut self, seed: Option<u64>, options: &ResetOptions) -> Result<(Observation, EnvInfo)> {
        self.running_return.iter_mut().for_each(|r| *r = 0.0);
        self.running_length.iter_mut().for_each(|l| *l = 0);
        self.env.reset(seed, options)
    }

    fn step(&mut self, actions: &Array2<f32>) -> Result<MultiAgentStep> {
        let result = self.env.step(actions)?;

        for (i, &reward) in result.rewards.iter().enumerate().take(self.running_return.len()) {
            self.running_return[i] += reward;
            self.running_length[i] += 1;

            let done = result.terminated.get(i).copied().unwrap_or(false)
                || result.truncated.get(i).copied().unwrap_or(false);
            if done {
                self.last_return[i] = self.running_return[i];
                self.last_length[i] = self.running_length[i];
                self.running_return[i] = 0.0;
                self.running_length[i] = 0;
            }
        }

        Ok(result)
    }

    fn render(&mut self) -> Option<super::Frame> {
        self.env.render()
    }

    fn close(&mut self) {
        self.env.close()
    }

    fn reset_agent(&mut self, agent: usize) {
        self.env.reset_agent(agent)
    }

    fn get_attr(&self, name: &str) -> Result<Value> {
        match name {
            "episode_returns" => Ok(Value::Floats(self.last_return.clone())),
            "episode_lengths" => Ok(Value::Floats(
                self.last_length.iter().map(|&l| l as f32).collect(),
            )),
            _ => self.env.get_attr(name),
        }
    }

    fn set_attr(&mut self, name: &str, value: Value) -> Result<Value> {
        self.env.set_attr(name, value)
    }

    fn call_method(
        &mut self,
        name: &str,
        args: &[Value],
        kwargs: &BTreeMap<String, Value>,
    ) -> Result<Value> {
        self.env.call_method(name, args, kwargs)
    }

    fn is_wrapped(&self, marker: &str) -> bool {
        marker == Self::MARKER || self.env.is_wrapped(marker)
    }
}

/// Wrapper that clips continuous actions to the action space bounds.
pub struct ClipAction<E: MultiAgentEnv> {
    env: E,
    bounds: BoxSpace,
}

impl<E: MultiAgentEnv> ClipAction<E> {
    pub const MARKER: &'static str = "ClipAction";

    /// Wrap an environment with action clipping.
    ///
    /// Fails unless the action space is a Box space.
    pub fn new(env: E) -> Result<Self> {
        match env.action_space() {
            DynSpace::Box(bounds) => Ok(Self { env, bounds }),
            other => Err(MarlError::InvalidAction(format!(
                "ClipAction requires a Box action space, got {:?}",
                other
            ))),
        }
    }
}

impl<E: MultiAgentEnv> MultiAgentEnv for ClipAction<E> {
    fn observation_space(&self) -> DynSpace {
        self.env.observation_space()
    }

    fn action_space(&self) -> DynSpace {
        self.env.action_space()
    }

    fn num_agents(&self) -> usize {
        self.env.num_agents()
    }

    fn reset(&mut self, seed: Option<u64>, options: &ResetOptions) -> Result<(Observation, EnvInfo)> {
        self.env.reset(seed, options)
    }

    fn step(&mut self, actions: &Array2<f32>) -> Result<MultiAgentStep> {
        let mut clipped = actions.as_standard_layout().into_owned();
        if let Some(values) = clipped.as_slice_mut() {
            self.bounds.clip(values);
        }
        self.env.step(&clipped)
    }

    fn render(&mut self) -> Option<super::Frame> {
        self.env.render()
    }

    fn close(&mut self) {
        self.env.close()
    }

    fn reset_agent(&mut self, agent: usize) {
        self.env.reset_agent(agent)
    }

    fn get_attr(&self, name: &str) -> Result<Value> {
        self.env.get_attr(name)
    }

    fn set_attr(&mut self, name: &str, value: Value) -> Result<Value> {
        self.env.set_attr(name, value)
    }

    fn call_method(
        &mut self,
        name: &str,
        args: &[Value],
        kwargs: &BTreeMap<String, Value>,
    ) -> Result<Value> {
        self.env.call_method(name, args, kwargs)
    }

    fn is_wrapped(&self, marker: &str) -> bool {
        marker == Self::MARKER || self.env.is_wrapped(marker)
    }
}

/// Per-agent step budget.
///
/// Each agent runs on its own counter: when it exceeds `max_episode_steps`
/// its `truncated` flag is raised, and the counter restarts whenever that
/// agent's episode ends. The slot as a whole is never truncated.
pub struct TimeLimit<E: MultiAgentEnv> {
    env: E,
    max_episode_steps: u32,
    elapsed: Vec<u32>,
}

impl<E: MultiAgentEnv> TimeLimit<E> {
    pub const MARKER: &'static str = "TimeLimit";

    pub fn new(env: E, max_episode_steps: u32) -> Self {
        let n = env.num_agents();
        Self {
            env,
            max_episode_steps,
            elapsed: vec![0; n],
        }
    }

    /// Steps taken by each agent in its current episode
    pub fn elapsed(&self) -> &[u32] {
        &self.elapsed
    }
}

impl<E: MultiAgentEnv> MultiAgentEnv for TimeLimit<E> {
    fn observation_space(&self) -> DynSpace {
        self.env.observation_space()
    }

    fn action_space(&self) -> DynSpace {
        self.env.action_space()
    }

    fn num_agents(&self) -> usize {
        self.env.num_agents()
    }

    fn reset(&mut self, seed: Option<u64>, options: &ResetOptions) -> Result<(Observation, EnvInfo)> {
        self.elapsed.iter_mut().for_each(|e| *e = 0);
        self.env.reset(seed, options)
    }

    fn step(&mut self, actions: &Array2<f32>) -> Result<MultiAgentStep> {
        let mut result = self.env.step(actions)?;

        for (i, elapsed) in self.elapsed.iter_mut().enumerate() {
            *elapsed += 1;
            let terminated = result.terminated.get(i).copied().unwrap_or(false);
            if *elapsed >= self.max_episode_steps {
                if let Some(t) = result.truncated.get_mut(i) {
                    *t = true;
                }
                if !terminated {
                    self.env.reset_agent(i);
                }
            }
            let truncated = result.truncated.get(i).copied().unwrap_or(false);
            if terminated || truncated {
                *elapsed = 0;
            }
        }

        Ok(result)
    }

    fn render(&mut self) -> Option<super::Frame> {
        self.env.render()
    }

    fn close(&mut self) {
        self.env.close()
    }

    fn reset_agent(&mut self, agent: usize) {
        self.env.reset_agent(agent)
    }

    fn get_attr(&self, name: &str) -> Result<Value> {
        match name {
            "max_episode_steps" => Ok(Value::Int(self.max_episode_steps as i64)),
            _ => self.env.get_attr(name),
        }
    }

    fn set_attr(&mut self, name: &str, value: Value) -> Result<Value> {
        match name {
            "max_episode_steps" => {
                let steps = value
                    .as_i64()
                    .filter(|&s| s > 0 && s <= u32::MAX as i64)
                    .ok_or_else(|| {
                        MarlError::EnvError(format!("max_episode_steps must be a positive integer, got {:?}", value))
                    })?;
                let previous = self.max_episode_steps;
                self.max_episode_steps = steps as u32;
                Ok(Value::Int(previous as i64))
            }
            _ => self.env.set_attr(name, value),
        }
    }

    fn call_method(
        &mut self,
        name: &str,
        args: &[Value],
        kwargs: &BTreeMap<String, Value>,
    ) -> Result<Value> {
        self.env.call_method(name, args, kwargs)
    }

    fn is_wrapped(&self, marker: &str) -> bool {
        marker == Self::MARKER || self.env.is_wrapped(marker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spaces::Discrete;
    use ndarray::{ArrayD, IxDyn};

    /// Two agents; agent 0 terminates every third step, agent 1 never does.
    struct Pair {
        ticks: u32,
    }

    impl MultiAgentEnv for Pair {
        fn observation_space(&self) -> DynSpace {
            DynSpace::Box(BoxSpace::uniform(&[2, 1], -1.0, 1.0))
        }

        fn action_space(&self) -> DynSpace {
            DynSpace::Box(BoxSpace::symmetric(&[1]))
        }

        fn num_agents(&self) -> usize {
            2
        }

        fn reset(&mut self, _seed: Option<u64>, _options: &ResetOptions) -> Result<(Observation, EnvInfo)> {
            self.ticks = 0;
            Ok((Observation::Array(ArrayD::zeros(IxDyn(&[2, 1]))), EnvInfo::new()))
        }

        fn step(&mut self, actions: &Array2<f32>) -> Result<MultiAgentStep> {
            self.ticks += 1;
            Ok(MultiAgentStep {
                observation: Observation::Array(
                    ArrayD::from_shape_vec(IxDyn(&[2, 1]), actions.iter().copied().collect()).unwrap(),
                ),
                rewards: vec![1.0, 0.5],
                terminated: vec![self.ticks % 3 == 0, false],
                truncated: vec![false, false],
            })
        }
    }

    fn zeros() -> Array2<f32> {
        Array2::zeros((2, 1))
    }

    #[test]
    fn test_episode_stats_per_agent() {
        let mut env = EpisodeStats::new(Pair { ticks: 0 });
        env.reset(None, &ResetOptions::new()).unwrap();
        for _ in 0..3 {
            env.step(&zeros()).unwrap();
        }
        assert_eq!(env.get_attr("episode_returns").unwrap(), Value::Floats(vec![3.0, 0.0]));
        assert_eq!(env.get_attr("episode_lengths").unwrap(), Value::Floats(vec![3.0, 0.0]));
    }

    #[test]
    fn test_time_limit_truncates_each_agent_independently() {
        let mut env = TimeLimit::new(Pair { ticks: 0 }, 4);
        env.reset(None, &ResetOptions::new()).unwrap();

        let truncated: Vec<Vec<bool>> = (0..4).map(|_| env.step(&zeros()).unwrap().truncated).collect();
        // agent 0 terminated at tick 3, so its budget restarted; agent 1 hits 4 steps
        assert_eq!(truncated[3], vec![false, true]);
        assert_eq!(env.elapsed(), &[1, 0]);
    }

    #[test]
    fn test_time_limit_attribute_round_trip() {
        let mut env = TimeLimit::new(Pair { ticks: 0 }, 10);
        assert_eq!(env.set_attr("max_episode_steps", Value::Int(20)).unwrap(), Value::Int(10));
        assert_eq!(env.get_attr("max_episode_steps").unwrap(), Value::Int(20));
        assert!(env.set_attr("max_episode_steps", Value::Int(0)).is_err());
        assert!(matches!(env.get_attr("nope"), Err(MarlError::UnknownAttribute(_))));
    }

    #[test]
    fn test_clip_action_clips_and_reports_marker() {
        let mut env = TimeLimit::new(ClipAction::new(Pair { ticks: 0 }).unwrap(), 100);
        let step = env.step(&Array2::from_shape_vec((2, 1), vec![4.0, -0.5]).unwrap()).unwrap();
        assert_eq!(
            step.observation,
            Observation::Array(ArrayD::from_shape_vec(IxDyn(&[2, 1]), vec![1.0, -0.5]).unwrap())
        );
        assert!(env.is_wrapped(ClipAction::<Pair>::MARKER));
        assert!(env.is_wrapped(TimeLimit::<Pair>::MARKER));
        assert!(!env.is_wrapped(EpisodeStats::<Pair>::MARKER));
    }

    #[test]
    fn test_clip_action_requires_box() {
        struct DiscreteActions(Pair);
        impl MultiAgentEnv for DiscreteActions {
            fn observation_space(&self) -> DynSpace {
                self.0.observation_space()
            }
            fn action_space(&self) -> DynSpace {
                DynSpace::Discrete(Discrete::new(2))
            }
            fn num_agents(&self) -> usize {
                2
            }
            fn reset(&mut self, seed: Option<u64>, options: &ResetOptions) -> Result<(Observation, EnvInfo)> {
                self.0.reset(seed, options)
            }
            fn step(&mut self, actions: &Array2<f32>) -> Result<MultiAgentStep> {
                self.0.step(actions)
            }
        }
        assert!(ClipAction::new(DiscreteActions(Pair { ticks: 0 })).is_err());
    }
}
