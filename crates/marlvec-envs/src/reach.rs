//! Goal-reaching swarm with a goal-conditioned observation.

use marlvec::env::{
    EnvInfo, Frame, MultiAgentEnv, MultiAgentStep, Observation, RenderMode, ResetOptions, Value,
};
use marlvec::spaces::{Box as BoxSpace, Dict, DynSpace};
use marlvec::{MarlError, Result};
use ndarray::{Array1, Array2, ArrayD};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

const FRAME_SIZE: usize = 64;

/// ReachSwarm environment
///
/// `A` point effectors in 3-D, each chasing its own goal. An agent that gets
/// within `distance_threshold` of its goal terminates and is immediately
/// re-initialized with a fresh start and goal; the other agents carry on.
///
/// Observation (per agent, stacked along axis 0):
/// - `observation`: `[x, y, z, vx, vy, vz]`
/// - `achieved_goal`: `[x, y, z]`
/// - `desired_goal`: `[gx, gy, gz]`
///
/// Action: `[dx, dy, dz]` in `[-1, 1]`, scaled by `speed`.
/// Reward: sparse, `0.0` on reaching the goal and `-1.0` otherwise.
pub struct ReachSwarm {
    num_agents: usize,
    distance_threshold: f32,
    goal_range: f32,
    speed: f32,
    render_mode: RenderMode,
    agent_names: Vec<String>,

    positions: Vec<[f32; 3]>,
    velocities: Vec<[f32; 3]>,
    goals: Vec<[f32; 3]>,
    rng: StdRng,
}

impl ReachSwarm {
    pub fn new(num_agents: usize) -> Self {
        Self {
            num_agents,
            distance_threshold: 0.05,
            goal_range: 0.3,
            speed: 0.05,
            render_mode: RenderMode::None,
            agent_names: (0..num_agents).map(|i| format!("Panda_{:02}", i)).collect(),
            positions: vec![[0.0; 3]; num_agents],
            velocities: vec![[0.0; 3]; num_agents],
            goals: vec![[0.0; 3]; num_agents],
            rng: StdRng::seed_from_u64(0),
        }
    }

    pub fn with_distance_threshold(mut self, threshold: f32) -> Self {
        self.distance_threshold = threshold;
        self
    }

    pub fn with_goal_range(mut self, range: f32) -> Self {
        self.goal_range = range;
        self
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_render_mode(mut self, mode: RenderMode) -> Self {
        self.render_mode = mode;
        self
    }

    /// Seed the goal sampler
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    fn sample_point(&mut self) -> [f32; 3] {
        let r = self.goal_range;
        [
            self.rng.gen_range(-r..=r),
            self.rng.gen_range(-r..=r),
            self.rng.gen_range(0.0..=r),
        ]
    }

    fn respawn(&mut self, agent: usize) {
        self.positions[agent] = self.sample_point();
        self.velocities[agent] = [0.0; 3];
        self.goals[agent] = self.sample_point();
    }

    /// Distance from each agent to its goal
    pub fn goal_distances(&self) -> Vec<f32> {
        self.positions
            .iter()
            .zip(&self.goals)
            .map(|(p, g)| distance(p, g))
            .collect()
    }

    fn field(&self, rows: impl Fn(usize) -> Vec<f32>) -> ArrayD<f32> {
        let data: Vec<f32> = (0..self.num_agents).flat_map(rows).collect();
        Array1::from(data).into_dyn()
    }

    fn observe(&self) -> Observation {
        let mut fields = BTreeMap::new();
        fields.insert(
            "observation".to_string(),
            self.field(|i| {
                let mut row = self.positions[i].to_vec();
                row.extend_from_slice(&self.velocities[i]);
                row
            }),
        );
        fields.insert("achieved_goal".to_string(), self.field(|i| self.positions[i].to_vec()));
        fields.insert("desired_goal".to_string(), self.field(|i| self.goals[i].to_vec()));
        Observation::Dict(fields)
    }
}

fn distance(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f32>().sqrt()
}

/// Project `x` in `[-range, range]` onto a pixel index
fn to_pixel(x: f32, range: f32) -> usize {
    let unit = ((x / range.max(f32::EPSILON)) + 1.0) / 2.0;
    (unit.clamp(0.0, 1.0) * (FRAME_SIZE - 1) as f32).round() as usize
}

impl MultiAgentEnv for ReachSwarm {
    fn observation_space(&self) -> DynSpace {
        let a = self.num_agents;
        DynSpace::Dict(Dict::from_pairs(vec![
            ("achieved_goal", DynSpace::Box(BoxSpace::unbounded(&[a * 3]))),
            ("desired_goal", DynSpace::Box(BoxSpace::unbounded(&[a * 3]))),
            ("observation", DynSpace::Box(BoxSpace::unbounded(&[a * 6]))),
        ]))
    }

    fn action_space(&self) -> DynSpace {
        DynSpace::Box(BoxSpace::symmetric(&[3]))
    }

    fn num_agents(&self) -> usize {
        self.num_agents
    }

    fn reset(&mut self, seed: Option<u64>, _options: &ResetOptions) -> Result<(Observation, EnvInfo)> {
        if let Some(s) = seed {
            self.rng = StdRng::seed_from_u64(s);
        }
        for agent in 0..self.num_agents {
            self.respawn(agent);
        }
        let info = EnvInfo::new().with_extra("distance_threshold", self.distance_threshold);
        Ok((self.observe(), info))
    }

    fn step(&mut self, actions: &Array2<f32>) -> Result<MultiAgentStep> {
        if actions.nrows() != self.num_agents || actions.ncols() != 3 {
            return Err(MarlError::InvalidAction(format!(
                "expected actions of shape [{}, 3], got {:?}",
                self.num_agents,
                actions.shape()
            )));
        }

        let mut rewards = Vec::with_capacity(self.num_agents);
        let mut terminated = Vec::with_capacity(self.num_agents);
        for (agent, row) in actions.outer_iter().enumerate() {
            for axis in 0..3 {
                let v = row[axis].clamp(-1.0, 1.0) * self.speed;
                self.velocities[agent][axis] = v;
                self.positions[agent][axis] += v;
            }
            let reached = distance(&self.positions[agent], &self.goals[agent]) < self.distance_threshold;
            rewards.push(if reached { 0.0 } else { -1.0 });
            terminated.push(reached);
        }

        for agent in 0..self.num_agents {
            if terminated[agent] {
                self.respawn(agent);
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
            self.respawn(agent);
        }
    }

    fn render(&mut self) -> Option<Frame> {
        match self.render_mode {
            RenderMode::RgbArray => {
                let mut frame = Frame::new(FRAME_SIZE, FRAME_SIZE);
                for (goal, pos) in self.goals.iter().zip(&self.positions) {
                    frame.put(to_pixel(goal[1], self.goal_range), to_pixel(goal[0], self.goal_range), [0, 200, 0]);
                    frame.put(to_pixel(pos[1], self.goal_range), to_pixel(pos[0], self.goal_range), [220, 30, 30]);
                }
                Some(frame)
            }
            RenderMode::Human => {
                tracing::debug!(distances = ?self.goal_distances(), "ReachSwarm state");
                None
            }
            RenderMode::None => None,
        }
    }

    fn get_attr(&self, name: &str) -> Result<Value> {
        match name {
            "distance_threshold" => Ok(Value::Float(self.distance_threshold as f64)),
            "goal_range" => Ok(Value::Float(self.goal_range as f64)),
            "agent_names" => Ok(Value::List(
                self.agent_names.iter().map(|n| Value::Str(n.clone())).collect(),
            )),
            "render_mode" => Ok(Value::Str(self.render_mode.to_string())),
            other => Err(MarlError::UnknownAttribute(other.to_string())),
        }
    }

    fn set_attr(&mut self, name: &str, value: Value) -> Result<Value> {
        let positive = |value: &Value| match value.as_f64() {
            Some(v) if v > 0.0 => Ok(v as f32),
            _ => Err(MarlError::EnvError(format!("{} must be a positive number", name))),
        };
        match name {
            "distance_threshold" => {
                let previous = self.get_attr(name)?;
                self.distance_threshold = positive(&value)?;
                Ok(previous)
            }
            "goal_range" => {
                let previous = self.get_attr(name)?;
                self.goal_range = positive(&value)?;
                Ok(previous)
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
            "set_seed_value" => {
                let seed = args
                    .first()
                    .or_else(|| kwargs.get("seed"))
                    .and_then(Value::as_i64)
                    .filter(|s| *s >= 0)
                    .ok_or_else(|| MarlError::EnvError("set_seed_value expects a non-negative seed".into()))?;
                self.rng = StdRng::seed_from_u64(seed as u64);
                Ok(Value::None)
            }
            "goal_distance" => Ok(Value::Floats(self.goal_distances())),
            other => Err(MarlError::UnknownMethod(other.to_string())),
        }
    }
}
