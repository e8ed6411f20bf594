//! Point masses with a tuple observation.

use marlvec::env::{EnvInfo, MultiAgentEnv, MultiAgentStep, Observation, ResetOptions};
use marlvec::spaces::{Box as BoxSpace, DynSpace, Tuple};
use marlvec::{MarlError, Result};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// TupleEcho environment
///
/// Agents are point masses on a plane; the action is the new velocity. The
/// reward is the negative distance to the origin. Agents never terminate, so
/// episodes end only through a time limit.
///
/// Observation: `(position [A * 2], velocity [A * 2])`
pub struct TupleEcho {
    num_agents: usize,
    dt: f32,
    positions: Vec<[f32; 2]>,
    velocities: Vec<[f32; 2]>,
    rng: StdRng,
}

impl TupleEcho {
    pub fn new(num_agents: usize) -> Self {
        Self {
            num_agents,
            dt: 0.1,
            positions: vec![[0.0; 2]; num_agents],
            velocities: vec![[0.0; 2]; num_agents],
            rng: StdRng::seed_from_u64(0),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    fn spawn(&mut self, agent: usize) {
        self.positions[agent] = [self.rng.gen_range(-1.0..=1.0), self.rng.gen_range(-1.0..=1.0)];
        self.velocities[agent] = [0.0; 2];
    }

    fn observe(&self) -> Observation {
        let flat = |rows: &[[f32; 2]]| {
            let data: Vec<f32> = rows.iter().flatten().copied().collect();
            Array1::from(data).into_dyn()
        };
        Observation::Tuple(vec![flat(&self.positions), flat(&self.velocities)])
    }
}

impl MultiAgentEnv for TupleEcho {
    fn observation_space(&self) -> DynSpace {
        let field = DynSpace::Box(BoxSpace::unbounded(&[self.num_agents * 2]));
        DynSpace::Tuple(Tuple::new(vec![field.clone(), field]))
    }

    fn action_space(&self) -> DynSpace {
        DynSpace::Box(BoxSpace::symmetric(&[2]))
    }

    fn num_agents(&self) -> usize {
        self.num_agents
    }

    fn reset(&mut self, seed: Option<u64>, _options: &ResetOptions) -> Result<(Observation, EnvInfo)> {
        if let Some(s) = seed {
            self.rng = StdRng::seed_from_u64(s);
        }
        for agent in 0..self.num_agents {
            self.spawn(agent);
        }
        Ok((self.observe(), EnvInfo::new()))
    }

    fn step(&mut self, actions: &Array2<f32>) -> Result<MultiAgentStep> {
        if actions.nrows() != self.num_agents || actions.ncols() != 2 {
            return Err(MarlError::InvalidAction(format!(
                "expected actions of shape [{}, 2], got {:?}",
                self.num_agents,
                actions.shape()
            )));
        }

        let mut rewards = Vec::with_capacity(self.num_agents);
        for (agent, row) in actions.outer_iter().enumerate() {
            for axis in 0..2 {
                self.velocities[agent][axis] = row[axis].clamp(-1.0, 1.0);
                self.positions[agent][axis] += self.velocities[agent][axis] * self.dt;
            }
            let [x, y] = self.positions[agent];
            rewards.push(-(x * x + y * y).sqrt());
        }

        Ok(MultiAgentStep {
            observation: self.observe(),
            rewards,
            terminated: vec![false; self.num_agents],
            truncated: vec![false; self.num_agents],
        })
    }

    fn reset_agent(&mut self, agent: usize) {
        if agent < self.num_agents {
            self.spawn(agent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_velocity_field_echoes_action() {
        let mut env = TupleEcho::new(2);
        env.reset(Some(5), &ResetOptions::new()).unwrap();
        let actions = Array2::from_shape_vec((2, 2), vec![0.5, -0.5, 3.0, 0.0]).unwrap();
        let step = env.step(&actions).unwrap();

        match &step.observation {
            Observation::Tuple(fields) => {
                assert_eq!(fields.len(), 2);
                assert_eq!(fields[1].as_slice().unwrap(), &[0.5, -0.5, 1.0, 0.0]);
            }
            other => panic!("unexpected observation {:?}", other),
        }
        assert!(step.rewards.iter().all(|&r| r <= 0.0));
        env.observation_space().schema().validate(&step.observation).unwrap();
    }
}
