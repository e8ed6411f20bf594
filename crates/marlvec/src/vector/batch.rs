//! Agent-indexed batch types returned by the dispatcher.

use crate::env::Observation;
use ndarray::{ArrayD, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Observations of all `N * A` agents.
///
/// Mirrors the structure of the observation space; row `g` of every field
/// belongs to global agent `g = slot * agents_per_env + local_agent`.
#[derive(Clone, Debug, PartialEq)]
pub enum BatchedObservation {
    Array(ArrayD<f32>),
    Dict(BTreeMap<String, ArrayD<f32>>),
    Tuple(Vec<ArrayD<f32>>),
}

impl BatchedObservation {
    /// Number of agent rows in the batch
    pub fn num_agents(&self) -> usize {
        let leading = |a: &ArrayD<f32>| a.shape().first().copied().unwrap_or(0);
        match self {
            Self::Array(a) => leading(a),
            Self::Dict(fields) => fields.values().next().map_or(0, leading),
            Self::Tuple(fields) => fields.first().map_or(0, leading),
        }
    }

    /// Field of a dict batch
    pub fn field(&self, name: &str) -> Option<&ArrayD<f32>> {
        match self {
            Self::Dict(fields) => fields.get(name),
            _ => None,
        }
    }

    /// Observation of one global agent, or `None` if `global` is out of range
    pub fn agent(&self, global: usize) -> Option<Observation> {
        if global >= self.num_agents() {
            return None;
        }
        let row = |a: &ArrayD<f32>| a.index_axis(Axis(0), global).to_owned();
        Some(match self {
            Self::Array(a) => Observation::Array(row(a)),
            Self::Dict(fields) => {
                Observation::Dict(fields.iter().map(|(k, v)| (k.clone(), row(v))).collect())
            }
            Self::Tuple(fields) => Observation::Tuple(fields.iter().map(row).collect()),
        })
    }
}

/// Per-agent info produced by flattening a step
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    /// 1.0 iff the agent terminated this step
    pub is_success: f32,
    /// The agent's truncation flag
    #[serde(rename = "TimeLimit.truncated")]
    pub time_limit_truncated: bool,
    /// This agent's slice of its slot's observation
    pub terminal_observation: Observation,
}

/// Result from stepping all slots, flattened to agents
#[derive(Clone, Debug, PartialEq)]
pub struct StepBatch {
    pub observations: BatchedObservation,
    pub rewards: Vec<f32>,
    /// `terminated || truncated` per agent
    pub dones: Vec<bool>,
    pub infos: Vec<AgentInfo>,
}

impl StepBatch {
    /// Number of agents in the batch
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    /// Global indices of agents that finished this step
    pub fn done_indices(&self) -> Vec<usize> {
        self.dones
            .iter()
            .enumerate()
            .filter_map(|(g, &d)| d.then_some(g))
            .collect()
    }

    /// Fraction of agents whose episode ended in success
    pub fn success_rate(&self) -> f32 {
        if self.infos.is_empty() {
            return 0.0;
        }
        self.infos.iter().map(|i| i.is_success).sum::<f32>() / self.infos.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    #[test]
    fn test_agent_row_lookup() {
        let obs = ArrayD::from_shape_vec(IxDyn(&[3, 2]), vec![0., 1., 2., 3., 4., 5.]).unwrap();
        let batch = BatchedObservation::Tuple(vec![obs]);
        assert_eq!(batch.num_agents(), 3);
        assert_eq!(
            batch.agent(1),
            Some(Observation::Tuple(vec![
                ArrayD::from_shape_vec(IxDyn(&[2]), vec![2., 3.]).unwrap()
            ]))
        );
        assert!(batch.agent(3).is_none());
    }

    #[test]
    fn test_info_serializes_time_limit_key() {
        let info = AgentInfo {
            is_success: 0.0,
            time_limit_truncated: true,
            terminal_observation: Observation::Array(ArrayD::zeros(IxDyn(&[1]))),
        };
        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("\"TimeLimit.truncated\":true"));
    }
}
