//! Scatter and gather between agent-indexed batches and per-slot results.
//!
//! Every function iterates slots in ascending order and, inside a slot, local
//! agents in ascending order, so row `g` of every output refers to agent
//! `slot * agents + local_agent`. Validation runs before any output is built:
//! a malformed slot result fails the whole batch.

use super::batch::{AgentInfo, BatchedObservation, StepBatch};
use crate::env::{MultiAgentStep, Observation};
use crate::spaces::ObsSchema;
use crate::{MarlError, Result};
use ndarray::{s, Array2, ArrayD, ArrayViewD, Axis, Slice};
use std::collections::BTreeMap;

/// Split a flat `[num_slots * agents, action_dim]` batch into one group per slot
pub fn scatter_actions(
    actions: &Array2<f32>,
    num_slots: usize,
    agents: usize,
) -> Result<Vec<Array2<f32>>> {
    if actions.nrows() != num_slots * agents {
        return Err(MarlError::ShapeMismatch {
            expected: vec![num_slots * agents, actions.ncols()],
            actual: actions.shape().to_vec(),
        });
    }
    Ok((0..num_slots)
        .map(|slot| actions.slice(s![slot * agents..(slot + 1) * agents, ..]).to_owned())
        .collect())
}

/// Split one field along axis 0 into `agents` equal contiguous chunks
pub fn split_field(field: &ArrayD<f32>, agents: usize) -> Result<Vec<ArrayViewD<'_, f32>>> {
    let len = match field.shape().first() {
        Some(&len) => len,
        None => {
            return Err(MarlError::Schema(
                "zero-dimensional field cannot be split into agents".into(),
            ))
        }
    };
    if agents == 0 || len % agents != 0 {
        return Err(MarlError::Schema(format!(
            "field of length {} does not split into {} agents",
            len, agents
        )));
    }
    let chunk = len / agents;
    Ok((0..agents)
        .map(|j| field.slice_axis(Axis(0), Slice::from(j * chunk..(j + 1) * chunk)))
        .collect())
}

fn stack(chunks: &[ArrayViewD<'_, f32>]) -> Result<ArrayD<f32>> {
    ndarray::stack(Axis(0), chunks).map_err(|e| {
        MarlError::Schema(format!("per-agent chunks do not share a shape: {}", e))
    })
}

fn owned(chunks: Vec<ArrayViewD<'_, f32>>) -> Vec<ArrayD<f32>> {
    chunks.into_iter().map(|c| c.to_owned()).collect()
}

/// Per-agent slices of one slot's observation, in local agent order
pub fn slice_agent_obs(obs: &Observation, agents: usize) -> Result<Vec<Observation>> {
    Ok(match obs {
        Observation::Array(a) => owned(split_field(a, agents)?)
            .into_iter()
            .map(Observation::Array)
            .collect(),
        Observation::Dict(fields) => {
            let mut per_agent = vec![BTreeMap::new(); agents];
            for (name, field) in fields {
                for (j, chunk) in owned(split_field(field, agents)?).into_iter().enumerate() {
                    per_agent[j].insert(name.clone(), chunk);
                }
            }
            per_agent.into_iter().map(Observation::Dict).collect()
        }
        Observation::Tuple(fields) => {
            let mut per_agent = vec![Vec::with_capacity(fields.len()); agents];
            for field in fields {
                for (j, chunk) in owned(split_field(field, agents)?).into_iter().enumerate() {
                    per_agent[j].push(chunk);
                }
            }
            per_agent.into_iter().map(Observation::Tuple).collect()
        }
    })
}

/// Stack the per-agent chunks of one field across all slots
fn gather_field<'a, F>(observations: &[&'a Observation], agents: usize, pick: F) -> Result<ArrayD<f32>>
where
    F: Fn(&'a Observation) -> Option<&'a ArrayD<f32>>,
{
    let mut chunks = Vec::with_capacity(observations.len() * agents);
    for (slot, &obs) in observations.iter().enumerate() {
        let field = pick(obs)
            .ok_or_else(|| MarlError::Schema(format!("slot {} is missing a field", slot)))?;
        chunks.extend(split_field(field, agents)?);
    }
    stack(&chunks)
}

/// Flatten `N` slot observations into one batch of `N * agents` rows
pub fn flatten_obs<'a, I>(observations: I, schema: &ObsSchema, agents: usize) -> Result<BatchedObservation>
where
    I: IntoIterator<Item = &'a Observation>,
{
    let observations: Vec<&Observation> = observations.into_iter().collect();
    if observations.is_empty() {
        return Err(MarlError::Schema("no slot observations to flatten".into()));
    }
    for (slot, obs) in observations.iter().enumerate() {
        schema.validate(obs).map_err(|e| match e {
            MarlError::Schema(message) => MarlError::Schema(format!("slot {}: {}", slot, message)),
            other => other,
        })?;
    }

    Ok(match schema {
        ObsSchema::Scalar => BatchedObservation::Array(gather_field(&observations, agents, |o| {
            match o {
                Observation::Array(a) => Some(a),
                _ => None,
            }
        })?),
        ObsSchema::Mapping(keys) => {
            let mut fields = BTreeMap::new();
            for key in keys {
                let stacked = gather_field(&observations, agents, |o| o.field(key))?;
                fields.insert(key.clone(), stacked);
            }
            BatchedObservation::Dict(fields)
        }
        ObsSchema::Sequence(len) => {
            let mut fields = Vec::with_capacity(*len);
            for i in 0..*len {
                fields.push(gather_field(&observations, agents, |o| match o {
                    Observation::Tuple(t) => t.get(i),
                    _ => None,
                })?);
            }
            BatchedObservation::Tuple(fields)
        }
    })
}

fn check_step(slot: usize, step: &MultiAgentStep, agents: usize) -> Result<()> {
    if step.terminated.len() != step.truncated.len() {
        return Err(MarlError::Schema(format!(
            "slot {}: {} terminated flags but {} truncated flags",
            slot,
            step.terminated.len(),
            step.truncated.len()
        )));
    }
    if step.terminated.len() != agents || step.rewards.len() != agents {
        return Err(MarlError::Schema(format!(
            "slot {}: expected {} agents, got {} rewards and {} done flags",
            slot,
            agents,
            step.rewards.len(),
            step.terminated.len()
        )));
    }
    Ok(())
}

/// Concatenate per-slot rewards, slot-major
pub fn flatten_rewards(steps: &[MultiAgentStep], agents: usize) -> Result<Vec<f32>> {
    for (slot, step) in steps.iter().enumerate() {
        check_step(slot, step, agents)?;
    }
    Ok(steps.iter().flat_map(|s| s.rewards.iter().copied()).collect())
}

/// `terminated || truncated` per agent, slot-major
pub fn flatten_dones(steps: &[MultiAgentStep], agents: usize) -> Result<Vec<bool>> {
    for (slot, step) in steps.iter().enumerate() {
        check_step(slot, step, agents)?;
    }
    Ok(steps
        .iter()
        .flat_map(|s| s.truncated.iter().zip(&s.terminated).map(|(&tr, &te)| tr || te))
        .collect())
}

/// Per-agent infos, slot-major
pub fn flatten_infos(steps: &[MultiAgentStep], agents: usize) -> Result<Vec<AgentInfo>> {
    let mut infos = Vec::with_capacity(steps.len() * agents);
    for (slot, step) in steps.iter().enumerate() {
        check_step(slot, step, agents)?;
        let slices = slice_agent_obs(&step.observation, agents)?;
        for (j, terminal_observation) in slices.into_iter().enumerate() {
            infos.push(AgentInfo {
                is_success: if step.terminated[j] { 1.0 } else { 0.0 },
                time_limit_truncated: step.truncated[j],
                terminal_observation,
            });
        }
    }
    Ok(infos)
}

/// Flatten the replies of one step across all slots
pub fn flatten_step(steps: &[MultiAgentStep], schema: &ObsSchema, agents: usize) -> Result<StepBatch> {
    let observations = flatten_obs(steps.iter().map(|s| &s.observation), schema, agents)?;
    Ok(StepBatch {
        observations,
        rewards: flatten_rewards(steps, agents)?,
        dones: flatten_dones(steps, agents)?,
        infos: flatten_infos(steps, agents)?,
    })
}
