//! Vectorized multi-agent environment pool.
//!
//! The batch API (`reset`, `step_async`, `step_wait`) is agent-indexed: rows
//! are global agents `slot * agents_per_env + local_agent`. The admin API
//! (`get_attr`, `set_attr`, `env_method`, `env_is_wrapped`) is slot-indexed.

use super::batch::{BatchedObservation, StepBatch};
use super::channel::{Channel, ProcessChannel, ThreadChannel};
use super::flatten::{flatten_obs, flatten_step, scatter_actions};
use super::protocol::{Command, Reply};
use crate::config::PoolConfig;
use crate::env::{EnvInfo, EnvRegistry, Frame, Observation, RenderMode, ResetOptions, Value};
use crate::spaces::{DynSpace, ObsSchema};
use crate::{MarlError, Result};
use ndarray::Array2;
use std::collections::BTreeMap;

/// Slot selection for admin calls
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum Indices {
    /// Every slot, in order
    #[default]
    All,
    One(usize),
    /// Explicit slots, replied in the order given
    Many(Vec<usize>),
}

impl Indices {
    /// Validate against `num_slots` and list the targeted slots
    pub fn resolve(&self, num_slots: usize) -> Result<Vec<usize>> {
        let slots = match self {
            Indices::All => return Ok((0..num_slots).collect()),
            Indices::One(i) => vec![*i],
            Indices::Many(list) => list.clone(),
        };
        match slots.iter().find(|&&i| i >= num_slots) {
            Some(&index) => Err(MarlError::IndexOutOfRange { index, num_slots }),
            None => Ok(slots),
        }
    }
}

impl From<usize> for Indices {
    fn from(i: usize) -> Self {
        Indices::One(i)
    }
}

impl From<Vec<usize>> for Indices {
    fn from(list: Vec<usize>) -> Self {
        Indices::Many(list)
    }
}

impl From<&[usize]> for Indices {
    fn from(list: &[usize]) -> Self {
        Indices::Many(list.to_vec())
    }
}

impl From<Option<usize>> for Indices {
    fn from(i: Option<usize>) -> Self {
        i.map_or(Indices::All, Indices::One)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PoolState {
    Idle,
    AwaitingReplies,
    Closed,
}

/// Turn a reply that is not the expected variant into an error
fn unexpected(slot: usize, wanted: &str, reply: Reply) -> MarlError {
    match reply {
        Reply::Failed(message) => MarlError::Worker { slot, message },
        other => MarlError::Protocol(format!(
            "slot {} answered {} with a {} reply",
            slot,
            wanted,
            other.name()
        )),
    }
}

/// Send one command per targeted slot, then receive one reply from every
/// slot that accepted its command, in the order given.
///
/// Every accepted command is drained even when an earlier slot fails, so no
/// channel is left with a reply in flight. The first error wins.
fn broadcast<C, F>(channels: &mut [C], slots: &[usize], mut command: F) -> Result<Vec<Reply>>
where
    C: Channel,
    F: FnMut(usize) -> Command,
{
    let mut first_err = None;
    let mut sent = Vec::with_capacity(slots.len());
    for &slot in slots {
        let cmd = command(slot);
        tracing::debug!(slot, command = cmd.name(), "Send");
        match channels[slot].send(cmd) {
            Ok(()) => sent.push(slot),
            Err(e) => {
                first_err.get_or_insert(e);
            }
        }
    }

    let mut replies = Vec::with_capacity(sent.len());
    for slot in sent {
        match channels[slot].recv() {
            Ok(reply) => replies.push(reply),
            Err(e) => {
                first_err.get_or_insert(e);
            }
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(replies),
    }
}

/// Pool of `N` slots, each hosting `A` agents.
///
/// # Example
///
/// ```rust,ignore
/// let mut pool = MultiAgentVecEnv::spawn(&config)?;
/// pool.seed(Some(7))?;
/// let obs = pool.reset()?;
/// let batch = pool.step(&Array2::zeros((pool.num_envs(), 3)))?;
/// pool.close()?;
/// ```
pub struct MultiAgentVecEnv<C: Channel = ProcessChannel> {
    channels: Vec<C>,
    agents_per_env: usize,
    observation_space: DynSpace,
    action_space: DynSpace,
    schema: ObsSchema,
    render_mode: RenderMode,
    state: PoolState,
    seeds: Vec<Option<u64>>,
    options: Vec<ResetOptions>,
    reset_infos: Vec<EnvInfo>,
}

impl MultiAgentVecEnv<ProcessChannel> {
    /// Launch one worker process per slot
    pub fn spawn(config: &PoolConfig) -> Result<Self> {
        config.validate()?;
        let mut channels = Vec::with_capacity(config.num_envs);
        for slot in 0..config.num_envs {
            let (program, args) = config.worker_command(slot)?;
            channels.push(ProcessChannel::spawn(slot, &program, &args[..])?);
        }
        tracing::info!(
            slots = config.num_envs,
            agents = config.agents_per_env(),
            env = %config.env.id,
            "Spawned worker processes"
        );
        Self::configured(channels, config)
    }
}

impl MultiAgentVecEnv<ThreadChannel> {
    /// Run every slot on a thread of this process, building environments from `registry`
    pub fn spawn_in_process(config: &PoolConfig, registry: &EnvRegistry) -> Result<Self> {
        config.validate()?;
        let mut channels = Vec::with_capacity(config.num_envs);
        for slot in 0..config.num_envs {
            let registry = registry.clone();
            let spec = config.env.clone();
            channels.push(ThreadChannel::spawn(slot, move || registry.make(&spec, slot))?);
        }
        tracing::info!(
            slots = config.num_envs,
            agents = config.agents_per_env(),
            env = %config.env.id,
            "Spawned worker threads"
        );
        Self::configured(channels, config)
    }
}

impl<C: Channel> MultiAgentVecEnv<C> {
    fn configured(channels: Vec<C>, config: &PoolConfig) -> Result<Self> {
        let mut pool = Self::from_channels(channels, config.agents_per_env(), config.env.render_mode)?;
        if let Some(seed) = config.seed {
            pool.seed(Some(seed))?;
        }
        Ok(pool)
    }

    /// Build a pool over already-started workers.
    ///
    /// Spaces are queried from slot 0 and the observation schema is resolved
    /// here, once.
    pub fn from_channels(mut channels: Vec<C>, agents_per_env: usize, render_mode: RenderMode) -> Result<Self> {
        if channels.is_empty() {
            return Err(MarlError::Config("a pool needs at least one slot".into()));
        }
        if agents_per_env == 0 {
            return Err(MarlError::Config("agents_per_env must be at least 1".into()));
        }

        let (observation_space, action_space) = match broadcast(&mut channels, &[0], |_| Command::GetSpaces)?
            .pop()
        {
            Some(Reply::Spaces { observation, action }) => (observation, action),
            Some(other) => return Err(unexpected(0, "get_spaces", other)),
            None => return Err(MarlError::Protocol("slot 0 sent no spaces".into())),
        };
        let schema = ObsSchema::from_space(&observation_space);
        tracing::debug!(?schema, agents_per_env, "Resolved observation schema");

        let n = channels.len();
        Ok(Self {
            channels,
            agents_per_env,
            observation_space,
            action_space,
            schema,
            render_mode,
            state: PoolState::Idle,
            seeds: vec![None; n],
            options: vec![ResetOptions::new(); n],
            reset_infos: vec![EnvInfo::new(); n],
        })
    }

    /// Total agents, `num_slots * agents_per_env`
    pub fn num_envs(&self) -> usize {
        self.channels.len() * self.agents_per_env
    }

    pub fn num_slots(&self) -> usize {
        self.channels.len()
    }

    pub fn agents_per_env(&self) -> usize {
        self.agents_per_env
    }

    /// Observation space of one slot
    pub fn observation_space(&self) -> &DynSpace {
        &self.observation_space
    }

    /// Action space of one agent
    pub fn action_space(&self) -> &DynSpace {
        &self.action_space
    }

    pub fn schema(&self) -> &ObsSchema {
        &self.schema
    }

    pub fn render_mode(&self) -> RenderMode {
        self.render_mode
    }

    pub fn is_closed(&self) -> bool {
        self.state == PoolState::Closed
    }

    /// Whether a `step_async` is waiting for its `step_wait`
    pub fn is_waiting(&self) -> bool {
        self.state == PoolState::AwaitingReplies
    }

    fn ensure_idle(&self, op: &str) -> Result<()> {
        match self.state {
            PoolState::Idle => Ok(()),
            PoolState::Closed => Err(MarlError::Closed),
            PoolState::AwaitingReplies => Err(MarlError::Protocol(format!(
                "{} called while a step is in flight; call step_wait first",
                op
            ))),
        }
    }

    /// Seed the next reset: slot `i` receives `seed + i`.
    ///
    /// With `None` a random base seed is drawn. Returns the per-slot seeds.
    pub fn seed(&mut self, seed: Option<u64>) -> Result<Vec<Option<u64>>> {
        self.ensure_idle("seed")?;
        let base = seed.unwrap_or_else(|| u64::from(rand::random::<u32>()));
        self.seeds = (0..self.num_slots())
            .map(|slot| Some(base.wrapping_add(slot as u64)))
            .collect();
        Ok(self.seeds.clone())
    }

    /// Options passed to the targeted slots on the next reset
    pub fn set_options(&mut self, options: ResetOptions, indices: impl Into<Indices>) -> Result<()> {
        self.ensure_idle("set_options")?;
        for slot in indices.into().resolve(self.num_slots())? {
            self.options[slot] = options.clone();
        }
        Ok(())
    }

    /// Per-slot infos returned by the last reset
    pub fn reset_infos(&self) -> &[EnvInfo] {
        &self.reset_infos
    }

    /// Reset every slot and return the first batched observation.
    ///
    /// Pending seeds and options are consumed by this call.
    pub fn reset(&mut self) -> Result<BatchedObservation> {
        self.ensure_idle("reset")?;
        let slots: Vec<usize> = (0..self.num_slots()).collect();
        let seeds = &self.seeds;
        let options = &self.options;
        let replies = broadcast(&mut self.channels, &slots, |slot| Command::Reset {
            seed: seeds[slot],
            options: options[slot].clone(),
        })?;

        let mut observations: Vec<Observation> = Vec::with_capacity(replies.len());
        let mut infos = Vec::with_capacity(replies.len());
        for (slot, reply) in replies.into_iter().enumerate() {
            match reply {
                Reply::Reset(obs, info) => {
                    observations.push(obs);
                    infos.push(info);
                }
                other => return Err(unexpected(slot, "reset", other)),
            }
        }
        let batch = flatten_obs(&observations, &self.schema, self.agents_per_env)?;

        self.reset_infos = infos;
        self.seeds.iter_mut().for_each(|s| *s = None);
        self.options.iter_mut().for_each(ResetOptions::clear);
        tracing::debug!(slots = self.num_slots(), "Reset complete");
        Ok(batch)
    }

    /// Scatter `[num_envs, action_dim]` actions to the slots without waiting
    pub fn step_async(&mut self, actions: &Array2<f32>) -> Result<()> {
        self.ensure_idle("step_async")?;
        let action_dim = self.action_space.num_elements();
        if actions.ncols() != action_dim {
            return Err(MarlError::ShapeMismatch {
                expected: vec![self.num_envs(), action_dim],
                actual: actions.shape().to_vec(),
            });
        }
        let groups = scatter_actions(actions, self.num_slots(), self.agents_per_env)?;

        for (slot, group) in groups.into_iter().enumerate() {
            if let Err(e) = self.channels[slot].send(Command::Step(group)) {
                // take back the replies already in flight
                for channel in &mut self.channels[..slot] {
                    if let Err(drain) = channel.recv() {
                        tracing::debug!(slot = channel.slot(), error = %drain, "Dropped step reply during rollback");
                    }
                }
                return Err(e);
            }
        }
        self.state = PoolState::AwaitingReplies;
        Ok(())
    }

    /// Collect one reply per slot, in slot order, and flatten them
    pub fn step_wait(&mut self) -> Result<StepBatch> {
        match self.state {
            PoolState::AwaitingReplies => {}
            PoolState::Closed => return Err(MarlError::Closed),
            PoolState::Idle => {
                return Err(MarlError::Protocol(
                    "step_wait called without a pending step_async".into(),
                ))
            }
        }

        let mut first_err = None;
        let mut steps = Vec::with_capacity(self.num_slots());
        for channel in &mut self.channels {
            let slot = channel.slot();
            match channel.recv() {
                Ok(Reply::Step(step)) => steps.push(step),
                Ok(other) => {
                    first_err.get_or_insert(unexpected(slot, "step", other));
                }
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }
        self.state = PoolState::Idle;
        if let Some(e) = first_err {
            return Err(e);
        }
        flatten_step(&steps, &self.schema, self.agents_per_env)
    }

    /// `step_async` followed by `step_wait`
    pub fn step(&mut self, actions: &Array2<f32>) -> Result<StepBatch> {
        self.step_async(actions)?;
        self.step_wait()
    }

    /// Read an attribute from the targeted slots
    pub fn get_attr(&mut self, name: &str, indices: impl Into<Indices>) -> Result<Vec<Value>> {
        self.ensure_idle("get_attr")?;
        let slots = indices.into().resolve(self.num_slots())?;
        let replies = broadcast(&mut self.channels, &slots, |_| Command::GetAttr(name.to_string()))?;
        collect_values(&slots, replies, "get_attr")
    }

    /// Write an attribute on the targeted slots
    pub fn set_attr(&mut self, name: &str, value: Value, indices: impl Into<Indices>) -> Result<()> {
        self.ensure_idle("set_attr")?;
        let slots = indices.into().resolve(self.num_slots())?;
        let replies = broadcast(&mut self.channels, &slots, |_| {
            Command::SetAttr(name.to_string(), value.clone())
        })?;
        collect_values(&slots, replies, "set_attr").map(|_| ())
    }

    /// Invoke a named method on the targeted slots
    pub fn env_method(
        &mut self,
        name: &str,
        args: &[Value],
        kwargs: &BTreeMap<String, Value>,
        indices: impl Into<Indices>,
    ) -> Result<Vec<Value>> {
        self.ensure_idle("env_method")?;
        let slots = indices.into().resolve(self.num_slots())?;
        let replies = broadcast(&mut self.channels, &slots, |_| Command::EnvMethod {
            name: name.to_string(),
            args: args.to_vec(),
            kwargs: kwargs.clone(),
        })?;
        collect_values(&slots, replies, "env_method")
    }

    /// Whether each targeted slot's environment is wrapped by `marker`
    pub fn env_is_wrapped(&mut self, marker: &str, indices: impl Into<Indices>) -> Result<Vec<bool>> {
        self.ensure_idle("env_is_wrapped")?;
        let slots = indices.into().resolve(self.num_slots())?;
        let replies = broadcast(&mut self.channels, &slots, |_| Command::IsWrapped(marker.to_string()))?;
        slots
            .iter()
            .zip(replies)
            .map(|(&slot, reply)| match reply {
                Reply::Wrapped(wrapped) => Ok(wrapped),
                other => Err(unexpected(slot, "is_wrapped", other)),
            })
            .collect()
    }

    /// One rendered frame per slot.
    ///
    /// Outside `rgb_array` mode nothing is rendered and every entry is `None`.
    pub fn get_images(&mut self) -> Result<Vec<Option<Frame>>> {
        self.ensure_idle("get_images")?;
        if self.render_mode != RenderMode::RgbArray {
            tracing::warn!(
                render_mode = %self.render_mode,
                "get_images needs render_mode rgb_array, returning no frames"
            );
            return Ok(vec![None; self.num_slots()]);
        }
        let slots: Vec<usize> = (0..self.num_slots()).collect();
        let replies = broadcast(&mut self.channels, &slots, |_| Command::Render)?;
        slots
            .iter()
            .zip(replies)
            .map(|(&slot, reply)| match reply {
                Reply::Render(frame) => Ok(frame),
                other => Err(unexpected(slot, "render", other)),
            })
            .collect()
    }

    /// Shut every worker down.
    ///
    /// Idempotent. An outstanding step is drained first. Every slot is asked
    /// to close and joined even if an earlier slot failed; the first error is
    /// returned.
    pub fn close(&mut self) -> Result<()> {
        if self.state == PoolState::Closed {
            return Ok(());
        }
        let mut first_err = None;

        if self.state == PoolState::AwaitingReplies {
            tracing::debug!("Draining outstanding step before close");
            for channel in &mut self.channels {
                if let Err(e) = channel.recv() {
                    first_err.get_or_insert(e);
                }
            }
        }
        for channel in &mut self.channels {
            if let Err(e) = channel.send(Command::Close) {
                first_err.get_or_insert(e);
            }
        }
        for channel in &mut self.channels {
            if let Err(e) = channel.join() {
                first_err.get_or_insert(e);
            }
        }
        self.state = PoolState::Closed;
        tracing::info!(slots = self.num_slots(), "Closed pool");

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Kill every worker without draining or joining cleanly.
    ///
    /// Recovery path for a pool whose workers stopped answering.
    pub fn terminate(&mut self) {
        if self.state == PoolState::Closed {
            return;
        }
        for channel in &mut self.channels {
            channel.kill();
        }
        self.state = PoolState::Closed;
        tracing::warn!(slots = self.num_slots(), "Terminated pool");
    }
}

fn collect_values(slots: &[usize], replies: Vec<Reply>, wanted: &str) -> Result<Vec<Value>> {
    slots
        .iter()
        .zip(replies)
        .map(|(&slot, reply)| match reply {
            Reply::Value(value) => Ok(value),
            other => Err(unexpected(slot, wanted, other)),
        })
        .collect()
}

impl<C: Channel> Drop for MultiAgentVecEnv<C> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "Failed to close pool on drop");
        }
    }
}
