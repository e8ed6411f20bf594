//! Name-indexed environment constructors.
//!
//! Workers cannot receive a closure from the dispatcher, so every process
//! that may host a slot carries the same registry and builds its environment
//! from an `EnvSpec` by looking up `spec.id`.

use super::{MultiAgentEnv, RenderMode};
use crate::{MarlError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Serializable description of the environment each slot hosts
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnvSpec {
    /// Registry id
    pub id: String,
    /// Agents per slot
    pub num_agents: usize,
    /// Per-agent step budget
    #[serde(default)]
    pub max_episode_steps: Option<u32>,
    #[serde(default)]
    pub render_mode: RenderMode,
    /// Environment-specific numeric parameters
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
}

impl EnvSpec {
    pub fn new(id: impl Into<String>, num_agents: usize) -> Self {
        Self {
            id: id.into(),
            num_agents,
            max_episode_steps: None,
            render_mode: RenderMode::None,
            params: BTreeMap::new(),
        }
    }

    pub fn with_max_episode_steps(mut self, steps: u32) -> Self {
        self.max_episode_steps = Some(steps);
        self
    }

    pub fn with_render_mode(mut self, mode: RenderMode) -> Self {
        self.render_mode = mode;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: f64) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Numeric parameter with a fallback
    pub fn param(&self, key: &str, default: f64) -> f64 {
        self.params.get(key).copied().unwrap_or(default)
    }
}

/// Builds the environment for one slot
pub type EnvFactory = Arc<dyn Fn(&EnvSpec, usize) -> Result<Box<dyn MultiAgentEnv>> + Send + Sync>;

/// Table of environment constructors by id
#[derive(Clone, Default)]
pub struct EnvRegistry {
    entries: BTreeMap<String, (String, EnvFactory)>,
}

impl EnvRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor under `id`, replacing any previous entry
    pub fn register<F>(&mut self, id: impl Into<String>, description: impl Into<String>, factory: F)
    where
        F: Fn(&EnvSpec, usize) -> Result<Box<dyn MultiAgentEnv>> + Send + Sync + 'static,
    {
        self.entries
            .insert(id.into(), (description.into(), Arc::new(factory)));
    }

    /// Constructor for `id`
    pub fn factory(&self, id: &str) -> Result<EnvFactory> {
        self.entries
            .get(id)
            .map(|(_, f)| Arc::clone(f))
            .ok_or_else(|| MarlError::EnvError(format!("no environment registered as `{}`", id)))
    }

    /// Build the environment for `slot`
    pub fn make(&self, spec: &EnvSpec, slot: usize) -> Result<Box<dyn MultiAgentEnv>> {
        let env = (self.factory(&spec.id)?)(spec, slot)?;
        if env.num_agents() != spec.num_agents {
            return Err(MarlError::EnvError(format!(
                "`{}` built {} agents, spec asked for {}",
                spec.id,
                env.num_agents(),
                spec.num_agents
            )));
        }
        Ok(env)
    }

    /// Registered ids with their descriptions, sorted by id
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(id, (desc, _))| (id.as_str(), desc.as_str()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }
}

impl std::fmt::Debug for EnvRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.entries.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_json_defaults() {
        let spec: EnvSpec = serde_json::from_str(r#"{"id": "reach", "num_agents": 3}"#).unwrap();
        assert_eq!(spec, EnvSpec::new("reach", 3));
        assert_eq!(spec.param("distance_threshold", 0.05), 0.05);

        let spec: EnvSpec = serde_json::from_str(
            r#"{"id": "reach", "num_agents": 2, "render_mode": "rgb_array", "params": {"speed": 2.0}}"#,
        )
        .unwrap();
        assert_eq!(spec.render_mode, RenderMode::RgbArray);
        assert_eq!(spec.param("speed", 1.0), 2.0);
    }

    #[test]
    fn test_unknown_id_is_env_error() {
        let registry = EnvRegistry::new();
        let err = registry.make(&EnvSpec::new("missing", 1), 0).err().unwrap();
        assert!(matches!(err, MarlError::EnvError(_)));
    }
}
