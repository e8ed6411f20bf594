//! Pool configuration.

use crate::env::{EnvSpec, RenderMode};
use crate::{MarlError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_worker_args() -> Vec<String> {
    vec!["worker".to_string()]
}

/// Configuration for a `MultiAgentVecEnv`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of slots (worker processes)
    pub num_envs: usize,
    /// Environment hosted by every slot
    pub env: EnvSpec,
    /// Base seed; slot `i` is reset with `seed + i`
    #[serde(default)]
    pub seed: Option<u64>,
    /// Executable launched for each slot (defaults to the current executable)
    #[serde(default)]
    pub worker_program: Option<PathBuf>,
    /// Leading arguments passed to the worker program
    #[serde(default = "default_worker_args")]
    pub worker_args: Vec<String>,
}

impl PoolConfig {
    pub fn new(env: EnvSpec, num_envs: usize) -> Self {
        Self {
            num_envs,
            env,
            seed: None,
            worker_program: None,
            worker_args: default_worker_args(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_render_mode(mut self, mode: RenderMode) -> Self {
        self.env.render_mode = mode;
        self
    }

    pub fn with_worker_program<I, S>(mut self, program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.worker_program = Some(program.into());
        self.worker_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Agents hosted by each slot
    pub fn agents_per_env(&self) -> usize {
        self.env.num_agents
    }

    /// Load from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_envs == 0 {
            return Err(MarlError::Config("num_envs must be at least 1".into()));
        }
        if self.env.num_agents == 0 {
            return Err(MarlError::Config("env.num_agents must be at least 1".into()));
        }
        if self.env.id.is_empty() {
            return Err(MarlError::Config("env.id is empty".into()));
        }
        if self.env.max_episode_steps == Some(0) {
            return Err(MarlError::Config("env.max_episode_steps must be positive".into()));
        }
        Ok(())
    }

    /// Program and full argument list for the worker of `slot`
    pub fn worker_command(&self, slot: usize) -> Result<(PathBuf, Vec<String>)> {
        let program = match &self.worker_program {
            Some(program) => program.clone(),
            None => std::env::current_exe()?,
        };
        let mut args = self.worker_args.clone();
        args.push("--spec".to_string());
        args.push(serde_json::to_string(&self.env)?);
        args.push("--slot".to_string());
        args.push(slot.to_string());
        Ok((program, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_json_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"num_envs": 3, "seed": 11, "env": {{"id": "line", "num_agents": 2, "max_episode_steps": 50}}}}"#
        )
        .unwrap();

        let config = PoolConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.num_envs, 3);
        assert_eq!(config.agents_per_env(), 2);
        assert_eq!(config.seed, Some(11));
        assert_eq!(config.env.max_episode_steps, Some(50));
        assert_eq!(config.worker_args, vec!["worker"]);
        assert!(config.worker_program.is_none());
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"num_envs": 0, "env": {{"id": "line", "num_agents": 2}}}}"#).unwrap();
        assert!(matches!(
            PoolConfig::from_json_file(file.path()),
            Err(MarlError::Config(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(PoolConfig::from_json_file(file.path()), Err(MarlError::Json(_))));
    }

    #[test]
    fn test_worker_command_carries_spec_and_slot() {
        let config = PoolConfig::new(EnvSpec::new("reach", 2), 4)
            .with_render_mode(RenderMode::RgbArray)
            .with_worker_program("/opt/bin/marlvec", ["worker", "--quiet"]);
        let (program, args) = config.worker_command(3).unwrap();
        assert_eq!(program, PathBuf::from("/opt/bin/marlvec"));
        assert_eq!(&args[..3], &["worker", "--quiet", "--spec"]);
        let spec: EnvSpec = serde_json::from_str(&args[3]).unwrap();
        assert_eq!(spec, config.env);
        assert_eq!(&args[4..], &["--slot", "3"]);
    }
}
