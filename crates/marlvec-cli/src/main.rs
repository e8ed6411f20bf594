//! marlvec CLI
//!
//! Drives vectorized multi-agent pools and hosts their worker processes.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

use marlvec::env::{EnvSpec, RenderMode, Value};
use marlvec::log::{ConsoleLogger, MetricLogger, Metrics};
use marlvec::vector::{Channel, Indices, MultiAgentVecEnv};
use marlvec::config::PoolConfig;

#[derive(Parser)]
#[command(name = "marlvec")]
#[command(version, about = "marlvec - vectorized multi-agent environments", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pool with random actions and report rollout statistics
    Run {
        /// Environment id (see `list`)
        #[arg(long)]
        env: Option<String>,

        /// Number of slots (worker processes)
        #[arg(long)]
        num_envs: Option<usize>,

        /// Agents per slot
        #[arg(long)]
        agents: Option<usize>,

        /// Steps to run
        #[arg(long, default_value = "100")]
        steps: usize,

        /// Pool configuration file (JSON); flags override its values
        #[arg(long)]
        config: Option<PathBuf>,

        /// Base seed, slot i is seeded with seed + i
        #[arg(long)]
        seed: Option<u64>,

        /// Per-agent step budget
        #[arg(long)]
        max_episode_steps: Option<u32>,

        /// Render mode: none, human, rgb_array
        #[arg(long)]
        render_mode: Option<RenderMode>,

        /// Host every slot on a thread of this process
        #[arg(long)]
        in_process: bool,

        /// Steps between metric reports
        #[arg(long, default_value = "25")]
        log_interval: usize,
    },

    /// List available environments
    List,

    /// Print the observation and action spaces of an environment
    Spaces {
        /// Environment id
        #[arg(long, default_value = "reach")]
        env: String,

        /// Agents per slot
        #[arg(long, default_value = "1")]
        agents: usize,
    },

    /// Serve one slot over stdin/stdout (launched by the pool)
    #[command(hide = true)]
    Worker {
        /// Environment spec as JSON
        #[arg(long)]
        spec: String,

        /// Slot index
        #[arg(long)]
        slot: usize,
    },
}

fn main() -> Result<()> {
    // stdout carries worker frames, so logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            env,
            num_envs,
            agents,
            steps,
            config,
            seed,
            max_episode_steps,
            render_mode,
            in_process,
            log_interval,
        } => {
            let mut pool_config = match config {
                Some(path) => PoolConfig::from_json_file(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => PoolConfig::new(EnvSpec::new("reach", 2), 2),
            };
            if let Some(env) = env {
                pool_config.env.id = env;
            }
            if let Some(n) = num_envs {
                pool_config.num_envs = n;
            }
            if let Some(a) = agents {
                pool_config.env.num_agents = a;
            }
            if let Some(s) = seed {
                pool_config.seed = Some(s);
            }
            if let Some(m) = max_episode_steps {
                pool_config.env.max_episode_steps = Some(m);
            }
            if let Some(mode) = render_mode {
                pool_config.env.render_mode = mode;
            }
            pool_config.validate()?;

            let registry = marlvec_envs::registry();
            if !registry.contains(&pool_config.env.id) {
                bail!("unknown environment `{}`, see `marlvec list`", pool_config.env.id);
            }

            let summary = if in_process {
                let mut pool = MultiAgentVecEnv::spawn_in_process(&pool_config, &registry)?;
                rollout(&mut pool, steps, log_interval, pool_config.seed)?
            } else {
                let mut pool = MultiAgentVecEnv::spawn(&pool_config)?;
                rollout(&mut pool, steps, log_interval, pool_config.seed)?
            };
            println!("{}", summary);
        }
        Commands::List => {
            println!("Available environments:");
            for (id, description) in marlvec_envs::registry().entries() {
                println!("  {:<12} {}", id, description);
            }
        }
        Commands::Spaces { env, agents } => {
            let env = marlvec_envs::registry().make(&EnvSpec::new(env, agents), 0)?;
            let observation = env.observation_space();
            println!("observation: {}", observation);
            println!("schema:      {:?}", observation.schema());
            println!("action:      {}", env.action_space());
        }
        Commands::Worker { spec, slot } => {
            let spec: EnvSpec = serde_json::from_str(&spec).context("parsing --spec")?;
            marlvec::vector::serve_stdio(&marlvec_envs::registry(), &spec, slot)?;
        }
    }

    Ok(())
}

/// Totals of a random-action rollout
struct RolloutSummary {
    steps: usize,
    agents: usize,
    mean_reward: f64,
    episodes: usize,
    successes: usize,
    mean_episode_return: f64,
}

impl std::fmt::Display for RolloutSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Finished {} steps over {} agents: mean reward {:.4}, {} episodes, {} successes, mean episode return {:.4}",
            self.steps, self.agents, self.mean_reward, self.episodes, self.successes, self.mean_episode_return
        )
    }
}

fn rollout<C: Channel>(
    pool: &mut MultiAgentVecEnv<C>,
    steps: usize,
    log_interval: usize,
    seed: Option<u64>,
) -> Result<RolloutSummary> {
    let logger = ConsoleLogger::with_prefix("rollout");
    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };
    let agents = pool.num_envs();
    let action_dim = pool.action_space().num_elements();

    pool.reset()?;
    tracing::info!(
        agents,
        slots = pool.num_slots(),
        observation = %pool.observation_space(),
        action = %pool.action_space(),
        "Starting rollout"
    );

    let mut reward_sum = 0.0f64;
    let mut episodes = 0usize;
    let mut successes = 0usize;
    let mut window = Metrics::new();
    let mut window_start = Instant::now();
    let mut window_steps = 0usize;

    for step in 1..=steps {
        let mut actions = Array2::zeros((agents, action_dim));
        for mut row in actions.rows_mut() {
            let sample = pool.action_space().sample(&mut rng);
            for (dst, src) in row.iter_mut().zip(sample.iter()) {
                *dst = *src;
            }
        }
        let batch = pool.step(&actions)?;

        let step_reward: f64 = batch.rewards.iter().map(|&r| r as f64).sum();
        let done = batch.done_indices().len();
        let success = batch.infos.iter().filter(|i| i.is_success > 0.0).count();
        reward_sum += step_reward;
        episodes += done;
        successes += success;

        *window.entry("mean_reward".to_string()).or_default() += step_reward / agents as f64;
        *window.entry("done_fraction".to_string()).or_default() += done as f64 / agents as f64;
        *window.entry("success_fraction".to_string()).or_default() += success as f64 / agents as f64;
        window_steps += 1;

        if log_interval > 0 && (step % log_interval == 0 || step == steps) {
            for value in window.values_mut() {
                *value /= window_steps as f64;
            }
            let elapsed = window_start.elapsed().as_secs_f64().max(f64::EPSILON);
            window.insert("sps".to_string(), (window_steps * agents) as f64 / elapsed);
            logger.log_metrics(&window, step as u64);
            window.clear();
            window_start = Instant::now();
            window_steps = 0;
        }
    }

    let returns = pool.get_attr("episode_returns", Indices::All)?;
    let finished: Vec<f32> = returns
        .iter()
        .filter_map(Value::as_floats)
        .flatten()
        .copied()
        .collect();
    let mean_episode_return = if finished.is_empty() {
        0.0
    } else {
        finished.iter().map(|&r| r as f64).sum::<f64>() / finished.len() as f64
    };

    pool.close()?;
    logger.close();

    Ok(RolloutSummary {
        steps,
        agents,
        mean_reward: if steps == 0 { 0.0 } else { reward_sum / (steps * agents) as f64 },
        episodes,
        successes,
        mean_episode_return,
    })
}
