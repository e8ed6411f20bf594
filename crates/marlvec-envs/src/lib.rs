//! Built-in multi-agent environments for marlvec.
//!
//! - `ReachSwarm` - goal-conditioned 3-D reaching, dict observation
//! - `LineWalkers` - 1-D walkers, array observation
//! - `TupleEcho` - point masses, tuple observation
//!
//! `registry()` exposes them by id so worker processes can build them from an
//! `EnvSpec`.

mod line;
mod reach;
mod tuple_echo;

pub use line::LineWalkers;
pub use reach::ReachSwarm;
pub use tuple_echo::TupleEcho;

use marlvec::env::{EnvRegistry, EnvSpec, EpisodeStats, MultiAgentEnv, TimeLimit};

/// Step budget used when the spec does not set one
pub const DEFAULT_MAX_EPISODE_STEPS: u32 = 50;

/// Derive a per-slot seed so slots sample different worlds by default
fn slot_seed(spec: &EnvSpec, slot: usize) -> u64 {
    spec.param("seed", 0.0).max(0.0) as u64 + slot as u64
}

fn finish<E: MultiAgentEnv + 'static>(env: E, spec: &EnvSpec) -> Box<dyn MultiAgentEnv> {
    let max_steps = spec.max_episode_steps.unwrap_or(DEFAULT_MAX_EPISODE_STEPS);
    Box::new(EpisodeStats::new(TimeLimit::new(env, max_steps)))
}

/// Registry with every built-in environment, each wrapped in
/// `TimeLimit` and `EpisodeStats`
pub fn registry() -> EnvRegistry {
    let mut registry = EnvRegistry::new();
    registry.register(
        "reach",
        "3-D goal reaching, dict observation {achieved_goal, desired_goal, observation}",
        |spec, slot| {
            let env = ReachSwarm::new(spec.num_agents)
                .with_seed(slot_seed(spec, slot))
                .with_distance_threshold(spec.param("distance_threshold", 0.05) as f32)
                .with_goal_range(spec.param("goal_range", 0.3) as f32)
                .with_speed(spec.param("speed", 0.05) as f32)
                .with_render_mode(spec.render_mode);
            Ok(finish(env, spec))
        },
    );
    registry.register("line", "1-D walkers, box observation", |spec, slot| {
        let env = LineWalkers::new(spec.num_agents)
            .with_seed(slot_seed(spec, slot))
            .with_length(spec.param("length", 5.0) as f32);
        Ok(finish(env, spec))
    });
    registry.register("tuple-echo", "2-D point masses, tuple observation", |spec, slot| {
        let env = TupleEcho::new(spec.num_agents).with_seed(slot_seed(spec, slot));
        Ok(finish(env, spec))
    });
    registry
}
