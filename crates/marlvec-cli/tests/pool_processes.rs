//! Pools backed by real worker processes of the `marlvec` binary.

use marlvec::env::{EnvSpec, RenderMode, Value};
use marlvec::vector::{BatchedObservation, Indices, MultiAgentVecEnv};
use marlvec::config::PoolConfig;
use ndarray::Array2;

fn config(id: &str, num_envs: usize, agents: usize) -> PoolConfig {
    PoolConfig::new(EnvSpec::new(id, agents), num_envs)
        .with_worker_program(env!("CARGO_BIN_EXE_marlvec"), ["worker"])
}

#[test]
fn test_process_pool_reset_and_step() {
    let mut pool = MultiAgentVecEnv::spawn(&config("reach", 2, 3).with_seed(7)).unwrap();
    assert_eq!(pool.num_slots(), 2);
    assert_eq!(pool.num_envs(), 6);

    let obs = pool.reset().unwrap();
    match &obs {
        BatchedObservation::Dict(fields) => {
            assert_eq!(fields["observation"].shape(), &[6, 6]);
            assert_eq!(fields["desired_goal"].shape(), &[6, 3]);
        }
        other => panic!("unexpected batch {:?}", other),
    }

    let actions = Array2::zeros((6, 3));
    let batch = pool.step(&actions).unwrap();
    assert_eq!(batch.len(), 6);
    assert_eq!(batch.infos.len(), 6);
    assert!(batch.rewards.iter().all(|&r| r == 0.0 || r == -1.0));

    pool.close().unwrap();
    pool.close().unwrap();
    assert!(pool.is_closed());
}

#[test]
fn test_process_pool_targets_one_slot() {
    let mut pool = MultiAgentVecEnv::spawn(&config("line", 3, 1)).unwrap();

    let lengths = pool.get_attr("length", Indices::One(2)).unwrap();
    assert_eq!(lengths, vec![Value::Float(5.0)]);

    let wrapped = pool.env_is_wrapped("TimeLimit", Indices::All).unwrap();
    assert_eq!(wrapped, vec![true, true, true]);

    // Env errors come back as replies; the pool stays usable.
    assert!(pool.get_attr("missing", Indices::All).is_err());
    pool.reset().unwrap();
    pool.close().unwrap();
}

#[test]
fn test_process_pool_images() {
    let mut pool = MultiAgentVecEnv::spawn(
        &config("reach", 2, 1).with_render_mode(RenderMode::RgbArray),
    )
    .unwrap();
    pool.reset().unwrap();
    let images = pool.get_images().unwrap();
    assert_eq!(images.len(), 2);
    assert!(images.iter().all(Option::is_some));
    pool.close().unwrap();
}
