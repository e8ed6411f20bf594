use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("marlvec").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("vectorized multi-agent environments"))
        .stdout(predicate::str::contains("worker").not());
}

#[test]
fn test_cli_list() {
    let mut cmd = Command::cargo_bin("marlvec").unwrap();
    cmd.arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("Available environments:"))
        .stdout(predicate::str::contains("reach"))
        .stdout(predicate::str::contains("tuple-echo"));
}

#[test]
fn test_cli_spaces() {
    let mut cmd = Command::cargo_bin("marlvec").unwrap();
    cmd.args(["spaces", "--env", "reach", "--agents", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Dict(achieved_goal: Box[6], desired_goal: Box[6], observation: Box[12])",
        ))
        .stdout(predicate::str::contains("action:      Box[3]"));
}

#[test]
fn test_cli_run_in_process() {
    let mut cmd = Command::cargo_bin("marlvec").unwrap();
    cmd.args([
        "run", "--env", "line", "--num-envs", "2", "--agents", "3", "--steps", "20", "--seed", "1",
        "--in-process",
    ])
    .assert()
    .success()
    .stdout(predicate::str::contains("Finished 20 steps over 6 agents"));
}

#[test]
fn test_cli_run_worker_processes() {
    let mut cmd = Command::cargo_bin("marlvec").unwrap();
    cmd.args([
        "run", "--env", "reach", "--num-envs", "2", "--agents", "2", "--steps", "10",
        "--max-episode-steps", "4",
    ])
    .assert()
    .success()
    .stdout(predicate::str::contains("Finished 10 steps over 4 agents"));
}

#[test]
fn test_cli_run_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"num_envs": 3, "seed": 4, "env": {{"id": "tuple-echo", "num_agents": 1}}}}"#
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("marlvec").unwrap();
    cmd.arg("run")
        .arg("--config")
        .arg(file.path())
        .args(["--steps", "5", "--in-process"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Finished 5 steps over 3 agents"));
}

#[test]
fn test_cli_unknown_env_fails() {
    let mut cmd = Command::cargo_bin("marlvec").unwrap();
    cmd.args(["run", "--env", "nope", "--steps", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown environment `nope`"));
}
