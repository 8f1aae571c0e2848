mod support;

use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;
use serde_json::Value;
use support::{entry, TestDir};
use taskreg::persist::TaskPersister;
use taskreg::stack::{StackKind, StackPosition};
use taskreg::task::TaskId;

fn taskreg(dir: &TestDir) -> Command {
    let mut cmd = Command::cargo_bin("taskreg").expect("binary");
    cmd.current_dir(dir.path())
        .env_remove("TASKREG_DIR")
        .env_remove("TASKREG_CONFIG")
        .env_remove("TASKREG_STATE_DIR")
        .env_remove("RUST_LOG");
    cmd
}

fn json_stdout(cmd: &mut Command) -> Value {
    let output = cmd.output().expect("run taskreg");
    serde_json::from_slice(&output.stdout).expect("json envelope")
}

/// Saves tasks 1 <- 2 <- 3 as one affiliation chain.
fn write_chain_snapshot(dir: &TestDir) -> [TaskId; 3] {
    let mut registry = dir.registry();
    let stack = registry.create_stack(StackKind::Fullscreen, None).expect("stack");
    let mut ids = Vec::new();
    for (id, class) in [(1, "Mail"), (2, "Compose"), (3, "Attachment")] {
        ids.push(
            registry
                .create_task(entry(id, class), Some(stack), StackPosition::Top)
                .expect("create"),
        );
    }
    registry
        .set_task_to_affiliate_with(ids[1], ids[0])
        .expect("affiliate");
    registry
        .set_task_to_affiliate_with(ids[2], ids[1])
        .expect("affiliate");
    registry.save_snapshot().expect("save");
    [ids[0], ids[1], ids[2]]
}

#[test]
fn init_writes_config_and_state_dir() {
    let dir = TestDir::new();
    taskreg(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(contains("taskreg init"));

    assert!(dir.path().join(".taskreg.toml").exists());
    assert!(dir.state_dir().is_dir());

    let again = json_stdout(taskreg(&dir).args(["--json", "init"]));
    assert_eq!(again["status"], "success");
    assert_eq!(again["data"]["created"]["config"], false);
    assert_eq!(again["data"]["created"]["state_dir"], false);
}

#[test]
fn show_lists_snapshot_tasks() {
    let dir = TestDir::new();
    write_chain_snapshot(&dir);

    let envelope = json_stdout(taskreg(&dir).args(["--json", "show"]));
    assert_eq!(envelope["schema_version"], "taskreg.v1");
    assert_eq!(envelope["command"], "show");
    let tasks = envelope["data"]["tasks"].as_array().expect("tasks");
    assert_eq!(tasks.len(), 3);
    assert_eq!(tasks[0]["id"], 1);
    assert_eq!(tasks[0]["real_activity"], "com.example/.Mail");
    assert_eq!(envelope["data"]["repairs"], 0);

    taskreg(&dir)
        .args(["show", "2"])
        .assert()
        .success()
        .stdout(contains("com.example/.Compose"))
        .stdout(contains("#1 -> #2 -> #3"));
}

#[test]
fn show_unknown_task_is_a_user_error() {
    let dir = TestDir::new();
    let output = taskreg(&dir)
        .args(["--json", "show", "99"])
        .output()
        .expect("run taskreg");
    assert_eq!(output.status.code(), Some(2));

    let envelope: Value = serde_json::from_slice(&output.stdout).expect("json envelope");
    assert_eq!(envelope["status"], "error");
    assert_eq!(envelope["command"], "show");
    assert_eq!(envelope["error"]["kind"], "user_error");
    assert_eq!(envelope["next_steps"][0], "taskreg show");
}

#[test]
fn chain_walks_from_the_head() {
    let dir = TestDir::new();
    let [first, _, third] = write_chain_snapshot(&dir);

    let envelope = json_stdout(taskreg(&dir).args(["--json", "chain", "3"]));
    let data = &envelope["data"];
    assert_eq!(data["task"], third.get());
    assert_eq!(data["head"], first.get());
    assert_eq!(data["affiliated_task"], first.get());
    let chain: Vec<u64> = data["chain"]
        .as_array()
        .expect("chain")
        .iter()
        .filter_map(|summary| summary["id"].as_u64())
        .collect();
    assert_eq!(chain, vec![1, 2, 3]);
}

#[test]
fn check_write_repairs_broken_snapshot() {
    let dir = TestDir::new();
    let registry = {
        write_chain_snapshot(&dir);
        let mut registry = dir.registry();
        registry.load_snapshot().expect("load");
        registry
    };
    let mut snapshot = registry.snapshot();
    snapshot.tasks.retain(|task| task.id() != TaskId::new(2));
    dir.persister().write_snapshot(&snapshot).expect("write");

    let events = dir.path().join("events.jsonl");
    let first = json_stdout(taskreg(&dir).args([
        "--json",
        "--events",
        events.to_str().expect("utf8 path"),
        "check",
        "--write",
    ]));
    assert_eq!(first["data"]["tasks"], 2);
    assert_eq!(first["data"]["repairs"].as_array().map(Vec::len), Some(2));
    assert_eq!(first["data"]["repairs"][0]["kind"], "missing_task");
    assert_eq!(first["data"]["written"], true);

    let logged = std::fs::read_to_string(&events).expect("events file");
    assert_eq!(
        logged
            .lines()
            .filter(|line| line.contains("\"chain_repaired\""))
            .count(),
        2
    );

    let second = json_stdout(taskreg(&dir).args(["--json", "check"]));
    assert_eq!(second["data"]["repairs"].as_array().map(Vec::len), Some(0));
    assert_eq!(second["data"]["written"], false);
}

#[test]
fn check_without_snapshot_warns() {
    let dir = TestDir::new();
    taskreg(&dir)
        .arg("check")
        .assert()
        .success()
        .stdout(contains("no snapshot found"));
}

#[test]
fn resolve_grows_bounds_to_minimum() {
    let dir = TestDir::new();
    let envelope = json_stdout(taskreg(&dir).args([
        "--json",
        "resolve",
        "--bounds",
        "0,0,100,100",
    ]));
    let data = &envelope["data"];
    assert_eq!(data["bounds"]["right"], 578);
    assert_eq!(data["bounds"]["bottom"], 578);
    assert_eq!(data["width_adjusted"], true);
    assert_eq!(data["height_adjusted"], true);
    assert_eq!(data["configuration"]["screen_width_dp"], 220);
}

#[test]
fn resolve_fullscreen_stack_ignores_bounds() {
    let dir = TestDir::new();
    taskreg(&dir)
        .args(["resolve", "--bounds", "0,0,100,100", "--stack", "fullscreen"])
        .assert()
        .success()
        .stdout(contains("bounds: fullscreen"))
        .stdout(contains("fullscreen stacks ignore task bounds"));
}

#[test]
fn resolve_rejects_empty_bounds() {
    let dir = TestDir::new();
    taskreg(&dir)
        .args(["resolve", "--bounds", "10,10,10,40"])
        .assert()
        .code(2)
        .stderr(contains("enclose no area"));
}

#[test]
fn resolve_rejects_edges_beyond_coordinate_limit() {
    let dir = TestDir::new();
    taskreg(&dir)
        .args(["resolve", "--bounds=-2147483648,0,2147483647,10"])
        .assert()
        .code(2)
        .stderr(contains("outside"));
}

#[test]
fn resolve_rejects_out_of_range_minimum() {
    let dir = TestDir::new();
    taskreg(&dir)
        .args(["resolve", "--bounds", "0,0,100,100", "--min-width", "2147483647"])
        .assert()
        .code(2)
        .stderr(contains("--min-width"));

    taskreg(&dir)
        .args(["resolve", "--bounds", "0,0,100,100", "--min-height=-1"])
        .assert()
        .code(2)
        .stderr(contains("--min-height"));
}

#[test]
fn explicit_invalid_config_fails_with_hint() {
    let dir = TestDir::new();
    let config = dir.write_config("[display]\ndensity_dpi = 0\n");

    taskreg(&dir)
        .arg("--config")
        .arg(&config)
        .arg("show")
        .assert()
        .code(2)
        .stderr(contains("density_dpi"))
        .stderr(contains("hint: fix .taskreg.toml then retry"))
        .stdout(predicate::str::is_empty());
}
