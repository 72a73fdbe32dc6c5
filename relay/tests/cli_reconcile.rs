//! Tests for the `relay` binary.

use std::process::{Command, Output};

use serde_json::{Value, json};

use relay::core::items::{function_call, function_call_output, reasoning, user_message};
use relay::exit_codes;
use relay::test_support::TestProject;

fn relay(args: &[&str], cwd: &std::path::Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_relay"))
        .args(args)
        .current_dir(cwd)
        .env_remove("AGENT_APPROVAL_REQUIRED")
        .env_remove("APPROVAL_MODE")
        .env_remove("APPROVALS_DIR")
        .env_remove("PROJECT_TYPE")
        .env_remove("PROJECT_ID")
        .env_remove("OPENAI_REASONING_ENCRYPTED")
        .env_remove("RUST_LOG")
        .output()
        .expect("run relay")
}

#[test]
fn reconcile_prints_cleaned_items_and_stats() {
    let project = TestProject::new().expect("project");
    let items = json!([
        user_message("hi"),
        reasoning("r1"),
        function_call("c1", "shell", "{}"),
        function_call_output("c1", "ok"),
        function_call_output("c1", "again"),
        function_call("c2", "shell", "{}"),
    ]);
    project
        .write("items.json", &items.to_string())
        .expect("write items");

    let output = relay(&["reconcile", "items.json"], project.root());
    assert_eq!(output.status.code(), Some(exit_codes::OK));

    let cleaned: Vec<Value> = serde_json::from_slice(&output.stdout).expect("stdout json");
    let types: Vec<&str> = cleaned
        .iter()
        .map(|item| item["type"].as_str().unwrap_or_default())
        .collect();
    assert_eq!(
        types,
        vec!["message", "reasoning", "function_call", "function_call_output"]
    );

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stats_line = stderr
        .lines()
        .rev()
        .find(|line| line.starts_with('{'))
        .expect("stats line");
    let stats: Value = serde_json::from_str(stats_line).expect("stats json");
    assert_eq!(stats["dropped"], 2);
    assert_eq!(stats["stats"]["triples"], 1);
    assert_eq!(stats["stats"]["stray_outputs"], 1);
    assert_eq!(stats["stats"]["dropped_calls"], 1);
}

#[test]
fn reconcile_rejects_non_array_input() {
    let project = TestProject::new().expect("project");
    project.write("items.json", "{\"type\":\"message\"}").expect("write");

    let output = relay(&["reconcile", "items.json"], project.root());
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("parse"));
}

#[test]
fn init_twice_without_force_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = relay(&["init"], dir.path());
    assert_eq!(first.status.code(), Some(exit_codes::OK));
    assert!(dir.path().join(".relay/config.toml").is_file());

    let second = relay(&["init"], dir.path());
    assert_eq!(second.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&second.stderr).contains("already exists"));

    let forced = relay(&["init", "--force"], dir.path());
    assert_eq!(forced.status.code(), Some(exit_codes::OK));
}

#[cfg(unix)]
mod run {
    use super::*;
    use std::fs;

    use relay::io::config::RelayConfig;

    /// Fake runtime: answers each role with its deliverables as one JSONL
    /// assistant message, plus a usage line.
    const AGENT_SCRIPT: &str = r#"cat > /dev/null
emit() {
  printf '{"type":"message","role":"assistant","content":"%s"}\n' "$1"
  printf '{"type":"usage","total_tokens":10}\n'
}
case "$RELAY_AGENT_ID" in
  pm)
    printf '{"type":"function_call","call_id":"lost","name":"shell","arguments":"{}"}\n'
    emit '### FILE: REQUIREMENTS.md\nreqs\n### FILE: TEST.md\nchecks\n### FILE: AGENT_TASKS.md\ntasks' ;;
  designer) emit '### FILE: design/design_spec.md\nlayout' ;;
  frontend) emit '### FILE: frontend/index.html\n<main></main>' ;;
  backend) emit '### FILE: backend/server.js\nserve()' ;;
  tester) emit '### FILE: tests/TEST_PLAN.md\n- load page' ;;
  *) exit 9 ;;
esac
"#;

    fn configure(project: &TestProject, script: &str) {
        project.write("agent.sh", script).expect("write script");
        let mut cfg = RelayConfig::default();
        cfg.runtime.command = vec![
            "sh".to_string(),
            project.root().join("agent.sh").display().to_string(),
        ];
        cfg.runtime.timeout_secs = 30;
        cfg.approval.required = false;
        project.write_config(&cfg).expect("write config");
    }

    #[test]
    fn run_drives_every_stage_and_emits_status_lines() {
        let project = TestProject::new().expect("project");
        configure(&project, AGENT_SCRIPT);

        let root = project.root().display().to_string();
        let output = relay(&["run", "--project-root", &root], project.root());
        assert_eq!(
            output.status.code(),
            Some(exit_codes::OK),
            "stderr: {}",
            String::from_utf8_lossy(&output.stderr)
        );

        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("AGENT_STATUS|pm|running|Planning requirements"));
        assert!(stdout.contains("AGENT_TOKENS|designer|10"));
        assert!(stdout.contains("AGENT_STATUS|tester|idle|Done"));

        assert_eq!(project.read("AGENT_TASKS.md").expect("tasks"), "tasks\n");
        assert_eq!(
            project.read("frontend/index.html").expect("index"),
            "<main></main>\n"
        );
        assert!(project.read("README.md").expect("readme").contains("Project Output"));

        let record: Value = serde_json::from_str(
            &fs::read_to_string(project.root().join(".relay/handoffs/1-pm.json"))
                .expect("handoff record"),
        )
        .expect("record json");
        assert_eq!(record["report"]["new_items"]["dropped_calls"], 1);
        assert!(project.root().join(".relay/turns/2-designer/input.json").is_file());
        assert!(project.root().join(".relay/turns/2-designer/stream.jsonl").is_file());
    }

    #[test]
    fn failing_runtime_exits_with_runtime_code() {
        let project = TestProject::new().expect("project");
        configure(&project, "cat > /dev/null\necho boom >&2\nexit 4\n");

        let root = project.root().display().to_string();
        let output = relay(&["run", "--project-root", &root], project.root());
        assert_eq!(output.status.code(), Some(exit_codes::RUNTIME));
        assert!(String::from_utf8_lossy(&output.stdout).contains("AGENT_STATUS|pm|failed|Failed"));
        assert!(!project.root().join("REQUIREMENTS.md").exists());
    }

    #[test]
    fn missing_task_file_is_invalid() {
        let project = TestProject::new().expect("project");
        configure(&project, AGENT_SCRIPT);

        let root = project.root().display().to_string();
        let output = relay(
            &["run", "--project-root", &root, "--task-file", "nope.md"],
            project.root(),
        );
        assert_eq!(output.status.code(), Some(exit_codes::INVALID));
        assert!(String::from_utf8_lossy(&output.stderr).contains("not found"));
    }
}
