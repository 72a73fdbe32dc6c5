//! Pipeline-level tests driving every role stage with a scripted runtime.
//!
//! Each test builds a temporary project, scripts the agent turns, and checks
//! the files, status lines, handoff records, and errors the run produces.

use relay::agents::ROLES;
use relay::core::items::{
    Item, ItemKind, call_id_of, classify, function_call, function_call_output, message_text,
    reasoning,
};
use relay::core::types::ApprovalDecision;
use relay::io::approval::ApprovalRejected;
use relay::io::config::RelayConfig;
use relay::pipeline::{MissingDeliverable, PipelineRequest, StageFailed, run_pipeline};
use relay::test_support::{
    RecordingGate, ScriptedRuntime, ScriptedTurn, TestProject, file_output, status_sink, turn,
};

fn pm_output() -> String {
    file_output(&[
        ("REQUIREMENTS.md", "# Requirements\n- snake game"),
        ("TEST.md", "- [Tester] game starts"),
        ("AGENT_TASKS.md", "## Designer\n- design/design_spec.md"),
    ])
}

/// Turns for all five stages. The project manager leaves one call without
/// an output, which must not reach the designer.
fn full_script() -> Vec<ScriptedTurn> {
    vec![
        turn(
            &pm_output(),
            vec![
                reasoning("r1"),
                function_call("c1", "web_search", "{\"q\":\"snake\"}"),
                function_call_output("c1", "results"),
                function_call("orphan", "web_search", "{}"),
            ],
            120,
        ),
        turn(
            &file_output(&[
                ("design/design_spec.md", "Grid layout"),
                ("design/wireframe.md", "```text\n[ board ]\n```"),
            ]),
            Vec::new(),
            80,
        ),
        turn(
            &file_output(&[("./frontend/index.html", "<canvas></canvas>")]),
            Vec::new(),
            60,
        ),
        turn(
            &file_output(&[("/backend/server.js", "console.log('up');")]),
            vec![function_call_output("late", "stray output")],
            40,
        ),
        turn(
            &file_output(&[("tests/TEST_PLAN.md", "- open the page")]),
            Vec::new(),
            20,
        ),
    ]
}

fn request<'a>(project: &'a TestProject, cfg: &'a RelayConfig) -> PipelineRequest<'a> {
    PipelineRequest {
        root: project.root(),
        cfg,
        task: "Goal: build a snake game",
        shell: "bash",
    }
}

#[test]
fn full_run_writes_deliverables_and_reconciles_handoffs() {
    let project = TestProject::new().expect("project");
    let cfg = RelayConfig::default();
    let runtime = ScriptedRuntime::new(full_script());
    let mut gate = RecordingGate::default();
    let (mut status, buffer) = status_sink();

    let outcome = run_pipeline(&request(&project, &cfg), &runtime, &mut gate, &mut status)
        .expect("pipeline");

    assert_eq!(outcome.stages.len(), ROLES.len());
    assert_eq!(outcome.total_tokens(), 320);
    assert_eq!(outcome.stages[0].handoff.new_items_dropped(), 1);
    assert_eq!(outcome.stages[3].handoff.new_items_dropped(), 1);
    assert!(outcome.readme_written);

    assert_eq!(
        project.read("design/wireframe.md").expect("wireframe"),
        "[ board ]\n"
    );
    assert_eq!(
        project.read("frontend/index.html").expect("index"),
        "<canvas></canvas>\n"
    );
    assert!(project.root().join("backend/server.js").is_file());
    assert!(project.read("README.md").expect("readme").starts_with("# Project Output"));
    for (index, role) in ROLES.iter().enumerate() {
        let record = project
            .root()
            .join(format!(".relay/handoffs/{}-{}.json", index + 1, role.id));
        assert!(record.is_file(), "missing {}", record.display());
    }

    // The designer sees the project manager's documents and none of its
    // unpaired calls.
    let requests = runtime.requests();
    assert_eq!(requests.len(), ROLES.len());
    let designer = &requests[1];
    assert_eq!(designer.agent_id, "designer");
    let payload = designer
        .input
        .last()
        .and_then(Item::to_structural)
        .and_then(|value| message_text(&value))
        .expect("payload");
    assert!(payload.starts_with("REQUIREMENTS.md:\n# Requirements"));
    assert!(payload.contains("AGENT_TASKS.md:\n## Designer"));
    assert!(
        designer
            .input
            .iter()
            .all(|item| call_id_of(item).as_deref() != Some("orphan"))
    );
    let calls = designer
        .input
        .iter()
        .filter(|item| classify(*item) == ItemKind::Call)
        .count();
    assert_eq!(calls, 1);

    let lines = buffer.lines();
    assert_eq!(lines[0], "AGENT_STATUS|pm|running|Planning requirements");
    assert_eq!(lines[1], "AGENT_LOG|pm|Starting requirements and task breakdown.");
    assert!(lines.contains(&"AGENT_TOKENS|pm|120".to_string()));
    assert!(lines.contains(&"AGENT_STATUS|tester|idle|Done".to_string()));

    let reviewed: Vec<&str> = gate.requests.iter().map(|r| r.agent_id.as_str()).collect();
    assert_eq!(reviewed, vec!["pm", "designer", "frontend", "backend", "tester"]);
    assert_eq!(
        gate.requests[2].files,
        vec!["frontend/index.html".to_string()]
    );
}

#[test]
fn rejection_stops_before_the_next_stage() {
    let project = TestProject::new().expect("project");
    let cfg = RelayConfig::default();
    let runtime = ScriptedRuntime::new(full_script());
    let mut gate = RecordingGate::new([ApprovalDecision::Approved, ApprovalDecision::Rejected]);
    let (mut status, buffer) = status_sink();

    let err = run_pipeline(&request(&project, &cfg), &runtime, &mut gate, &mut status)
        .unwrap_err();

    let rejected = err.downcast_ref::<ApprovalRejected>().expect("rejection");
    assert_eq!(rejected.agent_id, "designer");
    assert_eq!(runtime.requests().len(), 2);
    assert!(!project.root().join("frontend").exists());
    assert!(!project.root().join("README.md").exists());
    assert!(
        buffer
            .lines()
            .contains(&"AGENT_LOG|designer|Approval rejected. Exiting workflow.".to_string())
    );
}

#[test]
fn missing_required_document_fails_the_stage() {
    let project = TestProject::new().expect("project");
    let cfg = RelayConfig::default();
    let runtime = ScriptedRuntime::new([turn(
        &file_output(&[("REQUIREMENTS.md", "reqs"), ("TEST.md", "tests")]),
        Vec::new(),
        5,
    )]);
    let mut gate = RecordingGate::default();
    let (mut status, buffer) = status_sink();

    let err = run_pipeline(&request(&project, &cfg), &runtime, &mut gate, &mut status)
        .unwrap_err();

    let missing = err.downcast_ref::<MissingDeliverable>().expect("missing");
    assert_eq!(missing.agent_id, "pm");
    assert_eq!(missing.path, "AGENT_TASKS.md");
    assert!(gate.requests.is_empty());
    assert!(
        buffer
            .lines()
            .contains(&"AGENT_STATUS|pm|failed|Missing deliverable".to_string())
    );
}

#[test]
fn runtime_failure_marks_the_agent_failed() {
    let project = TestProject::new().expect("project");
    let cfg = RelayConfig::default();
    let runtime = ScriptedRuntime::new([ScriptedTurn::Fail("model unavailable".to_string())]);
    let mut gate = RecordingGate::default();
    let (mut status, buffer) = status_sink();

    let err = run_pipeline(&request(&project, &cfg), &runtime, &mut gate, &mut status)
        .unwrap_err();

    assert!(err.downcast_ref::<StageFailed>().is_some());
    assert!(format!("{err:#}").contains("model unavailable"));
    let lines = buffer.lines();
    assert!(lines.contains(&"AGENT_STATUS|pm|failed|Failed".to_string()));
    assert!(
        lines
            .iter()
            .any(|line| line.starts_with("AGENT_LOG|pm|Stage failed:"))
    );
}

#[test]
fn without_carried_context_each_stage_starts_fresh() {
    let project = TestProject::new().expect("project");
    let mut cfg = RelayConfig::default();
    cfg.handoff.carry_context = false;
    let runtime = ScriptedRuntime::new(full_script());
    let mut gate = RecordingGate::default();
    let (mut status, _) = status_sink();

    run_pipeline(&request(&project, &cfg), &runtime, &mut gate, &mut status).expect("pipeline");

    for request in runtime.requests() {
        // developer permissions, environment context, payload
        assert_eq!(request.input.len(), 3, "{}", request.agent_id);
    }
}

#[test]
fn carried_context_grows_with_cleaned_items() {
    let project = TestProject::new().expect("project");
    let cfg = RelayConfig::default();
    let runtime = ScriptedRuntime::new(full_script());
    let mut gate = RecordingGate::default();
    let (mut status, _) = status_sink();

    run_pipeline(&request(&project, &cfg), &runtime, &mut gate, &mut status).expect("pipeline");

    let requests = runtime.requests();
    // pm: 2 base items + task
    assert_eq!(requests[0].input.len(), 3);
    // designer: pm input (3) + kept pm items (reasoning, call, output,
    // message) + payload
    assert_eq!(requests[1].input.len(), 8);
}
