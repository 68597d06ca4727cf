use std::io::Write;
use std::path::Path;

use maestro::{AgentKind, WorkflowConfig, ORCHESTRATOR};

#[test]
fn test_load_full_workflow_from_file() {
    let toml_content = r#"
[[agents]]
name = "orchestrator"
kind = "orchestrator"
max_loops = 3

[[agents]]
name = "search"
kind = "worker"

[agents.policy.retries]
count = 2
backoff_ms = 25

[agents.policy.memory]
read_from = ["research"]
write_to = "results"

[agents.policy.guardrails]
max_cost_per_invocation = 1.5
allowed_domains = ["docs.rs", "crates.io"]

[[agents]]
name = "draft"
kind = "worker"

[agents.policy]
fallback = "search"

[routes]
orchestrator = ["search", "draft"]

[limits]
default_max_loops = 4
max_duration_ms = 30000
max_cost = 5.0

[memory.research]
topic = "rust release notes"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = WorkflowConfig::load(tmp.path()).expect("load workflow");

    assert_eq!(config.agents.len(), 3);
    let orch = config.agent(ORCHESTRATOR).expect("orchestrator declared");
    assert_eq!(orch.kind, AgentKind::Orchestrator);
    assert_eq!(orch.max_loops, Some(3));

    let search = config.agent("search").expect("search declared");
    assert_eq!(search.kind, AgentKind::Worker);
    assert_eq!(search.policy.retries.count, 2);
    assert_eq!(search.policy.retries.backoff_ms, 25);
    assert_eq!(search.policy.memory.read_from, vec!["research"]);
    assert_eq!(search.policy.memory.write_to.as_deref(), Some("results"));
    assert_eq!(search.policy.guardrails.max_cost_per_invocation, Some(1.5));
    assert_eq!(
        search.policy.guardrails.params.get("allowed_domains"),
        Some(&serde_json::json!(["docs.rs", "crates.io"]))
    );

    let draft = config.agent("draft").expect("draft declared");
    assert_eq!(draft.policy.fallback.as_deref(), Some("search"));

    assert_eq!(
        config.routes_for(ORCHESTRATOR),
        &["search".to_string(), "draft".to_string()]
    );
    assert_eq!(config.limits.default_max_loops, 4);
    assert_eq!(config.limits.max_duration_ms, Some(30000));
    assert_eq!(config.limits.max_cost, Some(5.0));
    assert_eq!(
        config.memory["research"]["topic"],
        serde_json::json!("rust release notes")
    );
}

#[test]
fn test_load_missing_file_errors() {
    let err = WorkflowConfig::load(Path::new("/nonexistent/workflow.toml")).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
}

#[test]
fn test_env_vars_expanded_in_config() {
    std::env::set_var("MAESTRO_TEST_TOPIC", "async runtimes");
    let toml_content = r#"
[[agents]]
name = "orchestrator"
kind = "orchestrator"

[memory.research]
topic = "${MAESTRO_TEST_TOPIC}"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = WorkflowConfig::load(tmp.path()).expect("load workflow");
    assert_eq!(
        config.memory["research"]["topic"],
        serde_json::json!("async runtimes")
    );
    std::env::remove_var("MAESTRO_TEST_TOPIC");
}

#[test]
fn test_minimal_workflow_gets_defaults() {
    let config = WorkflowConfig::from_toml_str(
        r#"
[[agents]]
name = "orchestrator"
kind = "orchestrator"
"#,
    )
    .expect("parse minimal workflow");

    assert_eq!(config.limits.default_max_loops, 10);
    assert!(config.limits.max_duration_ms.is_none());
    assert!(config.limits.max_cost.is_none());
    assert!(config.routes.is_empty());
    assert!(config.memory.is_empty());

    let orch = &config.agents[0];
    assert_eq!(orch.policy.retries.count, 1);
    assert_eq!(orch.policy.retries.backoff_ms, 0);
    assert!(orch.policy.guardrails.max_cost_per_invocation.is_none());
}

#[test]
fn test_rejects_workflow_without_orchestrator() {
    let err = WorkflowConfig::from_toml_str(
        r#"
[[agents]]
name = "search"
kind = "worker"
"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("exactly one orchestrator"));
}

#[test]
fn test_rejects_misnamed_orchestrator() {
    let err = WorkflowConfig::from_toml_str(
        r#"
[[agents]]
name = "boss"
kind = "orchestrator"
"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("must be named 'orchestrator'"));
}

#[test]
fn test_rejects_duplicate_agent_names() {
    let err = WorkflowConfig::from_toml_str(
        r#"
[[agents]]
name = "orchestrator"
kind = "orchestrator"

[[agents]]
name = "search"
kind = "worker"

[[agents]]
name = "search"
kind = "worker"
"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("duplicate agent name 'search'"));
}

#[test]
fn test_rejects_route_to_undeclared_agent() {
    let err = WorkflowConfig::from_toml_str(
        r#"
[[agents]]
name = "orchestrator"
kind = "orchestrator"

[routes]
orchestrator = ["ghost"]
"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("route target 'ghost'"));
}

#[test]
fn test_rejects_undeclared_fallback() {
    let err = WorkflowConfig::from_toml_str(
        r#"
[[agents]]
name = "orchestrator"
kind = "orchestrator"

[[agents]]
name = "search"
kind = "worker"

[agents.policy]
fallback = "ghost"
"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("fallback 'ghost'"));
}

#[test]
fn test_rejects_reserved_agent_name() {
    let err = WorkflowConfig::from_toml_str(
        r#"
[[agents]]
name = "orchestrator"
kind = "orchestrator"

[[agents]]
name = "end"
kind = "worker"
"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("reserved"));
}

#[test]
fn test_rejects_zero_retry_count() {
    let err = WorkflowConfig::from_toml_str(
        r#"
[[agents]]
name = "orchestrator"
kind = "orchestrator"

[[agents]]
name = "search"
kind = "worker"

[agents.policy.retries]
count = 0
"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("retries.count must be at least 1"));
}
