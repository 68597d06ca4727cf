use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MaestroError, Result};
use crate::types::{MemorySnapshot, END, ORCHESTRATOR};

/// What role an agent plays in the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// The fixed entry point. The only agent whose `next` requests are
    /// honored as routing targets.
    Orchestrator,
    /// Performs bounded work and returns control to the orchestrator.
    Worker,
}

/// Retry behavior for one agent's attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts per step, including the first (minimum 1).
    #[serde(default = "default_retry_count")]
    pub count: u32,
    /// Delay between failed attempts.
    #[serde(default)]
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            count: default_retry_count(),
            backoff_ms: 0,
        }
    }
}

fn default_retry_count() -> u32 { 1 }

/// Which memory namespaces an agent may touch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryPolicy {
    /// Namespaces flattened into the agent's read view.
    #[serde(default)]
    pub read_from: Vec<String>,
    /// The single namespace the agent's output payload merges into.
    #[serde(default)]
    pub write_to: Option<String>,
}

/// Per-agent safety rules.
///
/// Only `max_cost_per_invocation` is interpreted by the engine. Everything
/// else (domain whitelists, table whitelists, execution toggles) is an opaque
/// parameter bag read by the concrete agent through its context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Guardrails {
    /// Hard cap on a single attempt's reported cost. Exceeding it ends the
    /// run immediately, skipping retries and fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cost_per_invocation: Option<f64>,
    /// Capability parameters interpreted only by the concrete agent.
    #[serde(default, flatten)]
    pub params: BTreeMap<String, serde_json::Value>,
}

/// Execution policy attached to one agent declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentPolicy {
    #[serde(default)]
    pub retries: RetryPolicy,
    /// Agent substituted after retries exhaust. Not subject to the routing
    /// whitelist.
    #[serde(default)]
    pub fallback: Option<String>,
    #[serde(default)]
    pub memory: MemoryPolicy,
    #[serde(default)]
    pub guardrails: Guardrails,
}

impl AgentPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retries(mut self, count: u32, backoff_ms: u64) -> Self {
        self.retries = RetryPolicy { count, backoff_ms };
        self
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = Some(fallback.into());
        self
    }

    pub fn with_read_from(mut self, namespaces: Vec<String>) -> Self {
        self.memory.read_from = namespaces;
        self
    }

    pub fn with_write_to(mut self, namespace: impl Into<String>) -> Self {
        self.memory.write_to = Some(namespace.into());
        self
    }

    pub fn with_cost_guardrail(mut self, max_cost_per_invocation: f64) -> Self {
        self.guardrails.max_cost_per_invocation = Some(max_cost_per_invocation);
        self
    }

    pub fn with_guardrail_param(
        mut self,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        self.guardrails.params.insert(key.into(), value);
        self
    }
}

/// One agent in the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDeclaration {
    pub name: String,
    pub kind: AgentKind,
    /// Per-agent loop ceiling. Falls back to `limits.default_max_loops`.
    #[serde(default)]
    pub max_loops: Option<u32>,
    #[serde(default)]
    pub policy: AgentPolicy,
}

impl AgentDeclaration {
    /// Declare the entry-point agent.
    pub fn orchestrator() -> Self {
        Self {
            name: ORCHESTRATOR.to_string(),
            kind: AgentKind::Orchestrator,
            max_loops: None,
            policy: AgentPolicy::default(),
        }
    }

    /// Declare a worker agent.
    pub fn worker(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: AgentKind::Worker,
            max_loops: None,
            policy: AgentPolicy::default(),
        }
    }

    pub fn with_max_loops(mut self, max_loops: u32) -> Self {
        self.max_loops = Some(max_loops);
        self
    }

    pub fn with_policy(mut self, policy: AgentPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Run-wide ceilings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLimits {
    /// Loop ceiling for agents without an explicit `max_loops`.
    #[serde(default = "default_max_loops")]
    pub default_max_loops: u32,
    /// Wall-clock ceiling for the whole run. `None` = unlimited.
    #[serde(default)]
    pub max_duration_ms: Option<u64>,
    /// Cumulative cost ceiling across all attempts. `None` = unlimited.
    #[serde(default)]
    pub max_cost: Option<f64>,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            default_max_loops: default_max_loops(),
            max_duration_ms: None,
            max_cost: None,
        }
    }
}

fn default_max_loops() -> u32 { 10 }

/// Static description of a workflow: agents, routes, ceilings, and seeded
/// memory. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Declared agents, in declaration order.
    pub agents: Vec<AgentDeclaration>,
    /// Routing whitelist: agent name -> callee names it may request.
    /// Ending the workflow is always permitted and needs no entry.
    #[serde(default)]
    pub routes: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub limits: RunLimits,
    /// Pre-seeded memory namespaces.
    #[serde(default)]
    pub memory: MemorySnapshot,
}

impl WorkflowConfig {
    pub fn new(agents: Vec<AgentDeclaration>) -> Self {
        Self {
            agents,
            routes: BTreeMap::new(),
            limits: RunLimits::default(),
            memory: MemorySnapshot::new(),
        }
    }

    pub fn with_route(mut self, from: impl Into<String>, targets: Vec<String>) -> Self {
        self.routes.insert(from.into(), targets);
        self
    }

    pub fn with_limits(mut self, limits: RunLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Seed one key into a memory namespace.
    pub fn with_seed(
        mut self,
        namespace: impl Into<String>,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        self.memory
            .entry(namespace.into())
            .or_default()
            .insert(key.into(), value);
        self
    }

    /// Look up an agent declaration by name.
    pub fn agent(&self, name: &str) -> Option<&AgentDeclaration> {
        self.agents.iter().find(|a| a.name == name)
    }

    /// Routing targets an agent may request. Empty when none are declared.
    pub fn routes_for(&self, name: &str) -> &[String] {
        self.routes.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The loop ceiling in force for an agent.
    pub fn effective_max_loops(&self, decl: &AgentDeclaration) -> u32 {
        decl.max_loops.unwrap_or(self.limits.default_max_loops)
    }

    /// Load a workflow from a TOML file, with `${ENV_VAR}` expansion.
    ///
    /// The returned config has already passed [`WorkflowConfig::validate`].
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| MaestroError::ConfigNotFound(path.display().to_string()))?;
        let config = Self::from_toml_str(&content)?;
        debug!(
            path = %path.display(),
            agents = config.agents.len(),
            "Workflow config loaded"
        );
        Ok(config)
    }

    /// Parse a workflow from a TOML string, with `${ENV_VAR}` expansion.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        let config: Self =
            toml::from_str(&expanded).map_err(|e| MaestroError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the naming invariants. Violations are rejected before any run
    /// starts.
    pub fn validate(&self) -> Result<()> {
        if self.agents.is_empty() {
            return Err(MaestroError::Config("workflow declares no agents".into()));
        }

        let mut names = BTreeSet::new();
        for decl in &self.agents {
            if decl.name.is_empty() {
                return Err(MaestroError::Config("agent name must not be empty".into()));
            }
            if decl.name == END {
                return Err(MaestroError::Config(format!(
                    "agent name '{}' is reserved",
                    END
                )));
            }
            if !names.insert(decl.name.as_str()) {
                return Err(MaestroError::Config(format!(
                    "duplicate agent name '{}'",
                    decl.name
                )));
            }
            if decl.policy.retries.count == 0 {
                return Err(MaestroError::Config(format!(
                    "agent '{}': retries.count must be at least 1",
                    decl.name
                )));
            }
        }

        let orchestrators: Vec<&AgentDeclaration> = self
            .agents
            .iter()
            .filter(|a| a.kind == AgentKind::Orchestrator)
            .collect();
        match orchestrators.as_slice() {
            [single] if single.name == ORCHESTRATOR => {}
            [single] => {
                return Err(MaestroError::Config(format!(
                    "the orchestrator must be named '{}', found '{}'",
                    ORCHESTRATOR, single.name
                )));
            }
            _ => {
                return Err(MaestroError::Config(format!(
                    "workflow must declare exactly one orchestrator, found {}",
                    orchestrators.len()
                )));
            }
        }

        for (from, targets) in &self.routes {
            if !names.contains(from.as_str()) {
                return Err(MaestroError::Config(format!(
                    "route source '{}' is not a declared agent",
                    from
                )));
            }
            for to in targets {
                if !names.contains(to.as_str()) {
                    return Err(MaestroError::Config(format!(
                        "route target '{}' (from '{}') is not a declared agent",
                        to, from
                    )));
                }
            }
        }

        for decl in &self.agents {
            if let Some(fallback) = &decl.policy.fallback {
                if !names.contains(fallback.as_str()) {
                    return Err(MaestroError::Config(format!(
                        "fallback '{}' for agent '{}' is not a declared agent",
                        fallback, decl.name
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Expand `${ENV_VAR}` patterns in a string. Unset variables are left as-is.
fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find('}') {
            Some(end) => {
                let name = &rest[start + 2..start + 2 + end];
                match std::env::var(name) {
                    Ok(val) => out.push_str(&val),
                    Err(_) => {
                        out.push_str("${");
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &rest[start + 2 + end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
