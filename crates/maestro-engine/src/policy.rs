use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

use maestro_core::config::RunLimits;

/// A policy violation that halts a run.
///
/// Breaches end a run with status `stopped`: an expected operating boundary,
/// distinct from agent failures.
#[derive(Debug, Clone, PartialEq)]
pub enum Breach {
    /// An agent was entered more times than its loop ceiling allows.
    LoopLimit { agent: String, limit: u32 },
    /// The run outlived its wall-clock ceiling.
    Duration { elapsed_ms: u64, limit_ms: u64 },
    /// Cumulative cost crossed the run-wide ceiling.
    Cost { spent: f64, limit: f64 },
    /// A single attempt's cost crossed the agent's per-invocation guardrail.
    Guardrail { agent: String, cost: f64, limit: f64 },
}

impl fmt::Display for Breach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Breach::LoopLimit { agent, limit } => write!(
                f,
                "loop limit reached: agent '{}' exceeded {} iteration(s)",
                agent, limit
            ),
            Breach::Duration {
                elapsed_ms,
                limit_ms,
            } => write!(
                f,
                "duration ceiling reached: {}ms elapsed, limit {}ms",
                elapsed_ms, limit_ms
            ),
            Breach::Cost { spent, limit } => write!(
                f,
                "cost ceiling reached: {:.4} spent, limit {:.4}",
                spent, limit
            ),
            Breach::Guardrail { agent, cost, limit } => write!(
                f,
                "guardrail breached: agent '{}' attempt cost {:.4} exceeds per-invocation limit {:.4}",
                agent, cost, limit
            ),
        }
    }
}

/// Tracks loop budgets and run-wide ceilings for one run.
///
/// All comparisons are strict: a run at exactly its ceiling is still within
/// bounds, one past it is stopped.
pub struct PolicyEnforcer {
    limits: RunLimits,
    started: Instant,
    loop_counts: HashMap<String, u32>,
    total_cost: f64,
}

impl PolicyEnforcer {
    pub fn new(limits: RunLimits) -> Self {
        Self {
            limits,
            started: Instant::now(),
            loop_counts: HashMap::new(),
            total_cost: 0.0,
        }
    }

    /// Count one entry into an agent. Returns a breach when the count now
    /// exceeds the agent's ceiling, in which case the entry must not run.
    pub fn enter_loop(&mut self, agent: &str, max_loops: u32) -> Option<Breach> {
        let count = self.loop_counts.entry(agent.to_string()).or_insert(0);
        *count += 1;
        if *count > max_loops {
            Some(Breach::LoopLimit {
                agent: agent.to_string(),
                limit: max_loops,
            })
        } else {
            None
        }
    }

    /// How many times an agent has been entered so far.
    pub fn loop_count(&self, agent: &str) -> u32 {
        self.loop_counts.get(agent).copied().unwrap_or(0)
    }

    /// Whether the agent could be entered once more without breaching.
    pub fn has_loop_budget(&self, agent: &str, max_loops: u32) -> bool {
        self.loop_count(agent) < max_loops
    }

    /// Check the run-wide ceilings, duration before cost.
    pub fn check_ceilings(&self) -> Option<Breach> {
        if let Some(limit_ms) = self.limits.max_duration_ms {
            let elapsed_ms = self.elapsed_ms();
            if elapsed_ms > limit_ms {
                return Some(Breach::Duration {
                    elapsed_ms,
                    limit_ms,
                });
            }
        }
        if let Some(limit) = self.limits.max_cost {
            if self.total_cost > limit {
                return Some(Breach::Cost {
                    spent: self.total_cost,
                    limit,
                });
            }
        }
        None
    }

    /// Add an attempt's reported cost to the run total.
    pub fn charge(&mut self, cost: f64) {
        self.total_cost += cost;
    }

    pub fn total_cost(&self) -> f64 {
        self.total_cost
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Check one attempt's cost against an agent's per-invocation guardrail.
    /// `None` limit means the agent has no guardrail.
    pub fn check_guardrail(&self, agent: &str, cost: f64, limit: Option<f64>) -> Option<Breach> {
        let limit = limit?;
        if cost > limit {
            Some(Breach::Guardrail {
                agent: agent.to_string(),
                cost,
                limit,
            })
        } else {
            None
        }
    }
}
