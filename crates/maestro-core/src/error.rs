use thiserror::Error;

#[derive(Debug, Error)]
pub enum MaestroError {
    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Engine errors
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Route not permitted: {from} -> {to}")]
    RouteViolation { from: String, to: String },

    #[error("Agent '{agent}' failed after {attempts} attempt(s): {message}")]
    AgentFailed {
        agent: String,
        attempts: u32,
        message: String,
    },

    // Agent-implementation errors
    #[error("Agent execution failed: {0}")]
    AgentExecution(String),

    // Memory errors
    #[error("Memory error: {0}")]
    Memory(String),

    // Trace sink errors
    #[error("Trace sink error: {0}")]
    Sink(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MaestroError>;
