//! Agent error types.
//!
//! All engine subsystems surface errors through [`AgentError`].  Variants are
//! grouped by how the engine treats them: configuration errors are always
//! fatal, tool errors are turned into `is_error` tool-result blocks by the
//! dispatcher, and provider or nested-agent errors abort the run unchanged.

/// Unified error type for the execution engine.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    // -- Configuration errors ------------------------------------------------
    /// A tool-use block named something that is neither a declared tool nor a
    /// declared nested agent.
    #[error("unresolved tool or agent: {name}")]
    UnresolvedTool { name: String },

    /// A step asked to transition to a step name missing from the table.
    #[error("unknown step: {name}")]
    UnknownStep { name: String },

    /// A step needed the last message of the conversation but there is none.
    #[error("no last message in conversation state")]
    MissingLastMessage,

    /// Two tools or nested agents on the same agent share a name.
    #[error("duplicate tool or agent name: {name}")]
    DuplicateName { name: String },

    /// Agent construction or settings validation failed.
    #[error("config error: {reason}")]
    ConfigError { reason: String },

    /// Results supplied at a `tool-call-params` suspension do not answer the
    /// pending tool-use blocks exactly once each.
    #[error("invalid tool results: {reason}")]
    InvalidToolResults { reason: String },

    // -- Provider errors -----------------------------------------------------
    /// The model provider failed.  Raised by provider implementations and
    /// never handled by the engine.
    #[error("provider error: {reason}")]
    Provider { reason: String },

    /// The provider stream ended without delivering a final response.
    #[error("provider stream ended without a final response")]
    ProviderStreamIncomplete,

    // -- Tool errors ---------------------------------------------------------
    /// A tool invocation failed.
    #[error("tool execution failed for `{tool_name}`: {reason}")]
    ToolExecutionFailed { tool_name: String, reason: String },

    // -- Run lifecycle -------------------------------------------------------
    /// The event stream was resumed after it already completed or failed.
    #[error("run already finished")]
    RunFinished,

    /// The run executed more steps than the agent allows.
    #[error("agent `{agent}` exceeded max steps ({max_steps})")]
    MaxStepsExceeded { agent: String, max_steps: u32 },

    // -- Serialization -------------------------------------------------------
    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Agent settings could not be parsed.
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Reading a settings file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    // -- Generic -------------------------------------------------------------
    /// Catch-all for unexpected internal errors.  Prefer a typed variant
    /// whenever possible.
    #[error("internal agent error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AgentError>;

impl AgentError {
    /// Whether this error is a configuration error (always fatal, never
    /// worth retrying).
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnresolvedTool { .. }
                | Self::UnknownStep { .. }
                | Self::MissingLastMessage
                | Self::DuplicateName { .. }
                | Self::ConfigError { .. }
                | Self::InvalidToolResults { .. }
        )
    }
}
