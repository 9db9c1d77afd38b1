//! Agent settings loaded from TOML.
//!
//! Settings cover the declarative part of an agent.  Providers, tools,
//! nested agents, reducers and middleware are code and are attached through
//! [`AgentBuilder`](crate::agent::AgentBuilder).
//!
//! ```toml
//! name = "researcher"
//! description = "Finds and summarizes sources"
//! instructions = "Cite every claim."
//! stop_condition = "tool-result"
//! stream = true
//! max_steps = 32
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::agent::DEFAULT_MAX_STEPS;
use crate::context::StopCondition;
use crate::error::{AgentError, Result};

/// Declarative agent settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Overrides the name given to [`Agent::builder`](crate::agent::Agent::builder).
    pub name: Option<String>,

    /// Shown to delegating agents' models.
    pub description: Option<String>,

    /// System prompt.
    pub instructions: Option<String>,

    /// First step of every run.  Defaults to `llm-call`.
    pub start_step: Option<String>,

    pub stop_condition: StopCondition,

    /// Emit `llm-streaming` events by default.
    pub stream: bool,

    /// Upper bound on steps per run.  Zero disables the guard.
    pub max_steps: u32,

    /// Emit `llm-input` events by default.
    pub emit_llm_input: bool,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            name: None,
            description: None,
            instructions: None,
            start_step: None,
            stop_condition: StopCondition::Terminal,
            stream: false,
            max_steps: DEFAULT_MAX_STEPS,
            emit_llm_input: false,
        }
    }
}

impl AgentSettings {
    /// Parse settings from a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let settings: Self = toml::from_str(source)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read and parse a TOML settings file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "loading agent settings");
        Self::from_toml_str(&source)
    }

    fn validate(&self) -> Result<()> {
        let blank = |value: &Option<String>| value.as_deref().is_some_and(|v| v.trim().is_empty());
        if blank(&self.name) {
            return Err(AgentError::ConfigError {
                reason: "`name` must not be empty".into(),
            });
        }
        if blank(&self.start_step) {
            return Err(AgentError::ConfigError {
                reason: "`start_step` must not be empty".into(),
            });
        }
        Ok(())
    }
}
