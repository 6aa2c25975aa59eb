use thiserror::Error as ThisError;

#[derive(Debug, Clone, ThisError, PartialEq, Eq)]
pub enum FactoryError {
    #[error("invalid configuration for agent type '{agent_type}': missing keys {missing:?}")]
    Config {
        agent_type: String,
        missing: Vec<&'static str>,
    },

    #[error("agent '{name}' is disabled in the registry")]
    Disabled { name: String },

    #[error("module not found: {module}")]
    ModuleNotFound { module: String },

    #[error("module '{module}' failed to load: {message}")]
    ModuleLoad { module: String, message: String },

    #[error("function not found: {module}.{function}")]
    FunctionNotFound { module: String, function: String },

    #[error("factory for agent type '{agent_type}' failed: {message}")]
    Construction { agent_type: String, message: String },
}

impl FactoryError {
    /// Caller-side configuration problem; fixed by correcting the input.
    pub fn is_config(&self) -> bool {
        matches!(self, FactoryError::Config { .. } | FactoryError::Disabled { .. })
    }

    /// Lookup failure on the catalog path (module or function).
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            FactoryError::ModuleNotFound { .. }
                | FactoryError::ModuleLoad { .. }
                | FactoryError::FunctionNotFound { .. }
        )
    }
}
