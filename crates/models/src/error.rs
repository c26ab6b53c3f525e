use thiserror::Error;

#[derive(Error, Debug)]
pub enum SkiffError {
    #[error("Invalid recipe: {reason}")]
    InvalidRecipe { reason: String },

    #[error("Configuration error: {reason}")]
    ConfigError { reason: String },

    #[error("Build context unreadable: {path}: {reason}")]
    ContextUnreadable { path: String, reason: String },

    #[error("Build context too large: {size} bytes (max: {max_size})")]
    ContextTooLarge { size: u64, max_size: u64 },

    #[error("Docker error: {message}")]
    DockerError { message: String },

    #[error("Container wait timed out after {timeout_ms}ms")]
    ContainerTimeout { timeout_ms: u64 },

    #[error("Internal error: {reason}")]
    InternalError { reason: String },
}

impl SkiffError {
    pub fn error_type(&self) -> &'static str {
        match self {
            SkiffError::InvalidRecipe { .. } => "InvalidRecipe",
            SkiffError::ConfigError { .. } => "ConfigError",
            SkiffError::ContextUnreadable { .. } => "ContextUnreadable",
            SkiffError::ContextTooLarge { .. } => "ContextTooLarge",
            SkiffError::DockerError { .. } => "DockerError",
            SkiffError::ContainerTimeout { .. } => "ContainerTimeout",
            SkiffError::InternalError { .. } => "InternalError",
        }
    }

    /// Process exit code reported by the CLI when this error aborts a run.
    /// Distinct from container exit codes, which are forwarded as-is.
    pub fn exit_code(&self) -> i32 {
        match self {
            SkiffError::InvalidRecipe { .. } => 2,
            SkiffError::ConfigError { .. } => 2,
            SkiffError::ContextUnreadable { .. } => 3,
            SkiffError::ContextTooLarge { .. } => 3,
            SkiffError::DockerError { .. } => 4,
            SkiffError::ContainerTimeout { .. } => 5,
            SkiffError::InternalError { .. } => 1,
        }
    }
}
