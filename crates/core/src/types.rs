use thiserror::Error;

/// The main error type for runall operations
#[derive(Debug, Error)]
pub enum RunAllError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Registry error: {0}")]
    Registry(String),

    /// A pattern matched none of the known task names
    #[error("Task not found: \"{pattern}\"")]
    PatternResolution { pattern: String },

    /// The run policy or a task-list override is self-contradictory
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    /// A resolved task could not be started
    #[error("Launch error: {0}")]
    Launch(String),

    /// A task finished unsuccessfully; `code` is the representative exit code
    #[error("Task '{task}' failed with exit code {code}")]
    TaskExit { task: String, code: i32 },

    #[error("Task join error: {0}")]
    Join(String),
}

/// Result type alias for runall operations
pub type RunAllResult<T> = Result<T, RunAllError>;
