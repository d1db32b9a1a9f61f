//! Error type for provisioning operations.
//!
//! Every variant is fatal for the current run. Tolerated failures never become
//! errors: they are reported through `StageResult::tolerated` instead.

pub type Result<T> = std::result::Result<T, ProvisionError>;

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required tools: {}", .0.join(", "))]
    MissingTools(Vec<String>),

    #[error("Command failed (exit {exit_code}): {command}: {stderr_tail}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr_tail: String,
    },

    #[error("Failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Template error: {0}")]
    Template(String),

    #[error("Artifact error: {0}")]
    Artifact(String),

    #[error("No running pod matches selector {0}")]
    PodNotFound(String),

    #[error("Package identifier for label '{label}' not found in queryinstalled output:\n{output}")]
    PackageIdNotFound { label: String, output: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProvisionError {
    /// Builds a `CommandFailed` keeping only the last stderr line, falling back to stdout.
    pub fn command_failed(command: String, exit_code: i32, stderr: &str, stdout: &str) -> Self {
        let stderr_tail = stderr
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .or_else(|| stdout.lines().rev().find(|l| !l.trim().is_empty()))
            .unwrap_or("No output available")
            .to_string();
        ProvisionError::CommandFailed {
            command,
            exit_code,
            stderr_tail,
        }
    }
}
