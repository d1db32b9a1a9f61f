//! Prerequisite checker
//!
//! Verifies that every external tool the pipeline shells out to can be found on
//! the search path. Runs before any stateful call, so a missing tool never
//! leaves a half-provisioned environment behind.

use crate::error::{ProvisionError, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Tools every action may invoke
pub const REQUIRED_TOOLS: &[&str] = &["docker", "docker-compose", "kind", "kubectl", "awslocal"];

/// Result of a prerequisite check
#[derive(Debug, Clone)]
pub struct PrerequisiteReport {
    pub passed: bool,
    pub checks: Vec<CheckItem>,
}

/// Individual check item
#[derive(Debug, Clone)]
pub struct CheckItem {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub fix_command: Option<String>,
}

impl PrerequisiteReport {
    pub fn missing(&self) -> Vec<String> {
        self.checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.name.clone())
            .collect()
    }

    /// Returns a formatted error message if checks failed
    pub fn error_message(&self) -> Option<String> {
        if self.passed {
            return None;
        }

        let mut msg = String::from(
            "\n╔════════════════════════════════════════════════════════════════╗\n\
             ║  EcoFoodChain - Required Tools Missing                         ║\n\
             ╚════════════════════════════════════════════════════════════════╝\n\n",
        );

        for (i, check) in self.checks.iter().filter(|c| !c.passed).enumerate() {
            msg.push_str(&format!("  {}. {} - {}\n", i + 1, check.name, check.message));
            if let Some(fix) = &check.fix_command {
                msg.push_str(&format!("     Fix: {}\n", fix));
            }
            msg.push('\n');
        }

        Some(msg)
    }
}

/// Resolves tools against a search path (defaults to `$PATH`)
#[derive(Debug, Clone, Default)]
pub struct PrerequisiteChecker {
    search_path: Option<OsString>,
}

impl PrerequisiteChecker {
    pub fn from_env() -> Self {
        Self {
            search_path: std::env::var_os("PATH"),
        }
    }

    pub fn with_search_path(search_path: impl Into<OsString>) -> Self {
        Self {
            search_path: Some(search_path.into()),
        }
    }

    pub fn inspect(&self, tools: &[&str]) -> PrerequisiteReport {
        let checks: Vec<CheckItem> = tools.iter().map(|tool| self.check_tool(tool)).collect();
        let passed = checks.iter().all(|c| c.passed);
        PrerequisiteReport { passed, checks }
    }

    /// Fail fast if any tool is unresolvable
    pub fn check(&self, tools: &[&str]) -> Result<()> {
        tracing::info!("Checking prerequisites...");
        let report = self.inspect(tools);
        if let Some(msg) = report.error_message() {
            tracing::error!("{}", msg);
            return Err(ProvisionError::MissingTools(report.missing()));
        }
        tracing::info!("Prerequisites OK.");
        Ok(())
    }

    pub fn resolve(&self, tool: &str) -> Option<PathBuf> {
        let search_path = self.search_path.as_ref()?;
        std::env::split_paths(search_path)
            .map(|dir| dir.join(tool))
            .find(|candidate| is_executable(candidate))
    }

    fn check_tool(&self, tool: &str) -> CheckItem {
        match self.resolve(tool) {
            Some(path) => CheckItem {
                name: tool.to_string(),
                passed: true,
                message: format!("Found at {}", path.display()),
                fix_command: None,
            },
            None => CheckItem {
                name: tool.to_string(),
                passed: false,
                message: "not found on PATH".to_string(),
                fix_command: install_hint(tool).map(str::to_string),
            },
        }
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file() || path.with_extension("exe").is_file()
}

fn install_hint(tool: &str) -> Option<&'static str> {
    match tool {
        "docker" => Some("https://docs.docker.com/engine/install/"),
        "docker-compose" => Some("https://docs.docker.com/compose/install/"),
        "kind" => Some("go install sigs.k8s.io/kind@latest"),
        "kubectl" => Some("https://kubernetes.io/docs/tasks/tools/"),
        "awslocal" => Some("pip install awscli-local"),
        _ => None,
    }
}
