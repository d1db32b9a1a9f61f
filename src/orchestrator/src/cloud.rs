/// Emulated cloud (LocalStack) stack and resource provisioning.
///
/// Resources are ensured, not created: each create call tolerates failure, so
/// an existing bucket, repository or secret is left exactly as it is.
use crate::config::{CloudConfig, OrchestratorConfig, TimingConfig};
use crate::error::{ProvisionError, Result};
use crate::executor::{settle, Executor, Invocation, StageResult};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Structured credential stored in the secrets manager
#[derive(Debug, Serialize)]
struct DbCredentials<'a> {
    username: &'a str,
    password: &'a str,
}

/// `docker-compose [-f file] <subcommand...>`
pub fn compose(compose_file: Option<&Path>, subcommand: &[&str]) -> Invocation {
    let mut invocation = Invocation::new("docker-compose");
    if let Some(file) = compose_file {
        invocation = invocation.arg("-f").arg(file.display().to_string());
    }
    invocation.args(subcommand.iter().copied())
}

pub struct CloudProvisioner<'a> {
    executor: &'a Executor,
    cloud: &'a CloudConfig,
    timing: &'a TimingConfig,
    compose_file: Option<PathBuf>,
}

impl<'a> CloudProvisioner<'a> {
    pub fn new(executor: &'a Executor, config: &'a OrchestratorConfig) -> Self {
        Self {
            executor,
            cloud: &config.cloud,
            timing: &config.timing,
            compose_file: config.compose_file(),
        }
    }

    /// Bring the emulated cloud stack up and give it time to accept API calls
    pub async fn start_stack(&self) -> Result<()> {
        tracing::info!("[CloudProvisioner] Starting LocalStack...");
        self.executor
            .fatal(&compose(self.compose_file.as_deref(), &["up", "-d"]))
            .await?;
        settle("LocalStack availability", self.timing.cloud_settle()).await;
        Ok(())
    }

    pub fn resource_invocations(&self) -> Result<Vec<(String, Invocation)>> {
        let secret = serde_json::to_string(&DbCredentials {
            username: &self.cloud.db_username,
            password: &self.cloud.db_password,
        })
        .map_err(|e| ProvisionError::Config(format!("Failed to encode secret payload: {}", e)))?;

        Ok(vec![
            (
                format!("S3 bucket '{}'", self.cloud.bucket),
                Invocation::new("awslocal")
                    .args(["s3", "mb"])
                    .arg(format!("s3://{}", self.cloud.bucket)),
            ),
            (
                format!("ECR repository '{}'", self.cloud.repository),
                Invocation::new("awslocal")
                    .args(["ecr", "create-repository", "--repository-name"])
                    .arg(&self.cloud.repository),
            ),
            (
                format!("secret '{}'", self.cloud.secret_name),
                Invocation::new("awslocal")
                    .args(["secretsmanager", "create-secret", "--name"])
                    .arg(&self.cloud.secret_name)
                    .arg("--secret-string")
                    .arg(secret),
            ),
        ])
    }

    /// Ensure every resource exists; "already exists" is success
    pub async fn ensure_resources(&self) -> Result<Vec<StageResult>> {
        tracing::info!("[CloudProvisioner] Provisioning AWS resources (idempotent)...");
        let mut results = Vec::new();
        for (label, invocation) in self.resource_invocations()? {
            tracing::info!("[CloudProvisioner] Ensure {} exists", label);
            results.push(self.executor.tolerate(&invocation).await?);
        }
        Ok(results)
    }

    pub async fn provision(&self) -> Result<Vec<StageResult>> {
        self.start_stack().await?;
        self.ensure_resources().await
    }
}
