/// Environment teardown. Both steps tolerate absence, so destroying an
/// environment that was never started succeeds. Generated artifacts are kept.
use crate::cloud::compose;
use crate::cluster::delete_cluster;
use crate::config::OrchestratorConfig;
use crate::error::Result;
use crate::executor::{Executor, StageResult};

pub struct Teardown<'a> {
    executor: &'a Executor,
    config: &'a OrchestratorConfig,
}

impl<'a> Teardown<'a> {
    pub fn new(executor: &'a Executor, config: &'a OrchestratorConfig) -> Self {
        Self { executor, config }
    }

    pub async fn run(&self) -> Result<Vec<StageResult>> {
        tracing::info!("[Teardown] Deleting cluster '{}'", self.config.cluster.name);
        let cluster = self
            .executor
            .tolerate(&delete_cluster(&self.config.cluster.name))
            .await?;

        tracing::info!("[Teardown] Stopping LocalStack");
        let compose_file = self.config.compose_file();
        let cloud = self
            .executor
            .tolerate(&compose(compose_file.as_deref(), &["down"]))
            .await?;

        tracing::info!("[Teardown] Environment destroyed");
        Ok(vec![cluster, cloud])
    }
}
