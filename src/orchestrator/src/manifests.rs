/// Manifest applier - applies every workload definition under the manifests root.
use crate::cluster::ClusterHandle;
use crate::error::Result;
use crate::executor::Executor;
use crate::kube;
use std::path::PathBuf;

/// Marker that the workload definitions were applied in this run
#[derive(Debug, Clone)]
pub struct AppliedWorkloads {
    pub cluster: ClusterHandle,
}

pub struct ManifestApplier<'a> {
    executor: &'a Executor,
    root: PathBuf,
}

impl<'a> ManifestApplier<'a> {
    pub fn new(executor: &'a Executor, root: PathBuf) -> Self {
        Self { executor, root }
    }

    /// One recursive apply; a partial apply is fatal
    pub async fn apply(&self, cluster: &ClusterHandle) -> Result<AppliedWorkloads> {
        tracing::info!(
            "[ManifestApplier] Applying manifests under {} to '{}'",
            self.root.display(),
            cluster.name
        );
        let root = self.root.display().to_string();
        self.executor.fatal(&kube::apply_recursive(&root)).await?;
        Ok(AppliedWorkloads {
            cluster: cluster.clone(),
        })
    }
}
