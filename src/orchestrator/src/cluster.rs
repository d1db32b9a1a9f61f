/// Cluster lifecycle manager - kind cluster existence, creation and image loading.
use crate::artifacts::ArtifactSet;
use crate::config::{ClusterConfig, ImageSource, ImageSpec, OrchestratorConfig};
use crate::error::{ProvisionError, Result};
use crate::executor::{Executor, Invocation};
use crate::templates::{TemplateRenderer, KIND_CLUSTER};
use std::io::Write;
use tera::Context;

/// Reference to the kind cluster by name. Existence is always re-queried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterHandle {
    pub name: String,
}

impl ClusterHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

pub fn get_clusters() -> Invocation {
    Invocation::new("kind").args(["get", "clusters"])
}

pub fn delete_cluster(name: &str) -> Invocation {
    Invocation::new("kind").args(["delete", "cluster", "--name", name])
}

pub struct ClusterManager<'a> {
    executor: &'a Executor,
    config: &'a OrchestratorConfig,
    renderer: TemplateRenderer,
}

impl<'a> ClusterManager<'a> {
    pub fn new(executor: &'a Executor, config: &'a OrchestratorConfig) -> Result<Self> {
        Ok(Self {
            executor,
            config,
            renderer: TemplateRenderer::from_embedded()?,
        })
    }

    fn cluster(&self) -> &ClusterConfig {
        &self.config.cluster
    }

    pub fn handle(&self) -> ClusterHandle {
        ClusterHandle::new(&self.cluster().name)
    }

    /// Whether `kind get clusters` lists the cluster by exact name
    pub async fn exists(&self, handle: &ClusterHandle) -> Result<bool> {
        let result = self.executor.tolerate(&get_clusters()).await?;
        if !result.success() {
            tracing::warn!(
                "[ClusterManager] Could not list clusters, assuming '{}' is absent",
                handle.name
            );
            return Ok(false);
        }
        Ok(result.stdout.lines().any(|line| line.trim() == handle.name))
    }

    /// Render the kind configuration mounting the artifact root into the node
    pub fn render_config(&self, artifacts: &ArtifactSet) -> Result<String> {
        let host_path = std::fs::canonicalize(&artifacts.root).map_err(|e| {
            ProvisionError::Artifact(format!(
                "Artifact root {} is not available for mounting: {}",
                artifacts.root.display(),
                e
            ))
        })?;

        let mut context = Context::new();
        context.insert("cluster_name", &self.cluster().name);
        context.insert("artifacts_host_path", &host_path.display().to_string());
        context.insert("artifacts_mount", &artifacts.cluster_mount);
        let socket = if self.cluster().mount_runtime_socket {
            self.cluster().runtime_socket.display().to_string()
        } else {
            String::new()
        };
        context.insert("runtime_socket", &socket);

        self.renderer.render_with_context(KIND_CLUSTER, &context)
    }

    /// Create the cluster unless it already exists
    pub async fn ensure(&self, artifacts: &ArtifactSet) -> Result<ClusterHandle> {
        let handle = self.handle();

        if self.exists(&handle).await? {
            tracing::info!("[ClusterManager] Cluster '{}' already active.", handle.name);
            return Ok(handle);
        }

        let rendered = self.render_config(artifacts)?;

        // Removed when dropped, whether or not the create succeeds
        let mut config_file = tempfile::Builder::new()
            .prefix("kind-config-")
            .suffix(".yaml")
            .tempfile()?;
        config_file.write_all(rendered.as_bytes())?;
        config_file.flush()?;

        tracing::info!(
            "[ClusterManager] Creating cluster '{}' from {}",
            handle.name,
            config_file.path().display()
        );

        let create = Invocation::new("kind")
            .args(["create", "cluster", "--name"])
            .arg(&handle.name)
            .arg("--config")
            .arg(config_file.path().display().to_string());
        let outcome = self.executor.fatal(&create).await;

        if let Err(e) = config_file.close() {
            tracing::warn!("[ClusterManager] Failed to remove kind config: {}", e);
        }

        outcome?;
        Ok(handle)
    }

    pub fn image_invocations(&self, handle: &ClusterHandle, image: &ImageSpec) -> Vec<Invocation> {
        let acquire = match &image.source {
            ImageSource::Build {
                context,
                dockerfile,
            } => {
                let mut build = Invocation::new("docker").args(["build", "-t"]).arg(&image.tag);
                if let Some(dockerfile) = dockerfile {
                    build = build
                        .arg("-f")
                        .arg(self.config.resolve(dockerfile).display().to_string());
                }
                build.arg(self.config.resolve(context).display().to_string())
            }
            ImageSource::Pull => Invocation::new("docker").args(["pull"]).arg(&image.tag),
        };

        let load = Invocation::new("kind")
            .args(["load", "docker-image"])
            .arg(&image.tag)
            .arg("--name")
            .arg(&handle.name);

        vec![acquire, load]
    }

    /// Build (or pull) every workload image and load it into the cluster
    pub async fn load_images(&self, handle: &ClusterHandle) -> Result<()> {
        let images = &self.cluster().images;
        for (index, image) in images.iter().enumerate() {
            tracing::info!(
                "[ClusterManager] Image {}/{}: {}",
                index + 1,
                images.len(),
                image.tag
            );
            let started = std::time::Instant::now();
            for invocation in self.image_invocations(handle, image) {
                self.executor.fatal(&invocation).await?;
            }
            tracing::info!(
                "[TIMING] Image {} loaded in {}ms",
                image.tag,
                started.elapsed().as_millis()
            );
        }
        Ok(())
    }
}
