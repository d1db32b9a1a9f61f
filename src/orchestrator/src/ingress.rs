/// Ingress controller install and the blocking local tunnel.
use crate::config::{IngressConfig, TimingConfig};
use crate::error::Result;
use crate::executor::Executor;
use crate::kube;

pub struct IngressBootstrap<'a> {
    executor: &'a Executor,
    ingress: &'a IngressConfig,
    timing: &'a TimingConfig,
}

impl<'a> IngressBootstrap<'a> {
    pub fn new(executor: &'a Executor, ingress: &'a IngressConfig, timing: &'a TimingConfig) -> Self {
        Self {
            executor,
            ingress,
            timing,
        }
    }

    /// Apply the controller manifest and wait for it; both tolerated
    pub async fn install(&self) -> Result<()> {
        tracing::info!("[Ingress] Installing controller from {}", self.ingress.manifest_url);
        self.executor
            .tolerate(&kube::apply(&self.ingress.manifest_url))
            .await?;

        tracing::info!("[Ingress] Waiting for controller readiness...");
        let ready = self
            .executor
            .tolerate(&kube::wait_ready(
                &self.ingress.namespace,
                &self.ingress.controller_selector,
                self.timing.ingress_timeout(),
            ))
            .await?;
        if ready.tolerated {
            tracing::warn!("[Ingress] Controller not ready yet, opening tunnel anyway");
        }
        Ok(())
    }

    /// Block on the port-forward until it exits; a non-zero exit is fatal
    pub async fn tunnel(&self) -> Result<()> {
        tracing::info!(
            "[Ingress] Forwarding {} ({}), press Ctrl+C to stop",
            self.ingress.service,
            self.ingress.port_mapping
        );
        self.executor
            .foreground(&kube::port_forward(
                &self.ingress.namespace,
                &self.ingress.service,
                &self.ingress.port_mapping,
            ))
            .await
    }

    pub async fn run(&self) -> Result<()> {
        self.install().await?;
        self.tunnel().await
    }
}
