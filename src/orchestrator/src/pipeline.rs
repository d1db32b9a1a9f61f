/// Top-level action dispatch and the ordered start pipeline.
///
/// Each stage hands the next one the token it needs (artifact set, cluster
/// handle, applied workloads, settled ports, active channel), so the order is
/// enforced by the data flowing between them. A fatal error stops the run at
/// the failing stage; nothing is rolled back.
use crate::artifacts::{ArtifactGenerator, ArtifactSet};
use crate::cloud::CloudProvisioner;
use crate::cluster::ClusterManager;
use crate::config::OrchestratorConfig;
use crate::error::Result;
use crate::executor::{CommandRunner, Executor};
use crate::ingress::IngressBootstrap;
use crate::ledger::{
    ActiveChannel, ChaincodeDescriptor, ChaincodePipeline, ChannelBootstrap, CryptoMaterial,
    DeadlockRecovery,
};
use crate::manifests::ManifestApplier;
use crate::prereq::{PrerequisiteChecker, REQUIRED_TOOLS};
use crate::teardown::Teardown;
use std::sync::Arc;

/// What the operator asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Action {
    /// Provision and bootstrap everything, then hold the ingress tunnel open
    Start,
    /// Delete the cluster and stop the emulated cloud stack
    Destroy,
    /// Redeploy chaincode onto an already bootstrapped channel
    #[value(name = "deploy-cc")]
    DeployChaincode,
}

/// Named steps of the start pipeline, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CloudResources,
    Artifacts,
    Cluster,
    Images,
    Manifests,
    DeadlockRecovery,
    Channel,
    Chaincode,
    Ingress,
}

pub const START_STAGES: &[Stage] = &[
    Stage::CloudResources,
    Stage::Artifacts,
    Stage::Cluster,
    Stage::Images,
    Stage::Manifests,
    Stage::DeadlockRecovery,
    Stage::Channel,
    Stage::Chaincode,
    Stage::Ingress,
];

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::CloudResources => "cloud resources",
            Stage::Artifacts => "ledger artifacts",
            Stage::Cluster => "cluster",
            Stage::Images => "workload images",
            Stage::Manifests => "workload manifests",
            Stage::DeadlockRecovery => "ledger restart recovery",
            Stage::Channel => "channel bootstrap",
            Stage::Chaincode => "chaincode deployment",
            Stage::Ingress => "ingress",
        }
    }
}

/// Logs stage boundaries with position and elapsed time
struct StageProgress {
    total: usize,
    current: usize,
    started: std::time::Instant,
}

impl StageProgress {
    fn new(total: usize) -> Self {
        Self {
            total,
            current: 0,
            started: std::time::Instant::now(),
        }
    }

    fn begin(&mut self, stage: Stage) {
        self.current += 1;
        self.started = std::time::Instant::now();
        tracing::info!("[{}/{}] {}", self.current, self.total, stage.name());
    }

    fn end(&self, stage: Stage) {
        tracing::info!(
            "[TIMING] Stage {} completed in {}ms",
            stage.name(),
            self.started.elapsed().as_millis()
        );
    }
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    executor: Executor,
    checker: PrerequisiteChecker,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let executor = Executor::new(runner, config.overlay());
        Self {
            config,
            executor,
            checker: PrerequisiteChecker::from_env(),
        }
    }

    /// Replace the `$PATH`-based tool lookup
    pub fn with_checker(mut self, checker: PrerequisiteChecker) -> Self {
        self.checker = checker;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run one action. Prerequisites are checked before any external call.
    pub async fn run(&self, action: Action) -> Result<()> {
        self.checker.check(REQUIRED_TOOLS)?;

        let started = std::time::Instant::now();
        match action {
            Action::Start => self.start().await?,
            Action::Destroy => {
                Teardown::new(&self.executor, &self.config).run().await?;
            }
            Action::DeployChaincode => {
                let channel = ActiveChannel::assume_existing(&self.config.ledger.channel);
                let artifacts = self.artifact_generator().layout();
                self.deploy_chaincode(&channel, &artifacts).await?;
            }
        }
        tracing::info!(
            "[TIMING] {:?} finished in {}ms",
            action,
            started.elapsed().as_millis()
        );
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        let config = &self.config;
        let executor = &self.executor;
        let mut progress = StageProgress::new(START_STAGES.len());

        progress.begin(Stage::CloudResources);
        CloudProvisioner::new(executor, config).provision().await?;
        progress.end(Stage::CloudResources);

        progress.begin(Stage::Artifacts);
        let artifacts = self.artifact_generator().generate().await?;
        progress.end(Stage::Artifacts);

        progress.begin(Stage::Cluster);
        let clusters = ClusterManager::new(executor, config)?;
        let cluster = clusters.ensure(&artifacts).await?;
        progress.end(Stage::Cluster);

        progress.begin(Stage::Images);
        clusters.load_images(&cluster).await?;
        progress.end(Stage::Images);

        progress.begin(Stage::Manifests);
        let workloads = ManifestApplier::new(executor, config.resolve(&config.cluster.manifests_dir))
            .apply(&cluster)
            .await?;
        progress.end(Stage::Manifests);

        progress.begin(Stage::DeadlockRecovery);
        let ports = DeadlockRecovery::new(executor, &config.ledger, &config.timing)
            .run(&workloads)
            .await?;
        progress.end(Stage::DeadlockRecovery);

        progress.begin(Stage::Channel);
        let channel = ChannelBootstrap::new(executor, &config.ledger, &config.timing)
            .run(&artifacts, &ports)
            .await?;
        progress.end(Stage::Channel);

        progress.begin(Stage::Chaincode);
        self.deploy_chaincode(&channel, &artifacts).await?;
        progress.end(Stage::Chaincode);

        progress.begin(Stage::Ingress);
        IngressBootstrap::new(executor, &config.ingress, &config.timing)
            .run()
            .await?;
        progress.end(Stage::Ingress);

        Ok(())
    }

    fn artifact_generator(&self) -> ArtifactGenerator<'_> {
        ArtifactGenerator::new(
            &self.executor,
            &self.config.artifacts,
            &self.config.ledger,
            self.config.resolve(&self.config.artifacts.root),
        )
    }

    async fn deploy_chaincode(
        &self,
        channel: &ActiveChannel,
        artifacts: &ArtifactSet,
    ) -> Result<ChaincodeDescriptor> {
        ChaincodePipeline::new(
            &self.executor,
            &self.config.ledger,
            &self.config.chaincode,
            CryptoMaterial::from_artifacts(artifacts),
        )
        .deploy(channel, ChaincodeDescriptor::from_config(&self.config))
        .await
    }
}
