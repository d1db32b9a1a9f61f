//! Chaincode deployment pipeline: copy, package, install, approve, commit.

use super::channel::ActiveChannel;
use super::identity::{CryptoMaterial, ExecTarget, IdentityContext, PeerCommand};
use crate::config::{ChaincodeConfig, ChaincodeLanguage, LedgerConfig, OrchestratorConfig};
use crate::error::{ProvisionError, Result};
use crate::executor::Executor;
use crate::kube;
use regex::Regex;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChaincodeDescriptor {
    pub name: String,
    pub version: String,
    pub sequence: u32,
    pub language: ChaincodeLanguage,
    pub source_path: PathBuf,
    /// Set only once `queryinstalled` output has been parsed
    pub package_id: Option<String>,
}

impl ChaincodeDescriptor {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        let cc: &ChaincodeConfig = &config.chaincode;
        Self {
            name: cc.name.clone(),
            version: cc.version.clone(),
            sequence: cc.sequence,
            language: cc.language,
            source_path: config.resolve(&cc.source_path),
            package_id: None,
        }
    }

    /// Package label, `<name>_<version>`
    pub fn label(&self) -> String {
        format!("{}_{}", self.name, self.version)
    }

    pub fn package_file(&self) -> String {
        format!("/tmp/{}.tar.gz", self.label())
    }
}

/// Extract `<name>_<version>:<hex>` from `peer lifecycle chaincode queryinstalled` output
pub fn parse_package_id(output: &str, name: &str, version: &str) -> Result<String> {
    let label = format!("{}_{}", name, version);
    let pattern = format!(r"(?:^|\s)({}:[0-9a-fA-F]+)", regex::escape(&label));
    let re = Regex::new(&pattern)
        .map_err(|e| ProvisionError::Config(format!("Invalid chaincode label {}: {}", label, e)))?;

    re.captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or(ProvisionError::PackageIdNotFound {
            label,
            output: output.to_string(),
        })
}

/// A descriptor whose package id came from a successful `queryinstalled` parse.
///
/// Approve and commit only accept this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedChaincode {
    pub descriptor: ChaincodeDescriptor,
    pub package_id: String,
}

pub struct ChaincodePipeline<'a> {
    executor: &'a Executor,
    ledger: &'a LedgerConfig,
    crypto: CryptoMaterial,
    pod_dir: String,
}

impl<'a> ChaincodePipeline<'a> {
    pub fn new(
        executor: &'a Executor,
        ledger: &'a LedgerConfig,
        chaincode: &ChaincodeConfig,
        crypto: CryptoMaterial,
    ) -> Self {
        Self {
            executor,
            ledger,
            crypto,
            pod_dir: chaincode.pod_dir.trim_end_matches('/').to_string(),
        }
    }

    fn ns(&self) -> &str {
        &self.ledger.namespace
    }

    /// Name of the running peer pod
    pub async fn resolve_peer_pod(&self) -> Result<String> {
        let result = self
            .executor
            .fatal(&kube::first_pod_name(self.ns(), &self.ledger.peer_selector))
            .await?;
        let name = result.stdout.trim().trim_matches('\'').to_string();
        if name.is_empty() {
            return Err(ProvisionError::PodNotFound(self.ledger.peer_selector.clone()));
        }
        tracing::info!("[Chaincode] Peer pod: {}", name);
        Ok(name)
    }

    /// Replace any previous copy of the source tree inside the pod
    pub async fn copy_source(&self, pod: &str, descriptor: &ChaincodeDescriptor) -> Result<()> {
        let ns = self.ns();
        self.executor
            .fatal(&kube::exec(ns, pod, ["rm", "-rf", self.pod_dir.as_str()]))
            .await?;
        self.executor
            .fatal(&kube::exec(ns, pod, ["mkdir", "-p", self.pod_dir.as_str()]))
            .await?;
        self.executor
            .fatal(&kube::copy_to_pod(
                ns,
                &descriptor.source_path.display().to_string(),
                pod,
                &self.pod_dir,
            ))
            .await?;
        Ok(())
    }

    /// Chaincode root inside the pod.
    ///
    /// Copying a directory into an existing target nests it one level down, so
    /// the manifest is probed there first.
    pub async fn detect_root(&self, pod: &str, descriptor: &ChaincodeDescriptor) -> Result<String> {
        let Some(basename) = descriptor
            .source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
        else {
            return Ok(self.pod_dir.clone());
        };

        let nested = format!("{}/{}", self.pod_dir, basename);
        let probe = format!("{}/{}", nested, descriptor.language.package_manifest());
        let result = self
            .executor
            .tolerate(&kube::exec(self.ns(), pod, ["test", "-f", probe.as_str()]))
            .await?;

        let root = if result.success() { nested } else { self.pod_dir.clone() };
        tracing::info!("[Chaincode] Source root: {}", root);
        Ok(root)
    }

    /// Run the whole lifecycle and return the descriptor with its package id
    pub async fn deploy(
        &self,
        channel: &ActiveChannel,
        mut descriptor: ChaincodeDescriptor,
    ) -> Result<ChaincodeDescriptor> {
        tracing::info!(
            "[Chaincode] Deploying {} v{} (sequence {}) to '{}'",
            descriptor.name,
            descriptor.version,
            descriptor.sequence,
            channel.name
        );

        let pod = self.resolve_peer_pod().await?;
        self.copy_source(&pod, &descriptor).await?;
        let root = self.detect_root(&pod, &descriptor).await?;

        let ns = self.ns();
        let target = ExecTarget::Pod(pod);
        let admin = IdentityContext::admin(self.ledger, &self.crypto);
        let package_file = descriptor.package_file();

        tracing::info!("[Chaincode] Packaging {}", descriptor.label());
        let package = PeerCommand::new(["lifecycle", "chaincode", "package", package_file.as_str()])
            .flag("--path", root)
            .flag("--lang", descriptor.language.as_str())
            .flag("--label", descriptor.label());
        self.executor
            .fatal(&package.invocation(ns, &target, &admin))
            .await?;

        tracing::info!("[Chaincode] Installing package");
        let install = PeerCommand::new(["lifecycle", "chaincode", "install", package_file.as_str()]);
        self.executor
            .fatal(&install.invocation(ns, &target, &admin))
            .await?;

        let query = PeerCommand::new(["lifecycle", "chaincode", "queryinstalled"]);
        let installed = self
            .executor
            .fatal(&query.invocation(ns, &target, &admin))
            .await?;
        let package_id = parse_package_id(&installed.stdout, &descriptor.name, &descriptor.version)?;
        tracing::info!("[Chaincode] Package ID: {}", package_id);
        descriptor.package_id = Some(package_id.clone());

        let resolved = ResolvedChaincode {
            descriptor,
            package_id,
        };
        self.approve(channel, &target, &resolved).await?;
        self.commit(channel, &target, &resolved).await?;

        let descriptor = resolved.descriptor;
        tracing::info!("[Chaincode] {} committed", descriptor.label());
        Ok(descriptor)
    }

    fn ordered(&self, command: PeerCommand, channel: &ActiveChannel, cc: &ResolvedChaincode) -> PeerCommand {
        command
            .flag("-o", &self.ledger.orderer_address)
            .flag("--ordererTLSHostnameOverride", &self.ledger.orderer_tls_hostname)
            .tls(&self.crypto.orderer_ca(self.ledger))
            .flag("--channelID", &channel.name)
            .flag("--name", &cc.descriptor.name)
            .flag("--version", &cc.descriptor.version)
    }

    pub async fn approve(
        &self,
        channel: &ActiveChannel,
        target: &ExecTarget,
        cc: &ResolvedChaincode,
    ) -> Result<()> {
        tracing::info!("[Chaincode] Approving for {}", self.ledger.msp_id);
        let approve = self
            .ordered(PeerCommand::new(["lifecycle", "chaincode", "approveformyorg"]), channel, cc)
            .flag("--package-id", &cc.package_id)
            .flag("--sequence", cc.descriptor.sequence.to_string());
        self.executor
            .fatal(&approve.invocation(self.ns(), target, &IdentityContext::admin(self.ledger, &self.crypto)))
            .await?;
        Ok(())
    }

    pub async fn commit(
        &self,
        channel: &ActiveChannel,
        target: &ExecTarget,
        cc: &ResolvedChaincode,
    ) -> Result<()> {
        tracing::info!("[Chaincode] Committing to '{}'", channel.name);
        let commit = self
            .ordered(PeerCommand::new(["lifecycle", "chaincode", "commit"]), channel, cc)
            .flag("--sequence", cc.descriptor.sequence.to_string())
            .flag("--peerAddresses", &self.ledger.peer_address)
            .flag("--tlsRootCertFiles", &self.crypto.peer_tls_root_cert(self.ledger));
        self.executor
            .fatal(&commit.invocation(self.ns(), target, &IdentityContext::admin(self.ledger, &self.crypto)))
            .await?;
        Ok(())
    }
}
