//! Fabric identity material and channel bootstrap artifacts.
//!
//! The generator wipes any previous output before running the toolchain, so a
//! rerun never mixes identities or transactions from two runs.

use crate::config::{ArtifactsConfig, LedgerConfig};
use crate::error::{ProvisionError, Result};
use crate::executor::{shell_script, Executor, Invocation};
use std::path::{Path, PathBuf};

pub const CRYPTO_DIR: &str = "crypto-config";
pub const CHANNEL_ARTIFACTS_DIR: &str = "channel-artifacts";
pub const GENESIS_BLOCK: &str = "genesis.block";
pub const CHANNEL_TX: &str = "channel.tx";
pub const CRYPTO_CONFIG_INPUT: &str = "crypto-config.yaml";
pub const CONFIGTX_INPUT: &str = "configtx.yaml";

/// Mount point of the artifact root inside the toolchain container
const TOOLCHAIN_WORKDIR: &str = "/work";

/// Generated artifact layout.
///
/// Host paths are what the generator writes; [`ArtifactSet::cluster_path`]
/// maps them to where the ledger pods see them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSet {
    pub root: PathBuf,
    pub cluster_mount: String,
    pub crypto_material_dir: PathBuf,
    pub genesis_block_path: PathBuf,
    pub channel_tx_path: PathBuf,
    pub anchor_tx_path: PathBuf,
}

impl ArtifactSet {
    pub fn layout(root: &Path, cluster_mount: &str, anchor_tx_name: &str) -> Self {
        let channel_dir = root.join(CHANNEL_ARTIFACTS_DIR);
        Self {
            root: root.to_path_buf(),
            cluster_mount: cluster_mount.trim_end_matches('/').to_string(),
            crypto_material_dir: root.join(CRYPTO_DIR),
            genesis_block_path: channel_dir.join(GENESIS_BLOCK),
            channel_tx_path: channel_dir.join(CHANNEL_TX),
            anchor_tx_path: channel_dir.join(anchor_tx_name),
        }
    }

    pub fn channel_artifacts_dir(&self) -> PathBuf {
        self.root.join(CHANNEL_ARTIFACTS_DIR)
    }

    /// Path of a generated file as mounted inside the cluster
    pub fn cluster_path(&self, host_path: &Path) -> String {
        let relative = host_path.strip_prefix(&self.root).unwrap_or(host_path);
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/{}", self.cluster_mount, relative)
    }

    /// Every generated output exists
    pub fn verify(&self) -> Result<()> {
        let expected = [
            &self.crypto_material_dir,
            &self.genesis_block_path,
            &self.channel_tx_path,
            &self.anchor_tx_path,
        ];
        let missing: Vec<String> = expected
            .iter()
            .filter(|p| !p.exists())
            .map(|p| p.display().to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ProvisionError::Artifact(format!(
                "Toolchain finished but outputs are missing: {}",
                missing.join(", ")
            )))
        }
    }
}

pub struct ArtifactGenerator<'a> {
    executor: &'a Executor,
    config: &'a ArtifactsConfig,
    ledger: &'a LedgerConfig,
    root: PathBuf,
}

impl<'a> ArtifactGenerator<'a> {
    pub fn new(
        executor: &'a Executor,
        config: &'a ArtifactsConfig,
        ledger: &'a LedgerConfig,
        root: PathBuf,
    ) -> Self {
        Self {
            executor,
            config,
            ledger,
            root,
        }
    }

    pub fn layout(&self) -> ArtifactSet {
        ArtifactSet::layout(&self.root, &self.config.cluster_mount, &self.ledger.anchor_tx_name)
    }

    /// Delete previous output and recreate an empty channel-artifacts directory
    pub fn reset(&self) -> Result<()> {
        for dir in [CRYPTO_DIR, CHANNEL_ARTIFACTS_DIR] {
            let path = self.root.join(dir);
            match std::fs::remove_dir_all(&path) {
                Ok(()) => tracing::info!("[ArtifactGenerator] Removed stale {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(ProvisionError::Artifact(format!(
                        "Failed to remove {}: {}",
                        path.display(),
                        e
                    )))
                }
            }
        }
        std::fs::create_dir_all(self.root.join(CHANNEL_ARTIFACTS_DIR))?;
        Ok(())
    }

    /// The single containerized toolchain run
    pub fn toolchain_invocation(&self, host_root: &Path) -> Invocation {
        let set = self.layout();
        let anchor = set
            .anchor_tx_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.ledger.anchor_tx_name.clone());
        let out = |name: &str| format!("./{}/{}", CHANNEL_ARTIFACTS_DIR, name);

        let steps: Vec<Vec<String>> = vec![
            vec![
                "cryptogen".into(),
                "generate".into(),
                format!("--config=./{}", CRYPTO_CONFIG_INPUT),
                format!("--output={}", CRYPTO_DIR),
            ],
            vec![
                "configtxgen".into(),
                "-profile".into(),
                self.config.genesis_profile.clone(),
                "-channelID".into(),
                self.config.system_channel.clone(),
                "-outputBlock".into(),
                out(GENESIS_BLOCK),
            ],
            vec![
                "configtxgen".into(),
                "-profile".into(),
                self.config.channel_profile.clone(),
                "-outputCreateChannelTx".into(),
                out(CHANNEL_TX),
                "-channelID".into(),
                self.ledger.channel.clone(),
            ],
            vec![
                "configtxgen".into(),
                "-profile".into(),
                self.config.channel_profile.clone(),
                "-outputAnchorPeersTx".into(),
                out(&anchor),
                "-channelID".into(),
                self.ledger.channel.clone(),
                "-asOrg".into(),
                self.ledger.msp_id.clone(),
            ],
        ];

        let mut run = Invocation::new("docker").args(["run", "--rm"]);
        if let Some(owner) = host_owner(host_root) {
            run = run.arg("--user").arg(owner);
        }
        run.arg("-v")
            .arg(format!("{}:{}", host_root.display(), TOOLCHAIN_WORKDIR))
            .args(["-w", TOOLCHAIN_WORKDIR, "-e"])
            .arg(format!("FABRIC_CFG_PATH={}", TOOLCHAIN_WORKDIR))
            .arg(&self.config.toolchain_image)
            .args(["sh", "-c"])
            .arg(shell_script(&steps))
    }

    pub async fn generate(&self) -> Result<ArtifactSet> {
        for input in [CRYPTO_CONFIG_INPUT, CONFIGTX_INPUT] {
            let path = self.root.join(input);
            if !path.is_file() {
                return Err(ProvisionError::Artifact(format!(
                    "Toolchain input {} not found",
                    path.display()
                )));
            }
        }

        self.reset()?;

        // docker needs an absolute bind-mount source
        let host_root = std::fs::canonicalize(&self.root)?;
        tracing::info!(
            "[ArtifactGenerator] Generating crypto material and channel artifacts in {}",
            host_root.display()
        );
        self.executor
            .fatal(&self.toolchain_invocation(&host_root))
            .await?;

        let set = self.layout();
        set.verify()?;
        tracing::info!("[ArtifactGenerator] Artifacts ready");
        Ok(set)
    }
}

/// `uid:gid` owning the artifact root; the toolchain container writes as this user
#[cfg(unix)]
fn host_owner(path: &Path) -> Option<String> {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata(path)
        .ok()
        .map(|meta| format!("{}:{}", meta.uid(), meta.gid()))
}

#[cfg(not(unix))]
fn host_owner(_path: &Path) -> Option<String> {
    None
}
