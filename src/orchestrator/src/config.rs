/// Orchestrator configuration
/// Loaded from ecofood.toml; every field falls back to the values the
/// EcoFoodChain demo environment was built around.
use crate::error::{ProvisionError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "ecofood.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Directory that relative paths (manifests, build contexts, artifacts) resolve against
    pub project_dir: PathBuf,
    pub cloud: CloudConfig,
    pub cluster: ClusterConfig,
    pub artifacts: ArtifactsConfig,
    pub ledger: LedgerConfig,
    pub chaincode: ChaincodeConfig,
    pub ingress: IngressConfig,
    pub timing: TimingConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            project_dir: PathBuf::from("."),
            cloud: CloudConfig::default(),
            cluster: ClusterConfig::default(),
            artifacts: ArtifactsConfig::default(),
            ledger: LedgerConfig::default(),
            chaincode: ChaincodeConfig::default(),
            ingress: IngressConfig::default(),
            timing: TimingConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration. An explicit path must exist; otherwise `ecofood.toml`
    /// in the working directory is used when present, else the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ProvisionError::Config(format!(
                    "Config file {:?} does not exist",
                    path
                )));
            }
            return Self::from_file(path);
        }

        let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
        if default_path.exists() {
            return Self::from_file(&default_path);
        }

        tracing::warn!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
        Ok(Self::default())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProvisionError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        let config = Self::from_toml_str(&content).map_err(|e| {
            ProvisionError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;
        tracing::info!("Loaded orchestrator config from {:?}", path);
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Resolve a project-relative path
    pub fn resolve(&self, relative: impl AsRef<Path>) -> PathBuf {
        let relative = relative.as_ref();
        if relative.is_absolute() {
            relative.to_path_buf()
        } else {
            self.project_dir.join(relative)
        }
    }

    /// Compose file of the emulated cloud stack, resolved against `project_dir`
    pub fn compose_file(&self) -> Option<PathBuf> {
        self.cloud.compose_file.as_ref().map(|f| self.resolve(f))
    }

    pub fn overlay(&self) -> EnvironmentOverlay {
        EnvironmentOverlay::from_cloud(&self.cloud)
    }
}

/// Emulated cloud (LocalStack) endpoint, credentials and resources
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    pub endpoint_url: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Compose file for the emulated cloud stack; docker-compose's own lookup when unset
    pub compose_file: Option<PathBuf>,
    pub bucket: String,
    pub repository: String,
    pub secret_name: String,
    pub db_username: String,
    pub db_password: String,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            endpoint_url: "http://localhost:4566".to_string(),
            region: "eu-central-1".to_string(),
            access_key_id: "test".to_string(),
            secret_access_key: "test".to_string(),
            compose_file: None,
            bucket: "ecofood-backup".to_string(),
            repository: "metaverso".to_string(),
            secret_name: "EcoFoodChain/Prod/DBCredentials".to_string(),
            db_username: "postgres".to_string(),
            db_password: "securepassword123".to_string(),
        }
    }
}

/// kind cluster and workload images
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub name: String,
    /// Root of the declarative workload definitions, applied recursively
    pub manifests_dir: PathBuf,
    /// Mount the host docker socket into the control-plane node
    pub mount_runtime_socket: bool,
    pub runtime_socket: PathBuf,
    pub images: Vec<ImageSpec>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            name: "ecofood-cluster".to_string(),
            manifests_dir: PathBuf::from("k8s"),
            mount_runtime_socket: true,
            runtime_socket: PathBuf::from("/var/run/docker.sock"),
            images: default_images(),
        }
    }
}

/// A workload image loaded into the cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSpec {
    pub tag: String,
    #[serde(flatten)]
    pub source: ImageSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum ImageSource {
    /// Built locally from a context directory
    Build {
        context: PathBuf,
        #[serde(default)]
        dockerfile: Option<PathBuf>,
    },
    /// Third-party image pulled from its registry
    Pull,
}

impl ImageSpec {
    pub fn build(tag: &str, context: &str) -> Self {
        Self {
            tag: tag.to_string(),
            source: ImageSource::Build {
                context: PathBuf::from(context),
                dockerfile: None,
            },
        }
    }

    pub fn build_with_dockerfile(tag: &str, context: &str, dockerfile: &str) -> Self {
        Self {
            tag: tag.to_string(),
            source: ImageSource::Build {
                context: PathBuf::from(context),
                dockerfile: Some(PathBuf::from(dockerfile)),
            },
        }
    }

    pub fn pull(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            source: ImageSource::Pull,
        }
    }
}

fn default_images() -> Vec<ImageSpec> {
    vec![
        ImageSpec::build("ecofoodchain/frontend:latest", "microservices/frontend"),
        ImageSpec::build("ecofoodchain/metaverso:latest", "microservices/metaverso"),
        ImageSpec::build(
            "ecofoodchain/filiera-frontend:latest",
            "microservices/filiera360/frontend",
        ),
        ImageSpec::build(
            "ecofoodchain/filiera-backend:latest",
            "microservices/filiera360/backend",
        ),
        ImageSpec::build(
            "ecofoodchain/filiera-middleware:latest",
            "microservices/filiera360/blockchain/chaincode/myapp",
        ),
        ImageSpec::pull("mongo:5.0"),
        ImageSpec::build(
            "ecofoodchain/refood-frontend:latest",
            "microservices/refood/frontend",
        ),
        ImageSpec::build(
            "ecofoodchain/refood-backend:latest",
            "microservices/refood/backend",
        ),
        ImageSpec::build("ecofoodchain/refood-db:latest", "microservices/refood"),
        ImageSpec::build("ecofoodchain/buildform4:latest", "microservices/buildform4"),
        ImageSpec::build_with_dockerfile(
            "ecofoodchain/chatbot-frontend:latest",
            "microservices/chatbot",
            "microservices/chatbot/Dockerfile.frontend",
        ),
        ImageSpec::build_with_dockerfile(
            "ecofoodchain/chatbot-backend:latest",
            "microservices/chatbot",
            "microservices/chatbot/Dockerfile.backend",
        ),
    ]
}

/// Fabric crypto material and channel artifacts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    /// Host directory holding crypto-config.yaml, configtx.yaml and the generated output
    pub root: PathBuf,
    /// Where `root` is mounted inside the cluster node and the ledger pods
    pub cluster_mount: String,
    pub toolchain_image: String,
    pub genesis_profile: String,
    pub channel_profile: String,
    pub system_channel: String,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("fabric"),
            cluster_mount: "/fabric".to_string(),
            toolchain_image: "hyperledger/fabric-tools:2.5".to_string(),
            genesis_profile: "TwoOrgsOrdererGenesis".to_string(),
            channel_profile: "TwoOrgsChannel".to_string(),
            system_channel: "system-channel".to_string(),
        }
    }
}

/// Ledger workloads and identities.
///
/// MSP directories and TLS certificates are relative to the generated crypto
/// material and are mapped onto the cluster mount at use. Absolute paths are
/// used as given.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub namespace: String,
    pub channel: String,
    pub msp_id: String,
    pub peer_deployment: String,
    pub peer_selector: String,
    pub peer_address: String,
    pub orderer_deployment: String,
    pub orderer_selector: String,
    pub orderer_address: String,
    pub orderer_tls_hostname: String,
    pub peer_msp_path: String,
    pub admin_msp_path: String,
    pub orderer_ca_file: String,
    pub peer_tls_root_cert: String,
    pub anchor_tx_name: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        let org = "peerOrganizations/org1.example.com";
        Self {
            namespace: "default".to_string(),
            channel: "mychannel".to_string(),
            msp_id: "Org1MSP".to_string(),
            peer_deployment: "peer0-org1".to_string(),
            peer_selector: "app=peer0-org1".to_string(),
            peer_address: "peer0-org1:7051".to_string(),
            orderer_deployment: "orderer".to_string(),
            orderer_selector: "app=orderer".to_string(),
            orderer_address: "orderer:7050".to_string(),
            orderer_tls_hostname: "orderer.example.com".to_string(),
            peer_msp_path: format!("{}/peers/peer0.org1.example.com/msp", org),
            admin_msp_path: format!("{}/users/Admin@org1.example.com/msp", org),
            orderer_ca_file: "ordererOrganizations/example.com/orderers/orderer.example.com/msp/tlscacerts/tlsca.example.com-cert.pem".to_string(),
            peer_tls_root_cert: format!("{}/peers/peer0.org1.example.com/tls/ca.crt", org),
            anchor_tx_name: "Org1MSPanchors.tx".to_string(),
        }
    }
}

/// Chaincode source and lifecycle parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChaincodeConfig {
    pub name: String,
    pub version: String,
    pub sequence: u32,
    pub language: ChaincodeLanguage,
    pub source_path: PathBuf,
    /// Directory inside the peer pod the source tree is copied to
    pub pod_dir: String,
}

impl Default for ChaincodeConfig {
    fn default() -> Self {
        Self {
            name: "filiera360".to_string(),
            version: "1.0".to_string(),
            sequence: 1,
            language: ChaincodeLanguage::Golang,
            source_path: PathBuf::from("microservices/filiera360/blockchain/chaincode/filiera360"),
            pod_dir: "/opt/gopath/src/github.com/chaincode/filiera360".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChaincodeLanguage {
    #[default]
    Golang,
    Node,
}

impl ChaincodeLanguage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChaincodeLanguage::Golang => "golang",
            ChaincodeLanguage::Node => "node",
        }
    }

    /// File whose presence marks a chaincode source root
    pub fn package_manifest(&self) -> &'static str {
        match self {
            ChaincodeLanguage::Golang => "go.mod",
            ChaincodeLanguage::Node => "package.json",
        }
    }
}

/// Ingress controller and the local tunnel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngressConfig {
    pub manifest_url: String,
    pub namespace: String,
    pub controller_selector: String,
    pub service: String,
    pub port_mapping: String,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            manifest_url: "https://raw.githubusercontent.com/kubernetes/ingress-nginx/main/deploy/static/provider/kind/deploy.yaml".to_string(),
            namespace: "ingress-nginx".to_string(),
            controller_selector: "app.kubernetes.io/component=controller".to_string(),
            service: "service/ingress-nginx-controller".to_string(),
            port_mapping: "8080:80".to_string(),
        }
    }
}

/// Settling delays and bounded waits, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub cloud_settle_secs: u64,
    pub ledger_settle_secs: u64,
    pub recovery_settle_secs: u64,
    pub readiness_timeout_secs: u64,
    pub rollout_timeout_secs: u64,
    pub termination_timeout_secs: u64,
    pub ingress_timeout_secs: u64,
    pub poll_interval_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            cloud_settle_secs: 10,
            ledger_settle_secs: 15,
            recovery_settle_secs: 5,
            readiness_timeout_secs: 180,
            rollout_timeout_secs: 180,
            termination_timeout_secs: 90,
            ingress_timeout_secs: 90,
            poll_interval_secs: 2,
        }
    }
}

impl TimingConfig {
    /// All delays zero and waits short; used by tests and dry environments
    pub fn immediate() -> Self {
        Self {
            cloud_settle_secs: 0,
            ledger_settle_secs: 0,
            recovery_settle_secs: 0,
            readiness_timeout_secs: 1,
            rollout_timeout_secs: 1,
            termination_timeout_secs: 0,
            ingress_timeout_secs: 1,
            poll_interval_secs: 0,
        }
    }

    pub fn cloud_settle(&self) -> Duration {
        Duration::from_secs(self.cloud_settle_secs)
    }

    pub fn ledger_settle(&self) -> Duration {
        Duration::from_secs(self.ledger_settle_secs)
    }

    pub fn recovery_settle(&self) -> Duration {
        Duration::from_secs(self.recovery_settle_secs)
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }

    pub fn rollout_timeout(&self) -> Duration {
        Duration::from_secs(self.rollout_timeout_secs)
    }

    pub fn termination_timeout(&self) -> Duration {
        Duration::from_secs(self.termination_timeout_secs)
    }

    pub fn ingress_timeout(&self) -> Duration {
        Duration::from_secs(self.ingress_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Environment variables overlaid on every spawned process.
///
/// Built once from [`CloudConfig`] and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentOverlay {
    vars: BTreeMap<String, String>,
}

impl EnvironmentOverlay {
    pub fn from_cloud(cloud: &CloudConfig) -> Self {
        let mut vars = BTreeMap::new();
        vars.insert("AWS_ACCESS_KEY_ID".to_string(), cloud.access_key_id.clone());
        vars.insert(
            "AWS_SECRET_ACCESS_KEY".to_string(),
            cloud.secret_access_key.clone(),
        );
        vars.insert("AWS_DEFAULT_REGION".to_string(), cloud.region.clone());
        vars.insert("AWS_ENDPOINT_URL".to_string(), cloud.endpoint_url.clone());
        Self { vars }
    }

    pub fn empty() -> Self {
        Self {
            vars: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}
