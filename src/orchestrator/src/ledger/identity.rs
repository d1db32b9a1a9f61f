//! Identity contexts and the typed `peer` command builder.
//!
//! The MSP directory a `peer` process authenticates with decides what it may
//! do. Rather than mutating the pod's environment, every command carries its
//! identity explicitly and is turned into
//! `kubectl exec <target> -- env CORE_PEER_MSPCONFIGPATH=<msp> peer ...`.

use crate::artifacts::ArtifactSet;
use crate::config::LedgerConfig;
use crate::executor::Invocation;
use crate::kube;

pub const MSP_ENV: &str = "CORE_PEER_MSPCONFIGPATH";

/// Generated crypto material as the ledger pods see it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptoMaterial {
    base: String,
}

impl CryptoMaterial {
    pub fn from_artifacts(artifacts: &ArtifactSet) -> Self {
        Self {
            base: artifacts.cluster_path(&artifacts.crypto_material_dir),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Map a path relative to the crypto material; absolute paths pass through
    pub fn path(&self, relative: &str) -> String {
        if relative.starts_with('/') {
            relative.to_string()
        } else {
            format!("{}/{}", self.base, relative.trim_start_matches("./"))
        }
    }

    pub fn orderer_ca(&self, ledger: &LedgerConfig) -> String {
        self.path(&ledger.orderer_ca_file)
    }

    pub fn peer_tls_root_cert(&self, ledger: &LedgerConfig) -> String {
        self.path(&ledger.peer_tls_root_cert)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityRole {
    /// The peer's own identity; read-only operations
    Peer,
    /// Organization admin; channel and chaincode mutations
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityContext {
    pub role: IdentityRole,
    pub msp_config_path: String,
}

impl IdentityContext {
    pub fn peer(ledger: &LedgerConfig, crypto: &CryptoMaterial) -> Self {
        Self {
            role: IdentityRole::Peer,
            msp_config_path: crypto.path(&ledger.peer_msp_path),
        }
    }

    pub fn admin(ledger: &LedgerConfig, crypto: &CryptoMaterial) -> Self {
        Self {
            role: IdentityRole::Admin,
            msp_config_path: crypto.path(&ledger.admin_msp_path),
        }
    }

    pub fn env_assignment(&self) -> String {
        format!("{}={}", MSP_ENV, self.msp_config_path)
    }
}

/// Where a peer command is executed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecTarget {
    Deployment(String),
    Pod(String),
}

impl ExecTarget {
    pub fn as_kubectl(&self) -> String {
        match self {
            ExecTarget::Deployment(name) => format!("deploy/{}", name),
            ExecTarget::Pod(name) => name.clone(),
        }
    }
}

/// A `peer` CLI operation, built argument by argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerCommand {
    args: Vec<String>,
}

impl PeerCommand {
    pub fn new<I, S>(subcommand: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: subcommand.into_iter().map(Into::into).collect(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn flag(self, name: &str, value: impl Into<String>) -> Self {
        self.arg(name).arg(value)
    }

    /// Address the orderer over TLS
    pub fn orderer(self, ledger: &LedgerConfig, crypto: &CryptoMaterial) -> Self {
        self.flag("-o", &ledger.orderer_address)
            .tls(&crypto.orderer_ca(ledger))
    }

    pub fn tls(self, ca_file: &str) -> Self {
        self.arg("--tls").flag("--cafile", ca_file)
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Produce the kubectl invocation running this command under `identity`
    pub fn invocation(
        &self,
        namespace: &str,
        target: &ExecTarget,
        identity: &IdentityContext,
    ) -> Invocation {
        let command = ["env".to_string(), identity.env_assignment(), "peer".to_string()]
            .into_iter()
            .chain(self.args.iter().cloned());
        kube::exec(namespace, &target.as_kubectl(), command)
    }
}
