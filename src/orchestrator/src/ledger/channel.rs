//! Channel bootstrap state machine.
//!
//! `PeerNotReady -> OrdererNotReady -> Settling -> CheckingMembership ->
//! Creating -> Joining -> UpdatingAnchors -> Active`. Every step after the
//! membership check is fatal on failure; a failed run starts over rather than
//! resuming mid-sequence.

use super::identity::{CryptoMaterial, ExecTarget, IdentityContext, PeerCommand};
use super::recovery::SettledPorts;
use crate::artifacts::ArtifactSet;
use crate::config::{LedgerConfig, TimingConfig};
use crate::error::Result;
use crate::executor::{settle, Executor};
use crate::kube;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    PeerNotReady,
    OrdererNotReady,
    Settling,
    CheckingMembership,
    Creating,
    Joining,
    UpdatingAnchors,
    Active,
}

/// Proof that the channel was bootstrapped (or found joined) on the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveChannel {
    pub name: String,
}

impl ActiveChannel {
    /// For runs that only redeploy chaincode onto a channel bootstrapped earlier
    pub fn assume_existing(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

pub struct ChannelBootstrap<'a> {
    executor: &'a Executor,
    ledger: &'a LedgerConfig,
    timing: &'a TimingConfig,
}

impl<'a> ChannelBootstrap<'a> {
    pub fn new(executor: &'a Executor, ledger: &'a LedgerConfig, timing: &'a TimingConfig) -> Self {
        Self {
            executor,
            ledger,
            timing,
        }
    }

    fn target(&self) -> ExecTarget {
        ExecTarget::Deployment(self.ledger.peer_deployment.clone())
    }

    /// Block file written by create and consumed by join, inside the peer pod
    pub fn block_path(&self) -> String {
        format!("/tmp/{}.block", self.ledger.channel)
    }

    pub async fn run(&self, artifacts: &ArtifactSet, _ports: &SettledPorts) -> Result<ActiveChannel> {
        let mut state = BootstrapState::PeerNotReady;
        while state != BootstrapState::Active {
            let next = self.step(state, artifacts).await?;
            tracing::debug!("[ChannelBootstrap] {:?} -> {:?}", state, next);
            state = next;
        }
        tracing::info!("[ChannelBootstrap] Channel '{}' active", self.ledger.channel);
        Ok(ActiveChannel {
            name: self.ledger.channel.clone(),
        })
    }

    async fn step(&self, state: BootstrapState, artifacts: &ArtifactSet) -> Result<BootstrapState> {
        let ns = self.ledger.namespace.as_str();
        let crypto = CryptoMaterial::from_artifacts(artifacts);
        let admin = IdentityContext::admin(self.ledger, &crypto);

        match state {
            BootstrapState::PeerNotReady => {
                tracing::info!("[ChannelBootstrap] Waiting for peer readiness");
                self.executor
                    .fatal(&kube::wait_ready(
                        ns,
                        &self.ledger.peer_selector,
                        self.timing.readiness_timeout(),
                    ))
                    .await?;
                Ok(BootstrapState::OrdererNotReady)
            }
            BootstrapState::OrdererNotReady => {
                tracing::info!("[ChannelBootstrap] Waiting for orderer readiness");
                self.executor
                    .fatal(&kube::wait_ready(
                        ns,
                        &self.ledger.orderer_selector,
                        self.timing.readiness_timeout(),
                    ))
                    .await?;
                Ok(BootstrapState::Settling)
            }
            BootstrapState::Settling => {
                settle("ledger network settling", self.timing.ledger_settle()).await;
                Ok(BootstrapState::CheckingMembership)
            }
            BootstrapState::CheckingMembership => {
                if self.already_joined(&crypto).await? {
                    tracing::info!(
                        "[ChannelBootstrap] Peer already joined '{}', skipping create/join/anchor update",
                        self.ledger.channel
                    );
                    Ok(BootstrapState::Active)
                } else {
                    Ok(BootstrapState::Creating)
                }
            }
            BootstrapState::Creating => {
                tracing::info!("[ChannelBootstrap] Creating channel '{}'", self.ledger.channel);
                let create = PeerCommand::new(["channel", "create"])
                    .orderer(self.ledger, &crypto)
                    .flag("-c", &self.ledger.channel)
                    .flag("-f", artifacts.cluster_path(&artifacts.channel_tx_path))
                    .flag("--outputBlock", self.block_path());
                self.executor
                    .fatal(&create.invocation(ns, &self.target(), &admin))
                    .await?;
                Ok(BootstrapState::Joining)
            }
            BootstrapState::Joining => {
                tracing::info!("[ChannelBootstrap] Joining peer to '{}'", self.ledger.channel);
                let join = PeerCommand::new(["channel", "join"]).flag("-b", self.block_path());
                self.executor
                    .fatal(&join.invocation(ns, &self.target(), &admin))
                    .await?;
                Ok(BootstrapState::UpdatingAnchors)
            }
            BootstrapState::UpdatingAnchors => {
                tracing::info!("[ChannelBootstrap] Updating anchor peers");
                let update = PeerCommand::new(["channel", "update"])
                    .orderer(self.ledger, &crypto)
                    .flag("-c", &self.ledger.channel)
                    .flag("-f", artifacts.cluster_path(&artifacts.anchor_tx_path));
                self.executor
                    .fatal(&update.invocation(ns, &self.target(), &admin))
                    .await?;
                Ok(BootstrapState::Active)
            }
            // Terminal; `run` stops before stepping it
            BootstrapState::Active => Ok(BootstrapState::Active),
        }
    }

    /// `peer channel list` under the default identity; failure means "not joined"
    async fn already_joined(&self, crypto: &CryptoMaterial) -> Result<bool> {
        let list = PeerCommand::new(["channel", "list"]).invocation(
            &self.ledger.namespace,
            &self.target(),
            &IdentityContext::peer(self.ledger, crypto),
        );
        let result = self.executor.tolerate(&list).await?;
        Ok(result.success()
            && result
                .stdout
                .lines()
                .any(|line| line.trim() == self.ledger.channel))
    }
}
