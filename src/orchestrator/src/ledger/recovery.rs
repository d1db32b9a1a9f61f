//! Deadlock recovery sequencer.
//!
//! Restarting the orderer and the peer together can leave both holding the
//! same local port. The peer is therefore taken fully down before it comes
//! back: restart orderer, scale peer to zero, wait until no peer pod remains,
//! scale peer to one, then wait for both rollouts.

use crate::config::{LedgerConfig, TimingConfig};
use crate::error::Result;
use crate::executor::{settle, Executor};
use crate::kube::{self, WaitOutcome};
use crate::manifests::AppliedWorkloads;

/// Marker that the ledger workloads restarted without port contention
#[derive(Debug, Clone)]
pub struct SettledPorts {
    pub peer_terminated: WaitOutcome,
}

pub struct DeadlockRecovery<'a> {
    executor: &'a Executor,
    ledger: &'a LedgerConfig,
    timing: &'a TimingConfig,
}

impl<'a> DeadlockRecovery<'a> {
    pub fn new(executor: &'a Executor, ledger: &'a LedgerConfig, timing: &'a TimingConfig) -> Self {
        Self {
            executor,
            ledger,
            timing,
        }
    }

    pub async fn run(&self, _workloads: &AppliedWorkloads) -> Result<SettledPorts> {
        let ns = self.ledger.namespace.as_str();

        tracing::info!("[DeadlockRecovery] Restarting orderer");
        self.executor
            .tolerate(&kube::rollout_restart(ns, &self.ledger.orderer_deployment))
            .await?;

        tracing::info!("[DeadlockRecovery] Scaling peer to zero");
        self.executor
            .tolerate(&kube::scale(ns, &self.ledger.peer_deployment, 0))
            .await?;

        let peer_terminated = kube::wait_for_no_pods(
            self.executor,
            ns,
            &self.ledger.peer_selector,
            self.timing.termination_timeout(),
            self.timing.poll_interval(),
        )
        .await?;
        if peer_terminated == WaitOutcome::TimedOut {
            tracing::warn!(
                "[DeadlockRecovery] Peer pods still present after {:?}, continuing",
                self.timing.termination_timeout()
            );
        }

        tracing::info!("[DeadlockRecovery] Scaling peer back to one");
        self.executor
            .fatal(&kube::scale(ns, &self.ledger.peer_deployment, 1))
            .await?;

        for deployment in [&self.ledger.orderer_deployment, &self.ledger.peer_deployment] {
            self.executor
                .fatal(&kube::rollout_status(
                    ns,
                    deployment,
                    self.timing.rollout_timeout(),
                ))
                .await?;
        }

        settle("ledger ports to settle", self.timing.recovery_settle()).await;
        Ok(SettledPorts { peer_terminated })
    }
}
