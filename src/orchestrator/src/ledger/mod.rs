//! Permissioned ledger bring-up: restart recovery, channel bootstrap and
//! chaincode lifecycle. Every `peer` call runs inside the peer pod through
//! `kubectl exec` with an explicit identity.

pub mod chaincode;
pub mod channel;
pub mod identity;
pub mod recovery;

pub use chaincode::{parse_package_id, ChaincodeDescriptor, ChaincodePipeline, ResolvedChaincode};
pub use channel::{ActiveChannel, BootstrapState, ChannelBootstrap};
pub use identity::{CryptoMaterial, ExecTarget, IdentityContext, IdentityRole, PeerCommand};
pub use recovery::{DeadlockRecovery, SettledPorts};
