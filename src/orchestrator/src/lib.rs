//! EcoFoodChain environment orchestrator.
//!
//! Brings up the emulated cloud, the kind cluster with its workloads and the
//! permissioned ledger network, and tears them down again. All external work
//! goes through [`executor::Executor`].

pub mod artifacts;
pub mod cloud;
pub mod cluster;
pub mod config;
pub mod error;
pub mod executor;
pub mod ingress;
pub mod kube;
pub mod ledger;
pub mod manifests;
pub mod pipeline;
pub mod prereq;
pub mod teardown;
pub mod templates;

pub use config::OrchestratorConfig;
pub use error::{ProvisionError, Result};
pub use executor::{CommandRunner, Executor, FailurePolicy, Invocation, ProcessRunner, StageResult};
pub use pipeline::{Action, Orchestrator};
