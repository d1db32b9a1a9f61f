//! Channel bootstrap, restart recovery and chaincode lifecycle tests.

mod common;

use common::*;
use orchestrator::artifacts::ArtifactSet;
use orchestrator::cluster::ClusterHandle;
use orchestrator::config::{
    ChaincodeConfig, ChaincodeLanguage, EnvironmentOverlay, LedgerConfig, TimingConfig,
};
use orchestrator::error::ProvisionError;
use orchestrator::executor::Executor;
use orchestrator::kube::WaitOutcome;
use orchestrator::ledger::{
    parse_package_id, ActiveChannel, ChaincodeDescriptor, ChaincodePipeline, ChannelBootstrap,
    CryptoMaterial, DeadlockRecovery, SettledPorts,
};
use orchestrator::manifests::AppliedWorkloads;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const PEER_LIST: &[&str] = &["get", "pods", "-l", "app=peer0-org1", "-o", "name"];

fn executor(runner: &Arc<FakeRunner>) -> Executor {
    Executor::new(runner.clone(), EnvironmentOverlay::empty())
}

const ORG: &str = "crypto-config/peerOrganizations/org1.example.com";
const ORDERER_CA: &str = "/fabric/crypto-config/ordererOrganizations/example.com/orderers/orderer.example.com/msp/tlscacerts/tlsca.example.com-cert.pem";

fn artifacts() -> ArtifactSet {
    ArtifactSet::layout(Path::new("/srv/ecofood/fabric"), "/fabric", "Org1MSPanchors.tx")
}

fn crypto() -> CryptoMaterial {
    CryptoMaterial::from_artifacts(&artifacts())
}

fn settled() -> SettledPorts {
    SettledPorts {
        peer_terminated: WaitOutcome::Satisfied,
    }
}

fn workloads() -> AppliedWorkloads {
    AppliedWorkloads {
        cluster: ClusterHandle::new("ecofood-cluster"),
    }
}

fn descriptor() -> ChaincodeDescriptor {
    ChaincodeDescriptor {
        name: "filiera360".to_string(),
        version: "1.0".to_string(),
        sequence: 1,
        language: ChaincodeLanguage::Golang,
        source_path: PathBuf::from("/srv/ecofood/chaincode/filiera360"),
        package_id: None,
    }
}

// ---- channel bootstrap ----

#[tokio::test]
async fn test_channel_create_join_anchor_order() {
    let runner = FakeRunner::new();
    let ledger = LedgerConfig::default();
    let timing = TimingConfig::immediate();
    let executor = executor(&runner);

    let channel = ChannelBootstrap::new(&executor, &ledger, &timing)
        .run(&artifacts(), &settled())
        .await
        .unwrap();
    assert_eq!(channel, ActiveChannel::assume_existing("mychannel"));

    let lines = runner.lines();
    let admin = format!(
        "CORE_PEER_MSPCONFIGPATH=/fabric/{}/users/Admin@org1.example.com/msp",
        ORG
    );
    assert_eq!(lines.len(), 6, "{:#?}", lines);
    assert!(lines[0].contains("--selector=app=peer0-org1"));
    assert!(lines[1].contains("--selector=app=orderer"));
    assert!(lines[2].ends_with("peer channel list"));
    assert_eq!(
        lines[3],
        format!(
            "kubectl -n default exec deploy/peer0-org1 -- env {} peer channel create -o orderer:7050 --tls --cafile {} -c mychannel -f /fabric/channel-artifacts/channel.tx --outputBlock /tmp/mychannel.block",
            admin, ORDERER_CA
        )
    );
    assert!(lines[4].ends_with("peer channel join -b /tmp/mychannel.block"));
    assert!(lines[4].contains(&admin));
    assert!(lines[5].contains("peer channel update"));
    assert!(lines[5].contains("-f /fabric/channel-artifacts/Org1MSPanchors.tx"));
}

#[tokio::test]
async fn test_membership_check_uses_peer_identity() {
    let runner = FakeRunner::new();
    let ledger = LedgerConfig::default();
    let timing = TimingConfig::immediate();
    let executor = executor(&runner);

    ChannelBootstrap::new(&executor, &ledger, &timing)
        .run(&artifacts(), &settled())
        .await
        .unwrap();

    let list = &runner.calls()[2];
    let peer = format!(
        "CORE_PEER_MSPCONFIGPATH=/fabric/{}/peers/peer0.org1.example.com/msp",
        ORG
    );
    assert!(contains(list, &[peer.as_str(), "peer", "channel", "list"]));
}

#[tokio::test]
async fn test_already_joined_channel_skips_create() {
    let runner = FakeRunner::new();
    runner.respond(
        &["peer", "channel", "list"],
        0,
        "2026-10-15 INFO [channelCmd] InitCmdFactory -> Endorser and orderer connections initialized\nChannels peers has joined: \nmychannel\n",
    );
    let ledger = LedgerConfig::default();
    let timing = TimingConfig::immediate();
    let executor = executor(&runner);

    let channel = ChannelBootstrap::new(&executor, &ledger, &timing)
        .run(&artifacts(), &settled())
        .await
        .unwrap();

    assert_eq!(channel.name, "mychannel");
    assert_eq!(runner.count(&["peer", "channel", "create"]), 0);
    assert_eq!(runner.count(&["peer", "channel", "join"]), 0);
    assert_eq!(runner.count(&["peer", "channel", "update"]), 0);
}

#[tokio::test]
async fn test_membership_requires_exact_channel_name() {
    let runner = FakeRunner::new();
    runner.respond(&["peer", "channel", "list"], 0, "Channels peers has joined: \nmychannel2\n");
    let ledger = LedgerConfig::default();
    let timing = TimingConfig::immediate();
    let executor = executor(&runner);

    ChannelBootstrap::new(&executor, &ledger, &timing)
        .run(&artifacts(), &settled())
        .await
        .unwrap();

    assert_eq!(runner.count(&["peer", "channel", "create"]), 1);
}

#[tokio::test]
async fn test_failed_membership_query_counts_as_not_joined() {
    let runner = FakeRunner::new();
    runner.fail(&["peer", "channel", "list"], 1, "Error: failed to create deliver client");
    let ledger = LedgerConfig::default();
    let timing = TimingConfig::immediate();
    let executor = executor(&runner);

    ChannelBootstrap::new(&executor, &ledger, &timing)
        .run(&artifacts(), &settled())
        .await
        .unwrap();

    assert_eq!(runner.count(&["peer", "channel", "create"]), 1);
}

#[tokio::test]
async fn test_channel_create_failure_stops_before_join() {
    let runner = FakeRunner::new();
    runner.fail(&["peer", "channel", "create"], 1, "Error: got unexpected status: BAD_REQUEST");
    let ledger = LedgerConfig::default();
    let timing = TimingConfig::immediate();
    let executor = executor(&runner);

    let err = ChannelBootstrap::new(&executor, &ledger, &timing)
        .run(&artifacts(), &settled())
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::CommandFailed { .. }));
    assert_eq!(runner.count(&["peer", "channel", "join"]), 0);
}

#[tokio::test]
async fn test_readiness_timeout_is_fatal() {
    let runner = FakeRunner::new();
    runner.fail(
        &["--selector=app=orderer"],
        1,
        "error: timed out waiting for the condition on pods/orderer-7c9",
    );
    let ledger = LedgerConfig::default();
    let timing = TimingConfig::immediate();
    let executor = executor(&runner);

    let err = ChannelBootstrap::new(&executor, &ledger, &timing)
        .run(&artifacts(), &settled())
        .await
        .unwrap_err();

    match err {
        ProvisionError::CommandFailed { stderr_tail, .. } => {
            assert!(stderr_tail.contains("timed out"))
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(runner.count(&["peer"]), 0);
}

// ---- deadlock recovery ----

#[tokio::test]
async fn test_peer_scaled_up_only_after_pods_are_gone() {
    let runner = FakeRunner::new();
    runner.respond_times(PEER_LIST, 2, 0, "pod/peer0-org1-5d8f7c9b4-x2x7q\n");
    let ledger = LedgerConfig::default();
    let mut timing = TimingConfig::immediate();
    timing.termination_timeout_secs = 30;
    let executor = executor(&runner);

    let ports = DeadlockRecovery::new(&executor, &ledger, &timing)
        .run(&workloads())
        .await
        .unwrap();
    assert_eq!(ports.peer_terminated, WaitOutcome::Satisfied);

    let calls = runner.calls();
    let restart = runner.position(&["rollout", "restart", "deployment/orderer"]).unwrap();
    let down = runner.position(&["--replicas=0"]).unwrap();
    let last_poll = calls.iter().rposition(|c| contains(c, PEER_LIST)).unwrap();
    let up = runner.position(&["--replicas=1"]).unwrap();

    assert_eq!(runner.count(PEER_LIST), 3);
    assert!(restart < down);
    assert!(down < last_poll);
    assert!(last_poll < up);
    assert!(runner.position(&["rollout", "status", "deployment/orderer"]).unwrap() > up);
    assert!(runner.position(&["rollout", "status", "deployment/peer0-org1"]).unwrap() > up);
}

#[tokio::test]
async fn test_termination_timeout_is_tolerated() {
    let runner = FakeRunner::new();
    runner.respond(PEER_LIST, 0, "pod/peer0-org1-5d8f7c9b4-x2x7q\n");
    let ledger = LedgerConfig::default();
    let timing = TimingConfig::immediate();
    let executor = executor(&runner);

    let ports = DeadlockRecovery::new(&executor, &ledger, &timing)
        .run(&workloads())
        .await
        .unwrap();

    assert_eq!(ports.peer_terminated, WaitOutcome::TimedOut);
    assert_eq!(runner.count(PEER_LIST), 1);
    assert_eq!(runner.count(&["--replicas=1"]), 1);
}

#[tokio::test]
async fn test_restart_failures_before_scale_up_are_tolerated() {
    let runner = FakeRunner::new();
    runner.fail(&["rollout", "restart"], 1, "deployments.apps \"orderer\" not found");
    runner.fail(&["--replicas=0"], 1, "deployments.apps \"peer0-org1\" not found");
    let ledger = LedgerConfig::default();
    let timing = TimingConfig::immediate();
    let executor = executor(&runner);

    DeadlockRecovery::new(&executor, &ledger, &timing)
        .run(&workloads())
        .await
        .unwrap();
    assert_eq!(runner.count(&["--replicas=1"]), 1);
}

#[tokio::test]
async fn test_scale_up_failure_is_fatal() {
    let runner = FakeRunner::new();
    runner.fail(&["--replicas=1"], 1, "Error from server (NotFound)");
    let ledger = LedgerConfig::default();
    let timing = TimingConfig::immediate();
    let executor = executor(&runner);

    let err = DeadlockRecovery::new(&executor, &ledger, &timing)
        .run(&workloads())
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::CommandFailed { .. }));
    assert_eq!(runner.count(&["rollout", "status"]), 0);
}

// ---- chaincode ----

#[test]
fn test_parse_package_id() {
    assert_eq!(
        parse_package_id(QUERY_INSTALLED, "filiera360", "1.0").unwrap(),
        "filiera360_1.0:abcdef1234567890"
    );
    assert_eq!(
        parse_package_id("filiera360_1.0:0a1B2c\n", "filiera360", "1.0").unwrap(),
        "filiera360_1.0:0a1B2c"
    );
}

#[test]
fn test_parse_package_id_requires_exact_label() {
    let other_version = "Package ID: filiera360_1.1:abcdef, Label: filiera360_1.1\n";
    assert!(parse_package_id(other_version, "filiera360", "1.0").is_err());

    // The dot in the version is literal
    let dotless = "Package ID: filiera360_1x0:abcdef, Label: filiera360_1x0\n";
    assert!(parse_package_id(dotless, "filiera360", "1.0").is_err());

    let prefixed = "Package ID: myfiliera360_1.0:abcdef, Label: myfiliera360_1.0\n";
    assert!(parse_package_id(prefixed, "filiera360", "1.0").is_err());
}

#[test]
fn test_parse_package_id_miss_carries_output() {
    let output = "Installed chaincodes on peer:\n";
    match parse_package_id(output, "filiera360", "1.0") {
        Err(ProvisionError::PackageIdNotFound { label, output: raw }) => {
            assert_eq!(label, "filiera360_1.0");
            assert_eq!(raw, output);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_chaincode_lifecycle_order() {
    let runner = FakeRunner::new();
    script_ledger(&runner);
    let ledger = LedgerConfig::default();
    let chaincode = ChaincodeConfig::default();
    let executor = executor(&runner);

    let deployed = ChaincodePipeline::new(&executor, &ledger, &chaincode, crypto())
        .deploy(&ActiveChannel::assume_existing("mychannel"), descriptor())
        .await
        .unwrap();
    assert_eq!(
        deployed.package_id.as_deref(),
        Some("filiera360_1.0:abcdef1234567890")
    );

    let pod_dir = chaincode.pod_dir.as_str();
    let steps: [&[&str]; 9] = [
        &["exec", PEER_POD, "--", "rm", "-rf", pod_dir],
        &["exec", PEER_POD, "--", "mkdir", "-p", pod_dir],
        &["cp", "/srv/ecofood/chaincode/filiera360"],
        &["test", "-f"],
        &["chaincode", "package", "/tmp/filiera360_1.0.tar.gz"],
        &["chaincode", "install", "/tmp/filiera360_1.0.tar.gz"],
        &["chaincode", "queryinstalled"],
        &["chaincode", "approveformyorg"],
        &["chaincode", "commit"],
    ];
    let positions: Vec<usize> = steps
        .iter()
        .map(|words| runner.position(words).unwrap_or_else(|| panic!("missing {:?}", words)))
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "{:?}", positions);

    let approve = &runner.calls()[positions[7]];
    assert!(contains(approve, &["--package-id", "filiera360_1.0:abcdef1234567890"]));
    assert!(contains(approve, &["--sequence", "1"]));
    assert!(contains(approve, &["--ordererTLSHostnameOverride", "orderer.example.com"]));
    assert!(contains(approve, &["--tls", "--cafile", ORDERER_CA]));

    let commit = &runner.calls()[positions[8]];
    assert!(contains(commit, &["--peerAddresses", "peer0-org1:7051"]));
    let tls_root = format!("/fabric/{}/peers/peer0.org1.example.com/tls/ca.crt", ORG);
    assert!(contains(commit, &["--tlsRootCertFiles", tls_root.as_str()]));

    let admin = format!(
        "CORE_PEER_MSPCONFIGPATH=/fabric/{}/users/Admin@org1.example.com/msp",
        ORG
    );
    for index in &positions[4..] {
        assert!(contains(&runner.calls()[*index], &[admin.as_str()]));
    }
}

#[tokio::test]
async fn test_identity_paths_follow_the_cluster_mount() {
    let runner = FakeRunner::new();
    script_ledger(&runner);
    let ledger = LedgerConfig::default();
    let chaincode = ChaincodeConfig::default();
    let timing = TimingConfig::immediate();
    let executor = executor(&runner);
    let relocated =
        ArtifactSet::layout(Path::new("/srv/ecofood/fabric"), "/ledger", "Org1MSPanchors.tx");

    ChannelBootstrap::new(&executor, &ledger, &timing)
        .run(&relocated, &settled())
        .await
        .unwrap();
    ChaincodePipeline::new(
        &executor,
        &ledger,
        &chaincode,
        CryptoMaterial::from_artifacts(&relocated),
    )
    .deploy(&ActiveChannel::assume_existing("mychannel"), descriptor())
    .await
    .unwrap();

    let admin = format!(
        "CORE_PEER_MSPCONFIGPATH=/ledger/{}/users/Admin@org1.example.com/msp",
        ORG
    );
    let cafile = ORDERER_CA.replacen("/fabric/", "/ledger/", 1);
    for words in [["channel", "create"], ["chaincode", "approveformyorg"]] {
        let call = &runner.calls()[runner.position(&words).unwrap()];
        assert!(contains(call, &[admin.as_str()]));
        assert!(contains(call, &["--cafile", cafile.as_str()]));
    }
    for line in runner.lines() {
        assert!(!line.contains("/fabric"), "{}", line);
    }
}

#[test]
fn test_absolute_crypto_paths_are_kept() {
    let crypto = crypto();
    assert_eq!(crypto.base(), "/fabric/crypto-config");
    assert_eq!(crypto.path("/etc/hyperledger/msp"), "/etc/hyperledger/msp");
    assert_eq!(
        crypto.path("./ordererOrganizations/example.com/ca.pem"),
        "/fabric/crypto-config/ordererOrganizations/example.com/ca.pem"
    );
}

#[tokio::test]
async fn test_nested_copy_root_is_detected() {
    let runner = FakeRunner::new();
    script_ledger(&runner);
    let ledger = LedgerConfig::default();
    let chaincode = ChaincodeConfig::default();
    let executor = executor(&runner);

    ChaincodePipeline::new(&executor, &ledger, &chaincode, crypto())
        .deploy(&ActiveChannel::assume_existing("mychannel"), descriptor())
        .await
        .unwrap();

    let nested = format!("{}/filiera360", chaincode.pod_dir);
    let probe = format!("{}/go.mod", nested);
    assert_eq!(runner.count(&["test", "-f", probe.as_str()]), 1);
    assert_eq!(runner.count(&["--path", nested.as_str()]), 1);
}

#[tokio::test]
async fn test_flat_copy_root_is_used_when_probe_fails() {
    let runner = FakeRunner::new();
    script_ledger(&runner);
    runner.fail(&["test", "-f"], 1, "");
    let ledger = LedgerConfig::default();
    let chaincode = ChaincodeConfig::default();
    let executor = executor(&runner);

    ChaincodePipeline::new(&executor, &ledger, &chaincode, crypto())
        .deploy(&ActiveChannel::assume_existing("mychannel"), descriptor())
        .await
        .unwrap();

    assert_eq!(runner.count(&["--path", chaincode.pod_dir.as_str()]), 1);
}

#[tokio::test]
async fn test_node_chaincode_probes_package_json() {
    let runner = FakeRunner::new();
    script_ledger(&runner);
    let ledger = LedgerConfig::default();
    let chaincode = ChaincodeConfig::default();
    let executor = executor(&runner);
    let mut node = descriptor();
    node.language = ChaincodeLanguage::Node;

    ChaincodePipeline::new(&executor, &ledger, &chaincode, crypto())
        .deploy(&ActiveChannel::assume_existing("mychannel"), node)
        .await
        .unwrap();

    let probe = format!("{}/filiera360/package.json", chaincode.pod_dir);
    assert_eq!(runner.count(&["test", "-f", probe.as_str()]), 1);
    assert_eq!(runner.count(&["--lang", "node"]), 1);
}

#[tokio::test]
async fn test_missing_package_id_aborts_before_approve() {
    let runner = FakeRunner::new();
    script_ledger(&runner);
    runner.respond(&["chaincode", "queryinstalled"], 0, "Installed chaincodes on peer:\n");
    let ledger = LedgerConfig::default();
    let chaincode = ChaincodeConfig::default();
    let executor = executor(&runner);

    let err = ChaincodePipeline::new(&executor, &ledger, &chaincode, crypto())
        .deploy(&ActiveChannel::assume_existing("mychannel"), descriptor())
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::PackageIdNotFound { .. }));
    assert_eq!(runner.count(&["approveformyorg"]), 0);
    assert_eq!(runner.count(&["chaincode", "commit"]), 0);
}

#[tokio::test]
async fn test_missing_peer_pod_is_fatal() {
    let runner = FakeRunner::new();
    runner.respond(&["jsonpath={.items[0].metadata.name}"], 0, "");
    let ledger = LedgerConfig::default();
    let chaincode = ChaincodeConfig::default();
    let executor = executor(&runner);

    let err = ChaincodePipeline::new(&executor, &ledger, &chaincode, crypto())
        .deploy(&ActiveChannel::assume_existing("mychannel"), descriptor())
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::PodNotFound(ref sel) if sel == "app=peer0-org1"));
    assert_eq!(runner.calls().len(), 1);
}

#[tokio::test]
async fn test_copy_failure_is_fatal() {
    let runner = FakeRunner::new();
    script_ledger(&runner);
    runner.fail(&["cp"], 1, "error: source does not exist");
    let ledger = LedgerConfig::default();
    let chaincode = ChaincodeConfig::default();
    let executor = executor(&runner);

    let err = ChaincodePipeline::new(&executor, &ledger, &chaincode, crypto())
        .deploy(&ActiveChannel::assume_existing("mychannel"), descriptor())
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::CommandFailed { .. }));
    assert_eq!(runner.count(&["chaincode", "package"]), 0);
}
