//! Shared test fixtures: a recording command runner and project layouts.
#![allow(dead_code)]

use async_trait::async_trait;
use orchestrator::config::{EnvironmentOverlay, ImageSpec, OrchestratorConfig, TimingConfig};
use orchestrator::executor::{CommandRunner, Invocation, RawOutput};
use orchestrator::prereq::{PrerequisiteChecker, REQUIRED_TOOLS};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

type Hook = Box<dyn Fn(&Invocation) + Send + Sync>;

struct Rule {
    pattern: Vec<String>,
    output: RawOutput,
    remaining: Option<usize>,
    hook: Option<Hook>,
}

impl Rule {
    fn matches(&self, invocation: &Invocation) -> bool {
        let words: Vec<&str> = self.pattern.iter().map(String::as_str).collect();
        contains(invocation, &words)
    }
}

/// Records every invocation and answers from scripted rules.
///
/// A rule matches when its words appear contiguously in the argv. The most
/// recently added matching rule wins; unmatched invocations exit 0 with no
/// output.
#[derive(Default)]
pub struct FakeRunner {
    calls: Mutex<Vec<Invocation>>,
    foreground: Mutex<Vec<Invocation>>,
    rules: Mutex<Vec<Rule>>,
    overlays: Mutex<Vec<EnvironmentOverlay>>,
    foreground_exit: Mutex<i32>,
}

impl FakeRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, pattern: &[&str], output: RawOutput, remaining: Option<usize>, hook: Option<Hook>) {
        self.rules.lock().unwrap().push(Rule {
            pattern: pattern.iter().map(|s| s.to_string()).collect(),
            output,
            remaining,
            hook,
        });
    }

    pub fn respond(&self, pattern: &[&str], exit_code: i32, stdout: &str) {
        self.push(pattern, output(exit_code, stdout, ""), None, None);
    }

    pub fn fail(&self, pattern: &[&str], exit_code: i32, stderr: &str) {
        self.push(pattern, output(exit_code, "", stderr), None, None);
    }

    /// Answer only the next `times` matching invocations
    pub fn respond_times(&self, pattern: &[&str], times: usize, exit_code: i32, stdout: &str) {
        self.push(pattern, output(exit_code, stdout, ""), Some(times), None);
    }

    pub fn on(&self, pattern: &[&str], hook: impl Fn(&Invocation) + Send + Sync + 'static) {
        self.push(pattern, output(0, "", ""), None, Some(Box::new(hook)));
    }

    /// Run `hook` on each matching invocation, then fail it
    pub fn fail_on(
        &self,
        pattern: &[&str],
        exit_code: i32,
        stderr: &str,
        hook: impl Fn(&Invocation) + Send + Sync + 'static,
    ) {
        self.push(pattern, output(exit_code, "", stderr), None, Some(Box::new(hook)));
    }

    pub fn set_foreground_exit(&self, code: i32) {
        *self.foreground_exit.lock().unwrap() = code;
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.calls().iter().map(Invocation::display).collect()
    }

    pub fn foreground_calls(&self) -> Vec<Invocation> {
        self.foreground.lock().unwrap().clone()
    }

    pub fn overlays(&self) -> Vec<EnvironmentOverlay> {
        self.overlays.lock().unwrap().clone()
    }

    /// Index of the first recorded call containing `words` contiguously
    pub fn position(&self, words: &[&str]) -> Option<usize> {
        self.calls().iter().position(|inv| contains(inv, words))
    }

    pub fn count(&self, words: &[&str]) -> usize {
        self.calls().iter().filter(|inv| contains(inv, words)).count()
    }
}

fn output(exit_code: i32, stdout: &str, stderr: &str) -> RawOutput {
    RawOutput {
        exit_code,
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
    }
}

pub fn contains(invocation: &Invocation, words: &[&str]) -> bool {
    let argv = invocation.argv();
    words.is_empty() || argv.windows(words.len()).any(|w| w == words)
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        overlay: &EnvironmentOverlay,
    ) -> std::io::Result<RawOutput> {
        self.calls.lock().unwrap().push(invocation.clone());
        self.overlays.lock().unwrap().push(overlay.clone());

        let mut rules = self.rules.lock().unwrap();
        let hit = rules
            .iter_mut()
            .rev()
            .find(|r| r.remaining != Some(0) && r.matches(invocation));

        match hit {
            Some(rule) => {
                if let Some(n) = rule.remaining.as_mut() {
                    *n -= 1;
                }
                if let Some(hook) = &rule.hook {
                    hook(invocation);
                }
                Ok(rule.output.clone())
            }
            None => Ok(RawOutput::default()),
        }
    }

    async fn run_foreground(
        &self,
        invocation: &Invocation,
        _overlay: &EnvironmentOverlay,
    ) -> std::io::Result<i32> {
        self.foreground.lock().unwrap().push(invocation.clone());
        Ok(*self.foreground_exit.lock().unwrap())
    }
}

/// A directory holding an executable stub for every required tool
pub fn tool_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    for tool in REQUIRED_TOOLS {
        write_executable(&dir.path().join(tool));
    }
    dir
}

pub fn write_executable(path: &Path) {
    std::fs::write(path, "#!/bin/sh\nexit 0\n").unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
}

pub fn checker_for(dir: &TempDir) -> PrerequisiteChecker {
    PrerequisiteChecker::with_search_path(dir.path().as_os_str().to_os_string())
}

/// Project directory with toolchain inputs, a manifests dir and chaincode sources
pub fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    let fabric = dir.path().join("fabric");
    std::fs::create_dir_all(&fabric).unwrap();
    std::fs::write(fabric.join("crypto-config.yaml"), "OrdererOrgs: []\n").unwrap();
    std::fs::write(fabric.join("configtx.yaml"), "Profiles: {}\n").unwrap();
    std::fs::create_dir_all(dir.path().join("k8s")).unwrap();
    std::fs::create_dir_all(dir.path().join("chaincode/filiera360")).unwrap();
    dir
}

pub fn config_for(project: &TempDir) -> OrchestratorConfig {
    let mut config = OrchestratorConfig::default();
    config.project_dir = project.path().to_path_buf();
    config.timing = TimingConfig::immediate();
    config.chaincode.source_path = "chaincode/filiera360".into();
    config.cluster.images = vec![
        ImageSpec::build("ecofoodchain/frontend:latest", "microservices/frontend"),
        ImageSpec::pull("mongo:5.0"),
    ];
    config
}

/// Create every toolchain output under `root`, as the container would
pub fn fake_toolchain_outputs(root: &Path) {
    std::fs::create_dir_all(root.join("crypto-config/peerOrganizations")).unwrap();
    let channel = root.join("channel-artifacts");
    std::fs::create_dir_all(&channel).unwrap();
    for name in ["genesis.block", "channel.tx", "Org1MSPanchors.tx"] {
        std::fs::write(channel.join(name), b"artifact").unwrap();
    }
}

/// Make the `docker run` of the toolchain produce its outputs under `root`
pub fn script_toolchain(runner: &FakeRunner, root: &Path) {
    let root = root.to_path_buf();
    runner.on(&["docker", "run", "--rm"], move |_| fake_toolchain_outputs(&root));
}

pub const PEER_POD: &str = "peer0-org1-5d8f7c9b4-x2x7q";

pub const QUERY_INSTALLED: &str = "Installed chaincodes on peer:\n\
Package ID: filiera360_1.0:abcdef1234567890, Label: filiera360_1.0\n";

/// Script the ledger calls that need non-empty answers
pub fn script_ledger(runner: &FakeRunner) {
    runner.respond(&["jsonpath={.items[0].metadata.name}"], 0, PEER_POD);
    runner.respond(&["chaincode", "queryinstalled"], 0, QUERY_INSTALLED);
}
