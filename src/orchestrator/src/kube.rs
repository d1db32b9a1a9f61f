/// Typed kubectl invocations and the bounded pod poller.
use crate::executor::{Executor, Invocation};
use crate::error::Result;
use std::time::Duration;

fn kubectl(namespace: &str) -> Invocation {
    Invocation::new("kubectl").args(["-n", namespace])
}

fn timeout_flag(timeout: Duration) -> String {
    format!("--timeout={}s", timeout.as_secs())
}

/// `kubectl apply -f <dir> --recursive`
pub fn apply_recursive(dir: &str) -> Invocation {
    Invocation::new("kubectl").args(["apply", "-f", dir, "--recursive"])
}

/// `kubectl apply -f <url-or-file>`
pub fn apply(source: &str) -> Invocation {
    Invocation::new("kubectl").args(["apply", "-f", source])
}

/// Block until pods matching `selector` report Ready
pub fn wait_ready(namespace: &str, selector: &str, timeout: Duration) -> Invocation {
    kubectl(namespace)
        .args(["wait", "--for=condition=ready", "pod"])
        .arg(format!("--selector={}", selector))
        .arg(timeout_flag(timeout))
}

pub fn rollout_restart(namespace: &str, deployment: &str) -> Invocation {
    kubectl(namespace)
        .args(["rollout", "restart"])
        .arg(format!("deployment/{}", deployment))
}

pub fn rollout_status(namespace: &str, deployment: &str, timeout: Duration) -> Invocation {
    kubectl(namespace)
        .args(["rollout", "status"])
        .arg(format!("deployment/{}", deployment))
        .arg(timeout_flag(timeout))
}

pub fn scale(namespace: &str, deployment: &str, replicas: u32) -> Invocation {
    kubectl(namespace)
        .arg("scale")
        .arg(format!("deployment/{}", deployment))
        .arg(format!("--replicas={}", replicas))
}

/// One `pod/<name>` line per matching pod
pub fn pod_names(namespace: &str, selector: &str) -> Invocation {
    kubectl(namespace).args(["get", "pods", "-l", selector, "-o", "name"])
}

/// Name of the first pod matching `selector`
pub fn first_pod_name(namespace: &str, selector: &str) -> Invocation {
    kubectl(namespace).args([
        "get",
        "pods",
        "-l",
        selector,
        "-o",
        "jsonpath={.items[0].metadata.name}",
    ])
}

/// `kubectl exec <target> -- <command...>`
pub fn exec<I, S>(namespace: &str, target: &str, command: I) -> Invocation
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    kubectl(namespace)
        .args(["exec", target, "--"])
        .args(command)
}

/// Copy a local tree into a pod
pub fn copy_to_pod(namespace: &str, local: &str, pod: &str, dest: &str) -> Invocation {
    Invocation::new("kubectl")
        .arg("cp")
        .arg(local)
        .arg(format!("{}/{}:{}", namespace, pod, dest))
}

pub fn port_forward(namespace: &str, service: &str, mapping: &str) -> Invocation {
    Invocation::new("kubectl")
        .arg("port-forward")
        .arg(format!("--namespace={}", namespace))
        .args([service, mapping])
}

/// Outcome of a bounded wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Satisfied,
    TimedOut,
}

/// Poll until no pod matches `selector`, or until `timeout` elapses.
///
/// At least one poll is always issued. A failing `get pods` counts as
/// "still present" and the poll continues.
pub async fn wait_for_no_pods(
    executor: &Executor,
    namespace: &str,
    selector: &str,
    timeout: Duration,
    interval: Duration,
) -> Result<WaitOutcome> {
    tracing::info!(
        "[Kube] Waiting up to {:?} for pods matching {} to terminate",
        timeout,
        selector
    );

    let start = tokio::time::Instant::now();
    let query = pod_names(namespace, selector);

    loop {
        let result = executor.tolerate(&query).await?;
        if result.success() {
            let remaining = result.stdout.lines().filter(|l| !l.trim().is_empty()).count();
            if remaining == 0 {
                tracing::info!(
                    "[Kube] No pods match {} (took {:?})",
                    selector,
                    start.elapsed()
                );
                return Ok(WaitOutcome::Satisfied);
            }
            tracing::debug!("[Kube] {} pod(s) still match {}", remaining, selector);
        }

        if start.elapsed() >= timeout {
            return Ok(WaitOutcome::TimedOut);
        }
        tokio::time::sleep(interval).await;
    }
}
