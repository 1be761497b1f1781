//! Kubernetes adapter (SPEC_FULL §4.2). Shells out to `kubectl` rather
//! than speaking the API server directly (Open Question resolution 1 in
//! `DESIGN.md`): list nodes, best-effort top nodes, list pods for
//! per-node pod counts, then cluster-info for the control-plane URL.
//! `k8s-openapi`'s `NodeList`/`PodList` are reused purely as
//! serde-compatible shapes for `kubectl get -o json` output.

use crate::model::{KubeClusterStatus, KubeNode, KubeNodeStatus, KubernetesCluster};
use crate::utils::subprocess::{self};
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::List;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const CLI_TIMEOUT: Duration = Duration::from_secs(15);

pub struct KubernetesAdapter {
    pub context: String,
    pub platform: String,
    pub dashboard_url: Option<String>,
}

impl KubernetesAdapter {
    pub fn new(context: String, platform: Option<String>, dashboard_url: Option<String>) -> Self {
        Self {
            context,
            platform: platform.unwrap_or_else(|| "kubernetes".to_string()),
            dashboard_url,
        }
    }

    pub async fn fetch(&self, ctx: &CancellationToken) -> KubernetesCluster {
        let node_list = match self.run_json::<List<Node>>(&["get", "nodes", "-o", "json"], ctx).await {
            Ok(list) => list,
            Err(_) => {
                return KubernetesCluster {
                    name: self.context.clone(),
                    platform: self.platform.clone(),
                    status: KubeClusterStatus::Offline,
                    api_endpoint: None,
                    dashboard_url: self.dashboard_url.clone(),
                    total_nodes: 0,
                    ready_nodes: 0,
                    nodes: Vec::new(),
                }
            }
        };

        let top = self.fetch_top_nodes(ctx).await;
        let pod_counts = self.fetch_pod_counts(ctx).await;
        let api_endpoint = self.fetch_api_endpoint(ctx).await;

        let mut nodes = Vec::new();
        for node in node_list.items {
            let name = node.metadata.name.unwrap_or_default();
            let status = node_ready_status(&node.status);
            let (cpu_pct, mem_pct) = top.get(&name).copied().unwrap_or((0.0, 0.0));
            let pod_count = pod_counts.get(&name).copied().unwrap_or(0);
            let max_pods = node
                .status
                .as_ref()
                .and_then(|s| s.capacity.as_ref())
                .and_then(|c| c.get("pods"))
                .and_then(|q| q.0.parse::<u32>().ok())
                .unwrap_or(0);

            nodes.push(KubeNode {
                name,
                status,
                cpu_pct,
                mem_pct,
                pod_count,
                max_pods,
            });
        }

        let total_nodes = nodes.len() as u32;
        let ready_nodes = nodes.iter().filter(|n| n.status == KubeNodeStatus::Ready).count() as u32;
        let status = if nodes.is_empty() {
            KubeClusterStatus::Healthy
        } else if ready_nodes == total_nodes {
            KubeClusterStatus::Healthy
        } else {
            KubeClusterStatus::Degraded
        };

        KubernetesCluster {
            name: self.context.clone(),
            platform: self.platform.clone(),
            status,
            api_endpoint,
            dashboard_url: self.dashboard_url.clone(),
            total_nodes,
            ready_nodes,
            nodes,
        }
    }

    async fn run_json<T: serde::de::DeserializeOwned>(&self, args: &[&str], ctx: &CancellationToken) -> Result<T, String> {
        let mut full_args = vec!["--context", self.context.as_str()];
        full_args.extend_from_slice(args);
        let output = subprocess::run("kubectl", &full_args, CLI_TIMEOUT, ctx).await.map_err(|e| e.to_string())?;
        if output.status_code != Some(0) {
            return Err(output.stderr);
        }
        serde_json::from_str(&output.stdout).map_err(|e| e.to_string())
    }

    async fn fetch_top_nodes(&self, ctx: &CancellationToken) -> HashMap<String, (f64, f64)> {
        let full_args = ["--context", self.context.as_str(), "top", "nodes", "--no-headers"];
        let output = match subprocess::run("kubectl", &full_args, CLI_TIMEOUT, ctx).await {
            Ok(o) if o.status_code == Some(0) => o,
            _ => return HashMap::new(),
        };
        parse_top_nodes(&output.stdout)
    }

    async fn fetch_pod_counts(&self, ctx: &CancellationToken) -> HashMap<String, u32> {
        let result: Result<List<Pod>, String> = self.run_json(&["get", "pods", "-A", "-o", "json"], ctx).await;
        let Ok(pods) = result else {
            return HashMap::new();
        };
        let mut counts = HashMap::new();
        for pod in pods.items {
            if let Some(node_name) = pod.spec.and_then(|s| s.node_name) {
                *counts.entry(node_name).or_insert(0u32) += 1;
            }
        }
        counts
    }

    async fn fetch_api_endpoint(&self, ctx: &CancellationToken) -> Option<String> {
        let full_args = ["--context", self.context.as_str(), "cluster-info"];
        let output = subprocess::run("kubectl", &full_args, CLI_TIMEOUT, ctx).await.ok()?;
        if output.status_code != Some(0) {
            return None;
        }
        parse_control_plane_url(&output.stdout)
    }
}

fn node_ready_status(status: &Option<k8s_openapi::api::core::v1::NodeStatus>) -> KubeNodeStatus {
    let Some(status) = status else {
        return KubeNodeStatus::Unknown;
    };
    let Some(conditions) = &status.conditions else {
        return KubeNodeStatus::Unknown;
    };
    let Some(ready) = conditions.iter().find(|c| c.type_ == "Ready") else {
        return KubeNodeStatus::Unknown;
    };
    match ready.status.as_str() {
        "True" => KubeNodeStatus::Ready,
        "False" => KubeNodeStatus::NotReady,
        _ => KubeNodeStatus::Unknown,
    }
}

/// Parses `kubectl top nodes --no-headers` lines of the form
/// `name  cpu_cores  cpu_pct%  mem_bytes  mem_pct%`.
fn parse_top_nodes(stdout: &str) -> HashMap<String, (f64, f64)> {
    let mut result = HashMap::new();
    for line in stdout.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 5 {
            continue;
        }
        let name = fields[0].to_string();
        let cpu_pct = fields[2].trim_end_matches('%').parse::<f64>().unwrap_or(0.0);
        let mem_pct = fields[4].trim_end_matches('%').parse::<f64>().unwrap_or(0.0);
        result.insert(name, (cpu_pct, mem_pct));
    }
    result
}

/// Strips ANSI escape sequences then extracts the control-plane URL from
/// `kubectl cluster-info`'s first line
/// (`Kubernetes control plane is running at https://...`).
fn parse_control_plane_url(stdout: &str) -> Option<String> {
    let stripped = strip_ansi(stdout);
    let first_line = stripped.lines().next()?;
    let idx = first_line.find("https://")?;
    Some(first_line[idx..].trim().to_string())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            if chars.peek() == Some(&'[') {
                chars.next();
                for c2 in chars.by_ref() {
                    if c2.is_ascii_alphabetic() {
                        break;
                    }
                }
            }
            continue;
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_top_nodes_percentages() {
        let stdout = "node-1   250m   12%   512Mi   25%\nnode-2   100m   5%   256Mi   10%\n";
        let parsed = parse_top_nodes(stdout);
        assert_eq!(parsed["node-1"], (12.0, 25.0));
        assert_eq!(parsed["node-2"], (5.0, 10.0));
    }

    #[test]
    fn ignores_malformed_top_lines() {
        let stdout = "not enough fields\n";
        assert!(parse_top_nodes(stdout).is_empty());
    }

    #[test]
    fn strips_ansi_and_extracts_control_plane_url() {
        let stdout = "\u{1b}[0;32mKubernetes control plane\u{1b}[0m is running at https://1.2.3.4:6443\nCoreDNS is running...\n";
        assert_eq!(parse_control_plane_url(stdout), Some("https://1.2.3.4:6443".to_string()));
    }

    #[test]
    fn missing_https_yields_none() {
        assert!(parse_control_plane_url("no endpoint mentioned here").is_none());
    }
}
