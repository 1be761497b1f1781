//! Tailscale adapter (SPEC_FULL §4.2). Primary path is the tailnet HTTP
//! API with Basic auth; when no API key is configured, or the API call
//! fails and CLI fallback is enabled, falls back to the local `tailscale`
//! CLI's JSON status output. Grounded in the teacher's
//! graceful-degrade-to-`None` style for optional infra sources, with the
//! subprocess half following `utils::subprocess::run`.

use crate::model::{TailscaleNode, TailscaleStatus};
use crate::utils::http_client;
use crate::utils::subprocess::{self};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const API_BASE: &str = "https://api.tailscale.com/api/v2";
const CLI_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct ApiDevicesResponse {
    #[serde(default)]
    devices: Vec<ApiDevice>,
}

#[derive(Debug, Deserialize)]
struct ApiDevice {
    name: String,
    hostname: String,
    #[serde(default)]
    addresses: Vec<String>,
    os: String,
    #[serde(default)]
    online: bool,
    #[serde(rename = "lastSeen", default)]
    last_seen: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CliStatus {
    #[serde(rename = "Self")]
    this_node: CliPeer,
    #[serde(default)]
    #[serde(rename = "Peer")]
    peer: HashMap<String, CliPeer>,
}

#[derive(Debug, Deserialize)]
struct CliPeer {
    #[serde(rename = "HostName", default)]
    hostname: String,
    #[serde(rename = "DNSName", default)]
    dns_name: String,
    #[serde(rename = "TailscaleIPs", default)]
    tailscale_ips: Vec<String>,
    #[serde(rename = "OS", default)]
    os: String,
    #[serde(rename = "Online", default)]
    online: bool,
    #[serde(rename = "Tags", default)]
    tags: Option<Vec<String>>,
}

pub struct TailscaleAdapter {
    pub tailnet: String,
    pub api_key: Option<String>,
    pub cli_fallback: bool,
    pub dashboard_url: Option<String>,
    api_base: String,
    client: reqwest::Client,
}

pub struct TailscaleOutcome {
    pub status: Option<TailscaleStatus>,
    pub warnings: Vec<String>,
}

impl TailscaleAdapter {
    pub fn new(tailnet: String, api_key: Option<String>, cli_fallback: bool) -> Self {
        let dashboard_url = Some("https://login.tailscale.com/admin/machines".to_string());
        Self {
            tailnet,
            api_key,
            cli_fallback,
            dashboard_url,
            api_base: API_BASE.to_string(),
            client: http_client::build_client(),
        }
    }

    /// Overrides the tailnet API base URL, for pointing the adapter at a
    /// mock server in tests.
    pub fn with_api_base(mut self, api_base: String) -> Self {
        self.api_base = api_base;
        self
    }

    pub async fn fetch(&self, ctx: &CancellationToken) -> TailscaleOutcome {
        let mut warnings = Vec::new();

        if let Some(key) = &self.api_key {
            match self.fetch_api(key, ctx).await {
                Ok(status) => return TailscaleOutcome { status: Some(status), warnings },
                Err(e) => warnings.push(format!("tailscale api: {e}")),
            }
            if !self.cli_fallback {
                return TailscaleOutcome { status: None, warnings };
            }
        }

        match self.fetch_cli(ctx).await {
            Ok(status) => TailscaleOutcome { status: Some(status), warnings },
            Err(e) => {
                warnings.push(format!("tailscale cli: {e}"));
                TailscaleOutcome { status: None, warnings }
            }
        }
    }

    async fn fetch_api(&self, api_key: &str, ctx: &CancellationToken) -> Result<TailscaleStatus, String> {
        let url = format!("{}/tailnet/{}/devices", self.api_base, self.tailnet);
        let req = self.client.get(&url).basic_auth(api_key, Some("")).timeout(http_client::REQUEST_TIMEOUT);
        let resp = http_client::send_cancellable(req, ctx).await.map_err(|e| e.to_string())?;

        if !resp.status().is_success() {
            return Err(format!("http {}", resp.status()));
        }
        let body = http_client::capped_text(resp).await.map_err(|e| e.to_string())?;
        let parsed: ApiDevicesResponse = serde_json::from_str(&body).map_err(|e| e.to_string())?;

        let nodes: Vec<TailscaleNode> = parsed
            .devices
            .into_iter()
            .map(|d| TailscaleNode {
                name: d.name,
                hostname: d.hostname,
                ip: d.addresses.into_iter().next().unwrap_or_default(),
                os: d.os,
                online: d.online,
                last_seen: d
                    .last_seen
                    .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(Utc::now),
                tags: d.tags,
                dashboard_url: self.dashboard_url.clone(),
                cpu_pct: None,
                ram_pct: None,
                disk_pct: None,
            })
            .collect();

        let online_count = nodes.iter().filter(|n| n.online).count();
        Ok(TailscaleStatus {
            tailnet: self.tailnet.clone(),
            online_count,
            total_count: nodes.len(),
            nodes,
        })
    }

    async fn fetch_cli(&self, ctx: &CancellationToken) -> Result<TailscaleStatus, String> {
        let output = subprocess::run("tailscale", &["status", "--json"], CLI_TIMEOUT, ctx)
            .await
            .map_err(|e| e.to_string())?;
        if output.status_code != Some(0) {
            return Err(format!("exit {:?}: {}", output.status_code, output.stderr.trim()));
        }
        let parsed: CliStatus = serde_json::from_str(&output.stdout).map_err(|e| e.to_string())?;

        let mut nodes = vec![cli_peer_to_node(&self.this_node_name(&parsed), &parsed.this_node, &self.dashboard_url)];
        let mut peer_names: Vec<&String> = parsed.peer.keys().collect();
        peer_names.sort();
        for name in peer_names {
            nodes.push(cli_peer_to_node(name, &parsed.peer[name], &self.dashboard_url));
        }

        let online_count = nodes.iter().filter(|n| n.online).count();
        Ok(TailscaleStatus {
            tailnet: self.tailnet.clone(),
            online_count,
            total_count: nodes.len(),
            nodes,
        })
    }

    fn this_node_name(&self, status: &CliStatus) -> String {
        status.this_node.hostname.clone()
    }
}

fn cli_peer_to_node(name: &str, peer: &CliPeer, dashboard_url: &Option<String>) -> TailscaleNode {
    let hostname = if peer.hostname.is_empty() {
        peer.dns_name.trim_end_matches('.').to_string()
    } else {
        peer.hostname.clone()
    };
    TailscaleNode {
        name: name.to_string(),
        hostname,
        ip: peer.tailscale_ips.first().cloned().unwrap_or_default(),
        os: peer.os.clone(),
        online: peer.online,
        // The CLI's Self/Peer map carries no per-node last-handshake
        // timestamp in the shape parsed here; readers treat Tailscale
        // CLI-sourced nodes' recency as "online" alone.
        last_seen: Utc::now(),
        tags: peer.tags.clone().unwrap_or_default(),
        dashboard_url: dashboard_url.clone(),
        cpu_pct: None,
        ram_pct: None,
        disk_pct: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_devices_response_parses_bare_ip_list() {
        let body = r#"{"devices":[{"name":"laptop","hostname":"laptop","addresses":["100.64.0.1"],"os":"linux","online":true,"tags":["tag:dev"]}]}"#;
        let parsed: ApiDevicesResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.devices.len(), 1);
        assert_eq!(parsed.devices[0].addresses[0], "100.64.0.1");
    }

    #[test]
    fn cli_status_parses_self_and_peer_map() {
        let body = r#"{
            "Self": {"HostName":"laptop","DNSName":"laptop.tailnet.ts.net.","TailscaleIPs":["100.64.0.1"],"OS":"linux","Online":true},
            "Peer": {"nodekey1": {"HostName":"server","DNSName":"server.tailnet.ts.net.","TailscaleIPs":["100.64.0.2"],"OS":"linux","Online":false}}
        }"#;
        let parsed: CliStatus = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.this_node.hostname, "laptop");
        assert_eq!(parsed.peer.len(), 1);
        assert!(!parsed.peer["nodekey1"].online);
    }

    #[tokio::test]
    async fn missing_api_key_skips_straight_to_cli_even_with_fallback_disabled() {
        let adapter = TailscaleAdapter::new("example.ts.net".to_string(), None, false);
        let ctx = CancellationToken::new();
        let outcome = adapter.fetch(&ctx).await;
        // No credential means the API branch never runs at all, so any
        // warning present must come from the CLI attempt, not the API.
        assert!(!outcome.warnings.iter().any(|w| w.starts_with("tailscale api:")));
        if !outcome.warnings.is_empty() {
            assert!(outcome.warnings.iter().any(|w| w.starts_with("tailscale cli:")));
        }
    }

    #[tokio::test]
    async fn api_failure_with_fallback_enabled_attempts_cli() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(500)).mount(&server).await;

        let adapter = TailscaleAdapter::new("example.ts.net".to_string(), Some("key".to_string()), true).with_api_base(server.uri());
        let ctx = CancellationToken::new();
        let outcome = adapter.fetch(&ctx).await;

        assert!(outcome.warnings.iter().any(|w| w.starts_with("tailscale api:")));
    }

    #[tokio::test]
    async fn api_failure_with_fallback_disabled_yields_no_status() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(500)).mount(&server).await;

        let adapter = TailscaleAdapter::new("example.ts.net".to_string(), Some("key".to_string()), false).with_api_base(server.uri());
        let ctx = CancellationToken::new();
        let outcome = adapter.fetch(&ctx).await;

        assert!(outcome.status.is_none());
        assert!(!outcome.warnings.iter().any(|w| w.starts_with("tailscale cli:")));
    }
}
