//! Canonical records every collector normalizes its source data into.
//!
//! These are the only shapes that cross the collector/cache boundary; see
//! `SPEC_FULL.md` §3 for the field-by-field contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingProvider {
    Civo,
    Digitalocean,
    Aws,
    Dreamhost,
}

impl BillingProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingProvider::Civo => "civo",
            BillingProvider::Digitalocean => "digitalocean",
            BillingProvider::Aws => "aws",
            BillingProvider::Dreamhost => "dreamhost",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingStatus {
    Ok,
    Limited,
    AuthFailed,
    RateLimited,
    Error,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BillingPeriod {
    pub spend_usd: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub forecast_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub budget_usd: Option<f64>,
    pub start_date: String,
    pub end_date: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderBilling {
    pub provider: BillingProvider,
    pub account_name: String,
    pub status: BillingStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub dashboard_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub current_month: Option<BillingPeriod>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub previous_month_usd: Option<f64>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BillingTotal {
    pub current_month_usd: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub forecast_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub budget_usd: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BillingSnapshot {
    pub providers: Vec<ProviderBilling>,
    pub total: BillingTotal,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TailscaleNode {
    pub name: String,
    pub hostname: String,
    pub ip: String,
    pub os: String,
    pub online: bool,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub dashboard_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cpu_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ram_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub disk_pct: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TailscaleStatus {
    pub tailnet: String,
    pub online_count: usize,
    pub total_count: usize,
    pub nodes: Vec<TailscaleNode>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KubeClusterStatus {
    Healthy,
    Degraded,
    Offline,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum KubeNodeStatus {
    Ready,
    NotReady,
    Unknown,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KubeNode {
    pub name: String,
    pub status: KubeNodeStatus,
    pub cpu_pct: f64,
    pub mem_pct: f64,
    pub pod_count: u32,
    pub max_pods: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KubernetesCluster {
    pub name: String,
    pub platform: String,
    pub status: KubeClusterStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub api_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub dashboard_url: Option<String>,
    pub total_nodes: u32,
    pub ready_nodes: u32,
    pub nodes: Vec<KubeNode>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InfraStatus {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tailscale: Option<TailscaleStatus>,
    #[serde(default)]
    pub kubernetes: Vec<KubernetesCluster>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelUsage {
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
    pub cost_usd: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClaudeAccountUsage {
    pub name: String,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    pub current_month_usd: f64,
    pub previous_month_usd: f64,
    #[serde(default)]
    pub models: Vec<ModelUsage>,
    pub daily_burn_rate: f64,
    pub projected_monthly: f64,
    pub days_remaining: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClaudeUsageReport {
    pub accounts: Vec<ClaudeAccountUsage>,
    pub total_cost_usd: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SysMetrics {
    pub cpu_pct: f64,
    pub ram_pct: f64,
    pub disk_pct: f64,
    pub load_1: f64,
    pub load_5: f64,
    pub load_15: f64,
    pub uptime_secs: u64,
    #[serde(default)]
    pub cpu_history: Vec<f64>,
    #[serde(default)]
    pub ram_history: Vec<f64>,
    #[serde(default)]
    pub disk_history: Vec<f64>,
}

/// Tagged union over every canonical record a collector may produce.
///
/// Readers discriminate by `CollectResult::collector` and match on this
/// enum to recover the concrete shape; no cycles exist since variants never
/// reference the envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CollectedData {
    Billing(BillingSnapshot),
    Infra(InfraStatus),
    ClaudeUsage(ClaudeUsageReport),
    SysMetrics(SysMetrics),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CollectResult {
    pub collector: String,
    pub timestamp: DateTime<Utc>,
    pub data: CollectedData,
    #[serde(default)]
    pub warnings: Vec<String>,
}
