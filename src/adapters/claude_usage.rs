//! Claude usage adapter (SPEC_FULL §4.2), grounded in cldbar's
//! `claude_api.rs` pagination loop (`has_more`/`next_page`) against the
//! Anthropic Admin API, generalized to emit per-model cost via the local
//! pricing table rather than reading a separate cost endpoint so the
//! breakdown stays per-model. The clock is injectable so date-window math
//! is deterministic under test.

use crate::collector::Collector;
use crate::error::CollectorError;
use crate::model::{ClaudeAccountUsage, ClaudeUsageReport, CollectResult, CollectedData, ModelUsage};
use crate::utils::http_client;
use crate::utils::pricing::{estimate_cost_usd, rate_for_model};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration as ChronoDuration, Utc};
use futures::future::join_all;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const API_BASE: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Deserialize)]
struct UsageReport {
    data: Vec<UsageBucket>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    next_page: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageBucket {
    results: Vec<UsageResult>,
}

#[derive(Debug, Deserialize)]
struct UsageResult {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    uncached_input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: u64,
    #[serde(default)]
    cache_creation: Option<CacheCreation>,
}

#[derive(Debug, Deserialize)]
struct CacheCreation {
    #[serde(default)]
    ephemeral_5m_input_tokens: u64,
    #[serde(default)]
    ephemeral_1h_input_tokens: u64,
}

pub struct ClaudeAccountAdapter {
    pub name: String,
    pub api_key: String,
    base_url: String,
    client: reqwest::Client,
    clock: Arc<dyn Clock>,
}

impl ClaudeAccountAdapter {
    pub fn new(name: String, api_key: String, clock: Arc<dyn Clock>) -> Self {
        Self {
            name,
            api_key,
            base_url: API_BASE.to_string(),
            client: http_client::build_client(),
            clock,
        }
    }

    /// Overrides the API base URL, for pointing the adapter at a mock
    /// server in tests.
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    pub async fn fetch(&self, ctx: &CancellationToken) -> ClaudeAccountUsage {
        let now = self.clock.now();

        let current_start = now.with_day(1).unwrap_or(now);
        let days_elapsed = (now.day() as f64).max(1.0);
        let days_in_month = super::billing::civo::days_in_month(now.year(), now.month()) as f64;

        let prev_month_end = current_start - ChronoDuration::seconds(1);
        let prev_month_start = prev_month_end.with_day(1).unwrap_or(prev_month_end);

        let current_models = match self.fetch_model_tokens(&rfc3339_start(current_start), &rfc3339_end(now), ctx).await {
            Ok(m) => m,
            Err(e) => return disconnected(&self.name, e),
        };

        let previous_models = self
            .fetch_model_tokens(&rfc3339_start(prev_month_start), &rfc3339_end(prev_month_end), ctx)
            .await
            .unwrap_or_default();

        let models = build_model_usage(current_models);
        let current_month_usd = round_cents(models.iter().map(|m| m.cost_usd).sum());
        let previous_month_usd = round_cents(build_model_usage(previous_models).iter().map(|m| m.cost_usd).sum());

        let daily_burn_rate = round_cents(current_month_usd / days_elapsed);
        let projected_monthly = round_cents(daily_burn_rate * days_in_month);
        let days_remaining = (days_in_month - days_elapsed).max(0.0) as i64;

        ClaudeAccountUsage {
            name: self.name.clone(),
            connected: true,
            error: None,
            current_month_usd,
            previous_month_usd,
            models,
            daily_burn_rate,
            projected_monthly,
            days_remaining,
        }
    }

    async fn fetch_model_tokens(
        &self,
        starting_at: &str,
        ending_at: &str,
        ctx: &CancellationToken,
    ) -> Result<HashMap<String, (u64, u64, u64, u64)>, String> {
        let mut totals: HashMap<String, (u64, u64, u64, u64)> = HashMap::new();
        let mut page: Option<String> = None;

        loop {
            let mut req = self
                .client
                .get(format!("{}/v1/organizations/usage_report/messages", self.base_url))
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .query(&[("starting_at", starting_at), ("ending_at", ending_at), ("bucket_width", "1d"), ("limit", "31"), ("group_by[]", "model")])
                .timeout(http_client::REQUEST_TIMEOUT);

            if let Some(p) = &page {
                req = req.query(&[("page", p.as_str())]);
            }

            let resp = http_client::send_cancellable(req, ctx).await.map_err(|e| e.to_string())?;
            if !resp.status().is_success() {
                let status = resp.status();
                return Err(format!("usage_report http {status}"));
            }

            let body = http_client::capped_text(resp).await.map_err(|e| e.to_string())?;
            let report: UsageReport = serde_json::from_str(&body).map_err(|e| e.to_string())?;

            for bucket in report.data {
                for result in bucket.results {
                    let model = result.model.unwrap_or_else(|| "unknown".to_string());
                    let cache_write = result
                        .cache_creation
                        .as_ref()
                        .map(|c| c.ephemeral_5m_input_tokens + c.ephemeral_1h_input_tokens)
                        .unwrap_or(0);
                    let entry = totals.entry(model).or_insert((0, 0, 0, 0));
                    entry.0 += result.uncached_input_tokens;
                    entry.1 += result.output_tokens;
                    entry.2 += result.cache_read_input_tokens;
                    entry.3 += cache_write;
                }
            }

            if report.has_more {
                page = report.next_page;
                if page.is_none() {
                    break;
                }
            } else {
                break;
            }
        }

        Ok(totals)
    }
}

fn build_model_usage(totals: HashMap<String, (u64, u64, u64, u64)>) -> Vec<ModelUsage> {
    let mut models: Vec<ModelUsage> = totals
        .into_iter()
        .map(|(model, (input, output, cache_read, cache_write))| {
            let rate = rate_for_model(&model);
            let cost_usd = estimate_cost_usd(rate, input, output, cache_read, cache_write);
            ModelUsage {
                model,
                input_tokens: input,
                output_tokens: output,
                cache_read_tokens: cache_read,
                cache_write_tokens: cache_write,
                cost_usd,
            }
        })
        .collect();
    models.sort_by(|a, b| a.model.cmp(&b.model));
    models
}

fn disconnected(name: &str, error: String) -> ClaudeAccountUsage {
    ClaudeAccountUsage {
        name: name.to_string(),
        connected: false,
        error: Some(error),
        current_month_usd: 0.0,
        previous_month_usd: 0.0,
        models: Vec::new(),
        daily_burn_rate: 0.0,
        projected_monthly: 0.0,
        days_remaining: 0,
    }
}

fn rfc3339_start(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT00:00:00Z").to_string()
}

fn rfc3339_end(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT23:59:59Z").to_string()
}

fn round_cents(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub struct ClaudeUsageCollector {
    pub accounts: Vec<ClaudeAccountAdapter>,
    pub interval: Duration,
}

#[async_trait]
impl Collector for ClaudeUsageCollector {
    fn name(&self) -> &str {
        "claude_usage"
    }

    fn description(&self) -> &str {
        "Claude API usage and cost, per account"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn collect(&self, ctx: &CancellationToken) -> Result<CollectResult, CollectorError> {
        if ctx.is_cancelled() {
            return Err(CollectorError::Cancelled {
                collector: self.name().to_string(),
            });
        }

        let accounts = join_all(self.accounts.iter().map(|a| a.fetch(ctx))).await;
        let total_cost_usd = round_cents(accounts.iter().map(|a| a.current_month_usd).sum());
        let warnings = accounts
            .iter()
            .filter_map(|a| a.error.as_ref().map(|e| format!("{}: {}", a.name, e)))
            .collect();

        Ok(CollectResult {
            collector: self.name().to_string(),
            timestamp: Utc::now(),
            data: CollectedData::ClaudeUsage(ClaudeUsageReport { accounts, total_cost_usd }),
            warnings,
        })
    }
}
