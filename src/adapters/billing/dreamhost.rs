//! DreamHost billing adapter (SPEC_FULL §4.2). DreamHost has no
//! month-to-date total endpoint, so this adapter is deliberately
//! "limited": it always reports the dashboard URL and month window, and
//! only attempts the bandwidth/rewards calls when a credential is present.

use crate::model::{BillingPeriod, BillingProvider, BillingStatus, ProviderBilling};
use crate::utils::http_client;
use chrono::{Datelike, Utc};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

const DREAMHOST_API_BASE: &str = "https://api.dreamhost.com";

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    result: String,
    #[serde(default)]
    data: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
struct BandwidthRecord {
    #[serde(default)]
    total: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RewardRecord {
    #[serde(default)]
    amount: Option<String>,
}

pub struct DreamhostAdapter {
    pub account_name: String,
    pub api_key: Option<String>,
    pub dashboard_url: Option<String>,
    pub budget_usd: Option<f64>,
    base_url: String,
    client: reqwest::Client,
}

impl DreamhostAdapter {
    pub fn new(account_name: String, api_key: Option<String>, dashboard_url: Option<String>, budget_usd: Option<f64>) -> Self {
        Self {
            account_name,
            api_key,
            dashboard_url,
            budget_usd,
            base_url: DREAMHOST_API_BASE.to_string(),
            client: http_client::build_client(),
        }
    }

    /// Overrides the API base URL, for pointing the adapter at a mock
    /// server in tests.
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    pub async fn fetch(&self, ctx: &CancellationToken) -> ProviderBilling {
        let now = Utc::now();
        let start_date = now.with_day(1).unwrap_or(now).format("%Y-%m-%d").to_string();
        let end_date = now.format("%Y-%m-%d").to_string();

        let Some(api_key) = &self.api_key else {
            return self.limited_result(&start_date, &end_date, 0.0, None);
        };

        let bandwidth = self.fetch_bandwidth_total(api_key, ctx).await;
        let rewards = self.fetch_rewards_total(api_key, ctx).await;

        self.limited_result(&start_date, &end_date, bandwidth.unwrap_or(0.0), rewards.map(|r| -r))
    }

    async fn fetch_bandwidth_total(&self, api_key: &str, ctx: &CancellationToken) -> Option<f64> {
        let req = self
            .client
            .get(&self.base_url)
            .query(&[("key", api_key), ("cmd", "billing-list_bandwidth"), ("format", "json")])
            .timeout(http_client::REQUEST_TIMEOUT);
        let resp = http_client::send_cancellable(req, ctx).await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let body = http_client::capped_text(resp).await.ok()?;
        let envelope: ApiEnvelope<BandwidthRecord> = serde_json::from_str(&body).ok()?;
        if envelope.result != "success" {
            return None;
        }
        Some(envelope.data.iter().filter_map(|r| r.total.as_ref()?.parse::<f64>().ok()).sum())
    }

    async fn fetch_rewards_total(&self, api_key: &str, ctx: &CancellationToken) -> Option<f64> {
        let req = self
            .client
            .get(&self.base_url)
            .query(&[("key", api_key), ("cmd", "billing-list_rewards"), ("format", "json")])
            .timeout(http_client::REQUEST_TIMEOUT);
        let resp = http_client::send_cancellable(req, ctx).await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let body = http_client::capped_text(resp).await.ok()?;
        let envelope: ApiEnvelope<RewardRecord> = serde_json::from_str(&body).ok()?;
        if envelope.result != "success" {
            return None;
        }
        Some(envelope.data.iter().filter_map(|r| r.amount.as_ref()?.parse::<f64>().ok()).sum())
    }

    fn limited_result(&self, start_date: &str, end_date: &str, spend_usd: f64, forecast_usd: Option<f64>) -> ProviderBilling {
        ProviderBilling {
            provider: BillingProvider::Dreamhost,
            account_name: self.account_name.clone(),
            status: BillingStatus::Limited,
            dashboard_url: self.dashboard_url.clone(),
            current_month: Some(BillingPeriod {
                spend_usd: round_cents(spend_usd),
                forecast_usd: forecast_usd.map(round_cents),
                budget_usd: self.budget_usd,
                start_date: start_date.to_string(),
                end_date: end_date.to_string(),
            }),
            previous_month_usd: None,
            fetched_at: Utc::now(),
        }
    }
}

fn round_cents(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn without_credential_yields_limited_zero_spend() {
        let adapter = DreamhostAdapter::new(
            "main".to_string(),
            None,
            Some("https://panel.dreamhost.com".to_string()),
            None,
        );
        let ctx = CancellationToken::new();
        let result = adapter.fetch(&ctx).await;
        assert_eq!(result.status, BillingStatus::Limited);
        assert_eq!(result.current_month.as_ref().unwrap().spend_usd, 0.0);
        assert!(result.current_month.as_ref().unwrap().forecast_usd.is_none());
    }

    #[tokio::test]
    async fn with_credential_folds_bandwidth_and_rewards_into_spend() {
        use wiremock::matchers::{method, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("cmd", "billing-list_bandwidth"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": "success",
                "data": [{"total": "2.00"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("cmd", "billing-list_rewards"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": "success",
                "data": [{"amount": "0.50"}]
            })))
            .mount(&server)
            .await;

        let adapter = DreamhostAdapter::new("main".to_string(), Some("key".to_string()), None, None).with_base_url(server.uri());
        let ctx = CancellationToken::new();
        let result = adapter.fetch(&ctx).await;

        assert_eq!(result.status, BillingStatus::Limited);
        let period = result.current_month.unwrap();
        assert_eq!(period.spend_usd, 2.0);
        assert_eq!(period.forecast_usd, Some(-0.5));
    }

    #[test]
    fn limited_result_never_sets_previous_month() {
        let adapter = DreamhostAdapter::new("main".to_string(), None, None, None);
        let result = adapter.limited_result("2026-07-01", "2026-07-31", 2.5, Some(-1.0));
        assert_eq!(result.status, BillingStatus::Limited);
        assert_eq!(result.current_month.unwrap().forecast_usd, Some(-1.0));
        assert!(result.previous_month_usd.is_none());
    }
}
