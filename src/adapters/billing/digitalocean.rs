//! DigitalOcean billing adapter (SPEC_FULL §4.2). Balance is mandatory;
//! the previous-month invoice lookup is best-effort and its failure is
//! non-fatal (absent `previous_month_usd`, no status downgrade).

use crate::model::{BillingPeriod, BillingProvider, BillingStatus, ProviderBilling};
use crate::utils::http_client;
use chrono::{Datelike, Utc};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

const DO_API_BASE: &str = "https://api.digitalocean.com/v2";

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    month_to_date_usage: String,
}

#[derive(Debug, Deserialize)]
struct InvoicesResponse {
    #[serde(default)]
    invoices: Vec<InvoiceSummary>,
}

#[derive(Debug, Deserialize)]
struct InvoiceSummary {
    invoice_period: String,
    amount: String,
}

pub struct DigitaloceanAdapter {
    pub account_name: String,
    pub api_token: String,
    pub dashboard_url: Option<String>,
    pub budget_usd: Option<f64>,
    base_url: String,
    client: reqwest::Client,
}

impl DigitaloceanAdapter {
    pub fn new(account_name: String, api_token: String, dashboard_url: Option<String>, budget_usd: Option<f64>) -> Self {
        Self {
            account_name,
            api_token,
            dashboard_url,
            budget_usd,
            base_url: DO_API_BASE.to_string(),
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

        let req = self
            .client
            .get(format!("{}/customers/my/balance", self.base_url))
            .bearer_auth(&self.api_token)
            .timeout(http_client::REQUEST_TIMEOUT);

        let resp = match http_client::send_cancellable(req, ctx).await {
            Ok(r) => r,
            Err(_) => return self.error_result(BillingStatus::Error, &start_date, &end_date),
        };
        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return self.error_result(BillingStatus::AuthFailed, &start_date, &end_date);
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return self.error_result(BillingStatus::RateLimited, &start_date, &end_date);
        }
        if !status.is_success() {
            return self.error_result(BillingStatus::Error, &start_date, &end_date);
        }

        let balance: BalanceResponse = match resp.json().await {
            Ok(b) => b,
            Err(_) => return self.error_result(BillingStatus::Error, &start_date, &end_date),
        };
        let spend: f64 = balance.month_to_date_usage.parse().unwrap_or(0.0);

        let days_elapsed = (now.day() as f64).max(1.0);
        let days_in_month = super::civo::days_in_month(now.year(), now.month()) as f64;
        let forecast = (spend / days_elapsed) * days_in_month;

        let previous_month_usd = self.fetch_previous_month_invoice(now, ctx).await;

        ProviderBilling {
            provider: BillingProvider::Digitalocean,
            account_name: self.account_name.clone(),
            status: BillingStatus::Ok,
            dashboard_url: self.dashboard_url.clone(),
            current_month: Some(BillingPeriod {
                spend_usd: round_cents(spend),
                forecast_usd: Some(round_cents(forecast)),
                budget_usd: self.budget_usd,
                start_date,
                end_date,
            }),
            previous_month_usd,
            fetched_at: now,
        }
    }

    async fn fetch_previous_month_invoice(&self, now: chrono::DateTime<Utc>, ctx: &CancellationToken) -> Option<f64> {
        let prev = now.with_day(1)? - chrono::Duration::days(1);
        let period = prev.format("%Y-%m").to_string();

        let req = self
            .client
            .get(format!("{}/customers/my/invoices", self.base_url))
            .bearer_auth(&self.api_token)
            .timeout(http_client::REQUEST_TIMEOUT);

        let resp = http_client::send_cancellable(req, ctx).await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let invoices: InvoicesResponse = resp.json().await.ok()?;
        invoices
            .invoices
            .into_iter()
            .find(|inv| inv.invoice_period == period)
            .and_then(|inv| inv.amount.parse().ok())
    }

    fn error_result(&self, status: BillingStatus, start_date: &str, end_date: &str) -> ProviderBilling {
        ProviderBilling {
            provider: BillingProvider::Digitalocean,
            account_name: self.account_name.clone(),
            status,
            dashboard_url: self.dashboard_url.clone(),
            current_month: Some(BillingPeriod {
                spend_usd: 0.0,
                forecast_usd: None,
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

    #[test]
    fn error_result_leaves_previous_month_absent() {
        let adapter = DigitaloceanAdapter::new("main".to_string(), "tok".to_string(), None, None);
        let result = adapter.error_result(BillingStatus::RateLimited, "2026-07-01", "2026-07-31");
        assert_eq!(result.status, BillingStatus::RateLimited);
        assert!(result.previous_month_usd.is_none());
    }

    #[tokio::test]
    async fn healthy_balance_with_failing_invoice_lookup_is_still_ok() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/customers/my/balance"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"month_to_date_usage": "12.34"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/customers/my/invoices"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let adapter = DigitaloceanAdapter::new("main".to_string(), "tok".to_string(), None, None).with_base_url(server.uri());
        let ctx = CancellationToken::new();
        let result = adapter.fetch(&ctx).await;

        assert_eq!(result.status, BillingStatus::Ok);
        assert_eq!(result.current_month.unwrap().spend_usd, 12.34);
        assert!(result.previous_month_usd.is_none());
    }

    #[tokio::test]
    async fn auth_failure_is_classified_from_balance_call() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(401)).mount(&server).await;

        let adapter = DigitaloceanAdapter::new("main".to_string(), "tok".to_string(), None, None).with_base_url(server.uri());
        let ctx = CancellationToken::new();
        let result = adapter.fetch(&ctx).await;

        assert_eq!(result.status, BillingStatus::AuthFailed);
    }
}
