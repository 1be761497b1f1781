//! Billing collector aggregator (SPEC_FULL §4.2). Runs every configured
//! provider adapter concurrently in a single collection, fanning out to
//! parallel tasks, generalizing the cldbar Claude provider's
//! `build_usage_stats` pattern to multiple heterogeneous providers via
//! `futures::future::join_all`. Providers appear in the output in their
//! configured order regardless of task completion order.

pub mod aws;
pub mod civo;
pub mod digitalocean;
pub mod dreamhost;

use crate::cache::history::HistoryStore;
use crate::collector::Collector;
use crate::config::{resolve_credential, ProviderConfig};
use crate::error::CollectorError;
use crate::model::{BillingProvider, BillingSnapshot, BillingStatus, BillingTotal, CollectResult, CollectedData, ProviderBilling};
use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const CIVO_API_KEY_ENV: &str = "CIVO_API_KEY";
const DIGITALOCEAN_API_TOKEN_ENV: &str = "DIGITALOCEAN_API_TOKEN";
const DREAMHOST_API_KEY_ENV: &str = "DREAMHOST_API_KEY";

/// One entry per configured account, in declaration order: all Civo
/// accounts, then all DigitalOcean accounts, then AWS, then DreamHost.
/// This is the "configured order" the output list preserves.
pub struct BillingCollector {
    pub civo: Vec<ProviderConfig>,
    pub digitalocean: Vec<ProviderConfig>,
    pub aws: Vec<ProviderConfig>,
    pub dreamhost: Vec<ProviderConfig>,
    pub cache_dir: PathBuf,
    pub interval: Duration,
}

type ProviderFuture = Pin<Box<dyn Future<Output = (usize, ProviderBilling, Option<String>)> + Send>>;

#[async_trait]
impl Collector for BillingCollector {
    fn name(&self) -> &str {
        "billing"
    }

    fn description(&self) -> &str {
        "Cloud provider billing (Civo, DigitalOcean, AWS, DreamHost)"
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

        let mut futures: Vec<ProviderFuture> = Vec::new();
        let mut index = 0usize;

        for cfg in &self.civo {
            let idx = index;
            index += 1;
            let env_var = cfg.api_key_env.clone().unwrap_or_else(|| CIVO_API_KEY_ENV.to_string());
            let cfg = cfg.clone();
            let ctx = ctx.clone();
            futures.push(Box::pin(async move {
                match resolve_credential(&env_var) {
                    Some(key) => {
                        let adapter = civo::CivoAdapter::new(cfg.account_name.clone(), key, cfg.dashboard_url.clone(), cfg.budget_usd);
                        (idx, adapter.fetch(&ctx).await, None)
                    }
                    None => (idx, missing_credential(BillingProvider::Civo, &cfg), Some(format!("civo: missing credential {env_var}"))),
                }
            }));
        }

        for cfg in &self.digitalocean {
            let idx = index;
            index += 1;
            let env_var = cfg.api_key_env.clone().unwrap_or_else(|| DIGITALOCEAN_API_TOKEN_ENV.to_string());
            let cfg = cfg.clone();
            let ctx = ctx.clone();
            futures.push(Box::pin(async move {
                match resolve_credential(&env_var) {
                    Some(token) => {
                        let adapter =
                            digitalocean::DigitaloceanAdapter::new(cfg.account_name.clone(), token, cfg.dashboard_url.clone(), cfg.budget_usd);
                        (idx, adapter.fetch(&ctx).await, None)
                    }
                    None => (
                        idx,
                        missing_credential(BillingProvider::Digitalocean, &cfg),
                        Some(format!("digitalocean: missing credential {env_var}")),
                    ),
                }
            }));
        }

        for cfg in &self.aws {
            let idx = index;
            index += 1;
            let cfg = cfg.clone();
            let ctx = ctx.clone();
            futures.push(Box::pin(async move {
                let adapter = aws::AwsAdapter::new(cfg.account_name.clone(), cfg.dashboard_url.clone(), cfg.budget_usd);
                (idx, adapter.fetch(&ctx).await, None)
            }));
        }

        for cfg in &self.dreamhost {
            let idx = index;
            index += 1;
            let env_var = cfg.api_key_env.clone().unwrap_or_else(|| DREAMHOST_API_KEY_ENV.to_string());
            let cfg = cfg.clone();
            let ctx = ctx.clone();
            futures.push(Box::pin(async move {
                let adapter = dreamhost::DreamhostAdapter::new(cfg.account_name.clone(), resolve_credential(&env_var), cfg.dashboard_url.clone(), cfg.budget_usd);
                (idx, adapter.fetch(&ctx).await, None)
            }));
        }

        let mut results = join_all(futures).await;
        results.sort_by_key(|(idx, _, _)| *idx);

        let mut providers = Vec::with_capacity(results.len());
        let mut warnings = Vec::new();
        for (_, provider, warning) in results {
            if let Some(w) = warning {
                warnings.push(w);
            }
            providers.push(provider);
        }

        let total = aggregate_total(&providers);
        if providers.iter().all(|p| p.status == BillingStatus::Error) && !providers.is_empty() {
            warnings.push("no billing provider returned usable data".to_string());
        }

        let snapshot = BillingSnapshot {
            providers: providers.clone(),
            total,
            warnings: warnings.clone(),
        };

        update_history(&self.cache_dir, &providers);

        Ok(CollectResult {
            collector: self.name().to_string(),
            timestamp: Utc::now(),
            data: CollectedData::Billing(snapshot),
            warnings,
        })
    }
}

fn missing_credential(provider: BillingProvider, cfg: &ProviderConfig) -> ProviderBilling {
    let now = Utc::now();
    ProviderBilling {
        provider,
        account_name: cfg.account_name.clone(),
        status: BillingStatus::Error,
        dashboard_url: cfg.dashboard_url.clone(),
        current_month: None,
        previous_month_usd: None,
        fetched_at: now,
    }
}

fn aggregate_total(providers: &[ProviderBilling]) -> BillingTotal {
    let usable: Vec<&ProviderBilling> = providers.iter().filter(|p| p.status != BillingStatus::Error).collect();

    let current_month_usd = usable.iter().filter_map(|p| p.current_month.as_ref().map(|m| m.spend_usd)).sum();

    let forecasts: Vec<f64> = usable.iter().filter_map(|p| p.current_month.as_ref().and_then(|m| m.forecast_usd)).collect();
    let forecast_usd = if forecasts.is_empty() { None } else { Some(round_cents(forecasts.iter().sum())) };

    let budgets: Vec<f64> = usable.iter().filter_map(|p| p.current_month.as_ref().and_then(|m| m.budget_usd)).collect();
    let budget_usd = if budgets.is_empty() { None } else { Some(round_cents(budgets.iter().sum())) };

    BillingTotal {
        current_month_usd: round_cents(current_month_usd),
        forecast_usd,
        budget_usd,
    }
}

fn update_history(cache_dir: &std::path::Path, providers: &[ProviderBilling]) {
    let store = HistoryStore::new(cache_dir);
    let mut history = store.load();
    let per_provider: Vec<(String, f64)> = providers
        .iter()
        .filter(|p| p.status != BillingStatus::Error)
        .filter_map(|p| p.current_month.as_ref().map(|m| (p.provider.as_str().to_string(), m.spend_usd)))
        .collect();
    store.update(&mut history, Utc::now().date_naive(), &per_provider);
    let _ = store.save(&history);
}

fn round_cents(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BillingPeriod;

    fn provider(provider: BillingProvider, status: BillingStatus, spend: f64, forecast: Option<f64>) -> ProviderBilling {
        ProviderBilling {
            provider,
            account_name: "acct".to_string(),
            status,
            dashboard_url: None,
            current_month: Some(BillingPeriod {
                spend_usd: spend,
                forecast_usd: forecast,
                budget_usd: None,
                start_date: "2026-07-01".to_string(),
                end_date: "2026-07-31".to_string(),
            }),
            previous_month_usd: None,
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn aggregate_excludes_errored_providers() {
        let providers = vec![
            provider(BillingProvider::Civo, BillingStatus::AuthFailed, 0.0, None),
            provider(BillingProvider::Digitalocean, BillingStatus::Ok, 7.80, Some(30.0)),
        ];
        let total = aggregate_total(&providers);
        assert_eq!(total.current_month_usd, 7.80);
        assert_eq!(total.forecast_usd, Some(30.0));
    }

    #[test]
    fn aggregate_forecast_absent_when_no_provider_supplies_it() {
        let providers = vec![provider(BillingProvider::Civo, BillingStatus::Ok, 5.0, None)];
        let total = aggregate_total(&providers);
        assert!(total.forecast_usd.is_none());
    }

    #[test]
    fn all_errored_yields_zero_aggregate() {
        let providers = vec![provider(BillingProvider::Civo, BillingStatus::Error, 0.0, None)];
        let total = aggregate_total(&providers);
        assert_eq!(total.current_month_usd, 0.0);
    }

    #[tokio::test]
    async fn missing_credential_collector_produces_error_placeholder_in_order() {
        let dir = tempfile::tempdir().unwrap();
        std::env::remove_var("CIVO_API_KEY_TEST_BILLING");
        let collector = BillingCollector {
            civo: vec![ProviderConfig {
                account_name: "main".to_string(),
                dashboard_url: None,
                budget_usd: None,
                api_key_env: Some("CIVO_API_KEY_TEST_BILLING".to_string()),
            }],
            digitalocean: vec![],
            aws: vec![],
            dreamhost: vec![],
            cache_dir: dir.path().to_path_buf(),
            interval: Duration::from_secs(60),
        };
        let ctx = CancellationToken::new();
        let result = collector.collect(&ctx).await.unwrap();
        let CollectedData::Billing(snapshot) = result.data else {
            panic!("expected billing data");
        };
        assert_eq!(snapshot.providers.len(), 1);
        assert_eq!(snapshot.providers[0].status, BillingStatus::Error);
        assert!(result.warnings.iter().any(|w| w.contains("missing credential")));
    }
}
