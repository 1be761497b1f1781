//! Infra collector (SPEC_FULL §4.2): runs the Tailscale adapter and every
//! configured Kubernetes context concurrently in one collection, joins on
//! all of them, and assembles `InfraStatus`. Kubernetes clusters are
//! emitted in configured order regardless of completion order, mirroring
//! the billing aggregator's fan-out-then-sort pattern.

use crate::collector::Collector;
use crate::config::KubernetesContextConfig;
use crate::error::CollectorError;
use crate::model::{CollectResult, CollectedData, InfraStatus};
use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::kubernetes::KubernetesAdapter;
use super::tailscale::TailscaleAdapter;

pub struct InfraCollector {
    pub tailscale: Option<TailscaleAdapter>,
    pub kubernetes_contexts: Vec<KubernetesContextConfig>,
    pub interval: Duration,
}

#[async_trait]
impl Collector for InfraCollector {
    fn name(&self) -> &str {
        "infra"
    }

    fn description(&self) -> &str {
        "Tailscale mesh status and Kubernetes cluster health"
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

        let mut warnings = Vec::new();

        let tailscale_future = async {
            match &self.tailscale {
                Some(adapter) => {
                    let outcome = adapter.fetch(ctx).await;
                    (outcome.status, outcome.warnings)
                }
                None => (None, Vec::new()),
            }
        };

        let cluster_futures = self.kubernetes_contexts.iter().enumerate().map(|(idx, cfg)| {
            let adapter = KubernetesAdapter::new(cfg.context.clone(), cfg.platform.clone(), cfg.dashboard_url.clone());
            async move { (idx, adapter.fetch(ctx).await) }
        });

        let (tailscale_result, mut cluster_results) = tokio::join!(tailscale_future, join_all(cluster_futures));

        let (tailscale, tailscale_warnings) = tailscale_result;
        warnings.extend(tailscale_warnings);

        cluster_results.sort_by_key(|(idx, _)| *idx);
        let kubernetes = cluster_results.into_iter().map(|(_, cluster)| cluster).collect();

        let status = InfraStatus { tailscale, kubernetes };

        Ok(CollectResult {
            collector: self.name().to_string(),
            timestamp: Utc::now(),
            data: CollectedData::Infra(status),
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_sources_configured_yields_empty_status() {
        let collector = InfraCollector {
            tailscale: None,
            kubernetes_contexts: Vec::new(),
            interval: Duration::from_secs(30),
        };
        let ctx = CancellationToken::new();
        let result = collector.collect(&ctx).await.unwrap();
        let CollectedData::Infra(status) = result.data else {
            panic!("expected infra data");
        };
        assert!(status.tailscale.is_none());
        assert!(status.kubernetes.is_empty());
    }

    #[tokio::test]
    async fn cancelled_context_yields_fatal_error() {
        let collector = InfraCollector {
            tailscale: None,
            kubernetes_contexts: Vec::new(),
            interval: Duration::from_secs(30),
        };
        let ctx = CancellationToken::new();
        ctx.cancel();
        let result = collector.collect(&ctx).await;
        assert!(result.is_err());
    }
}
