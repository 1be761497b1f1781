//! Per-pass concurrent dispatch over the registry (SPEC_FULL §4.5).
//!
//! The tick loop is grounded in the monitoring harness's
//! `MonitoringSystem::start_monitoring` (`tokio::spawn` + `tokio::time::interval`).

use crate::cache::CacheStore;
use crate::registry::Registry;
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    PassRunning,
    Draining,
    Stopped,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub last_poll: DateTime<Utc>,
    pub collectors: HashMap<String, String>,
}

pub struct Scheduler {
    registry: Arc<Registry>,
    cache: Arc<CacheStore>,
    last_run: Mutex<HashMap<String, DateTime<Utc>>>,
    state: Mutex<SchedulerState>,
    tick_interval: Duration,
}

impl Scheduler {
    pub fn new(registry: Arc<Registry>, cache: Arc<CacheStore>, tick_interval: Duration) -> Self {
        Self {
            registry,
            cache,
            last_run: Mutex::new(HashMap::new()),
            state: Mutex::new(SchedulerState::Idle),
            tick_interval,
        }
    }

    pub async fn state(&self) -> SchedulerState {
        *self.state.lock().await
    }

    /// Runs an immediate pass, then ticks forever until `ctx` is cancelled.
    pub async fn run(&self, ctx: CancellationToken) {
        self.run_pass(&ctx).await;

        let mut ticker = interval(self.tick_interval);
        loop {
            tokio::select! {
                _ = ctx.cancelled() => break,
                _ = ticker.tick() => {
                    if ctx.is_cancelled() {
                        break;
                    }
                    self.run_pass(&ctx).await;
                }
            }
        }

        *self.state.lock().await = SchedulerState::Draining;
        *self.state.lock().await = SchedulerState::Stopped;
    }

    /// Launches one task per due collector, joins them all, then rewrites
    /// the health heartbeat. Collectors whose interval has not elapsed are
    /// skipped without touching their cache entry or `last_run`.
    pub async fn run_pass(&self, ctx: &CancellationToken) {
        if ctx.is_cancelled() {
            return;
        }
        *self.state.lock().await = SchedulerState::PassRunning;

        let now = Utc::now();
        let mut due = Vec::new();
        {
            let last_run = self.last_run.lock().await;
            for collector in self.registry.snapshot() {
                let elapsed = last_run
                    .get(collector.name())
                    .map(|t| now.signed_duration_since(*t))
                    .and_then(|d| d.to_std().ok());
                let is_due = match elapsed {
                    Some(elapsed) => elapsed >= collector.interval(),
                    None => true,
                };
                if is_due {
                    due.push(collector);
                }
            }
        }

        let mut join_set = tokio::task::JoinSet::new();
        for collector in due {
            let cache = Arc::clone(&self.cache);
            let ctx = ctx.clone();
            join_set.spawn(async move {
                let name = collector.name().to_string();
                match collector.collect(&ctx).await {
                    Ok(result) => {
                        for w in &result.warnings {
                            warn!("{name}: {w}");
                        }
                        if let Err(e) = cache.set(&name, &result).await {
                            warn!("{name}: failed to write cache: {e}");
                            return (name, false);
                        }
                        (name, true)
                    }
                    Err(e) => {
                        warn!("{name}: collection failed: {e}");
                        (name, false)
                    }
                }
            });
        }

        let mut outcomes: HashMap<String, bool> = HashMap::new();
        while let Some(joined) = join_set.join_next().await {
            if let Ok((name, ok)) = joined {
                outcomes.insert(name, ok);
            }
        }

        {
            let mut last_run = self.last_run.lock().await;
            for (name, ok) in &outcomes {
                if *ok {
                    last_run.insert(name.clone(), now);
                }
            }
        }

        self.write_health(&outcomes).await;
        *self.state.lock().await = SchedulerState::Idle;
        info!("pass complete: {} collector(s) ran", outcomes.len());
    }

    async fn write_health(&self, outcomes: &HashMap<String, bool>) {
        let collectors = outcomes
            .iter()
            .map(|(k, ok)| (k.clone(), if *ok { "ok".to_string() } else { "error".to_string() }))
            .collect();
        let report = HealthReport {
            status: "ok".to_string(),
            last_poll: Utc::now(),
            collectors,
        };
        if let Err(e) = self.cache.set("health", &report).await {
            warn!("failed to write health heartbeat: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectorError;
    use crate::model::{CollectResult, CollectedData, SysMetrics};
    use async_trait::async_trait;

    fn empty_sys_metrics() -> SysMetrics {
        SysMetrics {
            cpu_pct: 0.0,
            ram_pct: 0.0,
            disk_pct: 0.0,
            load_1: 0.0,
            load_5: 0.0,
            load_15: 0.0,
            uptime_secs: 0,
            cpu_history: vec![],
            ram_history: vec![],
            disk_history: vec![],
        }
    }

    struct AlwaysOk(&'static str);

    #[async_trait]
    impl crate::collector::Collector for AlwaysOk {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "always ok"
        }
        fn interval(&self) -> Duration {
            Duration::from_secs(0)
        }
        async fn collect(&self, _ctx: &CancellationToken) -> Result<CollectResult, CollectorError> {
            Ok(CollectResult {
                collector: self.0.to_string(),
                timestamp: Utc::now(),
                data: CollectedData::SysMetrics(empty_sys_metrics()),
                warnings: vec![],
            })
        }
    }

    struct AlwaysFatal;

    #[async_trait]
    impl crate::collector::Collector for AlwaysFatal {
        fn name(&self) -> &str {
            "fatal"
        }
        fn description(&self) -> &str {
            "always fatal"
        }
        fn interval(&self) -> Duration {
            Duration::from_secs(0)
        }
        async fn collect(&self, _ctx: &CancellationToken) -> Result<CollectResult, CollectorError> {
            Err(CollectorError::Cancelled {
                collector: "fatal".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn successful_pass_writes_cache_and_health() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(CacheStore::new(dir.path()).unwrap());
        let mut registry = Registry::new();
        registry.register(Arc::new(AlwaysOk("sys")));
        let scheduler = Scheduler::new(Arc::new(registry), Arc::clone(&cache), Duration::from_secs(1));

        let ctx = CancellationToken::new();
        scheduler.run_pass(&ctx).await;

        let got: Option<CollectResult> = cache.get("sys", Duration::from_secs(60));
        assert!(got.is_some());
        let health: Option<HealthReport> = cache.get("health", Duration::from_secs(60));
        assert_eq!(health.unwrap().collectors.get("sys"), Some(&"ok".to_string()));
    }

    #[tokio::test]
    async fn fatal_error_leaves_cache_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(CacheStore::new(dir.path()).unwrap());
        let mut registry = Registry::new();
        registry.register(Arc::new(AlwaysFatal));
        let scheduler = Scheduler::new(Arc::new(registry), Arc::clone(&cache), Duration::from_secs(1));

        let ctx = CancellationToken::new();
        scheduler.run_pass(&ctx).await;

        let got: Option<CollectResult> = cache.get("fatal", Duration::from_secs(60));
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn empty_registry_pass_is_a_noop_health_write() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(CacheStore::new(dir.path()).unwrap());
        let registry = Registry::new();
        let scheduler = Scheduler::new(Arc::new(registry), Arc::clone(&cache), Duration::from_secs(1));

        let ctx = CancellationToken::new();
        scheduler.run_pass(&ctx).await;

        let health: Option<HealthReport> = cache.get("health", Duration::from_secs(60));
        assert!(health.unwrap().collectors.is_empty());
    }

    #[tokio::test]
    async fn skips_collector_before_its_interval_elapses() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(CacheStore::new(dir.path()).unwrap());
        let mut registry = Registry::new();
        struct SlowCollector {
            calls: Arc<AtomicUsize>,
        }
        #[async_trait]
        impl crate::collector::Collector for SlowCollector {
            fn name(&self) -> &str {
                "slow"
            }
            fn description(&self) -> &str {
                "slow"
            }
            fn interval(&self) -> Duration {
                Duration::from_secs(3600)
            }
            async fn collect(&self, _ctx: &CancellationToken) -> Result<CollectResult, CollectorError> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(CollectResult {
                    collector: "slow".to_string(),
                    timestamp: Utc::now(),
                    data: CollectedData::SysMetrics(empty_sys_metrics()),
                    warnings: vec![],
                })
            }
        }
        let calls = Arc::new(AtomicUsize::new(0));
        registry.register(Arc::new(SlowCollector { calls: Arc::clone(&calls) }));
        let scheduler = Scheduler::new(Arc::new(registry), Arc::clone(&cache), Duration::from_secs(1));
        let ctx = CancellationToken::new();

        scheduler.run_pass(&ctx).await;
        scheduler.run_pass(&ctx).await;

        // The second pass must not have re-invoked "slow": its interval
        // (1 hour) has not elapsed between the two immediate passes.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let got: Option<CollectResult> = cache.get("slow", Duration::from_secs(60));
        assert!(got.is_some());
    }
}
