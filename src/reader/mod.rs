//! Typed read-only cache facade for external front-ends (SPEC_FULL §6).
//! Banner/TUI/prompt-segment processes construct one of these against the
//! same cache directory the daemon writes and never touch the daemon
//! directly.

use crate::cache::history::{BillingHistory, HistoryStore};
use crate::cache::CacheStore;
use crate::model::{BillingSnapshot, ClaudeUsageReport, CollectResult, InfraStatus, SysMetrics};
use crate::scheduler::HealthReport;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(5 * 60);

pub struct Reader {
    cache: CacheStore,
    history: HistoryStore,
}

impl Reader {
    pub fn open(cache_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self {
            cache: CacheStore::new(cache_dir.as_ref())?,
            history: HistoryStore::new(cache_dir.as_ref()),
        })
    }

    fn envelope<T: serde::de::DeserializeOwned>(&self, name: &str) -> Option<T> {
        let result: CollectResult = self.cache.get(name, DEFAULT_STALE_AFTER)?;
        serde_json::from_value(serde_json::to_value(result.data).ok()?).ok()
    }

    pub fn billing(&self) -> Option<BillingSnapshot> {
        self.envelope("billing")
    }

    pub fn infra(&self) -> Option<InfraStatus> {
        self.envelope("infra")
    }

    pub fn claude_usage(&self) -> Option<ClaudeUsageReport> {
        self.envelope("claude_usage")
    }

    pub fn sysmetrics(&self) -> Option<SysMetrics> {
        self.envelope("sysmetrics")
    }

    pub fn billing_history(&self) -> BillingHistory {
        self.history.load()
    }

    pub fn health(&self) -> Option<HealthReport> {
        self.cache.get("health", Duration::from_secs(u64::MAX / 2))
    }
}
