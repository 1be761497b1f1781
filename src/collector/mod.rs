//! The collector contract every adapter implements (SPEC_FULL §4.1).
//!
//! Modeled on the `#[async_trait] trait HealthMonitor` shape used by the
//! monitoring harness this core is grounded on: a handful of cheap
//! synchronous accessors plus one fallible async operation.

use crate::error::CollectorError;
use crate::model::CollectResult;
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait Collector: Send + Sync {
    /// Unique process-wide identifier; also the cache key and the
    /// `CollectResult::collector` value.
    fn name(&self) -> &str;

    /// Short human label, surfaced in `--health` output.
    fn description(&self) -> &str;

    /// Recommended cadence. The scheduler throttles on this per collector,
    /// independent of its own tick rate.
    fn interval(&self) -> Duration;

    /// Gather once. A fatal error means no record could be produced at all
    /// (e.g. cancellation); isolated sub-source failures must instead be
    /// folded into a successful envelope carrying an error-classified
    /// status and a warning, never surfaced as a fatal error here.
    async fn collect(&self, ctx: &CancellationToken) -> Result<CollectResult, CollectorError>;
}
