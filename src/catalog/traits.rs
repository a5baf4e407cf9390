//! Failure reporter trait

use crate::types::Category;
use async_trait::async_trait;

/// Tells an upstream catalog that a release failed
#[async_trait]
pub trait FailureReporter: Send + Sync {
    /// Mark `release_title` as failed in the catalog serving `category`
    ///
    /// The core logs a failed report and never retries it.
    async fn report_failed(&self, release_title: &str, category: Category) -> crate::Result<()>;
}
