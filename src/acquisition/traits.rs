//! Acquisition client trait

use crate::types::{AcquisitionId, AcquisitionInfo};
use async_trait::async_trait;

/// Remote service that acquires the content behind a link
#[async_trait]
pub trait AcquisitionClient: Send + Sync {
    /// Submit a link for acquisition
    ///
    /// # Errors
    ///
    /// Returns `Error::Submission` when the service rejects the link; the
    /// descriptor is then kept for a later attempt.
    async fn submit(&self, link: &str) -> crate::Result<AcquisitionId>;

    /// Current status and media members of an acquisition
    async fn poll(&self, id: &AcquisitionId) -> crate::Result<AcquisitionInfo>;

    /// Restrict the acquisition to the given file ids
    async fn select_files(&self, id: &AcquisitionId, file_ids: &[u64]) -> crate::Result<()>;

    /// Drop the acquisition on the remote side
    ///
    /// Best effort: callers log a failure and move on.
    async fn cancel(&self, id: &AcquisitionId) -> crate::Result<()>;
}
