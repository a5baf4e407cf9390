//! In-memory stand-ins for the acquisition service and the catalogs

use async_trait::async_trait;
use debridarr::{
    AcquisitionClient, AcquisitionId, AcquisitionInfo, AcquisitionStatus, Category,
    FailureReporter, MediaMember, Result,
};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Acquisition service whose status sequence is scripted
///
/// Once the script runs out every poll answers with the final status.
pub struct FakeAcquisition {
    members: Vec<MediaMember>,
    script: Mutex<VecDeque<AcquisitionStatus>>,
    last: AcquisitionStatus,
    /// Links submitted so far
    pub submitted: Mutex<Vec<String>>,
    /// Acquisitions cancelled so far
    pub cancelled: Mutex<Vec<String>>,
}

impl FakeAcquisition {
    /// Acquisition that goes through `script` and then stays at `last`
    pub fn new(members: &[&str], script: Vec<AcquisitionStatus>, last: AcquisitionStatus) -> Self {
        Self {
            members: members
                .iter()
                .enumerate()
                .map(|(i, name)| MediaMember {
                    id: i as u64 + 1,
                    name: name.to_string(),
                })
                .collect(),
            script: Mutex::new(script.into()),
            last,
            submitted: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
        }
    }

    /// Acquisition that is ready immediately
    pub fn ready(members: &[&str]) -> Self {
        Self::new(members, Vec::new(), AcquisitionStatus::Ready)
    }
}

#[async_trait]
impl AcquisitionClient for FakeAcquisition {
    async fn submit(&self, link: &str) -> Result<AcquisitionId> {
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(link.to_string());
        Ok(AcquisitionId::new(format!("FAKE{}", submitted.len())))
    }

    async fn poll(&self, id: &AcquisitionId) -> Result<AcquisitionInfo> {
        let status = self.script.lock().unwrap().pop_front().unwrap_or(self.last);
        Ok(AcquisitionInfo {
            id: id.clone(),
            status,
            raw_status: format!("{status:?}").to_lowercase(),
            media_members: self.members.clone(),
        })
    }

    async fn select_files(&self, _id: &AcquisitionId, _file_ids: &[u64]) -> Result<()> {
        Ok(())
    }

    async fn cancel(&self, id: &AcquisitionId) -> Result<()> {
        self.cancelled.lock().unwrap().push(id.to_string());
        Ok(())
    }
}

/// Catalog that records every failure report
#[derive(Default)]
pub struct RecordingReporter {
    /// `(release_title, category)` in call order
    pub calls: Mutex<Vec<(String, Category)>>,
}

impl RecordingReporter {
    /// Snapshot of the calls made so far
    pub fn calls(&self) -> Vec<(String, Category)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl FailureReporter for RecordingReporter {
    async fn report_failed(&self, release_title: &str, category: Category) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((release_title.to_string(), category));
        Ok(())
    }
}
