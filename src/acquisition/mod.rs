//! Acquisition service access
//!
//! The [`AcquisitionClient`] trait is the seam between intake and the remote
//! caching service that turns a link into downloadable files. The production
//! implementation, [`RealDebridClient`], talks to the Real-Debrid REST API.
//!
//! ## Lifecycle of one acquisition
//!
//! 1. [`AcquisitionClient::submit`] the link and get an [`AcquisitionId`](crate::types::AcquisitionId)
//! 2. [`AcquisitionClient::poll`] once to learn the file list
//! 3. [`AcquisitionClient::select_files`] with the media members only
//! 4. poll until the status is terminal
//! 5. [`AcquisitionClient::cancel`] if it ended unavailable or in error

mod real_debrid;
mod traits;

pub use real_debrid::{RealDebridClient, map_status};
pub use traits::AcquisitionClient;
