//! Upstream catalog failure reporting
//!
//! When a request can never be fulfilled (the acquisition is unavailable, or
//! the file never arrives before the match timeout) the catalog that asked
//! for it is told so, letting it blocklist the release and search for another.
//!
//! [`FailureReporter`] is the seam used by intake and the reconciliation
//! worker; [`ArrReporter`] implements it against the Sonarr/Radarr v3 API.

mod arr;
mod traits;

pub use arr::ArrReporter;
pub use traits::FailureReporter;
