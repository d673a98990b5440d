//! The data source seam the fetch coordinator calls into.

use complaint_map_api_models::MapQueryParams;
use complaint_map_complaint_models::{DataPoint, DensityRegion};
use thiserror::Error;

/// Why a point or region request failed.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// Transport-level failure (connection, timeout, TLS).
    #[error("HTTP error: {message}")]
    Http {
        /// Description of the failure.
        message: String,
    },

    /// The server answered with a non-success status.
    #[error("Unexpected status {status} from {url}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// The response body could not be decoded.
    #[error("Decode error: {message}")]
    Decode {
        /// Description of the failure.
        message: String,
    },
}

/// Backend providing complaint points and density regions for a viewport.
///
/// Implementations may return items with bad coordinates; the coordinator
/// drops those individually.
#[async_trait::async_trait]
pub trait ComplaintSource: Send + Sync {
    /// Fetches complaint points inside the requested bounds.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the request fails.
    async fn points(&self, params: &MapQueryParams) -> Result<Vec<DataPoint>, SourceError>;

    /// Fetches density regions inside the requested bounds.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the request fails.
    async fn regions(&self, params: &MapQueryParams) -> Result<Vec<DensityRegion>, SourceError>;
}
