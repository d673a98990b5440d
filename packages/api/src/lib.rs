#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! HTTP client for the complaint GIS endpoints.
//!
//! [`HttpComplaintSource`] implements the map engine's
//! [`ComplaintSource`] against `/api/gis/map-items` (points) and
//! `/api/gis/hotspots` (density regions).

pub mod retry;

use std::time::Duration;

use async_trait::async_trait;
use complaint_map::{ComplaintSource, SourceError};
use complaint_map_api_models::{ApiHotspot, ApiMapItem, MapQueryParams};
use complaint_map_complaint_models::{DataPoint, DensityRegion};

/// Path of the point endpoint.
pub const MAP_ITEMS_PATH: &str = "/api/gis/map-items";

/// Path of the density-region endpoint.
pub const HOTSPOTS_PATH: &str = "/api/gis/hotspots";

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from the GIS client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The response body is not the expected JSON.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The server answered with a non-success status.
    #[error("Unexpected status {status} from {url}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Requested URL.
        url: String,
    },
}

impl From<ApiError> for SourceError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Http(e) => Self::Http {
                message: e.to_string(),
            },
            ApiError::Json(e) => Self::Decode {
                message: e.to_string(),
            },
            ApiError::Status { status, url } => Self::Status { status, url },
        }
    }
}

/// Complaint source backed by the GIS REST API.
#[derive(Debug, Clone)]
pub struct HttpComplaintSource {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpComplaintSource {
    /// Creates a client for the API at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("complaint-map/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token: None,
        })
    }

    /// Sends `Authorization: Bearer <token>` with every request. Agency
    /// accounts only see their own complaints.
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn get(&self, path: &str, params: &MapQueryParams) -> reqwest::RequestBuilder {
        let request = self.client.get(self.url(path)).query(params);
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Fetches raw map items (markers and server clusters).
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request or decoding fails.
    pub async fn map_items(&self, params: &MapQueryParams) -> Result<Vec<ApiMapItem>, ApiError> {
        retry::send_json(|| self.get(MAP_ITEMS_PATH, params)).await
    }

    /// Fetches raw hotspot cells.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request or decoding fails.
    pub async fn hotspots(&self, params: &MapQueryParams) -> Result<Vec<ApiHotspot>, ApiError> {
        retry::send_json(|| self.get(HOTSPOTS_PATH, params)).await
    }
}

#[async_trait]
impl ComplaintSource for HttpComplaintSource {
    async fn points(&self, params: &MapQueryParams) -> Result<Vec<DataPoint>, SourceError> {
        let items = self.map_items(params).await?;
        let total = items.len();
        let points: Vec<DataPoint> = items
            .into_iter()
            .filter_map(ApiMapItem::into_data_point)
            .collect();
        log::debug!(
            "Fetched {} points ({} items) at zoom {}",
            points.len(),
            total,
            params.zoom
        );
        Ok(points)
    }

    async fn regions(&self, params: &MapQueryParams) -> Result<Vec<DensityRegion>, SourceError> {
        let hotspots = self.hotspots(params).await?;
        log::debug!("Fetched {} hotspot cells at zoom {}", hotspots.len(), params.zoom);
        Ok(hotspots.into_iter().map(DensityRegion::from).collect())
    }
}
