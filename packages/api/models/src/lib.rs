#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Request and response types for the complaint GIS endpoints.
//!
//! These mirror the JSON contract of `/api/gis/map-items` and
//! `/api/gis/hotspots`. They are kept separate from the domain types in
//! `complaint_map_complaint_models` so the wire contract can change
//! without touching the engine.

use complaint_map_complaint_models::{
    ComplaintId, ComplaintStatus, DataPoint, DensityRegion, LatLng,
};
use serde::{Deserialize, Serialize};

/// Query parameters shared by both GIS endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapQueryParams {
    /// South-west corner latitude.
    pub sw_lat: f64,
    /// South-west corner longitude.
    pub sw_lng: f64,
    /// North-east corner latitude.
    pub ne_lat: f64,
    /// North-east corner longitude.
    pub ne_lng: f64,
    /// Map zoom level of the viewport.
    pub zoom: u8,
}

impl MapQueryParams {
    /// Creates parameters for the given corners and zoom.
    #[must_use]
    pub const fn new(south_west: LatLng, north_east: LatLng, zoom: u8) -> Self {
        Self {
            sw_lat: south_west.lat,
            sw_lng: south_west.lng,
            ne_lat: north_east.lat,
            ne_lng: north_east.lng,
            zoom,
        }
    }
}

/// Kind of item returned by the map-items endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiMapItemType {
    /// A single complaint.
    Marker,
    /// A server-side aggregate with only a count.
    Cluster,
}

/// One entry of the `/api/gis/map-items` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiMapItem {
    /// Item kind; older servers omit it and only send markers.
    #[serde(rename = "type")]
    pub item_type: Option<ApiMapItemType>,
    /// Latitude.
    pub lat: Option<f64>,
    /// Longitude.
    pub lng: Option<f64>,
    /// Complaint number (markers only).
    pub complaint_no: Option<i64>,
    /// Category name.
    pub category: Option<String>,
    /// Complaint title.
    pub title: Option<String>,
    /// Processing status.
    pub status: Option<ComplaintStatus>,
    /// Street address.
    pub address: Option<String>,
    /// Attached image, if any.
    pub image_path: Option<String>,
    /// Aggregate size (clusters only).
    pub count: Option<u32>,
    /// Server cluster key (clusters only).
    pub cluster_key: Option<String>,
}

impl ApiMapItem {
    /// Converts a marker item into a [`DataPoint`].
    ///
    /// Returns `None` for cluster items and for markers without a complaint
    /// number. Missing coordinates become NaN so the engine's validation
    /// drops the item with a warning.
    #[must_use]
    pub fn into_data_point(self) -> Option<DataPoint> {
        if self.item_type == Some(ApiMapItemType::Cluster) {
            log::debug!(
                "Skipping server cluster item {:?} ({:?} complaints)",
                self.cluster_key,
                self.count
            );
            return None;
        }

        let Some(complaint_no) = self.complaint_no else {
            log::warn!("Skipping map item without a complaint number");
            return None;
        };

        Some(DataPoint {
            id: ComplaintId(complaint_no),
            lat: self.lat.unwrap_or(f64::NAN),
            lng: self.lng.unwrap_or(f64::NAN),
            category: self.category.unwrap_or_default(),
            status: self.status.unwrap_or(ComplaintStatus::Other),
            title: self.title.unwrap_or_default(),
            address: self.address.unwrap_or_default(),
        })
    }
}

/// A boundary vertex in the hotspot response.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ApiPoint {
    /// Latitude.
    pub lat: Option<f64>,
    /// Longitude.
    pub lng: Option<f64>,
}

/// One entry of the `/api/gis/hotspots` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHotspot {
    /// Grid cell identifier.
    pub cell_id: Option<String>,
    /// Number of complaints in the cell.
    pub count: Option<u32>,
    /// Cell boundary.
    #[serde(default)]
    pub points: Vec<ApiPoint>,
}

impl From<ApiHotspot> for DensityRegion {
    fn from(hotspot: ApiHotspot) -> Self {
        let boundary = hotspot
            .points
            .into_iter()
            .map(|p| LatLng::new(p.lat.unwrap_or(f64::NAN), p.lng.unwrap_or(f64::NAN)))
            .collect();
        Self::new(hotspot.cell_id, boundary, hotspot.count.unwrap_or(0))
    }
}
