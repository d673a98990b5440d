//! Viewport bounds and the map display mode.

use complaint_map_api_models::MapQueryParams;
use complaint_map_complaint_models::LatLng;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::MapError;

/// The geographic bounding box and zoom level currently visible.
///
/// Only ever constructed through [`Viewport::new`], so the south-west
/// corner is always south and west of the north-east corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    south_west: LatLng,
    north_east: LatLng,
    zoom_level: u8,
}

impl Viewport {
    /// Creates a viewport from its corners.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::InvalidViewport`] if a corner is not a valid
    /// coordinate or `south_west` lies north or east of `north_east`.
    pub fn new(south_west: LatLng, north_east: LatLng, zoom_level: u8) -> Result<Self, MapError> {
        if !south_west.is_valid()
            || !north_east.is_valid()
            || south_west.lat > north_east.lat
            || south_west.lng > north_east.lng
        {
            return Err(MapError::InvalidViewport {
                sw_lat: south_west.lat,
                sw_lng: south_west.lng,
                ne_lat: north_east.lat,
                ne_lng: north_east.lng,
            });
        }

        Ok(Self {
            south_west,
            north_east,
            zoom_level,
        })
    }

    /// South-west corner.
    #[must_use]
    pub const fn south_west(&self) -> LatLng {
        self.south_west
    }

    /// North-east corner.
    #[must_use]
    pub const fn north_east(&self) -> LatLng {
        self.north_east
    }

    /// Zoom level reported by the widget.
    #[must_use]
    pub const fn zoom_level(&self) -> u8 {
        self.zoom_level
    }

    /// Request parameters for the GIS endpoints.
    #[must_use]
    pub const fn query_params(&self) -> MapQueryParams {
        MapQueryParams::new(self.south_west, self.north_east, self.zoom_level)
    }
}

/// Which overlay set the map shows.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum MapMode {
    /// Clustered complaint markers.
    #[default]
    Marker,
    /// Density polygons.
    Hotspot,
}

impl MapMode {
    /// Whether a fetch cycle in this mode also requests density regions.
    #[must_use]
    pub const fn wants_regions(self) -> bool {
        matches!(self, Self::Hotspot)
    }
}
