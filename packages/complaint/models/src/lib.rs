#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Complaint status taxonomy and the map-facing complaint types.
//!
//! These are the shapes the map engine works with once a response has been
//! decoded: individual complaint locations ([`DataPoint`]) and aggregated
//! density cells ([`DensityRegion`]). Wire shapes live in
//! `complaint_map_api_models`.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Processing status of a complaint.
///
/// Unknown wire values deserialize to [`ComplaintStatus::Other`] rather than
/// failing the whole batch.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", from = "String")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplaintStatus {
    /// Filed but not yet looked at
    Unprocessed,
    /// Awaiting triage
    Pending,
    /// Accepted by an agency
    Received,
    /// Being worked on
    InProgress,
    /// Resolved
    Completed,
    /// Refused by the agency
    Rejected,
    /// Withdrawn by the filer
    Cancelled,
    /// Removed from the system
    Deleted,
    /// A status this client does not know about
    Other,
}

impl From<String> for ComplaintStatus {
    fn from(value: String) -> Self {
        value.trim().parse().unwrap_or(Self::Other)
    }
}

impl ComplaintStatus {
    /// Whether the complaint has reached final resolution and no longer
    /// needs attention on the map.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Rejected | Self::Cancelled | Self::Deleted
        )
    }

    /// Whether an agency is actively reviewing the complaint.
    #[must_use]
    pub const fn is_in_review(self) -> bool {
        matches!(self, Self::Received | Self::InProgress)
    }

    /// Korean display label used by the side panel badges.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Unprocessed => "미처리",
            Self::Pending => "대기",
            Self::Received => "접수",
            Self::InProgress => "처리중",
            Self::Completed => "완료",
            Self::Rejected => "반려",
            Self::Cancelled => "취소",
            Self::Deleted => "삭제",
            Self::Other => "기타",
        }
    }

    /// Marker fill color (hex) keyed by status.
    #[must_use]
    pub const fn marker_color(self) -> &'static str {
        if self.is_in_review() {
            return "#f59e0b";
        }
        match self {
            Self::Unprocessed | Self::Pending => "#ef4444",
            Self::Completed => "#22c55e",
            _ => "#64748b",
        }
    }

    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Unprocessed,
            Self::Pending,
            Self::Received,
            Self::InProgress,
            Self::Completed,
            Self::Rejected,
            Self::Cancelled,
            Self::Deleted,
            Self::Other,
        ]
    }
}

/// Primary key of a complaint record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComplaintId(pub i64);

impl std::fmt::Display for ComplaintId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

impl LatLng {
    /// Creates a new coordinate pair.
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Whether both components are finite and within WGS84 range.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Why a decoded item cannot be placed on the map.
#[derive(Debug, Clone, PartialEq)]
pub enum MalformedItem {
    /// A coordinate was NaN, infinite or out of range.
    InvalidCoordinate(LatLng),
    /// A region boundary has fewer than three distinct vertices.
    DegenerateBoundary {
        /// Number of distinct vertices found.
        vertices: usize,
    },
}

impl std::fmt::Display for MalformedItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidCoordinate(c) => write!(f, "invalid coordinate ({}, {})", c.lat, c.lng),
            Self::DegenerateBoundary { vertices } => {
                write!(f, "boundary has only {vertices} distinct vertices")
            }
        }
    }
}

impl std::error::Error for MalformedItem {}

/// A single complaint location as shown on the map and in the side list.
///
/// Identity is [`DataPoint::id`]; two points with the same id are the same
/// complaint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPoint {
    /// Complaint number.
    pub id: ComplaintId,
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lng: f64,
    /// Free-form category name (e.g. `교통`, `환경`).
    pub category: String,
    /// Processing status.
    pub status: ComplaintStatus,
    /// Complaint title.
    pub title: String,
    /// Street address.
    pub address: String,
}

impl DataPoint {
    /// Returns the location of this point.
    #[must_use]
    pub const fn position(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }

    /// Checks that the point can be placed on a map.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedItem::InvalidCoordinate`] if the location is not
    /// a valid WGS84 coordinate.
    pub fn validate(&self) -> Result<(), MalformedItem> {
        let position = self.position();
        if position.is_valid() {
            Ok(())
        } else {
            Err(MalformedItem::InvalidCoordinate(position))
        }
    }

    /// Path of the full record view for this complaint.
    #[must_use]
    pub fn detail_path(&self) -> String {
        format!("/reports/{}", self.id)
    }
}

/// An aggregated density cell ("hotspot").
///
/// Regions have no persistent identity; every fetch replaces the whole set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DensityRegion {
    /// Optional server-side cell label.
    pub cell_id: Option<String>,
    /// Closed ring of boundary vertices (first == last).
    pub boundary: Vec<LatLng>,
    /// Number of complaints aggregated into this cell.
    pub count: u32,
}

impl DensityRegion {
    /// Builds a region, closing the ring if the last vertex differs from
    /// the first.
    #[must_use]
    pub fn new(cell_id: Option<String>, mut boundary: Vec<LatLng>, count: u32) -> Self {
        if let (Some(first), Some(last)) = (boundary.first().copied(), boundary.last().copied())
            && first != last
        {
            boundary.push(first);
        }
        Self {
            cell_id,
            boundary,
            count,
        }
    }

    /// Checks that the region is a drawable polygon.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedItem`] if any vertex is invalid or the ring has
    /// fewer than three distinct vertices.
    pub fn validate(&self) -> Result<(), MalformedItem> {
        if let Some(bad) = self.boundary.iter().find(|c| !c.is_valid()) {
            return Err(MalformedItem::InvalidCoordinate(*bad));
        }

        let mut distinct: Vec<LatLng> = Vec::with_capacity(self.boundary.len());
        for vertex in &self.boundary {
            if !distinct.contains(vertex) {
                distinct.push(*vertex);
            }
        }

        if distinct.len() < 3 {
            return Err(MalformedItem::DegenerateBoundary {
                vertices: distinct.len(),
            });
        }

        Ok(())
    }
}
