//! Seams to the external map widget and marker-clustering library.
//!
//! The engine never talks to a concrete map SDK. A frontend binding (or the
//! in-memory [`crate::headless`] implementation) provides these traits.

use complaint_map_complaint_models::{ComplaintId, LatLng};

/// Handle to an overlay object created on a [`MapWidget`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OverlayId(pub u64);

impl std::fmt::Display for OverlayId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "overlay-{}", self.0)
    }
}

/// Appearance of a single complaint marker.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerSpec {
    /// Marker position.
    pub position: LatLng,
    /// Fill color of the pin (hex).
    pub color: &'static str,
    /// Hover title.
    pub title: String,
    /// Complaint the marker stands for.
    pub complaint: ComplaintId,
}

/// Appearance of a density polygon.
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonSpec {
    /// Closed boundary ring.
    pub path: Vec<LatLng>,
    /// Fill color (hex).
    pub fill_color: String,
    /// Fill opacity in `0.0..=1.0`.
    pub fill_opacity: f64,
    /// Border width in pixels; `0` draws no border.
    pub stroke_weight: u32,
    /// Stacking order; higher draws on top.
    pub z_index: i32,
}

/// An interactive map widget.
///
/// Overlays are created detached and only become visible once attached.
/// Attaching an already attached overlay, or detaching a detached one, is a
/// no-op.
pub trait MapWidget: Send {
    /// Current `(south_west, north_east)` corners of the visible area.
    fn bounds(&self) -> (LatLng, LatLng);

    /// Current zoom level.
    fn level(&self) -> u8;

    /// Creates a (detached) marker.
    fn create_marker(&mut self, spec: MarkerSpec) -> OverlayId;

    /// Creates a (detached) polygon.
    fn create_polygon(&mut self, spec: PolygonSpec) -> OverlayId;

    /// Makes the overlay visible on the map.
    fn attach(&mut self, overlay: OverlayId);

    /// Removes the overlay from the map without destroying it.
    fn detach(&mut self, overlay: OverlayId);

    /// Detaches and destroys the overlay.
    fn destroy(&mut self, overlay: OverlayId);

    /// Number of overlays currently attached.
    fn attached_count(&self) -> usize;
}

/// A marker handed to a [`Clusterer`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterMarker {
    /// Marker overlay.
    pub overlay: OverlayId,
    /// Marker position, used for grouping.
    pub position: LatLng,
}

/// Groups nearby markers into count badges at low zoom.
///
/// A clusterer owns the visibility of the markers added to it while it is
/// attached to a map. It must survive being detached and reattached across
/// mode switches without resurrecting markers from before a [`clear`].
///
/// [`clear`]: Clusterer::clear
pub trait Clusterer: Send {
    /// Binds the clusterer to `map`.
    fn attach(&mut self, map: &mut dyn MapWidget);

    /// Unbinds the clusterer from the map it is attached to.
    fn detach(&mut self, map: &mut dyn MapWidget);

    /// Drops every marker the clusterer holds, detaching them from `map`.
    fn clear(&mut self, map: &mut dyn MapWidget);

    /// Adds markers and shows them on `map`.
    fn add_markers(&mut self, map: &mut dyn MapWidget, markers: &[ClusterMarker]);

    /// Number of markers the clusterer currently holds.
    fn marker_count(&self) -> usize;
}
