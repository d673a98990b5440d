//! In-memory map widget and clusterer.
//!
//! Used by the CLI to drive the engine without a browser, and by tests to
//! observe exactly which overlays are attached at any point. Both types are
//! cheap handles over shared state, so a clone kept outside the engine sees
//! everything the engine does to the original.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use complaint_map_complaint_models::{ComplaintId, LatLng};

use crate::widget::{ClusterMarker, Clusterer, MapWidget, MarkerSpec, OverlayId, PolygonSpec};

/// Extent of a [`HeadlessMap::centered`] view opened without explicit
/// bounds, in degrees per axis. Roughly a district at the default level.
pub const DEFAULT_SPAN_DEGREES: f64 = 0.1;

/// Overlay category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayKind {
    /// Complaint marker.
    Marker,
    /// Density polygon.
    Polygon,
}

/// One overlay state change, in the order it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapJournalEntry {
    /// Overlay created (detached).
    Created {
        /// Overlay.
        id: OverlayId,
        /// Kind.
        kind: OverlayKind,
    },
    /// Overlay became visible.
    Attached {
        /// Overlay.
        id: OverlayId,
        /// Kind.
        kind: OverlayKind,
    },
    /// Overlay hidden.
    Detached {
        /// Overlay.
        id: OverlayId,
        /// Kind.
        kind: OverlayKind,
    },
    /// Overlay destroyed.
    Destroyed {
        /// Overlay.
        id: OverlayId,
        /// Kind.
        kind: OverlayKind,
    },
}

#[derive(Debug, Clone)]
enum OverlaySpec {
    Marker(MarkerSpec),
    Polygon(PolygonSpec),
}

impl OverlaySpec {
    const fn kind(&self) -> OverlayKind {
        match self {
            Self::Marker(_) => OverlayKind::Marker,
            Self::Polygon(_) => OverlayKind::Polygon,
        }
    }
}

#[derive(Debug)]
struct Overlay {
    spec: OverlaySpec,
    attached: bool,
}

#[derive(Debug)]
struct MapState {
    south_west: LatLng,
    north_east: LatLng,
    level: u8,
    next_id: u64,
    overlays: BTreeMap<OverlayId, Overlay>,
    journal: Vec<MapJournalEntry>,
    /// Attached overlay count just before each journal entry.
    attached_before: Vec<usize>,
}

impl MapState {
    fn attached(&self) -> usize {
        self.overlays.values().filter(|o| o.attached).count()
    }

    fn record(&mut self, entry: MapJournalEntry) {
        let before = self.attached();
        self.journal.push(entry);
        self.attached_before.push(before);
    }

    fn set_attached(&mut self, id: OverlayId, attached: bool) {
        let Some(overlay) = self.overlays.get(&id) else {
            log::debug!("Ignoring attach/detach of unknown {id}");
            return;
        };
        if overlay.attached == attached {
            return;
        }
        let kind = overlay.spec.kind();
        self.record(if attached {
            MapJournalEntry::Attached { id, kind }
        } else {
            MapJournalEntry::Detached { id, kind }
        });
        if let Some(overlay) = self.overlays.get_mut(&id) {
            overlay.attached = attached;
        }
    }

    fn create(&mut self, spec: OverlaySpec) -> OverlayId {
        self.next_id += 1;
        let id = OverlayId(self.next_id);
        self.record(MapJournalEntry::Created {
            id,
            kind: spec.kind(),
        });
        self.overlays.insert(
            id,
            Overlay {
                spec,
                attached: false,
            },
        );
        id
    }
}

/// Map widget that keeps overlays in memory.
#[derive(Debug, Clone)]
pub struct HeadlessMap {
    state: Arc<Mutex<MapState>>,
}

impl HeadlessMap {
    /// Creates a map showing the given corners at `level`.
    #[must_use]
    pub fn new(south_west: LatLng, north_east: LatLng, level: u8) -> Self {
        Self {
            state: Arc::new(Mutex::new(MapState {
                south_west,
                north_east,
                level,
                next_id: 0,
                overlays: BTreeMap::new(),
                journal: Vec::new(),
                attached_before: Vec::new(),
            })),
        }
    }

    /// Creates a map centred on `center`, spanning `span` degrees in each
    /// direction.
    #[must_use]
    pub fn centered(center: LatLng, span: f64, level: u8) -> Self {
        let half = span / 2.0;
        Self::new(
            LatLng::new(center.lat - half, center.lng - half),
            LatLng::new(center.lat + half, center.lng + half),
            level,
        )
    }

    fn lock(&self) -> MutexGuard<'_, MapState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves the camera, as a finished pan/zoom gesture would.
    pub fn set_view(&self, south_west: LatLng, north_east: LatLng, level: u8) {
        let mut state = self.lock();
        state.south_west = south_west;
        state.north_east = north_east;
        state.level = level;
    }

    /// Number of attached markers standing for `complaint`.
    #[must_use]
    pub fn markers_for(&self, complaint: ComplaintId) -> usize {
        self.lock()
            .overlays
            .values()
            .filter(|o| o.attached)
            .filter(|o| matches!(&o.spec, OverlaySpec::Marker(m) if m.complaint == complaint))
            .count()
    }

    /// The attached marker for `complaint`, as a user click would hit it.
    #[must_use]
    pub fn marker_overlay(&self, complaint: ComplaintId) -> Option<OverlayId> {
        self.lock().overlays.iter().find_map(|(id, o)| match &o.spec {
            OverlaySpec::Marker(m) if o.attached && m.complaint == complaint => Some(*id),
            _ => None,
        })
    }

    /// Colors of all attached markers.
    #[must_use]
    pub fn attached_marker_colors(&self) -> Vec<&'static str> {
        self.lock()
            .overlays
            .values()
            .filter(|o| o.attached)
            .filter_map(|o| match &o.spec {
                OverlaySpec::Marker(m) => Some(m.color),
                OverlaySpec::Polygon(_) => None,
            })
            .collect()
    }

    /// Specs of all attached polygons.
    #[must_use]
    pub fn attached_polygons(&self) -> Vec<PolygonSpec> {
        self.lock()
            .overlays
            .values()
            .filter(|o| o.attached)
            .filter_map(|o| match &o.spec {
                OverlaySpec::Polygon(p) => Some(p.clone()),
                OverlaySpec::Marker(_) => None,
            })
            .collect()
    }

    /// Attached polygons with their overlay handles, as a user click would
    /// hit them.
    #[must_use]
    pub fn polygon_overlays(&self) -> Vec<(OverlayId, PolygonSpec)> {
        self.lock()
            .overlays
            .iter()
            .filter(|(_, o)| o.attached)
            .filter_map(|(id, o)| match &o.spec {
                OverlaySpec::Polygon(p) => Some((*id, p.clone())),
                OverlaySpec::Marker(_) => None,
            })
            .collect()
    }

    /// Attached overlays of `kind`.
    #[must_use]
    pub fn attached_of(&self, kind: OverlayKind) -> usize {
        self.lock()
            .overlays
            .values()
            .filter(|o| o.attached && o.spec.kind() == kind)
            .count()
    }

    /// Overlay changes since creation or the last [`clear_journal`].
    ///
    /// [`clear_journal`]: Self::clear_journal
    #[must_use]
    pub fn journal(&self) -> Vec<MapJournalEntry> {
        self.lock().journal.clone()
    }

    /// Attached overlay count just before journal entry `index`.
    #[must_use]
    pub fn attached_count_at(&self, index: usize) -> usize {
        let state = self.lock();
        state
            .attached_before
            .get(index)
            .copied()
            .unwrap_or_else(|| state.attached())
    }

    /// Forgets recorded overlay changes.
    pub fn clear_journal(&self) {
        let mut state = self.lock();
        state.journal.clear();
        state.attached_before.clear();
    }
}

impl MapWidget for HeadlessMap {
    fn bounds(&self) -> (LatLng, LatLng) {
        let state = self.lock();
        (state.south_west, state.north_east)
    }

    fn level(&self) -> u8 {
        self.lock().level
    }

    fn create_marker(&mut self, spec: MarkerSpec) -> OverlayId {
        self.lock().create(OverlaySpec::Marker(spec))
    }

    fn create_polygon(&mut self, spec: PolygonSpec) -> OverlayId {
        self.lock().create(OverlaySpec::Polygon(spec))
    }

    fn attach(&mut self, overlay: OverlayId) {
        self.lock().set_attached(overlay, true);
    }

    fn detach(&mut self, overlay: OverlayId) {
        self.lock().set_attached(overlay, false);
    }

    fn destroy(&mut self, overlay: OverlayId) {
        let mut state = self.lock();
        state.set_attached(overlay, false);
        if let Some(removed) = state.overlays.remove(&overlay) {
            state.record(MapJournalEntry::Destroyed {
                id: overlay,
                kind: removed.spec.kind(),
            });
        }
    }

    fn attached_count(&self) -> usize {
        self.lock().attached()
    }
}

/// A group of markers drawn as one count badge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterBadge {
    /// Badge position.
    pub center: LatLng,
    /// Markers in the group.
    pub count: usize,
}

#[derive(Debug, Default)]
struct ClustererState {
    markers: Vec<ClusterMarker>,
    attached: bool,
}

/// Grid-based marker clusterer.
#[derive(Debug, Clone)]
pub struct HeadlessClusterer {
    min_level: u8,
    average_center: bool,
    state: Arc<Mutex<ClustererState>>,
}

impl HeadlessClusterer {
    /// Grid cell size, in degrees, at `min_level`. Doubles per level above.
    const BASE_CELL_DEGREES: f64 = 0.01;

    /// Creates a clusterer that groups markers at `min_level` and above.
    #[must_use]
    pub fn new(min_level: u8, average_center: bool) -> Self {
        Self {
            min_level,
            average_center,
            state: Arc::new(Mutex::new(ClustererState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ClustererState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Markers currently held.
    #[must_use]
    pub fn marker_total(&self) -> usize {
        self.lock().markers.len()
    }

    /// Whether the clusterer is bound to a map.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.lock().attached
    }

    /// Badges as they would be drawn at `level`. Below `min_level` every
    /// marker stands alone.
    #[must_use]
    pub fn badges(&self, level: u8) -> Vec<ClusterBadge> {
        let state = self.lock();
        if level < self.min_level {
            return state
                .markers
                .iter()
                .map(|m| ClusterBadge {
                    center: m.position,
                    count: 1,
                })
                .collect();
        }

        let cell = Self::BASE_CELL_DEGREES * 2_f64.powi(i32::from(level - self.min_level));
        let mut groups: BTreeMap<(i64, i64), Vec<LatLng>> = BTreeMap::new();
        for marker in &state.markers {
            #[allow(clippy::cast_possible_truncation)]
            let key = (
                (marker.position.lat / cell).floor() as i64,
                (marker.position.lng / cell).floor() as i64,
            );
            groups.entry(key).or_default().push(marker.position);
        }

        groups
            .into_values()
            .map(|positions| {
                let center = if self.average_center {
                    #[allow(clippy::cast_precision_loss)]
                    let n = positions.len() as f64;
                    LatLng::new(
                        positions.iter().map(|p| p.lat).sum::<f64>() / n,
                        positions.iter().map(|p| p.lng).sum::<f64>() / n,
                    )
                } else {
                    positions[0]
                };
                ClusterBadge {
                    center,
                    count: positions.len(),
                }
            })
            .collect()
    }
}

impl Clusterer for HeadlessClusterer {
    fn attach(&mut self, map: &mut dyn MapWidget) {
        let mut state = self.lock();
        if state.attached {
            return;
        }
        state.attached = true;
        for marker in &state.markers {
            map.attach(marker.overlay);
        }
    }

    fn detach(&mut self, map: &mut dyn MapWidget) {
        let mut state = self.lock();
        if !state.attached {
            return;
        }
        state.attached = false;
        for marker in &state.markers {
            map.detach(marker.overlay);
        }
    }

    fn clear(&mut self, map: &mut dyn MapWidget) {
        let mut state = self.lock();
        for marker in state.markers.drain(..) {
            map.detach(marker.overlay);
        }
    }

    fn add_markers(&mut self, map: &mut dyn MapWidget, markers: &[ClusterMarker]) {
        let mut state = self.lock();
        if state.attached {
            for marker in markers {
                map.attach(marker.overlay);
            }
        }
        state.markers.extend_from_slice(markers);
    }

    fn marker_count(&self) -> usize {
        self.marker_total()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(map: &mut HeadlessMap, complaint: i64, position: LatLng) -> ClusterMarker {
        let overlay = map.create_marker(MarkerSpec {
            position,
            color: "#ef4444",
            title: String::new(),
            complaint: ComplaintId(complaint),
        });
        ClusterMarker { overlay, position }
    }

    #[test]
    fn nearby_markers_collapse_at_high_level_and_separate_at_low() {
        let mut map = HeadlessMap::new(LatLng::new(37.5, 126.9), LatLng::new(37.6, 127.0), 7);
        let mut clusterer = HeadlessClusterer::new(5, true);
        let markers = vec![
            marker(&mut map, 1, LatLng::new(37.5501, 126.9801)),
            marker(&mut map, 2, LatLng::new(37.5502, 126.9802)),
            marker(&mut map, 3, LatLng::new(37.5503, 126.9803)),
        ];
        clusterer.attach(&mut map);
        clusterer.add_markers(&mut map, &markers);

        let collapsed = clusterer.badges(7);
        assert_eq!(collapsed.len(), 1);
        assert_eq!(collapsed[0].count, 3);
        assert!((collapsed[0].center.lat - 37.5502).abs() < 1e-9);

        assert_eq!(clusterer.badges(3).len(), 3);
    }

    #[test]
    fn clear_then_reattach_does_not_leak_markers() {
        let mut map = HeadlessMap::new(LatLng::new(37.5, 126.9), LatLng::new(37.6, 127.0), 7);
        let mut clusterer = HeadlessClusterer::new(5, true);
        let first = vec![marker(&mut map, 1, LatLng::new(37.55, 126.98))];
        clusterer.attach(&mut map);
        clusterer.add_markers(&mut map, &first);
        assert_eq!(map.attached_count(), 1);

        clusterer.clear(&mut map);
        clusterer.detach(&mut map);
        assert_eq!(map.attached_count(), 0);

        clusterer.attach(&mut map);
        assert_eq!(map.attached_count(), 0);
        assert_eq!(clusterer.marker_count(), 0);
    }

    #[test]
    fn journal_tracks_attached_count() {
        let mut map = HeadlessMap::new(LatLng::new(37.5, 126.9), LatLng::new(37.6, 127.0), 7);
        let a = map.create_polygon(PolygonSpec {
            path: Vec::new(),
            fill_color: "#22c55e".to_string(),
            fill_opacity: 0.3,
            stroke_weight: 0,
            z_index: 21,
        });
        map.attach(a);
        map.attach(a);
        map.destroy(a);

        let journal = map.journal();
        assert_eq!(journal.len(), 4);
        assert_eq!(map.attached_count_at(1), 0);
        assert_eq!(map.attached_count_at(2), 1);
        assert_eq!(map.attached_count(), 0);
    }
}
