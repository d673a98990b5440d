//! Reconciles the aggregation store with what is attached to the widget.
//!
//! The renderer exclusively owns the live overlay set. Every draw starts by
//! retiring the whole previous set (markers, the clusterer's internal
//! references and polygons) so two overlay generations are never visible
//! at once.

use std::collections::BTreeMap;

use complaint_map_complaint_models::{DataPoint, DensityRegion};

use crate::{
    palette::DensityPalette,
    store::AggregationStore,
    viewport::MapMode,
    widget::{ClusterMarker, Clusterer, MapWidget, MarkerSpec, OverlayId, PolygonSpec},
};

/// Base stacking order for density polygons; the region count is added so
/// hotter cells draw above cooler ones.
const POLYGON_BASE_Z_INDEX: i32 = 20;

/// What a render pass drew.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderSummary {
    /// Markers handed to the clusterer.
    pub markers: usize,
    /// Polygons attached.
    pub polygons: usize,
    /// Points hidden because their complaint is resolved.
    pub resolved_hidden: usize,
    /// Items skipped because their geometry is unusable.
    pub malformed: usize,
}

#[derive(Default)]
struct OverlaySet {
    markers: BTreeMap<OverlayId, DataPoint>,
    polygons: BTreeMap<OverlayId, DensityRegion>,
    clusterer_attached: bool,
    mode: Option<MapMode>,
}

impl OverlaySet {
    fn len(&self) -> usize {
        self.markers.len() + self.polygons.len()
    }
}

/// Draws markers or density polygons for the active mode.
pub struct OverlayRenderer {
    clusterer: Box<dyn Clusterer>,
    palette: DensityPalette,
    overlays: OverlaySet,
}

impl OverlayRenderer {
    /// Creates a renderer that clusters markers with `clusterer` and colors
    /// polygons with `palette`.
    #[must_use]
    pub fn new(clusterer: Box<dyn Clusterer>, palette: DensityPalette) -> Self {
        Self {
            clusterer,
            palette,
            overlays: OverlaySet::default(),
        }
    }

    /// Number of overlays the renderer currently owns.
    #[must_use]
    pub fn overlay_count(&self) -> usize {
        self.overlays.len()
    }

    /// Mode of the overlays currently drawn, or `None` after a clear.
    #[must_use]
    pub const fn drawn_mode(&self) -> Option<MapMode> {
        self.overlays.mode
    }

    /// The point behind a rendered marker, for click handling.
    #[must_use]
    pub fn point_for(&self, marker: OverlayId) -> Option<&DataPoint> {
        self.overlays.markers.get(&marker)
    }

    /// The density region behind a rendered polygon, for click handling.
    #[must_use]
    pub fn region_for(&self, polygon: OverlayId) -> Option<&DensityRegion> {
        self.overlays.polygons.get(&polygon)
    }

    /// Detaches and destroys every overlay, and empties the clusterer.
    pub fn clear(&mut self, map: &mut dyn MapWidget) {
        self.clusterer.clear(map);
        if self.overlays.clusterer_attached {
            self.clusterer.detach(map);
            self.overlays.clusterer_attached = false;
        }
        self.overlays.mode = None;

        for (overlay, _) in std::mem::take(&mut self.overlays.markers) {
            map.destroy(overlay);
        }
        for (overlay, _) in std::mem::take(&mut self.overlays.polygons) {
            map.destroy(overlay);
        }
    }

    /// Redraws the overlays for the store's current mode.
    pub fn render(&mut self, map: &mut dyn MapWidget, store: &AggregationStore) -> RenderSummary {
        self.clear(map);

        let summary = match store.mode() {
            MapMode::Marker => self.draw_markers(map, store.points()),
            MapMode::Hotspot => self.draw_regions(map, store.regions()),
        };
        self.overlays.mode = Some(store.mode());

        log::debug!(
            "Rendered {} mode: {} markers, {} polygons ({} resolved hidden, {} malformed)",
            store.mode(),
            summary.markers,
            summary.polygons,
            summary.resolved_hidden,
            summary.malformed
        );
        summary
    }

    fn draw_markers(&mut self, map: &mut dyn MapWidget, points: &[DataPoint]) -> RenderSummary {
        let mut summary = RenderSummary::default();
        let mut cluster_markers = Vec::with_capacity(points.len());

        for point in points {
            if point.status.is_terminal() {
                summary.resolved_hidden += 1;
                continue;
            }
            if let Err(e) = point.validate() {
                log::warn!("Not drawing complaint {}: {e}", point.id);
                summary.malformed += 1;
                continue;
            }

            let overlay = map.create_marker(MarkerSpec {
                position: point.position(),
                color: point.status.marker_color(),
                title: point.title.clone(),
                complaint: point.id,
            });
            cluster_markers.push(ClusterMarker {
                overlay,
                position: point.position(),
            });
            self.overlays.markers.insert(overlay, point.clone());
        }

        summary.markers = cluster_markers.len();
        if cluster_markers.is_empty() {
            return summary;
        }

        self.clusterer.attach(map);
        self.overlays.clusterer_attached = true;
        self.clusterer.add_markers(map, &cluster_markers);
        summary
    }

    fn draw_regions(&mut self, map: &mut dyn MapWidget, regions: &[DensityRegion]) -> RenderSummary {
        let mut summary = RenderSummary::default();

        for region in regions {
            if let Err(e) = region.validate() {
                log::warn!(
                    "Not drawing hotspot {}: {e}",
                    region.cell_id.as_deref().unwrap_or("<unnamed>")
                );
                summary.malformed += 1;
                continue;
            }

            let style = self.palette.style(region.count);
            let overlay = map.create_polygon(PolygonSpec {
                path: region.boundary.clone(),
                fill_color: style.color,
                fill_opacity: style.opacity,
                stroke_weight: 0,
                z_index: POLYGON_BASE_Z_INDEX
                    .saturating_add(i32::try_from(region.count).unwrap_or(i32::MAX)),
            });
            map.attach(overlay);
            self.overlays.polygons.insert(overlay, region.clone());
        }

        summary.polygons = self.overlays.polygons.len();
        summary
    }
}

#[cfg(test)]
mod tests {
    use complaint_map_complaint_models::{ComplaintId, ComplaintStatus, LatLng};

    use super::*;
    use crate::{
        config::MapConfig,
        headless::{HeadlessClusterer, HeadlessMap, MapJournalEntry, OverlayKind},
    };

    fn renderer(clusterer: &HeadlessClusterer) -> OverlayRenderer {
        let palette = MapConfig::embedded().unwrap().density_palette().unwrap();
        OverlayRenderer::new(Box::new(clusterer.clone()), palette)
    }

    fn map() -> HeadlessMap {
        HeadlessMap::new(LatLng::new(37.50, 126.95), LatLng::new(37.60, 127.00), 7)
    }

    fn point(id: i64, status: ComplaintStatus) -> DataPoint {
        DataPoint {
            id: ComplaintId(id),
            lat: 37.51 + 0.01 * f64::from(u8::try_from(id).unwrap()),
            lng: 126.97,
            category: "시설".to_string(),
            status,
            title: format!("민원 {id}"),
            address: "서울 중구 세종대로".to_string(),
        }
    }

    fn region(count: u32) -> DensityRegion {
        DensityRegion::new(
            Some(format!("cell-{count}")),
            vec![
                LatLng::new(37.50, 126.95),
                LatLng::new(37.50, 126.96),
                LatLng::new(37.51, 126.96),
            ],
            count,
        )
    }

    fn store_with(mode: MapMode, points: Vec<DataPoint>, regions: Vec<DensityRegion>) -> AggregationStore {
        let mut store = AggregationStore::new(mode);
        store.commit(crate::store::Commit {
            points: Some(points),
            regions: Some(regions),
        });
        store
    }

    #[test]
    fn resolved_points_get_no_marker() {
        let clusterer = HeadlessClusterer::new(5, true);
        let mut renderer = renderer(&clusterer);
        let mut map = map();
        let store = store_with(
            MapMode::Marker,
            vec![
                point(1, ComplaintStatus::Completed),
                point(2, ComplaintStatus::Unprocessed),
            ],
            Vec::new(),
        );

        let summary = renderer.render(&mut map, &store);
        assert_eq!(summary.markers, 1);
        assert_eq!(summary.resolved_hidden, 1);
        assert_eq!(map.markers_for(ComplaintId(1)), 0);
        assert_eq!(map.markers_for(ComplaintId(2)), 1);
        assert_eq!(clusterer.marker_total(), 1);
    }

    #[test]
    fn marker_color_follows_status() {
        let clusterer = HeadlessClusterer::new(5, true);
        let mut renderer = renderer(&clusterer);
        let mut map = map();
        let store = store_with(
            MapMode::Marker,
            vec![
                point(1, ComplaintStatus::InProgress),
                point(2, ComplaintStatus::Unprocessed),
            ],
            Vec::new(),
        );
        renderer.render(&mut map, &store);

        let colors = map.attached_marker_colors();
        assert!(colors.contains(&ComplaintStatus::InProgress.marker_color()));
        assert!(colors.contains(&ComplaintStatus::Unprocessed.marker_color()));
    }

    #[test]
    fn redraw_does_not_resurrect_cleared_markers() {
        let clusterer = HeadlessClusterer::new(5, true);
        let mut renderer = renderer(&clusterer);
        let mut map = map();

        let first = store_with(
            MapMode::Marker,
            vec![
                point(1, ComplaintStatus::Pending),
                point(2, ComplaintStatus::Pending),
            ],
            Vec::new(),
        );
        renderer.render(&mut map, &first);

        let second = store_with(
            MapMode::Marker,
            vec![point(3, ComplaintStatus::Pending)],
            Vec::new(),
        );
        renderer.render(&mut map, &second);

        assert_eq!(map.attached_count(), 1);
        assert_eq!(clusterer.marker_total(), 1);
        assert_eq!(map.markers_for(ComplaintId(1)), 0);
    }

    #[test]
    fn mode_switch_clears_before_drawing() {
        let clusterer = HeadlessClusterer::new(5, true);
        let mut renderer = renderer(&clusterer);
        let mut map = map();

        let mut store = store_with(
            MapMode::Marker,
            vec![
                point(1, ComplaintStatus::Pending),
                point(2, ComplaintStatus::Received),
            ],
            vec![region(2), region(12)],
        );
        renderer.render(&mut map, &store);
        assert_eq!(map.attached_count(), 2);
        map.clear_journal();

        store.set_mode(MapMode::Hotspot);
        let summary = renderer.render(&mut map, &store);
        assert_eq!(summary.polygons, 2);

        let journal = map.journal();
        let first_attach = journal
            .iter()
            .position(|e| matches!(e, MapJournalEntry::Attached { .. }))
            .unwrap();
        assert_eq!(
            map.attached_count_at(first_attach),
            0,
            "old overlays still visible when the first polygon was attached"
        );
        assert!(journal.iter().all(|e| !matches!(
            e,
            MapJournalEntry::Attached {
                kind: OverlayKind::Marker,
                ..
            }
        )));
    }

    #[test]
    fn polygons_are_borderless_and_stacked_by_count() {
        let clusterer = HeadlessClusterer::new(5, true);
        let mut renderer = renderer(&clusterer);
        let mut map = map();
        let store = store_with(MapMode::Hotspot, Vec::new(), vec![region(2), region(10)]);
        renderer.render(&mut map, &store);

        let polygons = map.attached_polygons();
        assert_eq!(polygons.len(), 2);
        assert!(polygons.iter().all(|p| p.stroke_weight == 0));
        let hot = polygons.iter().find(|p| p.z_index == 30).unwrap();
        let cool = polygons.iter().find(|p| p.z_index == 22).unwrap();
        assert!(hot.fill_opacity >= cool.fill_opacity);
        assert_ne!(hot.fill_color, cool.fill_color);
    }

    #[test]
    fn polygon_overlays_map_back_to_their_regions() {
        let clusterer = HeadlessClusterer::new(5, true);
        let mut renderer = renderer(&clusterer);
        let mut map = map();
        let store = store_with(MapMode::Hotspot, Vec::new(), vec![region(2), region(10)]);
        renderer.render(&mut map, &store);

        let (overlay, _) = map
            .polygon_overlays()
            .into_iter()
            .find(|(_, spec)| spec.z_index == 30)
            .unwrap();
        let region = renderer.region_for(overlay).unwrap();
        assert_eq!(region.count, 10);
        assert_eq!(region.cell_id.as_deref(), Some("cell-10"));

        renderer.clear(&mut map);
        assert!(renderer.region_for(overlay).is_none());
    }

    #[test]
    fn malformed_region_is_skipped_rest_drawn() {
        let clusterer = HeadlessClusterer::new(5, true);
        let mut renderer = renderer(&clusterer);
        let mut map = map();
        let broken = DensityRegion::new(None, vec![LatLng::new(f64::NAN, 126.9)], 3);
        let store = store_with(MapMode::Hotspot, Vec::new(), vec![broken, region(4)]);

        let summary = renderer.render(&mut map, &store);
        assert_eq!(summary.polygons, 1);
        assert_eq!(summary.malformed, 1);
    }

    #[test]
    fn clear_empties_everything() {
        let clusterer = HeadlessClusterer::new(5, true);
        let mut renderer = renderer(&clusterer);
        let mut map = map();
        let store = store_with(
            MapMode::Marker,
            vec![point(1, ComplaintStatus::Pending)],
            Vec::new(),
        );
        renderer.render(&mut map, &store);
        assert_eq!(renderer.drawn_mode(), Some(MapMode::Marker));
        renderer.clear(&mut map);

        assert_eq!(renderer.drawn_mode(), None);
        assert_eq!(renderer.overlay_count(), 0);
        assert_eq!(map.attached_count(), 0);
        assert_eq!(clusterer.marker_total(), 0);
        assert!(!clusterer.is_attached());
    }
}
