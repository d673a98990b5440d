//! Single source of truth for what the map and side panel show.
//!
//! Field ownership: points, regions and the loading flag are written only by
//! the fetch coordinator (`pub(crate)` setters), the selections by user
//! clicks and the mode by the mode controller.

use complaint_map_complaint_models::{ComplaintId, DataPoint, DensityRegion};

use crate::viewport::MapMode;

/// Result of one fetch cycle ready to be committed.
///
/// `None` leaves the corresponding field untouched.
#[derive(Debug, Default)]
pub(crate) struct Commit {
    pub points: Option<Vec<DataPoint>>,
    pub regions: Option<Vec<DensityRegion>>,
}

/// Latest committed map state.
#[derive(Debug, Default)]
pub struct AggregationStore {
    points: Vec<DataPoint>,
    regions: Vec<DensityRegion>,
    selection: Option<DataPoint>,
    hotspot: Option<DensityRegion>,
    mode: MapMode,
    loading: bool,
}

impl AggregationStore {
    /// Creates an empty store in `mode`.
    #[must_use]
    pub fn new(mode: MapMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Committed complaint points.
    #[must_use]
    pub fn points(&self) -> &[DataPoint] {
        &self.points
    }

    /// Committed density regions.
    #[must_use]
    pub fn regions(&self) -> &[DensityRegion] {
        &self.regions
    }

    /// Currently selected point, which may no longer be in [`points`].
    ///
    /// [`points`]: Self::points
    #[must_use]
    pub const fn selection(&self) -> Option<&DataPoint> {
        self.selection.as_ref()
    }

    /// Currently selected density cell, which may no longer be in
    /// [`regions`].
    ///
    /// [`regions`]: Self::regions
    #[must_use]
    pub const fn selected_hotspot(&self) -> Option<&DensityRegion> {
        self.hotspot.as_ref()
    }

    /// Active display mode.
    #[must_use]
    pub const fn mode(&self) -> MapMode {
        self.mode
    }

    /// Whether a fetch cycle is outstanding.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.loading
    }

    /// Looks up a committed point by id.
    #[must_use]
    pub fn point(&self, id: ComplaintId) -> Option<&DataPoint> {
        self.points.iter().find(|p| p.id == id)
    }

    /// Sets the display mode. Pure state write: it does not fetch.
    ///
    /// Returns whether the mode changed.
    pub fn set_mode(&mut self, mode: MapMode) -> bool {
        if self.mode == mode {
            return false;
        }
        self.mode = mode;
        true
    }

    /// Sets or clears the selection. No validation against the committed
    /// points is performed.
    pub fn select(&mut self, point: Option<DataPoint>) {
        self.selection = point;
    }

    /// Sets or clears the selected density cell. Like [`select`], it is
    /// never cleared by a fetch.
    ///
    /// [`select`]: Self::select
    pub fn select_hotspot(&mut self, region: Option<DensityRegion>) {
        self.hotspot = region;
    }

    pub(crate) const fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    /// Applies both halves of a cycle in one step.
    pub(crate) fn commit(&mut self, commit: Commit) {
        if let Some(points) = commit.points {
            self.points = points;
        }
        if let Some(regions) = commit.regions {
            self.regions = regions;
        }
    }
}

#[cfg(test)]
mod tests {
    use complaint_map_complaint_models::ComplaintStatus;

    use super::*;

    fn point(id: i64) -> DataPoint {
        DataPoint {
            id: ComplaintId(id),
            lat: 37.55,
            lng: 126.98,
            category: "안전".to_string(),
            status: ComplaintStatus::Unprocessed,
            title: format!("민원 {id}"),
            address: "서울 중구".to_string(),
        }
    }

    #[test]
    fn set_mode_is_a_plain_write() {
        let mut store = AggregationStore::new(MapMode::Marker);
        assert!(store.set_mode(MapMode::Hotspot));
        assert!(!store.set_mode(MapMode::Hotspot));
        assert_eq!(store.mode(), MapMode::Hotspot);
        assert!(!store.is_loading());
    }

    #[test]
    fn commit_with_single_half_keeps_the_other() {
        let mut store = AggregationStore::new(MapMode::Hotspot);
        store.commit(Commit {
            points: Some(vec![point(1)]),
            regions: Some(vec![DensityRegion::new(None, Vec::new(), 3)]),
        });
        store.commit(Commit {
            points: Some(vec![point(2)]),
            regions: None,
        });
        assert_eq!(store.points()[0].id, ComplaintId(2));
        assert_eq!(store.regions().len(), 1);
    }

    #[test]
    fn selection_is_not_validated() {
        let mut store = AggregationStore::new(MapMode::Marker);
        store.select(Some(point(99)));
        assert_eq!(store.selection().map(|p| p.id), Some(ComplaintId(99)));
        assert!(store.point(ComplaintId(99)).is_none());
    }

    #[test]
    fn hotspot_selection_survives_a_commit() {
        let mut store = AggregationStore::new(MapMode::Hotspot);
        store.select_hotspot(Some(DensityRegion::new(
            Some("종로구".to_string()),
            Vec::new(),
            7,
        )));
        store.commit(Commit {
            points: Some(Vec::new()),
            regions: Some(Vec::new()),
        });
        assert_eq!(store.selected_hotspot().map(|r| r.count), Some(7));
    }
}
