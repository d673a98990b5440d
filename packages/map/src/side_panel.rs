//! List and detail views projected from the aggregation store.
//!
//! The side panel never fetches. Its list is a filtered, paginated view of
//! the committed points (independent of what the map draws) and its detail
//! view shows the selection. A clicked density cell is summarized
//! separately. Clicks are forwarded to [`AggregationStore::select`].

use std::collections::BTreeMap;

use complaint_map_complaint_models::{ComplaintId, ComplaintStatus, DataPoint, DensityRegion};

use crate::store::AggregationStore;

/// Prompt shown in the detail view when nothing is selected.
pub const DETAIL_PLACEHOLDER: &str = "지도에서 민원을 선택하세요";

/// Label for a density cell the server sent without an identifier.
pub const UNNAMED_HOTSPOT: &str = "이름 없는 구역";

/// List filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SidePanelFilter {
    /// Only this category, if set.
    pub category: Option<String>,
    /// Only this status, if set.
    pub status: Option<ComplaintStatus>,
    /// Case-insensitive substring matched against title and address.
    pub search: String,
}

impl SidePanelFilter {
    fn matches(&self, point: &DataPoint) -> bool {
        if point.status == ComplaintStatus::Deleted {
            return false;
        }
        if self
            .category
            .as_deref()
            .is_some_and(|category| point.category != category)
        {
            return false;
        }
        if self.status.is_some_and(|status| point.status != status) {
            return false;
        }

        let needle = self.search.trim().to_lowercase();
        needle.is_empty()
            || point.title.to_lowercase().contains(&needle)
            || point.address.to_lowercase().contains(&needle)
    }
}

/// The detail half of the panel.
#[derive(Debug, Clone, PartialEq)]
pub enum DetailView<'a> {
    /// A complaint is selected.
    Selected {
        /// The selected point.
        point: &'a DataPoint,
        /// Full record view to navigate to.
        detail_path: String,
    },
    /// Nothing selected.
    Placeholder(&'static str),
}

/// Name and complaint count of the clicked density cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotspotDetail<'a> {
    /// Cell label.
    pub label: &'a str,
    /// Complaints in the cell.
    pub count: u32,
}

impl<'a> HotspotDetail<'a> {
    fn of(region: &'a DensityRegion) -> Self {
        Self {
            label: region.cell_id.as_deref().unwrap_or(UNNAMED_HOTSPOT),
            count: region.count,
        }
    }
}

/// One rendering of the panel.
#[derive(Debug, Clone, PartialEq)]
pub struct SidePanelView<'a> {
    /// Items on the current page.
    pub items: Vec<&'a DataPoint>,
    /// Current page (1-based).
    pub page: usize,
    /// Number of pages for the current filter.
    pub total_pages: usize,
    /// Points matching the filter across all pages.
    pub total_matches: usize,
    /// Detail view.
    pub detail: DetailView<'a>,
    /// Selected density cell, if any.
    pub hotspot: Option<HotspotDetail<'a>>,
}

/// Per-status counts over the committed points.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSummary {
    /// Count for each status that occurs at least once.
    pub by_status: BTreeMap<ComplaintStatus, usize>,
    /// Total points.
    pub total: usize,
}

impl StatusSummary {
    /// Counts `points` by status.
    #[must_use]
    pub fn from_points(points: &[DataPoint]) -> Self {
        let mut by_status = BTreeMap::new();
        for point in points {
            *by_status.entry(point.status).or_insert(0) += 1;
        }
        Self {
            by_status,
            total: points.len(),
        }
    }

    /// Count for one status.
    #[must_use]
    pub fn count(&self, status: ComplaintStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

/// Filter and pagination state for the side panel.
#[derive(Debug, Clone)]
pub struct SidePanel {
    filter: SidePanelFilter,
    page: usize,
    page_size: usize,
}

impl SidePanel {
    /// Creates a panel showing `page_size` items per page (at least one).
    #[must_use]
    pub fn new(page_size: usize) -> Self {
        Self {
            filter: SidePanelFilter::default(),
            page: 1,
            page_size: page_size.max(1),
        }
    }

    /// Current filter.
    #[must_use]
    pub const fn filter(&self) -> &SidePanelFilter {
        &self.filter
    }

    /// Replaces the filter and returns to the first page.
    pub fn set_filter(&mut self, filter: SidePanelFilter) {
        self.filter = filter;
        self.page = 1;
    }

    /// Filters by category and returns to the first page.
    pub fn set_category(&mut self, category: Option<String>) {
        self.filter.category = category;
        self.page = 1;
    }

    /// Filters by status and returns to the first page.
    pub fn set_status(&mut self, status: Option<ComplaintStatus>) {
        self.filter.status = status;
        self.page = 1;
    }

    /// Sets the search text and returns to the first page.
    pub fn set_search(&mut self, search: impl Into<String>) {
        self.filter.search = search.into();
        self.page = 1;
    }

    /// Moves to `page` (1-based). Out-of-range pages are clamped when the
    /// view is projected.
    pub fn set_page(&mut self, page: usize) {
        self.page = page.max(1);
    }

    /// Projects the store into list and detail views.
    #[must_use]
    pub fn project<'a>(&self, store: &'a AggregationStore) -> SidePanelView<'a> {
        let matching: Vec<&DataPoint> = store
            .points()
            .iter()
            .filter(|p| self.filter.matches(p))
            .collect();

        let total_matches = matching.len();
        let total_pages = total_matches.div_ceil(self.page_size);
        let page = self.page.min(total_pages.max(1));
        let items = matching
            .into_iter()
            .skip((page - 1) * self.page_size)
            .take(self.page_size)
            .collect();

        let detail = store.selection().map_or(
            DetailView::Placeholder(DETAIL_PLACEHOLDER),
            |point| DetailView::Selected {
                point,
                detail_path: point.detail_path(),
            },
        );

        SidePanelView {
            items,
            page,
            total_pages,
            total_matches,
            detail,
            hotspot: store.selected_hotspot().map(HotspotDetail::of),
        }
    }

    /// Forwards a list click to the store's selection.
    ///
    /// Returns `false` if `id` is not among the committed points.
    pub fn click(&self, store: &mut AggregationStore, id: ComplaintId) -> bool {
        let Some(point) = store.point(id).cloned() else {
            log::debug!("Side panel click on unknown complaint {id}");
            return false;
        };
        store.select(Some(point));
        true
    }
}
