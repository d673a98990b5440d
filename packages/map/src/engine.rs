//! Single-consumer event loop driving the map.
//!
//! Widget events, user actions and fetch completions all arrive as
//! [`EngineEvent`]s and are handled one at a time. Network calls run as
//! spawned tasks that post their results back on the same channel, so every
//! state mutation happens on the loop.

use std::{ops::ControlFlow, sync::Arc};

use complaint_map_complaint_models::{ComplaintId, DataPoint, DensityRegion};
use tokio::sync::mpsc;

use crate::{
    MapConfig, MapError,
    coordinator::{Completion, FetchCoordinator, FetchCycle, FetchToken},
    renderer::{OverlayRenderer, RenderSummary},
    side_panel::{SidePanel, SidePanelView, StatusSummary},
    source::{ComplaintSource, SourceError},
    store::AggregationStore,
    tracker::{LifecycleState, SettledListener, ViewportTracker},
    viewport::MapMode,
    widget::{Clusterer, MapWidget, OverlayId},
};

/// Text shown instead of the map when no widget key is configured.
pub const UNAVAILABLE_PLACEHOLDER: &str = "지도를 불러올 수 없습니다 (지도 키가 설정되지 않았습니다)";

/// Something the engine reacts to.
pub enum EngineEvent {
    /// The widget finished loading.
    WidgetReady(Box<dyn MapWidget>),
    /// The widget settled after a pan or zoom.
    Idle,
    /// The user toggled the display mode.
    SetMode(MapMode),
    /// The user clicked a rendered marker.
    MarkerClicked(OverlayId),
    /// The user clicked a rendered density polygon.
    PolygonClicked(OverlayId),
    /// The user clicked an item in the side list.
    ListItemClicked(ComplaintId),
    /// The user closed the detail view or clicked empty map.
    ClearSelection,
    /// A point request finished.
    PointsFetched {
        /// Cycle the request belonged to.
        token: FetchToken,
        /// Request outcome.
        result: Result<Vec<DataPoint>, SourceError>,
    },
    /// A density-region request finished.
    RegionsFetched {
        /// Cycle the request belonged to.
        token: FetchToken,
        /// Request outcome.
        result: Result<Vec<DensityRegion>, SourceError>,
    },
    /// The map is being torn down.
    Unmount,
}

impl std::fmt::Debug for EngineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WidgetReady(_) => f.write_str("WidgetReady"),
            Self::Idle => f.write_str("Idle"),
            Self::SetMode(mode) => write!(f, "SetMode({mode})"),
            Self::MarkerClicked(id) => write!(f, "MarkerClicked({id})"),
            Self::PolygonClicked(id) => write!(f, "PolygonClicked({id})"),
            Self::ListItemClicked(id) => write!(f, "ListItemClicked({id})"),
            Self::ClearSelection => f.write_str("ClearSelection"),
            Self::PointsFetched { token, result } => {
                write!(f, "PointsFetched({token}, ok={})", result.is_ok())
            }
            Self::RegionsFetched { token, result } => {
                write!(f, "RegionsFetched({token}, ok={})", result.is_ok())
            }
            Self::Unmount => f.write_str("Unmount"),
        }
    }
}

/// Owns every component of one mounted map.
pub struct MapEngine {
    tracker: ViewportTracker,
    coordinator: FetchCoordinator,
    store: AggregationStore,
    renderer: OverlayRenderer,
    side_panel: SidePanel,
    source: Arc<dyn ComplaintSource>,
    tx: mpsc::UnboundedSender<EngineEvent>,
    last_render: Option<RenderSummary>,
}

impl MapEngine {
    /// Builds an engine and the receiving end of its event channel.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::Config`] if the density table is inconsistent.
    pub fn new(
        config: &MapConfig,
        source: Arc<dyn ComplaintSource>,
        clusterer: Box<dyn Clusterer>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<EngineEvent>), MapError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = Self {
            tracker: ViewportTracker::new(),
            coordinator: FetchCoordinator::new(),
            store: AggregationStore::new(MapMode::default()),
            renderer: OverlayRenderer::new(clusterer, config.density_palette()?),
            side_panel: SidePanel::new(config.side_panel.page_size),
            source,
            tx,
            last_render: None,
        };
        Ok((engine, rx))
    }

    /// Sender for posting events from widget callbacks.
    #[must_use]
    pub fn sender(&self) -> mpsc::UnboundedSender<EngineEvent> {
        self.tx.clone()
    }

    /// Starts loading the widget.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::WidgetUnavailable`] without a widget key; the
    /// engine then shows [`UNAVAILABLE_PLACEHOLDER`] and never fetches.
    pub fn mount(&mut self, widget_key: Option<&str>) -> Result<(), MapError> {
        self.tracker.begin_loading(widget_key)
    }

    /// Widget lifecycle state.
    #[must_use]
    pub const fn lifecycle(&self) -> LifecycleState {
        self.tracker.state()
    }

    /// Placeholder text to show instead of the map, if the widget is
    /// unavailable.
    #[must_use]
    pub fn placeholder(&self) -> Option<&'static str> {
        (self.tracker.state() == LifecycleState::Unavailable).then_some(UNAVAILABLE_PLACEHOLDER)
    }

    /// Committed state.
    #[must_use]
    pub const fn store(&self) -> &AggregationStore {
        &self.store
    }

    /// Side panel filter and pagination state.
    #[must_use]
    pub const fn side_panel(&self) -> &SidePanel {
        &self.side_panel
    }

    /// Mutable side panel state, for filter and page changes.
    pub const fn side_panel_mut(&mut self) -> &mut SidePanel {
        &mut self.side_panel
    }

    /// Current list and detail views.
    #[must_use]
    pub fn side_panel_view(&self) -> SidePanelView<'_> {
        self.side_panel.project(&self.store)
    }

    /// Status counts over the committed points.
    #[must_use]
    pub fn status_summary(&self) -> StatusSummary {
        StatusSummary::from_points(self.store.points())
    }

    /// Registers `listener` to run with the viewport after every settled
    /// pan or zoom, before the engine starts the matching fetch. Listeners
    /// are dropped on unmount.
    pub fn on_settled(&mut self, listener: SettledListener) {
        self.tracker.on_settled(listener);
    }

    /// Overlays currently on the map.
    #[must_use]
    pub fn overlay_count(&self) -> usize {
        self.renderer.overlay_count()
    }

    /// Summary of the most recent render pass.
    #[must_use]
    pub const fn last_render(&self) -> Option<RenderSummary> {
        self.last_render
    }

    /// Handles one event. Breaks after [`EngineEvent::Unmount`].
    pub fn handle(&mut self, event: EngineEvent) -> ControlFlow<()> {
        log::trace!("Handling {event:?}");
        match event {
            EngineEvent::WidgetReady(widget) => self.on_ready(widget),
            EngineEvent::Idle => self.on_idle(),
            EngineEvent::SetMode(mode) => self.set_mode(mode),
            EngineEvent::MarkerClicked(overlay) => {
                match self.renderer.point_for(overlay).cloned() {
                    Some(point) => {
                        self.store.select_hotspot(None);
                        self.store.select(Some(point));
                    }
                    None => log::debug!("Click on unknown marker {overlay}"),
                }
            }
            EngineEvent::PolygonClicked(overlay) => {
                match self.renderer.region_for(overlay).cloned() {
                    Some(region) => self.store.select_hotspot(Some(region)),
                    None => log::debug!("Click on unknown polygon {overlay}"),
                }
            }
            EngineEvent::ListItemClicked(id) => {
                self.side_panel.click(&mut self.store, id);
            }
            EngineEvent::ClearSelection => {
                self.store.select(None);
                self.store.select_hotspot(None);
            }
            EngineEvent::PointsFetched { token, result } => {
                let completion = self
                    .coordinator
                    .complete_points(token, result, &mut self.store);
                self.on_completion(completion);
            }
            EngineEvent::RegionsFetched { token, result } => {
                let completion = self
                    .coordinator
                    .complete_regions(token, result, &mut self.store);
                self.on_completion(completion);
            }
            EngineEvent::Unmount => {
                self.unmount();
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Switches the display mode.
    ///
    /// Clears the previous mode's overlays right away, so the map is empty
    /// rather than mixed while the new data loads, then re-fetches. Before
    /// the widget is ready only the mode is recorded; the first fetch uses
    /// it.
    pub fn set_mode(&mut self, mode: MapMode) {
        let changed = self.store.set_mode(mode);
        log::info!("Map mode set to {mode}");

        if self.tracker.state() != LifecycleState::Ready {
            return;
        }
        if changed && let Ok(map) = self.tracker.widget_mut() {
            self.renderer.clear(map);
        }
        self.trigger();
    }

    /// Processes events until the latest fetch cycle has settled.
    ///
    /// Breaks if the engine is unmounted or the channel closes first.
    pub async fn settle(
        &mut self,
        rx: &mut mpsc::UnboundedReceiver<EngineEvent>,
    ) -> ControlFlow<()> {
        while self.store.is_loading() {
            let Some(event) = rx.recv().await else {
                return ControlFlow::Break(());
            };
            self.handle(event)?;
        }
        ControlFlow::Continue(())
    }

    /// Runs the loop until [`EngineEvent::Unmount`] or until every sender
    /// is dropped, and hands the engine back.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<EngineEvent>) -> Self {
        while let Some(event) = rx.recv().await {
            if self.handle(event).is_break() {
                break;
            }
        }
        log::debug!("Map engine loop finished");
        self
    }

    fn on_ready(&mut self, widget: Box<dyn MapWidget>) {
        if let Err(e) = self.tracker.ready(widget) {
            log::warn!("Ignoring widget readiness: {e}");
            return;
        }
        self.trigger();
    }

    fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Committed { .. } => self.render(),
            // A mode switch cleared the map; fall back to the retained data
            // rather than leaving it empty.
            Completion::Failed if self.renderer.drawn_mode() != Some(self.store.mode()) => {
                log::info!(
                    "Fetch failed; drawing retained {} data",
                    self.store.mode()
                );
                self.render();
            }
            Completion::Failed | Completion::Stale | Completion::Waiting => {}
        }
    }

    fn on_idle(&mut self) {
        match self.tracker.handle_idle() {
            Ok(Some(viewport)) => {
                let cycle = self
                    .coordinator
                    .trigger(&viewport, self.store.mode(), &mut self.store);
                self.dispatch(cycle);
            }
            Ok(None) => {}
            Err(e) => log::warn!("Ignoring idle event: {e}"),
        }
    }

    fn trigger(&mut self) {
        match self.tracker.current_viewport() {
            Ok(viewport) => {
                let cycle = self
                    .coordinator
                    .trigger(&viewport, self.store.mode(), &mut self.store);
                self.dispatch(cycle);
            }
            Err(e) => log::error!("Cannot fetch without a viewport: {e}"),
        }
    }

    fn dispatch(&self, cycle: FetchCycle) {
        let FetchCycle {
            token,
            params,
            mode,
        } = cycle;

        if mode.wants_regions() {
            let source = Arc::clone(&self.source);
            let tx = self.tx.clone();
            let params = params.clone();
            tokio::spawn(async move {
                let result = source.regions(&params).await;
                if tx.send(EngineEvent::RegionsFetched { token, result }).is_err() {
                    log::debug!("Engine gone; dropping regions for cycle {token}");
                }
            });
        }

        let source = Arc::clone(&self.source);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = source.points(&params).await;
            if tx.send(EngineEvent::PointsFetched { token, result }).is_err() {
                log::debug!("Engine gone; dropping points for cycle {token}");
            }
        });
    }

    fn render(&mut self) {
        match self.tracker.widget_mut() {
            Ok(map) => {
                let summary = self.renderer.render(map, &self.store);
                self.last_render = Some(summary);
            }
            Err(e) => log::warn!("Skipping render: {e}"),
        }
    }

    fn unmount(&mut self) {
        if let Ok(map) = self.tracker.widget_mut() {
            self.renderer.clear(map);
        }
        let released = self.tracker.unmount().is_some();
        log::info!("Map unmounted (widget released: {released})");
    }
}
