use std::{
    collections::HashMap,
    ops::ControlFlow,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use complaint_map::{
    ComplaintSource, EngineEvent, MapConfig, MapEngine, MapMode, SourceError, Viewport,
    headless::{HeadlessClusterer, HeadlessMap, MapJournalEntry, OverlayKind},
    side_panel::DetailView,
    tracker::LifecycleState,
};
use complaint_map_api_models::MapQueryParams;
use complaint_map_complaint_models::{
    ComplaintId, ComplaintStatus, DataPoint, DensityRegion, LatLng,
};
use tokio::sync::{mpsc, oneshot};

const SW: LatLng = LatLng {
    lat: 37.50,
    lng: 126.95,
};
const NE: LatLng = LatLng {
    lat: 37.60,
    lng: 127.00,
};

fn point(id: i64, status: ComplaintStatus) -> DataPoint {
    #[allow(clippy::cast_precision_loss)]
    let offset = id as f64 * 0.001;
    DataPoint {
        id: ComplaintId(id),
        lat: 37.55 + offset,
        lng: 126.97 + offset,
        category: "도로".to_string(),
        status,
        title: format!("민원 {id}"),
        address: format!("서울 중구 세종대로 {id}"),
    }
}

fn region(count: u32, offset: f64) -> DensityRegion {
    DensityRegion::new(
        Some(format!("cell-{count}")),
        vec![
            LatLng::new(37.52 + offset, 126.96),
            LatLng::new(37.52 + offset, 126.97),
            LatLng::new(37.53 + offset, 126.97),
            LatLng::new(37.53 + offset, 126.96),
        ],
        count,
    )
}

#[derive(Default)]
struct StaticSource {
    points: Mutex<Vec<DataPoint>>,
    regions: Mutex<Vec<DensityRegion>>,
    failing: AtomicBool,
    point_requests: Mutex<Vec<MapQueryParams>>,
    region_requests: AtomicUsize,
}

impl StaticSource {
    fn with_points(points: Vec<DataPoint>) -> Arc<Self> {
        Arc::new(Self {
            points: Mutex::new(points),
            ..Self::default()
        })
    }

    fn set_points(&self, points: Vec<DataPoint>) {
        *self.points.lock().unwrap() = points;
    }

    fn point_request_count(&self) -> usize {
        self.point_requests.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl ComplaintSource for StaticSource {
    async fn points(&self, params: &MapQueryParams) -> Result<Vec<DataPoint>, SourceError> {
        self.point_requests.lock().unwrap().push(params.clone());
        if self.failing.load(Ordering::SeqCst) {
            return Err(SourceError::Status {
                status: 503,
                url: "/api/gis/map-items".to_string(),
            });
        }
        Ok(self.points.lock().unwrap().clone())
    }

    async fn regions(&self, _params: &MapQueryParams) -> Result<Vec<DensityRegion>, SourceError> {
        self.region_requests.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(SourceError::Http {
                message: "connection refused".to_string(),
            });
        }
        Ok(self.regions.lock().unwrap().clone())
    }
}

type Reply = oneshot::Receiver<Result<Vec<DataPoint>, SourceError>>;

/// Holds each point request open until the test releases it, keyed by
/// zoom level so the release order does not depend on task scheduling.
#[derive(Default)]
struct ScriptedSource {
    replies: Mutex<HashMap<u8, Reply>>,
}

impl ScriptedSource {
    fn expect(&self, zoom: u8) -> oneshot::Sender<Result<Vec<DataPoint>, SourceError>> {
        let (tx, rx) = oneshot::channel();
        self.replies.lock().unwrap().insert(zoom, rx);
        tx
    }
}

#[async_trait::async_trait]
impl ComplaintSource for ScriptedSource {
    async fn points(&self, params: &MapQueryParams) -> Result<Vec<DataPoint>, SourceError> {
        let reply = self.replies.lock().unwrap().remove(&params.zoom);
        match reply {
            Some(rx) => rx.await.unwrap_or_else(|_| {
                Err(SourceError::Http {
                    message: "script dropped".to_string(),
                })
            }),
            None => Err(SourceError::Http {
                message: format!("no scripted reply for zoom {}", params.zoom),
            }),
        }
    }

    async fn regions(&self, _params: &MapQueryParams) -> Result<Vec<DensityRegion>, SourceError> {
        Ok(Vec::new())
    }
}

struct Harness {
    engine: MapEngine,
    rx: mpsc::UnboundedReceiver<EngineEvent>,
    map: HeadlessMap,
}

impl Harness {
    fn new(source: Arc<dyn ComplaintSource>) -> Self {
        let config = MapConfig::embedded().unwrap();
        let clusterer = HeadlessClusterer::new(config.cluster.min_level, config.cluster.average_center);
        let (engine, rx) = MapEngine::new(&config, source, Box::new(clusterer)).unwrap();
        Self {
            engine,
            rx,
            map: HeadlessMap::new(SW, NE, 7),
        }
    }

    /// Mounts with a key and delivers the widget, which starts the first
    /// fetch cycle.
    fn ready(&mut self) {
        self.engine.mount(Some("test-key")).unwrap();
        let flow = self
            .engine
            .handle(EngineEvent::WidgetReady(Box::new(self.map.clone())));
        assert_eq!(flow, ControlFlow::Continue(()));
        assert_eq!(self.engine.lifecycle(), LifecycleState::Ready);
    }

    async fn settle(&mut self) {
        assert_eq!(
            self.engine.settle(&mut self.rx).await,
            ControlFlow::Continue(())
        );
    }

    async fn next(&mut self) {
        let event = self.rx.recv().await.unwrap();
        self.engine.handle(event);
    }

    fn ids(&self) -> Vec<i64> {
        self.engine.store().points().iter().map(|p| p.id.0).collect()
    }
}

#[tokio::test]
async fn seoul_viewport_renders_only_unresolved_markers() {
    let source = StaticSource::with_points(vec![
        point(1, ComplaintStatus::Unprocessed),
        point(2, ComplaintStatus::InProgress),
        point(3, ComplaintStatus::Completed),
    ]);
    let mut harness = Harness::new(source.clone());
    harness.ready();
    harness.settle().await;

    let requests = source.point_requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert!((requests[0].sw_lat - 37.50).abs() < f64::EPSILON);
    assert!((requests[0].ne_lng - 127.00).abs() < f64::EPSILON);
    assert_eq!(requests[0].zoom, 7);
    assert_eq!(source.region_requests.load(Ordering::SeqCst), 0);

    assert_eq!(harness.map.attached_of(OverlayKind::Marker), 2);
    assert_eq!(harness.map.markers_for(ComplaintId(3)), 0);
    let summary = harness.engine.last_render().unwrap();
    assert_eq!(summary.markers, 2);
    assert_eq!(summary.resolved_hidden, 1);

    let view = harness.engine.side_panel_view();
    assert_eq!(view.items.len(), 3);
    assert_eq!(view.total_pages, 1);

    let counts = harness.engine.status_summary();
    assert_eq!(counts.total, 3);
    assert_eq!(counts.count(ComplaintStatus::Unprocessed), 1);
    assert_eq!(counts.count(ComplaintStatus::InProgress), 1);
    assert_eq!(counts.count(ComplaintStatus::Completed), 1);
}

#[tokio::test]
async fn side_list_is_capped_to_page_size() {
    let points = (1..=8)
        .map(|id| point(id, ComplaintStatus::Unprocessed))
        .collect();
    let mut harness = Harness::new(StaticSource::with_points(points));
    harness.ready();
    harness.settle().await;

    assert_eq!(harness.map.attached_of(OverlayKind::Marker), 8);
    let view = harness.engine.side_panel_view();
    assert_eq!(view.items.len(), 5);
    assert_eq!(view.total_pages, 2);

    harness.engine.side_panel_mut().set_page(2);
    assert_eq!(harness.engine.side_panel_view().items.len(), 3);
}

#[tokio::test]
async fn out_of_order_responses_keep_the_latest_cycle() {
    let source = Arc::new(ScriptedSource::default());
    let reply_7 = source.expect(7);
    let reply_6 = source.expect(6);
    let reply_5 = source.expect(5);

    let mut harness = Harness::new(source.clone());
    harness.ready();
    harness.map.set_view(SW, NE, 6);
    harness.engine.handle(EngineEvent::Idle);
    harness.map.set_view(SW, NE, 5);
    harness.engine.handle(EngineEvent::Idle);
    assert!(harness.engine.store().is_loading());

    reply_5
        .send(Ok(vec![point(3, ComplaintStatus::Unprocessed)]))
        .unwrap();
    harness.next().await;
    assert_eq!(harness.ids(), vec![3]);
    assert!(!harness.engine.store().is_loading());

    reply_7
        .send(Ok(vec![point(1, ComplaintStatus::Unprocessed)]))
        .unwrap();
    harness.next().await;
    reply_6
        .send(Ok(vec![point(2, ComplaintStatus::Unprocessed)]))
        .unwrap();
    harness.next().await;

    assert_eq!(harness.ids(), vec![3]);
    assert_eq!(harness.map.markers_for(ComplaintId(3)), 1);
    assert_eq!(harness.map.markers_for(ComplaintId(1)), 0);
    assert_eq!(harness.map.markers_for(ComplaintId(2)), 0);
}

#[tokio::test]
async fn mode_switch_clears_before_new_overlays_arrive() {
    let source = StaticSource::with_points(vec![
        point(1, ComplaintStatus::Unprocessed),
        point(2, ComplaintStatus::Received),
    ]);
    source.regions.lock().unwrap().extend([region(2, 0.0), region(10, 0.02)]);

    let mut harness = Harness::new(source.clone());
    harness.ready();
    harness.settle().await;
    assert_eq!(harness.map.attached_of(OverlayKind::Marker), 2);

    harness.map.clear_journal();
    harness.engine.handle(EngineEvent::SetMode(MapMode::Hotspot));
    assert_eq!(harness.engine.store().mode(), MapMode::Hotspot);
    assert!(harness.engine.store().is_loading());
    assert_eq!(harness.engine.overlay_count(), 0);
    assert_eq!(harness.map.attached_of(OverlayKind::Marker), 0);
    assert_eq!(harness.map.attached_of(OverlayKind::Polygon), 0);

    harness.settle().await;
    assert_eq!(source.region_requests.load(Ordering::SeqCst), 1);
    assert_eq!(harness.map.attached_of(OverlayKind::Marker), 0);
    let polygons = harness.map.attached_polygons();
    assert_eq!(polygons.len(), 2);
    assert!(polygons.iter().all(|p| p.stroke_weight == 0));

    let journal = harness.map.journal();
    let first_attach = journal
        .iter()
        .position(|entry| matches!(entry, MapJournalEntry::Attached { .. }))
        .unwrap();
    assert_eq!(harness.map.attached_count_at(first_attach), 0);
}

#[tokio::test]
async fn selection_survives_a_disjoint_fetch() {
    let source = StaticSource::with_points(vec![point(1, ComplaintStatus::Unprocessed)]);
    let mut harness = Harness::new(source.clone());
    harness.ready();
    harness.settle().await;

    let marker = harness.map.marker_overlay(ComplaintId(1)).unwrap();
    harness.engine.handle(EngineEvent::MarkerClicked(marker));
    assert_eq!(
        harness.engine.store().selection().map(|p| p.id),
        Some(ComplaintId(1))
    );

    source.set_points(vec![point(7, ComplaintStatus::Pending)]);
    harness.engine.handle(EngineEvent::Idle);
    harness.settle().await;

    assert_eq!(harness.ids(), vec![7]);
    match harness.engine.side_panel_view().detail {
        DetailView::Selected { point, detail_path } => {
            assert_eq!(point.id, ComplaintId(1));
            assert_eq!(detail_path, "/reports/1");
        }
        DetailView::Placeholder(_) => panic!("selection was cleared"),
    }

    harness.engine.handle(EngineEvent::ListItemClicked(ComplaintId(7)));
    assert_eq!(
        harness.engine.store().selection().map(|p| p.id),
        Some(ComplaintId(7))
    );
    harness.engine.handle(EngineEvent::ClearSelection);
    assert!(harness.engine.store().selection().is_none());
}

#[tokio::test]
async fn failed_fetch_keeps_the_map_as_it_was() {
    let source = StaticSource::with_points(vec![
        point(1, ComplaintStatus::Unprocessed),
        point(2, ComplaintStatus::Unprocessed),
    ]);
    let mut harness = Harness::new(source.clone());
    harness.ready();
    harness.settle().await;

    source.failing.store(true, Ordering::SeqCst);
    harness.engine.handle(EngineEvent::Idle);
    harness.settle().await;

    assert!(!harness.engine.store().is_loading());
    assert_eq!(harness.ids(), vec![1, 2]);
    assert_eq!(harness.map.attached_of(OverlayKind::Marker), 2);
}

#[tokio::test]
async fn malformed_point_is_dropped_and_the_rest_rendered() {
    let mut broken = point(2, ComplaintStatus::Unprocessed);
    broken.lng = f64::NAN;
    let source = StaticSource::with_points(vec![
        point(1, ComplaintStatus::Unprocessed),
        broken,
        point(3, ComplaintStatus::Unprocessed),
    ]);
    let mut harness = Harness::new(source);
    harness.ready();
    harness.settle().await;

    assert_eq!(harness.ids(), vec![1, 3]);
    assert_eq!(harness.map.attached_of(OverlayKind::Marker), 2);
}

#[tokio::test]
async fn missing_widget_key_never_fetches() {
    let source = StaticSource::with_points(vec![point(1, ComplaintStatus::Unprocessed)]);
    let mut harness = Harness::new(source.clone());

    assert!(harness.engine.mount(None).is_err());
    assert_eq!(harness.engine.lifecycle(), LifecycleState::Unavailable);
    assert!(harness.engine.placeholder().is_some());

    harness
        .engine
        .handle(EngineEvent::WidgetReady(Box::new(harness.map.clone())));
    harness.engine.handle(EngineEvent::Idle);
    harness.engine.handle(EngineEvent::SetMode(MapMode::Hotspot));
    tokio::task::yield_now().await;

    assert_eq!(harness.engine.store().mode(), MapMode::Hotspot);
    assert!(!harness.engine.store().is_loading());
    assert_eq!(source.point_request_count(), 0);
    assert_eq!(source.region_requests.load(Ordering::SeqCst), 0);
    assert_eq!(harness.map.journal().len(), 0);
}

#[tokio::test]
async fn mode_chosen_before_ready_drives_the_first_fetch() {
    let source = StaticSource::with_points(Vec::new());
    source.regions.lock().unwrap().push(region(4, 0.0));
    let mut harness = Harness::new(source.clone());

    harness.engine.handle(EngineEvent::SetMode(MapMode::Hotspot));
    assert_eq!(source.point_request_count(), 0);

    harness.ready();
    harness.settle().await;
    assert_eq!(source.region_requests.load(Ordering::SeqCst), 1);
    assert_eq!(harness.map.attached_of(OverlayKind::Polygon), 1);
}

#[tokio::test]
async fn unmount_clears_overlays_and_stops_the_loop() {
    let source = StaticSource::with_points(vec![point(1, ComplaintStatus::Unprocessed)]);
    let mut harness = Harness::new(source);
    harness.ready();
    harness.settle().await;
    assert_eq!(harness.map.attached_of(OverlayKind::Marker), 1);

    let sender = harness.engine.sender();
    sender.send(EngineEvent::Idle).unwrap();
    sender.send(EngineEvent::Unmount).unwrap();

    let Harness { engine, rx, map } = harness;
    let engine = engine.run(rx).await;

    assert_eq!(engine.lifecycle(), LifecycleState::Unmounted);
    assert_eq!(engine.overlay_count(), 0);
    assert_eq!(map.attached_of(OverlayKind::Marker), 0);
}

#[tokio::test]
async fn failed_fetch_after_mode_switch_draws_retained_points() {
    let source = StaticSource::with_points(vec![
        point(1, ComplaintStatus::Unprocessed),
        point(2, ComplaintStatus::InProgress),
    ]);
    source.regions.lock().unwrap().push(region(6, 0.0));
    let mut harness = Harness::new(source.clone());
    harness.engine.handle(EngineEvent::SetMode(MapMode::Hotspot));
    harness.ready();
    harness.settle().await;
    assert_eq!(harness.map.attached_of(OverlayKind::Polygon), 1);

    source.failing.store(true, Ordering::SeqCst);
    harness.engine.handle(EngineEvent::SetMode(MapMode::Marker));
    assert_eq!(harness.engine.overlay_count(), 0);
    harness.settle().await;

    assert!(!harness.engine.store().is_loading());
    assert_eq!(harness.ids(), vec![1, 2]);
    assert_eq!(harness.map.attached_of(OverlayKind::Polygon), 0);
    assert_eq!(harness.map.attached_of(OverlayKind::Marker), 2);
}

#[tokio::test]
async fn polygon_click_shows_cell_name_and_count() {
    let source = StaticSource::with_points(Vec::new());
    source
        .regions
        .lock()
        .unwrap()
        .extend([region(3, 0.0), region(10, 0.02)]);
    let mut harness = Harness::new(source.clone());
    harness.engine.handle(EngineEvent::SetMode(MapMode::Hotspot));
    harness.ready();
    harness.settle().await;
    assert!(harness.engine.side_panel_view().hotspot.is_none());

    let (polygon, _) = harness
        .map
        .polygon_overlays()
        .into_iter()
        .find(|(_, spec)| spec.z_index == 30)
        .unwrap();
    harness.engine.handle(EngineEvent::PolygonClicked(polygon));
    let hotspot = harness.engine.side_panel_view().hotspot.unwrap();
    assert_eq!(hotspot.label, "cell-10");
    assert_eq!(hotspot.count, 10);

    *source.regions.lock().unwrap() = vec![region(1, 0.04)];
    harness.engine.handle(EngineEvent::Idle);
    harness.settle().await;
    assert_eq!(harness.map.attached_of(OverlayKind::Polygon), 1);
    assert_eq!(
        harness.engine.side_panel_view().hotspot.map(|h| h.count),
        Some(10)
    );

    harness.engine.handle(EngineEvent::ClearSelection);
    assert!(harness.engine.side_panel_view().hotspot.is_none());
}

#[tokio::test]
async fn marker_click_replaces_the_hotspot_detail() {
    let source = StaticSource::with_points(vec![point(4, ComplaintStatus::Pending)]);
    source.regions.lock().unwrap().push(region(5, 0.0));
    let mut harness = Harness::new(source.clone());
    harness.engine.handle(EngineEvent::SetMode(MapMode::Hotspot));
    harness.ready();
    harness.settle().await;

    let (polygon, _) = harness.map.polygon_overlays()[0].clone();
    harness.engine.handle(EngineEvent::PolygonClicked(polygon));
    assert!(harness.engine.store().selected_hotspot().is_some());

    harness.engine.handle(EngineEvent::SetMode(MapMode::Marker));
    harness.settle().await;
    assert!(harness.engine.store().selected_hotspot().is_some());

    let marker = harness.map.marker_overlay(ComplaintId(4)).unwrap();
    harness.engine.handle(EngineEvent::MarkerClicked(marker));
    assert!(harness.engine.store().selected_hotspot().is_none());
    assert_eq!(
        harness.engine.store().selection().map(|p| p.id),
        Some(ComplaintId(4))
    );
}

#[tokio::test]
async fn settled_listeners_see_each_idle_viewport() {
    let source = StaticSource::with_points(Vec::new());
    let mut harness = Harness::new(source.clone());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    harness
        .engine
        .on_settled(Box::new(move |viewport: &Viewport| {
            sink.lock().unwrap().push(viewport.zoom_level());
        }));

    harness.ready();
    harness.settle().await;
    assert!(seen.lock().unwrap().is_empty());

    harness.map.set_view(SW, NE, 6);
    harness.engine.handle(EngineEvent::Idle);
    harness.settle().await;

    assert_eq!(*seen.lock().unwrap(), vec![6]);
    assert_eq!(source.point_request_count(), 2);
}
