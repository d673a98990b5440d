#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Drives the complaint map engine against a live API without a browser.
//!
//! ```text
//! complaint_map watch --bbox 37.50,126.95,37.60,127.00 --zoom 7
//! complaint_map watch --bbox 37.50,126.95,37.60,127.00 --zoom 7 --mode hotspot
//! complaint_map watch --mode hotspot
//! ```
//!
//! Without `--bbox` the view opens on the configured `initial_center`.
//!
//! The map widget is the in-memory headless implementation, so the output
//! shows exactly what a browser map would have drawn for that viewport.

use std::{path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use complaint_map::{
    EngineEvent, MapConfig, MapEngine, MapMode,
    headless::{DEFAULT_SPAN_DEGREES, HeadlessClusterer, HeadlessMap, OverlayKind},
    widget::MapWidget,
};
use complaint_map_api::HttpComplaintSource;
use complaint_map_complaint_models::{ComplaintStatus, LatLng};

/// Widget key used when none is configured. The headless widget has no
/// tile source, so it needs no real credential.
const HEADLESS_WIDGET_KEY: &str = "headless";

#[derive(Parser)]
#[command(
    name = "complaint_map",
    about = "Run the complaint map engine headlessly against the GIS API"
)]
struct Cli {
    /// Path to a map config TOML file (defaults to the embedded config)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// API base URL (overrides config and `COMPLAINT_MAP_API_URL`)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Bearer token for agency-scoped results
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and render one viewport, then print what the map shows
    Watch {
        /// Viewport as `sw_lat,sw_lng,ne_lat,ne_lng` (defaults to the
        /// configured initial center)
        #[arg(long, value_parser = parse_bbox)]
        bbox: Option<(LatLng, LatLng)>,
        /// Zoom level (defaults to the configured initial level)
        #[arg(long)]
        zoom: Option<u8>,
        /// Display mode (`marker` or `hotspot`)
        #[arg(long, default_value = "marker", value_parser = parse_mode)]
        mode: MapMode,
        /// Side list page (1-based)
        #[arg(long, default_value = "1")]
        page: usize,
        /// Only list this category
        #[arg(long)]
        category: Option<String>,
        /// Only list this status (e.g. `IN_PROGRESS`)
        #[arg(long, value_parser = parse_status)]
        status: Option<ComplaintStatus>,
        /// Only list complaints whose title or address contains this text
        #[arg(long)]
        search: Option<String>,
    },
}

fn parse_bbox(value: &str) -> Result<(LatLng, LatLng), String> {
    let parts = value
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid coordinate: {e}"))?;

    let [sw_lat, sw_lng, ne_lat, ne_lng] = parts[..] else {
        return Err(format!(
            "expected 4 comma-separated values, got {}",
            parts.len()
        ));
    };
    Ok((LatLng::new(sw_lat, sw_lng), LatLng::new(ne_lat, ne_lng)))
}

/// Opens the headless map on `bbox`, or on the configured initial camera.
fn open_map(config: &MapConfig, bbox: Option<(LatLng, LatLng)>, zoom: Option<u8>) -> HeadlessMap {
    let zoom = zoom.unwrap_or(config.initial_level);
    match bbox {
        Some((south_west, north_east)) => HeadlessMap::new(south_west, north_east, zoom),
        None => HeadlessMap::centered(config.initial_center, DEFAULT_SPAN_DEGREES, zoom),
    }
}

fn parse_mode(value: &str) -> Result<MapMode, String> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("unknown mode: {value} (expected marker or hotspot)"))
}

fn parse_status(value: &str) -> Result<ComplaintStatus, String> {
    value
        .trim()
        .to_uppercase()
        .replace('-', "_")
        .parse()
        .map_err(|_| format!("unknown status: {value}"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_custom_env("RUST_LOG");
    let cli = Cli::parse();

    let mut config = MapConfig::load(cli.config.as_deref())?;
    if let Some(api_url) = cli.api_url {
        config.api_base_url = api_url;
    }

    match cli.command {
        Commands::Watch {
            bbox,
            zoom,
            mode,
            page,
            category,
            status,
            search,
        } => {
            let map = open_map(&config, bbox, zoom);
            let zoom = map.level();

            let mut source = HttpComplaintSource::new(config.api_base_url.clone())?;
            if let Some(token) = cli.token {
                source = source.with_auth_token(token);
            }

            let clusterer =
                HeadlessClusterer::new(config.cluster.min_level, config.cluster.average_center);
            let (mut engine, mut rx) =
                MapEngine::new(&config, Arc::new(source), Box::new(clusterer.clone()))?;

            engine.handle(EngineEvent::SetMode(mode));
            engine.mount(Some(
                config
                    .widget_key
                    .as_deref()
                    .unwrap_or(HEADLESS_WIDGET_KEY),
            ))?;
            log::info!("Fetching {mode} data from {}", config.api_base_url);
            engine.handle(EngineEvent::WidgetReady(Box::new(map.clone())));

            if engine.settle(&mut rx).await.is_break() {
                return Err("map engine stopped before the fetch settled".into());
            }

            let panel = engine.side_panel_mut();
            panel.set_category(category);
            panel.set_status(status);
            panel.set_search(search.unwrap_or_default());
            panel.set_page(page);

            print_map(&engine, &map, &clusterer, mode, zoom);
            print_side_panel(&engine);
            print_summary(&engine);

            engine.handle(EngineEvent::Unmount);
        }
    }

    Ok(())
}

fn print_map(
    engine: &MapEngine,
    map: &HeadlessMap,
    clusterer: &HeadlessClusterer,
    mode: MapMode,
    zoom: u8,
) {
    let summary = engine.last_render().unwrap_or_default();
    println!("Mode: {mode} (zoom {zoom})");
    match mode {
        MapMode::Marker => {
            println!(
                "Markers: {} ({} resolved hidden, {} malformed)",
                map.attached_of(OverlayKind::Marker),
                summary.resolved_hidden,
                summary.malformed
            );
            println!("Cluster badges: {}", clusterer.badges(zoom).len());
        }
        MapMode::Hotspot => {
            println!(
                "Polygons: {} ({} malformed)",
                map.attached_of(OverlayKind::Polygon),
                summary.malformed
            );
        }
    }
    println!();
}

fn print_side_panel(engine: &MapEngine) {
    let view = engine.side_panel_view();
    println!(
        "Complaints (page {}/{}, {} matching)",
        view.page,
        view.total_pages.max(1),
        view.total_matches
    );
    println!("{:<10} {:<8} {:<12} TITLE", "ID", "STATUS", "CATEGORY");
    println!("{}", "-".repeat(72));

    if view.items.is_empty() {
        println!("No complaints in this area.");
    }
    for point in view.items {
        println!(
            "{:<10} {:<8} {:<12} {} ({})",
            point.id.to_string(),
            point.status.label(),
            point.category,
            point.title,
            point.address
        );
    }
    println!();
}

fn print_summary(engine: &MapEngine) {
    let summary = engine.status_summary();
    println!("Status summary ({} total)", summary.total);
    for (status, count) in &summary.by_status {
        println!("  {:<8} {count}", status.label());
    }
}
