#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Viewport-synchronized complaint map engine.
//!
//! Keeps an interactive map widget in step with the complaint GIS API:
//!
//! 1. [`tracker::ViewportTracker`] owns the widget through its
//!    `Uninitialized -> Loading -> Ready` lifecycle and turns the widget's
//!    idle events into "viewport settled" notifications.
//! 2. [`coordinator::FetchCoordinator`] tags every fetch cycle with a
//!    monotonically increasing [`coordinator::FetchToken`] and commits only
//!    the response belonging to the latest token.
//! 3. [`store::AggregationStore`] holds the committed points, density
//!    regions, selection, mode and loading flag.
//! 4. [`renderer::OverlayRenderer`] is the only code that attaches or
//!    detaches overlays, always clearing the previous set first.
//! 5. [`side_panel::SidePanel`] projects the store into a paginated list
//!    and a detail view.
//!
//! [`engine::MapEngine`] wires these together behind a single event loop.
//! Network calls run as `tokio` tasks and post their results back to that
//! loop, so all state is mutated from one place.

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod headless;
pub mod palette;
pub mod renderer;
pub mod side_panel;
pub mod source;
pub mod store;
pub mod tracker;
pub mod viewport;
pub mod widget;

pub use config::MapConfig;
pub use engine::{EngineEvent, MapEngine};
pub use source::{ComplaintSource, SourceError};
pub use viewport::{MapMode, Viewport};

use thiserror::Error;
use tracker::LifecycleState;

/// Errors raised by the map engine.
#[derive(Debug, Error)]
pub enum MapError {
    /// No map credential is configured, so the widget cannot be loaded.
    #[error("Map widget unavailable: no widget key configured")]
    WidgetUnavailable,

    /// The widget was used before it signalled readiness.
    #[error("Map widget not ready (state: {state})")]
    NotReady {
        /// Lifecycle state at the time of the call.
        state: LifecycleState,
    },

    /// The widget signalled readiness more than once for the same mount.
    #[error("Map widget already ready")]
    AlreadyReady,

    /// The tracker was torn down and cannot be reused.
    #[error("Viewport tracker has been unmounted")]
    Unmounted,

    /// The widget reported bounds whose south-west corner is not south-west
    /// of the north-east corner.
    #[error("Invalid viewport: sw=({sw_lat}, {sw_lng}) ne=({ne_lat}, {ne_lng})")]
    InvalidViewport {
        /// South-west latitude.
        sw_lat: f64,
        /// South-west longitude.
        sw_lng: f64,
        /// North-east latitude.
        ne_lat: f64,
        /// North-east longitude.
        ne_lng: f64,
    },

    /// Configuration could not be loaded or is inconsistent.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}
