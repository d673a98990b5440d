//! Widget lifecycle and viewport tracking.
//!
//! The map widget arrives asynchronously (its script loads over the
//! network), so everything that touches it goes through the tracker, which
//! refuses access until the widget has signalled readiness.

use strum_macros::Display;

use crate::{MapError, viewport::Viewport, widget::MapWidget};

/// Tag of the tracker's current lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum LifecycleState {
    /// Nothing has been mounted yet.
    Uninitialized,
    /// The widget script is loading.
    Loading,
    /// The widget is usable.
    Ready,
    /// No widget credential is configured; the map shows a placeholder.
    Unavailable,
    /// Torn down; a new tracker is required for the next mount.
    Unmounted,
}

enum WidgetState {
    Uninitialized,
    Loading,
    Ready(Box<dyn MapWidget>),
    Unavailable,
    Unmounted,
}

impl WidgetState {
    const fn tag(&self) -> LifecycleState {
        match self {
            Self::Uninitialized => LifecycleState::Uninitialized,
            Self::Loading => LifecycleState::Loading,
            Self::Ready(_) => LifecycleState::Ready,
            Self::Unavailable => LifecycleState::Unavailable,
            Self::Unmounted => LifecycleState::Unmounted,
        }
    }
}

/// Callback run once per settled pan/zoom gesture.
pub type SettledListener = Box<dyn FnMut(&Viewport) + Send>;

/// Owns the map widget and forwards its idle events.
pub struct ViewportTracker {
    state: WidgetState,
    listeners: Vec<SettledListener>,
}

impl Default for ViewportTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewportTracker {
    /// Creates a tracker in the `Uninitialized` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: WidgetState::Uninitialized,
            listeners: Vec::new(),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> LifecycleState {
        self.state.tag()
    }

    /// Starts mounting the widget.
    ///
    /// Without a widget key the tracker moves to `Unavailable` and the map
    /// degrades to a placeholder.
    ///
    /// # Errors
    ///
    /// * [`MapError::WidgetUnavailable`] if `widget_key` is missing or blank
    /// * [`MapError::Unmounted`] if the tracker was already torn down
    /// * [`MapError::AlreadyReady`] if called after readiness
    pub fn begin_loading(&mut self, widget_key: Option<&str>) -> Result<(), MapError> {
        match self.state {
            WidgetState::Uninitialized => {}
            WidgetState::Loading => return Ok(()),
            WidgetState::Ready(_) => return Err(MapError::AlreadyReady),
            WidgetState::Unavailable => return Err(MapError::WidgetUnavailable),
            WidgetState::Unmounted => return Err(MapError::Unmounted),
        }

        if widget_key.is_none_or(|key| key.trim().is_empty()) {
            log::warn!("No map widget key configured; showing placeholder instead of the map");
            self.state = WidgetState::Unavailable;
            return Err(MapError::WidgetUnavailable);
        }

        log::debug!("Loading map widget");
        self.state = WidgetState::Loading;
        Ok(())
    }

    /// Accepts the loaded widget. Happens exactly once per mount.
    ///
    /// # Errors
    ///
    /// Returns an error unless the tracker is `Loading`.
    pub fn ready(&mut self, widget: Box<dyn MapWidget>) -> Result<(), MapError> {
        match self.state {
            WidgetState::Loading => {
                log::info!("Map widget ready at level {}", widget.level());
                self.state = WidgetState::Ready(widget);
                Ok(())
            }
            WidgetState::Ready(_) => Err(MapError::AlreadyReady),
            WidgetState::Unavailable => Err(MapError::WidgetUnavailable),
            WidgetState::Unmounted => Err(MapError::Unmounted),
            WidgetState::Uninitialized => Err(MapError::NotReady {
                state: LifecycleState::Uninitialized,
            }),
        }
    }

    /// Registers `listener` to run once per settled gesture.
    pub fn on_settled(&mut self, listener: SettledListener) {
        self.listeners.push(listener);
    }

    /// Handles the widget's native idle event.
    ///
    /// Returns the settled viewport after running every listener, or `None`
    /// if the widget is not ready yet. No extra debouncing is applied: the
    /// widget already coalesces continuous motion into one idle event.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::Unmounted`] after teardown, or
    /// [`MapError::InvalidViewport`] if the widget reports bad bounds.
    pub fn handle_idle(&mut self) -> Result<Option<Viewport>, MapError> {
        match self.state {
            WidgetState::Ready(_) => {}
            WidgetState::Unmounted => return Err(MapError::Unmounted),
            _ => {
                log::debug!("Ignoring idle event in state {}", self.state());
                return Ok(None);
            }
        }

        let viewport = self.current_viewport()?;
        for listener in &mut self.listeners {
            listener(&viewport);
        }
        Ok(Some(viewport))
    }

    /// Reads the current viewport from the widget.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::NotReady`] (or [`MapError::Unmounted`]) when
    /// called before the widget is ready; this is a programming error and
    /// is logged as such.
    pub fn current_viewport(&self) -> Result<Viewport, MapError> {
        let widget = self.widget()?;
        let (south_west, north_east) = widget.bounds();
        Viewport::new(south_west, north_east, widget.level())
    }

    /// Shared access to the ready widget.
    ///
    /// # Errors
    ///
    /// Fails unless the tracker is `Ready`.
    pub fn widget(&self) -> Result<&dyn MapWidget, MapError> {
        match &self.state {
            WidgetState::Ready(widget) => Ok(widget.as_ref()),
            other => Err(Self::not_ready(other.tag())),
        }
    }

    /// Exclusive access to the ready widget, for the overlay renderer.
    ///
    /// # Errors
    ///
    /// Fails unless the tracker is `Ready`.
    pub fn widget_mut(&mut self) -> Result<&mut dyn MapWidget, MapError> {
        match &mut self.state {
            WidgetState::Ready(widget) => Ok(widget.as_mut()),
            other => Err(Self::not_ready(other.tag())),
        }
    }

    /// Tears down listeners and releases the widget. The tracker cannot be
    /// reused afterwards.
    pub fn unmount(&mut self) -> Option<Box<dyn MapWidget>> {
        self.listeners.clear();
        match std::mem::replace(&mut self.state, WidgetState::Unmounted) {
            WidgetState::Ready(widget) => Some(widget),
            _ => None,
        }
    }

    fn not_ready(state: LifecycleState) -> MapError {
        if state == LifecycleState::Unmounted {
            return MapError::Unmounted;
        }
        log::error!("Map widget accessed before ready (state: {state})");
        MapError::NotReady { state }
    }
}
