//! Fetch cycles and stale-result rejection.
//!
//! Responses for rapid successive viewport changes can complete in any
//! order. Every cycle gets a [`FetchToken`] one higher than the previous,
//! and a response is committed only if its token is still the latest one
//! issued. There is no cancellation: superseded requests finish and are
//! dropped here.

use std::collections::BTreeSet;

use complaint_map_api_models::MapQueryParams;
use complaint_map_complaint_models::{DataPoint, DensityRegion};

use crate::{
    source::SourceError,
    store::{AggregationStore, Commit},
    viewport::{MapMode, Viewport},
};

/// Identifies a fetch cycle. Strictly increasing, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FetchToken(u64);

impl FetchToken {
    /// Raw counter value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for FetchToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Requests to issue for one cycle.
#[derive(Debug, Clone)]
pub struct FetchCycle {
    /// Token the responses must carry back.
    pub token: FetchToken,
    /// Parameters shared by both requests.
    pub params: MapQueryParams,
    /// Mode the cycle was issued in.
    pub mode: MapMode,
}

impl FetchCycle {
    /// Whether a density-region request belongs to this cycle.
    #[must_use]
    pub const fn wants_regions(&self) -> bool {
        self.mode.wants_regions()
    }
}

/// What happened to a delivered response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Superseded by a newer cycle; nothing changed.
    Stale,
    /// Latest cycle, still waiting for its other half.
    Waiting,
    /// Latest cycle settled; these fields were replaced.
    Committed {
        /// Points were replaced.
        points: bool,
        /// Regions were replaced.
        regions: bool,
    },
    /// Latest cycle settled but every request failed; the store keeps its
    /// previous data.
    Failed,
}

enum Slot<T> {
    NotRequested,
    Waiting,
    Ready(T),
    Failed,
}

impl<T> Slot<T> {
    const fn is_settled(&self) -> bool {
        !matches!(self, Self::Waiting)
    }

    fn take_ready(&mut self) -> Option<T> {
        match std::mem::replace(self, Self::NotRequested) {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }
}

struct PendingCycle {
    token: FetchToken,
    points: Slot<Vec<DataPoint>>,
    regions: Slot<Vec<DensityRegion>>,
}

impl PendingCycle {
    const fn is_settled(&self) -> bool {
        self.points.is_settled() && self.regions.is_settled()
    }
}

/// Issues fetch cycles and commits only the freshest result.
pub struct FetchCoordinator {
    latest: FetchToken,
    pending: Option<PendingCycle>,
}

impl Default for FetchCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl FetchCoordinator {
    /// Creates a coordinator that has issued no tokens.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            latest: FetchToken(0),
            pending: None,
        }
    }

    /// Highest token issued so far.
    #[must_use]
    pub const fn latest_token(&self) -> FetchToken {
        self.latest
    }

    /// Starts a new cycle for `viewport` in `mode` and marks the store as
    /// loading. Any cycle still in flight is superseded.
    pub fn trigger(
        &mut self,
        viewport: &Viewport,
        mode: MapMode,
        store: &mut AggregationStore,
    ) -> FetchCycle {
        self.latest = FetchToken(self.latest.0 + 1);
        let token = self.latest;

        self.pending = Some(PendingCycle {
            token,
            points: Slot::Waiting,
            regions: if mode.wants_regions() {
                Slot::Waiting
            } else {
                Slot::NotRequested
            },
        });
        store.set_loading(true);

        let params = viewport.query_params();
        log::debug!(
            "Fetch cycle {token} ({mode}): sw=({}, {}) ne=({}, {}) zoom={}",
            params.sw_lat,
            params.sw_lng,
            params.ne_lat,
            params.ne_lng,
            params.zoom
        );

        FetchCycle {
            token,
            params,
            mode,
        }
    }

    /// Delivers the point response for `token`.
    pub fn complete_points(
        &mut self,
        token: FetchToken,
        result: Result<Vec<DataPoint>, SourceError>,
        store: &mut AggregationStore,
    ) -> Completion {
        let Some(pending) = self.pending_for(token, "points") else {
            return Completion::Stale;
        };
        if !matches!(pending.points, Slot::Waiting) {
            log::warn!("Duplicate point response for cycle {token}; ignoring");
            return Completion::Stale;
        }

        pending.points = match result {
            Ok(points) => Slot::Ready(points),
            Err(e) => {
                log::error!("Failed to fetch map points for cycle {token}: {e}");
                Slot::Failed
            }
        };
        self.settle(store)
    }

    /// Delivers the density-region response for `token`.
    pub fn complete_regions(
        &mut self,
        token: FetchToken,
        result: Result<Vec<DensityRegion>, SourceError>,
        store: &mut AggregationStore,
    ) -> Completion {
        let Some(pending) = self.pending_for(token, "regions") else {
            return Completion::Stale;
        };
        if !matches!(pending.regions, Slot::Waiting) {
            log::warn!("Unexpected region response for cycle {token}; ignoring");
            return Completion::Stale;
        }

        pending.regions = match result {
            Ok(regions) => Slot::Ready(regions),
            Err(e) => {
                log::error!("Failed to fetch hotspot regions for cycle {token}: {e}");
                Slot::Failed
            }
        };
        self.settle(store)
    }

    fn pending_for(&mut self, token: FetchToken, what: &str) -> Option<&mut PendingCycle> {
        if token != self.latest {
            if token > self.latest {
                log::warn!(
                    "Discarding {what} for unissued cycle {token} (latest {})",
                    self.latest
                );
            } else {
                log::debug!(
                    "Discarding stale {what} for cycle {token} (latest {})",
                    self.latest
                );
            }
            return None;
        }

        let pending = self.pending.as_mut().filter(|p| p.token == token);
        if pending.is_none() {
            log::debug!("Cycle {token} already settled; discarding late {what}");
        }
        pending
    }

    fn settle(&mut self, store: &mut AggregationStore) -> Completion {
        if !self.pending.as_ref().is_some_and(PendingCycle::is_settled) {
            return Completion::Waiting;
        }
        let Some(mut pending) = self.pending.take() else {
            return Completion::Waiting;
        };

        let points = pending.points.take_ready().map(sanitize_points);
        let regions = pending.regions.take_ready().map(sanitize_regions);
        store.set_loading(false);

        if points.is_none() && regions.is_none() {
            log::debug!(
                "Cycle {} failed; keeping previously committed data",
                pending.token
            );
            return Completion::Failed;
        }

        let completion = Completion::Committed {
            points: points.is_some(),
            regions: regions.is_some(),
        };
        log::debug!(
            "Committing cycle {}: {} points, {} regions",
            pending.token,
            points.as_ref().map_or_else(|| "kept".to_string(), |p| p.len().to_string()),
            regions.as_ref().map_or_else(|| "kept".to_string(), |r| r.len().to_string()),
        );
        store.commit(Commit { points, regions });
        completion
    }
}

/// Drops points with unusable coordinates and duplicate ids (first wins).
fn sanitize_points(points: Vec<DataPoint>) -> Vec<DataPoint> {
    let mut seen = BTreeSet::new();
    points
        .into_iter()
        .filter(|point| {
            if let Err(e) = point.validate() {
                log::warn!("Dropping complaint {}: {e}", point.id);
                return false;
            }
            seen.insert(point.id)
        })
        .collect()
}

fn sanitize_regions(regions: Vec<DensityRegion>) -> Vec<DensityRegion> {
    regions
        .into_iter()
        .filter(|region| match region.validate() {
            Ok(()) => true,
            Err(e) => {
                log::warn!(
                    "Dropping hotspot {}: {e}",
                    region.cell_id.as_deref().unwrap_or("<unnamed>")
                );
                false
            }
        })
        .collect()
}
