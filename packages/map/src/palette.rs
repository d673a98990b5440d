//! Count-to-color mapping for density polygons.
//!
//! A fixed, ordered threshold table maps a region's count to a fill color
//! and opacity. Both are monotonic in the count: a higher count never maps
//! to a cooler tier or a lower opacity. Opacity is capped so outliers stay
//! distinguishable without saturating to solid color.

use serde::Deserialize;

use crate::config::ConfigError;

/// Fill style for one polygon.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DensityStyle {
    /// Fill color (hex).
    pub color: String,
    /// Fill opacity.
    pub opacity: f64,
}

/// One row of the threshold table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DensityTier {
    /// Smallest count that uses this tier.
    pub min_count: u32,
    /// Fill color (hex).
    pub color: String,
    /// Fill opacity.
    pub opacity: f64,
}

/// Validated threshold table.
#[derive(Debug, Clone)]
pub struct DensityPalette {
    tiers: Vec<DensityTier>,
    empty: DensityStyle,
    max_opacity: f64,
}

impl DensityPalette {
    /// Builds a palette from tiers ordered by ascending `min_count`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the table is empty, the counts
    /// are not strictly increasing, the opacities decrease, or the cap is
    /// outside `0.0..=1.0`.
    pub fn new(
        tiers: Vec<DensityTier>,
        empty: DensityStyle,
        max_opacity: f64,
    ) -> Result<Self, ConfigError> {
        if tiers.is_empty() {
            return Err(ConfigError::invalid("density table needs at least one tier"));
        }
        if !(0.0..=1.0).contains(&max_opacity) {
            return Err(ConfigError::invalid(format!(
                "max_opacity {max_opacity} outside 0.0..=1.0"
            )));
        }
        if tiers.first().is_some_and(|t| t.min_count == 0) {
            return Err(ConfigError::invalid(
                "the first density tier must start above zero; zero uses the empty style",
            ));
        }
        for pair in tiers.windows(2) {
            if pair[1].min_count <= pair[0].min_count {
                return Err(ConfigError::invalid(format!(
                    "density tiers must have strictly increasing min_count ({} then {})",
                    pair[0].min_count, pair[1].min_count
                )));
            }
            if pair[1].opacity < pair[0].opacity {
                return Err(ConfigError::invalid(format!(
                    "density tier opacity decreases at min_count {}",
                    pair[1].min_count
                )));
            }
        }
        if tiers.iter().any(|t| t.opacity < empty.opacity) {
            return Err(ConfigError::invalid(
                "empty style must not be more opaque than any tier",
            ));
        }

        Ok(Self {
            tiers,
            empty,
            max_opacity,
        })
    }

    /// Heat rank of `count`: `0` for empty regions, then `1..=tiers` from
    /// coolest to hottest.
    #[must_use]
    pub fn rank(&self, count: u32) -> usize {
        if count == 0 {
            return 0;
        }
        self.tiers
            .iter()
            .rposition(|t| count >= t.min_count)
            .map_or(1, |i| i + 1)
    }

    /// Fill style for a region with `count` complaints.
    #[must_use]
    pub fn style(&self, count: u32) -> DensityStyle {
        let rank = self.rank(count);
        let (color, opacity) = if rank == 0 {
            (&self.empty.color, self.empty.opacity)
        } else {
            let tier = &self.tiers[rank - 1];
            (&tier.color, tier.opacity)
        };

        DensityStyle {
            color: color.clone(),
            opacity: opacity.min(self.max_opacity),
        }
    }
}
