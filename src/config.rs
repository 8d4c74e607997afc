//! Explorer configuration.
//!
//! All tunable constants live here so hosts can override them from JSON.
//! Defaults match the shipped California dataset and map.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrailError};
use crate::types::GeoPoint;

/// Configuration for marker clustering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClusterConfig {
    /// Clustering radius in screen pixels.
    /// Default: 100
    pub radius_px: f64,

    /// Highest zoom level at which markers are still clustered.
    /// Above this every marker renders on its own. Default: 15
    pub max_zoom: u8,

    /// Lowest zoom level clusters are computed for. Default: 0
    pub min_zoom: u8,

    /// Minimum number of markers that form a cluster. Default: 2
    pub min_points: usize,

    /// Tile size in pixels used for the Web Mercator projection. Default: 256
    pub tile_size: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            radius_px: 100.0,
            max_zoom: 15,
            min_zoom: 0,
            min_points: 2,
            tile_size: 256.0,
        }
    }
}

/// Viewport constants for the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewportConfig {
    /// Initial map centre (centre of California).
    pub default_center: GeoPoint,

    /// Zoom used for the overview of all results. Default: 6
    pub overview_zoom: u8,

    /// Zoom used when a single trail is focused. Default: 14
    pub detail_zoom: u8,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            default_center: GeoPoint::new(37.8, -119.5),
            overview_zoom: 6,
            detail_zoom: 14,
        }
    }
}

/// Top-level configuration for the explorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExplorerConfig {
    /// Rows per list page. Default: 12
    pub page_size: u32,

    /// Hard cap on rows returned by any data query, including the map query.
    /// Default: 1000
    pub max_rows: u32,

    /// Distance slider domain in miles. Default: [0, 100]
    pub distance_domain: (f64, f64),

    /// Elevation gain slider domain in feet. Default: [0, 10000]
    pub elevation_domain: (f64, f64),

    /// Number of similar trails shown on a detail view. Default: 4
    pub similar_limit: u32,

    /// Maximum difficulty code distance for similar trails. Default: 2
    pub similar_difficulty_window: i64,

    /// Minimum rating for featured trails. Default: 4.7
    pub featured_min_rating: f64,

    /// Featured trails need strictly more reviews than this. Default: 1000
    pub featured_min_reviews: i64,

    /// Number of featured trails. Default: 6
    pub featured_limit: u32,

    /// Number of areas offered in the filter panel. Default: 50
    pub area_option_limit: u32,

    /// Number of areas in the top-areas chart. Default: 10
    pub top_area_limit: u32,

    /// Row cap for scatter samples. Default: 1000
    pub scatter_sample_limit: u32,

    pub cluster: ClusterConfig,
    pub viewport: ViewportConfig,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            page_size: 12,
            max_rows: 1000,
            distance_domain: (0.0, 100.0),
            elevation_domain: (0.0, 10_000.0),
            similar_limit: 4,
            similar_difficulty_window: 2,
            featured_min_rating: 4.7,
            featured_min_reviews: 1000,
            featured_limit: 6,
            area_option_limit: 50,
            top_area_limit: 10,
            scatter_sample_limit: 1000,
            cluster: ClusterConfig::default(),
            viewport: ViewportConfig::default(),
        }
    }
}

impl ExplorerConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: ExplorerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(config_error("pageSize must be at least 1"));
        }
        if self.max_rows < self.page_size {
            return Err(config_error("maxRows must be at least pageSize"));
        }
        for (name, (min, max)) in [
            ("distanceDomain", self.distance_domain),
            ("elevationDomain", self.elevation_domain),
        ] {
            if !min.is_finite() || !max.is_finite() || min > max {
                return Err(config_error(&format!("{} must be a finite [min, max]", name)));
            }
        }
        if !(self.cluster.radius_px.is_finite() && self.cluster.radius_px > 0.0) {
            return Err(config_error("cluster.radiusPx must be positive"));
        }
        if self.cluster.min_zoom > self.cluster.max_zoom {
            return Err(config_error("cluster.minZoom must not exceed cluster.maxZoom"));
        }
        if self.viewport.detail_zoom <= self.viewport.overview_zoom {
            return Err(config_error(
                "viewport.detailZoom must be greater than viewport.overviewZoom",
            ));
        }
        Ok(())
    }
}

fn config_error(message: &str) -> TrailError {
    TrailError::Config {
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ExplorerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.page_size, 12);
        assert_eq!(config.cluster.max_zoom, 15);
        assert_eq!(config.viewport.detail_zoom, 14);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ExplorerConfig::from_json(r#"{"pageSize": 24, "cluster": {"radiusPx": 60}}"#)
            .unwrap();
        assert_eq!(config.page_size, 24);
        assert_eq!(config.cluster.radius_px, 60.0);
        assert_eq!(config.cluster.max_zoom, 15);
        assert_eq!(config.max_rows, 1000);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            ExplorerConfig::from_json(r#"{"pageSize": 0}"#),
            Err(TrailError::Config { .. })
        ));
        assert!(matches!(
            ExplorerConfig::from_json(r#"{"viewport": {"detailZoom": 3}}"#),
            Err(TrailError::Config { .. })
        ));
        assert!(matches!(
            ExplorerConfig::from_json("not json"),
            Err(TrailError::Config { .. })
        ));
    }
}
