//! # Marker/Cluster Manager
//!
//! Owns every marker and the cluster index for one map. The map itself sits
//! behind [`MapProvider`]; hosts implement it over whatever map SDK they use.
//!
//! `sync` is a full rebuild: old markers are removed, one marker is created per
//! record, and clusters are recomputed. Provider failures on single markers are
//! logged and skipped. A failing cluster index degrades to unclustered markers.

use std::collections::HashMap;

use log::{debug, info, warn};
use serde::Serialize;

use crate::cluster::{Cluster, ClusterIndex, ClusterNode};
use crate::config::ClusterConfig;
use crate::error::Result;
use crate::selection::Viewport;
use crate::types::{Difficulty, GeoPoint, TrailRecord};

// ============================================================================
// Styling
// ============================================================================

/// Marker fill colour, a pure function of difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MarkerColor {
    Green,
    Blue,
    Orange,
    Red,
    /// Unknown or missing difficulty
    Purple,
}

impl MarkerColor {
    pub fn for_difficulty(difficulty: Option<Difficulty>) -> Self {
        match difficulty {
            Some(Difficulty::Easy) => MarkerColor::Green,
            Some(Difficulty::Moderate) => MarkerColor::Blue,
            Some(Difficulty::Hard) => MarkerColor::Orange,
            Some(Difficulty::VeryHard) => MarkerColor::Red,
            None => MarkerColor::Purple,
        }
    }

    pub fn hex(&self) -> &'static str {
        match self {
            MarkerColor::Green => "#4CAF50",
            MarkerColor::Blue => "#2196F3",
            MarkerColor::Orange => "#FF9800",
            MarkerColor::Red => "#F44336",
            MarkerColor::Purple => "#9C27B0",
        }
    }
}

/// Circle marker appearance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerStyle {
    pub fill_color: &'static str,
    pub fill_opacity: f64,
    pub scale: f64,
    pub stroke_color: &'static str,
    pub stroke_weight: f64,
}

impl MarkerStyle {
    pub fn for_color(color: MarkerColor) -> Self {
        Self {
            fill_color: color.hex(),
            fill_opacity: 0.7,
            scale: 8.0,
            stroke_color: "#FFFFFF",
            stroke_weight: 1.0,
        }
    }
}

/// Legend rows in difficulty order.
pub fn legend() -> Vec<(Difficulty, MarkerColor)> {
    Difficulty::ALL
        .into_iter()
        .map(|d| (d, MarkerColor::for_difficulty(Some(d))))
        .collect()
}

// ============================================================================
// Provider contract
// ============================================================================

/// What the provider needs to draw one marker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerSpec {
    pub trail_id: String,
    pub position: GeoPoint,
    pub title: String,
    pub style: MarkerStyle,
}

impl MarkerSpec {
    pub fn for_record(record: &TrailRecord) -> Self {
        Self {
            trail_id: record.id.clone(),
            position: record.position(),
            title: record.name.clone(),
            style: MarkerStyle::for_color(MarkerColor::for_difficulty(record.difficulty)),
        }
    }
}

/// Provider-issued id of a rendered marker. Clicks are reported with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MarkerHandle(pub u64);

/// The map SDK seam.
pub trait MapProvider {
    fn create_map(&mut self, viewport: Viewport) -> Result<()>;
    fn destroy_map(&mut self);

    fn create_marker(&mut self, spec: &MarkerSpec) -> Result<MarkerHandle>;
    fn remove_marker(&mut self, handle: MarkerHandle);
    /// Hide markers folded into a cluster; show them again when it splits.
    fn set_marker_visible(&mut self, handle: MarkerHandle, visible: bool);

    /// Replace the aggregate cluster markers. An empty slice clears them.
    fn render_clusters(&mut self, clusters: &[Cluster]);

    fn set_viewport(&mut self, viewport: Viewport);

    fn show_overlay(&mut self, anchor: GeoPoint, trail: &TrailRecord);
    fn hide_overlay(&mut self);
}

// ============================================================================
// Manager
// ============================================================================

/// One live marker.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerState {
    pub trail_id: String,
    pub position: GeoPoint,
    /// Cluster hiding this marker at the current zoom
    pub cluster_id: Option<usize>,
    pub visual_category: MarkerColor,
    pub handle: MarkerHandle,
}

/// Outcome of one sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncReport {
    pub rendered: usize,
    pub skipped: usize,
    pub clustered: bool,
}

#[derive(Debug)]
pub struct MarkerManager {
    cluster_config: ClusterConfig,
    clustering_available: bool,
    zoom: u8,
    records: Vec<TrailRecord>,
    markers: Vec<MarkerState>,
    /// Click listeners: handle -> marker index
    by_handle: HashMap<MarkerHandle, usize>,
    by_trail: HashMap<String, usize>,
    cluster_index: Option<ClusterIndex>,
}

impl MarkerManager {
    pub fn new(cluster_config: &ClusterConfig, zoom: u8) -> Self {
        Self {
            cluster_config: cluster_config.clone(),
            clustering_available: true,
            zoom,
            records: Vec::new(),
            markers: Vec::new(),
            by_handle: HashMap::new(),
            by_trail: HashMap::new(),
            cluster_index: None,
        }
    }

    /// Mark the clustering capability as loaded or missing. Takes effect on the
    /// next sync.
    pub fn set_clustering_available(&mut self, available: bool) {
        self.clustering_available = available;
    }

    pub fn clustering_available(&self) -> bool {
        self.clustering_available
    }

    pub fn markers(&self) -> &[MarkerState] {
        &self.markers
    }

    pub fn records(&self) -> &[TrailRecord] {
        &self.records
    }

    pub fn cluster_index(&self) -> Option<&ClusterIndex> {
        self.cluster_index.as_ref()
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    pub fn marker_for_trail(&self, trail_id: &str) -> Option<&MarkerState> {
        self.by_trail.get(trail_id).map(|&i| &self.markers[i])
    }

    pub fn record_for_trail(&self, trail_id: &str) -> Option<&TrailRecord> {
        self.by_trail.get(trail_id).map(|&i| &self.records[i])
    }

    pub fn record_for_handle(&self, handle: MarkerHandle) -> Option<&TrailRecord> {
        self.by_handle.get(&handle).map(|&i| &self.records[i])
    }

    /// Clusters visible at the current zoom.
    pub fn visible_clusters(&self) -> Vec<Cluster> {
        self.cluster_index
            .as_ref()
            .map(|index| index.clusters(self.zoom))
            .unwrap_or_default()
    }

    /// Rebuild all markers for `results`.
    pub fn sync<P: MapProvider + ?Sized>(
        &mut self,
        provider: &mut P,
        results: &[TrailRecord],
    ) -> SyncReport {
        self.clear(provider);

        let mut report = SyncReport::default();
        for record in results {
            if self.by_trail.contains_key(&record.id) {
                warn!(
                    "trailmap: [Markers] Duplicate trail id '{}', keeping first",
                    record.id
                );
                report.skipped += 1;
                continue;
            }
            let spec = MarkerSpec::for_record(record);
            let handle = match provider.create_marker(&spec) {
                Ok(handle) => handle,
                Err(e) => {
                    warn!(
                        "trailmap: [Markers] Provider could not create marker for '{}': {}",
                        record.id, e
                    );
                    report.skipped += 1;
                    continue;
                }
            };
            let idx = self.markers.len();
            self.markers.push(MarkerState {
                trail_id: record.id.clone(),
                position: spec.position,
                cluster_id: None,
                visual_category: MarkerColor::for_difficulty(record.difficulty),
                handle,
            });
            self.records.push(record.clone());
            self.by_handle.insert(handle, idx);
            self.by_trail.insert(record.id.clone(), idx);
        }
        report.rendered = self.markers.len();

        if self.clustering_available && !self.markers.is_empty() {
            let points: Vec<GeoPoint> = self.markers.iter().map(|m| m.position).collect();
            match ClusterIndex::new(&self.cluster_config, &points) {
                Ok(index) => self.cluster_index = Some(index),
                Err(e) => warn!(
                    "trailmap: [Markers] Clustering unavailable, rendering unclustered: {}",
                    e
                ),
            }
        }
        report.clustered = self.cluster_index.is_some();
        self.apply_clusters(provider);

        info!(
            "trailmap: [Markers] Synced {} markers ({} skipped, clustered: {})",
            report.rendered, report.skipped, report.clustered
        );
        report
    }

    /// Recompute which markers are folded into clusters at `zoom`.
    pub fn set_zoom<P: MapProvider + ?Sized>(&mut self, provider: &mut P, zoom: u8) {
        if zoom == self.zoom {
            return;
        }
        self.zoom = zoom;
        if self.cluster_index.is_some() {
            self.apply_clusters(provider);
        }
    }

    /// Remove every marker and the cluster index.
    pub fn clear<P: MapProvider + ?Sized>(&mut self, provider: &mut P) {
        for marker in self.markers.drain(..) {
            provider.remove_marker(marker.handle);
        }
        if self.cluster_index.take().is_some() {
            provider.render_clusters(&[]);
        }
        self.records.clear();
        self.by_handle.clear();
        self.by_trail.clear();
    }

    fn apply_clusters<P: MapProvider + ?Sized>(&mut self, provider: &mut P) {
        let Some(index) = &self.cluster_index else {
            for marker in &mut self.markers {
                marker.cluster_id = None;
                provider.set_marker_visible(marker.handle, true);
            }
            return;
        };

        let mut clusters = Vec::new();
        for marker in &mut self.markers {
            marker.cluster_id = None;
        }
        for node in index.nodes(self.zoom) {
            match node {
                ClusterNode::Point(i) => {
                    provider.set_marker_visible(self.markers[*i].handle, true);
                }
                ClusterNode::Cluster(cluster) => {
                    for &m in &cluster.members {
                        self.markers[m].cluster_id = Some(cluster.id);
                        provider.set_marker_visible(self.markers[m].handle, false);
                    }
                    clusters.push(cluster.clone());
                }
            }
        }
        debug!(
            "trailmap: [Markers] Zoom {}: {} clusters",
            self.zoom,
            clusters.len()
        );
        provider.render_clusters(&clusters);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{trail, RecordingMap};

    fn manager() -> MarkerManager {
        MarkerManager::new(&ClusterConfig::default(), 6)
    }

    #[test]
    fn test_color_mapping_is_total() {
        assert_eq!(MarkerColor::for_difficulty(Some(Difficulty::Easy)).hex(), "#4CAF50");
        assert_eq!(MarkerColor::for_difficulty(Some(Difficulty::Moderate)).hex(), "#2196F3");
        assert_eq!(MarkerColor::for_difficulty(Some(Difficulty::Hard)).hex(), "#FF9800");
        assert_eq!(MarkerColor::for_difficulty(Some(Difficulty::VeryHard)).hex(), "#F44336");
        assert_eq!(MarkerColor::for_difficulty(None).hex(), "#9C27B0");
        assert_eq!(legend().len(), 4);
    }

    #[test]
    fn test_sync_empty_results() {
        let mut map = RecordingMap::default();
        let mut m = manager();
        let report = m.sync(&mut map, &[]);
        assert_eq!(report.rendered, 0);
        assert!(!report.clustered);
        assert!(m.cluster_index().is_none());
        assert!(map.live_markers.is_empty());
    }

    #[test]
    fn test_sync_rebuilds_markers() {
        let mut map = RecordingMap::default();
        let mut m = manager();
        let first = vec![trail("1", 37.74, -119.53), trail("2", 36.57, -118.29)];
        m.sync(&mut map, &first);
        assert_eq!(map.live_markers.len(), 2);

        let second = vec![trail("3", 34.0, -116.0)];
        m.sync(&mut map, &second);
        assert_eq!(map.live_markers.len(), 1);
        assert_eq!(map.removed, 2);
        assert!(m.marker_for_trail("1").is_none());
        assert!(m.marker_for_trail("3").is_some());

        // Same input twice gives the same visible state
        m.sync(&mut map, &second);
        assert_eq!(map.live_markers.len(), 1);
    }

    #[test]
    fn test_marker_failures_are_skipped() {
        let mut map = RecordingMap::default();
        map.fail_marker_for.insert("2".to_string());
        let mut m = manager();
        let report = m.sync(
            &mut map,
            &[trail("1", 37.74, -119.53), trail("2", 36.57, -118.29)],
        );
        assert_eq!(report.rendered, 1);
        assert_eq!(report.skipped, 1);
        assert!(m.marker_for_trail("2").is_none());
    }

    #[test]
    fn test_clusters_hide_members_until_zoomed_in() {
        let mut map = RecordingMap::default();
        let mut m = manager();
        let records = vec![
            trail("1", 37.7300, -119.5500),
            trail("2", 37.7320, -119.5520),
            trail("3", 32.7157, -117.1611),
        ];
        let report = m.sync(&mut map, &records);
        assert!(report.clustered);
        assert_eq!(map.clusters.len(), 1);
        assert!(map.hidden.contains(&m.marker_for_trail("1").unwrap().handle));
        assert!(m.marker_for_trail("3").unwrap().cluster_id.is_none());

        m.set_zoom(&mut map, 16);
        assert!(map.clusters.is_empty());
        assert!(map.hidden.is_empty());
        assert!(m.markers().iter().all(|s| s.cluster_id.is_none()));
    }

    #[test]
    fn test_clustering_unavailable_degrades() {
        let mut map = RecordingMap::default();
        let mut m = manager();
        m.set_clustering_available(false);
        let records = vec![trail("1", 37.7300, -119.5500), trail("2", 37.7320, -119.5520)];
        let report = m.sync(&mut map, &records);
        assert!(!report.clustered);
        assert_eq!(report.rendered, 2);
        assert!(map.hidden.is_empty());

        // A broken cluster config degrades the same way
        let config = ClusterConfig {
            radius_px: f64::NAN,
            ..ClusterConfig::default()
        };
        let mut m = MarkerManager::new(&config, 6);
        let report = m.sync(&mut map, &records);
        assert!(!report.clustered);
        assert_eq!(report.rendered, 2);
    }

    #[test]
    fn test_handle_lookup() {
        let mut map = RecordingMap::default();
        let mut m = manager();
        m.sync(&mut map, &[trail("42", 37.0, -119.0)]);
        let handle = m.marker_for_trail("42").unwrap().handle;
        assert_eq!(m.record_for_handle(handle).unwrap().id, "42");
        assert!(m.record_for_handle(MarkerHandle(9999)).is_none());
    }
}
