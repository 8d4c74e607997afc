//! # Marker Clustering
//!
//! Greedy radius clustering over Web Mercator pixel space, computed for every
//! zoom level from `min_zoom` to `max_zoom`. Above `max_zoom` every point is
//! its own node.
//!
//! At each level, points are visited in input order; an unassigned point
//! gathers every unassigned neighbour within `radius_px` (R-tree query) and
//! becomes a cluster if the group reaches `min_points`.

use std::collections::HashMap;
use std::f64::consts::PI;

use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::config::ClusterConfig;
use crate::error::{Result, TrailError};
use crate::types::GeoPoint;

/// Web Mercator latitude limit, as sin(lat).
const MAX_SIN_LAT: f64 = 0.9999;

/// Project a coordinate to world pixel space at `zoom`.
pub fn project(point: GeoPoint, zoom: u8, tile_size: f64) -> [f64; 2] {
    let world = tile_size * 2f64.powi(i32::from(zoom));
    let x = (point.longitude + 180.0) / 360.0 * world;
    let sin = point
        .latitude
        .to_radians()
        .sin()
        .clamp(-MAX_SIN_LAT, MAX_SIN_LAT);
    let y = (0.5 - ((1.0 + sin) / (1.0 - sin)).ln() / (4.0 * PI)) * world;
    [x, y]
}

/// A projected point with its input index, for R-tree queries.
#[derive(Debug, Clone, Copy)]
struct PixelPoint {
    idx: usize,
    x: f64,
    y: f64,
}

impl RTreeObject for PixelPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.x, self.y])
    }
}

impl PointDistance for PixelPoint {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.x - point[0];
        let dy = self.y - point[1];
        dx * dx + dy * dy
    }
}

/// Several points rendered as one aggregate marker.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    /// Unique across all zoom levels of one index
    pub id: usize,
    /// Zoom level this cluster exists at
    pub zoom: u8,
    /// Mean position of the members
    pub center: GeoPoint,
    /// Input indices of the member points, ascending
    pub members: Vec<usize>,
}

impl Cluster {
    pub fn count(&self) -> usize {
        self.members.len()
    }
}

/// What renders at a zoom level: a lone point or a cluster.
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterNode {
    Point(usize),
    Cluster(Cluster),
}

#[derive(Debug, Clone)]
struct Level {
    nodes: Vec<ClusterNode>,
    /// point index -> cluster id at this level
    membership: Vec<Option<usize>>,
}

/// Precomputed clusters for every zoom level of one result set.
#[derive(Debug, Clone)]
pub struct ClusterIndex {
    config: ClusterConfig,
    levels: Vec<Level>,
    unclustered: Vec<ClusterNode>,
    /// cluster id -> (level offset, node index)
    lookup: HashMap<usize, (usize, usize)>,
    point_count: usize,
}

impl ClusterIndex {
    /// Build the index. Fails if the configuration cannot produce clusters,
    /// in which case callers render markers unclustered.
    pub fn new(config: &ClusterConfig, points: &[GeoPoint]) -> Result<Self> {
        if !(config.radius_px.is_finite() && config.radius_px > 0.0) {
            return Err(TrailError::ClusteringUnavailable {
                message: format!("invalid radius {}", config.radius_px),
            });
        }
        if !(config.tile_size.is_finite() && config.tile_size > 0.0) {
            return Err(TrailError::ClusteringUnavailable {
                message: format!("invalid tile size {}", config.tile_size),
            });
        }
        if config.min_zoom > config.max_zoom {
            return Err(TrailError::ClusteringUnavailable {
                message: format!(
                    "min zoom {} above max zoom {}",
                    config.min_zoom, config.max_zoom
                ),
            });
        }

        let mut next_id = 0;
        let mut levels = Vec::new();
        let mut lookup = HashMap::new();
        for zoom in config.min_zoom..=config.max_zoom {
            let level = cluster_level(config, points, zoom, &mut next_id);
            for (node_idx, node) in level.nodes.iter().enumerate() {
                if let ClusterNode::Cluster(c) = node {
                    lookup.insert(c.id, (levels.len(), node_idx));
                }
            }
            levels.push(level);
        }

        Ok(Self {
            config: config.clone(),
            levels,
            unclustered: (0..points.len()).map(ClusterNode::Point).collect(),
            lookup,
            point_count: points.len(),
        })
    }

    pub fn point_count(&self) -> usize {
        self.point_count
    }

    pub fn max_zoom(&self) -> u8 {
        self.config.max_zoom
    }

    fn level(&self, zoom: u8) -> Option<&Level> {
        if zoom > self.config.max_zoom {
            return None;
        }
        let offset = zoom.saturating_sub(self.config.min_zoom) as usize;
        self.levels.get(offset)
    }

    /// Everything to render at `zoom`.
    pub fn nodes(&self, zoom: u8) -> &[ClusterNode] {
        match self.level(zoom) {
            Some(level) => &level.nodes,
            None => &self.unclustered,
        }
    }

    /// Only the multi-point clusters at `zoom`.
    pub fn clusters(&self, zoom: u8) -> Vec<Cluster> {
        self.nodes(zoom)
            .iter()
            .filter_map(|node| match node {
                ClusterNode::Cluster(c) => Some(c.clone()),
                ClusterNode::Point(_) => None,
            })
            .collect()
    }

    /// Id of the cluster containing `point` at `zoom`, if any.
    pub fn cluster_of(&self, point: usize, zoom: u8) -> Option<usize> {
        self.level(zoom)
            .and_then(|level| level.membership.get(point).copied().flatten())
    }

    pub fn get_cluster(&self, id: usize) -> Option<&Cluster> {
        let (level, node) = *self.lookup.get(&id)?;
        match self.levels.get(level)?.nodes.get(node)? {
            ClusterNode::Cluster(c) => Some(c),
            ClusterNode::Point(_) => None,
        }
    }

    /// First zoom at which the cluster's members no longer share one cluster.
    pub fn expansion_zoom(&self, id: usize) -> Option<u8> {
        let cluster = self.get_cluster(id)?;
        let first = cluster.members[0];
        for zoom in cluster.zoom.saturating_add(1)..=self.config.max_zoom {
            let shared = self.cluster_of(first, zoom);
            let together = shared.is_some()
                && cluster
                    .members
                    .iter()
                    .all(|&m| self.cluster_of(m, zoom) == shared);
            if !together {
                return Some(zoom);
            }
        }
        Some(self.config.max_zoom.saturating_add(1))
    }
}

fn cluster_level(
    config: &ClusterConfig,
    points: &[GeoPoint],
    zoom: u8,
    next_id: &mut usize,
) -> Level {
    let projected: Vec<PixelPoint> = points
        .iter()
        .enumerate()
        .map(|(idx, p)| {
            let [x, y] = project(*p, zoom, config.tile_size);
            PixelPoint { idx, x, y }
        })
        .collect();
    let tree = RTree::bulk_load(projected.clone());
    let radius_2 = config.radius_px * config.radius_px;

    let mut membership: Vec<Option<usize>> = vec![None; points.len()];
    let mut assigned = vec![false; points.len()];
    let mut nodes = Vec::new();

    for p in &projected {
        if assigned[p.idx] {
            continue;
        }
        let mut members: Vec<usize> = tree
            .locate_within_distance([p.x, p.y], radius_2)
            .map(|n| n.idx)
            .filter(|&idx| !assigned[idx])
            .collect();

        if members.len() < config.min_points.max(2) {
            assigned[p.idx] = true;
            nodes.push(ClusterNode::Point(p.idx));
            continue;
        }

        members.sort_unstable();
        let id = *next_id;
        *next_id += 1;
        let (lat_sum, lng_sum) = members.iter().fold((0.0, 0.0), |(lat, lng), &m| {
            (lat + points[m].latitude, lng + points[m].longitude)
        });
        let n = members.len() as f64;
        for &m in &members {
            assigned[m] = true;
            membership[m] = Some(id);
        }
        nodes.push(ClusterNode::Cluster(Cluster {
            id,
            zoom,
            center: GeoPoint::new(lat_sum / n, lng_sum / n),
            members,
        }));
    }

    Level { nodes, membership }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yosemite_group() -> Vec<GeoPoint> {
        // Three trails a few hundred metres apart, one far away in San Diego
        vec![
            GeoPoint::new(37.7300, -119.5500),
            GeoPoint::new(37.7320, -119.5520),
            GeoPoint::new(37.7340, -119.5480),
            GeoPoint::new(32.7157, -117.1611),
        ]
    }

    #[test]
    fn test_projection_origin() {
        let [x, y] = project(GeoPoint::new(0.0, 0.0), 0, 256.0);
        assert!((x - 128.0).abs() < 1e-9);
        assert!((y - 128.0).abs() < 1e-9);

        let [x1, _] = project(GeoPoint::new(0.0, 0.0), 1, 256.0);
        assert!((x1 - 256.0).abs() < 1e-9);
    }

    #[test]
    fn test_nearby_points_cluster_at_low_zoom() {
        let index = ClusterIndex::new(&ClusterConfig::default(), &yosemite_group()).unwrap();
        let clusters = index.clusters(8);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members, vec![0, 1, 2]);
        assert_eq!(index.cluster_of(3, 8), None);
        assert_eq!(index.cluster_of(0, 8), Some(clusters[0].id));

        // Every point appears exactly once per level
        for zoom in 0..=15 {
            let mut covered: Vec<usize> = index
                .nodes(zoom)
                .iter()
                .flat_map(|n| match n {
                    ClusterNode::Point(i) => vec![*i],
                    ClusterNode::Cluster(c) => c.members.clone(),
                })
                .collect();
            covered.sort_unstable();
            assert_eq!(covered, vec![0, 1, 2, 3], "zoom {}", zoom);
        }
    }

    #[test]
    fn test_no_clusters_above_max_zoom() {
        let index = ClusterIndex::new(&ClusterConfig::default(), &yosemite_group()).unwrap();
        assert!(index.clusters(16).is_empty());
        assert_eq!(index.nodes(16).len(), 4);
        assert_eq!(index.cluster_of(0, 20), None);
    }

    #[test]
    fn test_duplicate_coordinates_merge_until_max_zoom() {
        let p = GeoPoint::new(36.5785, -118.2923);
        let index = ClusterIndex::new(&ClusterConfig::default(), &[p, p]).unwrap();
        assert_eq!(index.clusters(15).len(), 1);
        assert_eq!(index.clusters(16).len(), 0);

        let id = index.clusters(10)[0].id;
        assert_eq!(index.expansion_zoom(id), Some(16));
    }

    #[test]
    fn test_expansion_zoom_splits_cluster() {
        let index = ClusterIndex::new(&ClusterConfig::default(), &yosemite_group()).unwrap();
        let cluster = index.clusters(5).remove(0);
        let zoom = index.expansion_zoom(cluster.id).unwrap();
        assert!(zoom > 5 && zoom <= 16);
        let first = cluster.members[0];
        let shared = index.cluster_of(first, zoom);
        assert!(
            shared.is_none()
                || cluster
                    .members
                    .iter()
                    .any(|&m| index.cluster_of(m, zoom) != shared)
        );
    }

    #[test]
    fn test_invalid_config_is_unavailable() {
        let config = ClusterConfig {
            radius_px: 0.0,
            ..ClusterConfig::default()
        };
        assert!(matches!(
            ClusterIndex::new(&config, &yosemite_group()),
            Err(TrailError::ClusteringUnavailable { .. })
        ));
    }

    #[test]
    fn test_empty_input() {
        let index = ClusterIndex::new(&ClusterConfig::default(), &[]).unwrap();
        assert_eq!(index.point_count(), 0);
        assert!(index.nodes(3).is_empty());
    }
}
