//! Deterministic fixtures for tests.
//!
//! Builds a schema-correct dataset (both relations) in memory or on disk, and
//! provides [`RecordingMap`], a [`MapProvider`] that records what it is asked
//! to draw.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use rusqlite::{params, Connection};

use crate::cluster::Cluster;
use crate::dataset::Dataset;
use crate::error::{Result, TrailError};
use crate::markers::{MapProvider, MarkerHandle, MarkerSpec};
use crate::selection::Viewport;
use crate::types::{Difficulty, GeoPoint, LengthCategory, TrailRecord, TrailType};

/// Number of trails in [`sample_records`].
pub const SAMPLE_TRAIL_COUNT: usize = 60;

/// `trails` and its `trail_summary` projection.
pub const SCHEMA: &str = "
CREATE TABLE trails (
    Unique_Id INTEGER PRIMARY KEY,
    Trail_Name TEXT,
    Area TEXT,
    Country TEXT,
    State TEXT,
    Latitude REAL,
    Longitude REAL,
    Distance REAL,
    Elevation_Gain REAL,
    Highest_Point REAL,
    Rating REAL,
    Review_Count INTEGER,
    Difficulty INTEGER,
    Difficulty_Category TEXT,
    Trail_Type TEXT,
    Trail_Type_Category TEXT,
    Length_Category TEXT,
    Est_Hike_Duration TEXT,
    Permits TEXT,
    Cover_Photo TEXT,
    Url TEXT,
    Source TEXT
);
CREATE VIEW trail_summary AS
SELECT Unique_Id, Trail_Name, Area, Latitude, Longitude, Distance, Elevation_Gain,
       Rating, Review_Count, Difficulty, Difficulty_Category, Trail_Type_Category,
       Length_Category, Cover_Photo, Url
FROM trails;
";

/// (area, short name, latitude, longitude)
const AREAS: [(&str, &str, f64, f64); 6] = [
    ("Yosemite National Park", "Yosemite", 37.7400, -119.5700),
    ("Lake Tahoe Basin", "Tahoe", 39.0900, -120.0400),
    ("Joshua Tree National Park", "Joshua Tree", 33.8700, -115.9000),
    ("Big Sur", "Big Sur", 36.2700, -121.8100),
    ("San Gabriel Mountains", "San Gabriel", 34.3000, -117.9500),
    ("Point Reyes National Seashore", "Point Reyes", 38.0700, -122.8800),
];

/// A minimal valid record for map and selection tests.
pub fn trail(id: &str, latitude: f64, longitude: f64) -> TrailRecord {
    TrailRecord {
        id: id.to_string(),
        name: format!("Trail {}", id),
        area: "Test Area".to_string(),
        latitude,
        longitude,
        distance: 4.2,
        elevation_gain: 850.0,
        rating: 4.4,
        review_count: 120,
        difficulty: Some(Difficulty::Moderate),
        difficulty_code: Some(Difficulty::Moderate.code()),
        trail_type: Some(TrailType::Loop),
        length_category: Some(LengthCategory::from_distance(4.2)),
        cover_photo_url: None,
        source_url: None,
        country: None,
        state: None,
        highest_point: None,
        est_hike_duration: None,
        permits: None,
        source: None,
    }
}

/// The sample trails. Ten per area, every difficulty and trail type present.
pub fn sample_records() -> Vec<TrailRecord> {
    (1..=SAMPLE_TRAIL_COUNT)
        .map(|i| {
            let (area, short, lat, lng) = AREAS[(i - 1) % AREAS.len()];
            let step = ((i - 1) / AREAS.len()) as f64;
            let difficulty = Difficulty::ALL[((i - 1) / AREAS.len()) % Difficulty::ALL.len()];
            let trail_type = TrailType::ALL[i % TrailType::ALL.len()];
            let distance = 1.0 + ((i * 37) % 200) as f64 / 10.0;
            TrailRecord {
                id: i.to_string(),
                name: format!("{} {} Trail {}", short, trail_type.label(), i),
                area: area.to_string(),
                latitude: lat + step * 0.013,
                longitude: lng - step * 0.011,
                distance,
                elevation_gain: ((i * 173) % 4000 + 50) as f64,
                rating: 3.0 + ((i * 13) % 21) as f64 / 10.0,
                review_count: ((i * 397) % 4800 + 5) as u32,
                difficulty: Some(difficulty),
                difficulty_code: Some(difficulty.code()),
                trail_type: Some(trail_type),
                length_category: Some(LengthCategory::from_distance(distance)),
                cover_photo_url: Some(format!("https://example.com/photos/{}.jpg", i)),
                source_url: Some(format!("https://example.com/trails/{}", i)),
                country: Some("United States".to_string()),
                state: Some("California".to_string()),
                highest_point: Some(((i * 211) % 9000 + 500) as f64),
                est_hike_duration: Some(format!("{:.1} h", distance / 2.0)),
                permits: Some(if i % 5 == 0 { "Required" } else { "None" }.to_string()),
                source: Some("AllTrails".to_string()),
            }
        })
        .collect()
}

pub fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

pub fn insert_trail(conn: &Connection, t: &TrailRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO trails (Unique_Id, Trail_Name, Area, Country, State, Latitude, Longitude,
            Distance, Elevation_Gain, Highest_Point, Rating, Review_Count, Difficulty,
            Difficulty_Category, Trail_Type, Trail_Type_Category, Length_Category,
            Est_Hike_Duration, Permits, Cover_Photo, Url, Source)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
            ?18, ?19, ?20, ?21, ?22)",
        params![
            t.id,
            t.name,
            t.area,
            t.country,
            t.state,
            t.latitude,
            t.longitude,
            t.distance,
            t.elevation_gain,
            t.highest_point,
            t.rating,
            t.review_count,
            t.difficulty_code,
            t.difficulty.map(|d| d.label()),
            t.trail_type.map(|tt| tt.label()),
            t.trail_type.map(|tt| tt.label()),
            t.length_category.map(|l| l.label()),
            t.est_hike_duration,
            t.permits,
            t.cover_photo_url,
            t.source_url,
            t.source,
        ],
    )?;
    Ok(())
}

pub fn populate(conn: &Connection, records: &[TrailRecord]) -> Result<()> {
    create_schema(conn)?;
    for record in records {
        insert_trail(conn, record)?;
    }
    Ok(())
}

/// In-memory dataset of [`sample_records`].
pub fn sample_dataset() -> Result<Dataset> {
    let conn = Connection::open_in_memory().map_err(load_failed)?;
    populate(&conn, &sample_records())?;
    Dataset::from_connection(conn)
}

/// Write [`sample_records`] to a database file at `path`.
pub fn write_sample_dataset(path: &Path) -> Result<()> {
    let conn = Connection::open(path).map_err(load_failed)?;
    populate(&conn, &sample_records())?;
    conn.close().map_err(|(_, e)| load_failed(e))
}

fn load_failed(e: rusqlite::Error) -> TrailError {
    TrailError::LoadFailed {
        message: e.to_string(),
    }
}

// ============================================================================
// Recording map provider
// ============================================================================

/// Map provider double. Public fields expose what was drawn.
#[derive(Debug, Default)]
pub struct RecordingMap {
    /// Make `create_map` fail
    pub fail_create_map: bool,
    /// Trail ids whose marker creation fails
    pub fail_marker_for: HashSet<String>,

    pub map_created: bool,
    pub live_markers: BTreeMap<MarkerHandle, MarkerSpec>,
    pub hidden: HashSet<MarkerHandle>,
    pub clusters: Vec<Cluster>,
    pub viewport: Option<Viewport>,
    /// Anchor and trail id of the open overlay
    pub overlay: Option<(GeoPoint, String)>,
    pub overlay_hides: usize,
    pub removed: usize,
    next_handle: u64,
}

impl RecordingMap {
    /// A provider whose `create_map` always fails.
    pub fn failing() -> Self {
        Self {
            fail_create_map: true,
            ..Self::default()
        }
    }
}

impl MapProvider for RecordingMap {
    fn create_map(&mut self, viewport: Viewport) -> Result<()> {
        if self.fail_create_map {
            return Err(TrailError::MapProvider {
                message: "map script failed to load".to_string(),
            });
        }
        self.map_created = true;
        self.viewport = Some(viewport);
        Ok(())
    }

    fn destroy_map(&mut self) {
        self.map_created = false;
    }

    fn create_marker(&mut self, spec: &MarkerSpec) -> Result<MarkerHandle> {
        if self.fail_marker_for.contains(&spec.trail_id) {
            return Err(TrailError::MapProvider {
                message: format!("cannot draw marker for {}", spec.trail_id),
            });
        }
        self.next_handle += 1;
        let handle = MarkerHandle(self.next_handle);
        self.live_markers.insert(handle, spec.clone());
        Ok(handle)
    }

    fn remove_marker(&mut self, handle: MarkerHandle) {
        if self.live_markers.remove(&handle).is_some() {
            self.removed += 1;
        }
        self.hidden.remove(&handle);
    }

    fn set_marker_visible(&mut self, handle: MarkerHandle, visible: bool) {
        if visible {
            self.hidden.remove(&handle);
        } else {
            self.hidden.insert(handle);
        }
    }

    fn render_clusters(&mut self, clusters: &[Cluster]) {
        self.clusters = clusters.to_vec();
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = Some(viewport);
    }

    fn show_overlay(&mut self, anchor: GeoPoint, trail: &TrailRecord) {
        self.overlay = Some((anchor, trail.id.clone()));
    }

    fn hide_overlay(&mut self) {
        self.overlay = None;
        self.overlay_hides += 1;
    }
}
