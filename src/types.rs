//! Trail record types and the typed mapping from dataset rows.
//!
//! The dataset stores categories as display labels (`简单`, `Out & Back`, ...).
//! Those labels are parsed into enums here; anything unrecognised becomes
//! `None` instead of failing the row.

use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrailError};

// ============================================================================
// Geographic point
// ============================================================================

/// A WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

// ============================================================================
// Categories
// ============================================================================

/// Difficulty category. Ordered from easiest to hardest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Difficulty {
    Easy,
    Moderate,
    Hard,
    VeryHard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 4] = [
        Difficulty::Easy,
        Difficulty::Moderate,
        Difficulty::Hard,
        Difficulty::VeryHard,
    ];

    /// Label stored in the `Difficulty_Category` column.
    pub fn label(&self) -> &'static str {
        match self {
            Difficulty::Easy => "简单",
            Difficulty::Moderate => "中等",
            Difficulty::Hard => "困难",
            Difficulty::VeryHard => "极难",
        }
    }

    /// Numeric code stored in the `Difficulty` column, used for ordering and charts.
    pub fn code(&self) -> u8 {
        match self {
            Difficulty::Easy => 1,
            Difficulty::Moderate => 3,
            Difficulty::Hard => 5,
            Difficulty::VeryHard => 7,
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.label() == label.trim())
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|d| i64::from(d.code()) == code)
    }
}

/// Trail type category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrailType {
    Loop,
    OutAndBack,
    PointToPoint,
}

impl TrailType {
    pub const ALL: [TrailType; 3] = [TrailType::Loop, TrailType::OutAndBack, TrailType::PointToPoint];

    /// Label stored in the `Trail_Type_Category` column.
    pub fn label(&self) -> &'static str {
        match self {
            TrailType::Loop => "Loop",
            TrailType::OutAndBack => "Out & Back",
            TrailType::PointToPoint => "Point to Point",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.label() == label.trim())
    }
}

/// Length bucket derived from distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LengthCategory {
    Short,
    Medium,
    Long,
    VeryLong,
}

impl LengthCategory {
    pub const ALL: [LengthCategory; 4] = [
        LengthCategory::Short,
        LengthCategory::Medium,
        LengthCategory::Long,
        LengthCategory::VeryLong,
    ];

    /// Label stored in the `Length_Category` column.
    pub fn label(&self) -> &'static str {
        match self {
            LengthCategory::Short => "短距离 (<3英里)",
            LengthCategory::Medium => "中等距离 (3-7英里)",
            LengthCategory::Long => "长距离 (7-15英里)",
            LengthCategory::VeryLong => "超长距离 (>15英里)",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.label() == label.trim())
    }

    /// Bucket for a distance in miles.
    pub fn from_distance(miles: f64) -> Self {
        if miles < 3.0 {
            LengthCategory::Short
        } else if miles <= 7.0 {
            LengthCategory::Medium
        } else if miles <= 15.0 {
            LengthCategory::Long
        } else {
            LengthCategory::VeryLong
        }
    }
}

// ============================================================================
// Trail record
// ============================================================================

/// One trail. Immutable once read from the dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrailRecord {
    /// Primary key (`Unique_Id`), stored as text regardless of column type
    pub id: String,
    pub name: String,
    pub area: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Distance in miles
    pub distance: f64,
    /// Elevation gain in feet
    pub elevation_gain: f64,
    /// 0.0 - 5.0
    pub rating: f64,
    pub review_count: u32,
    /// `None` when the stored label is unrecognised
    pub difficulty: Option<Difficulty>,
    /// Numeric difficulty (1/3/5/7)
    pub difficulty_code: Option<u8>,
    pub trail_type: Option<TrailType>,
    pub length_category: Option<LengthCategory>,
    pub cover_photo_url: Option<String>,
    pub source_url: Option<String>,

    // Detail-only columns (absent from the summary projection)
    pub country: Option<String>,
    pub state: Option<String>,
    /// Highest point in feet
    pub highest_point: Option<f64>,
    pub est_hike_duration: Option<String>,
    pub permits: Option<String>,
    pub source: Option<String>,
}

impl TrailRecord {
    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }

    /// Map a dataset row to a record.
    ///
    /// Works for both the `trails` relation and the `trail_summary` projection:
    /// columns the projection lacks come back as `None`. Rows without an id or
    /// with unusable coordinates are rejected; missing numbers default to 0.
    pub fn from_row(row: &Row<'_>) -> Result<Self> {
        let id = column(row, "Unique_Id")?
            .and_then(value_to_text)
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| malformed("row has no Unique_Id"))?;

        let latitude = column(row, "Latitude")?.and_then(value_to_f64);
        let longitude = column(row, "Longitude")?.and_then(value_to_f64);
        let position = match (latitude, longitude) {
            (Some(lat), Some(lng)) => GeoPoint::new(lat, lng),
            _ => return Err(malformed(&format!("trail '{}' has no coordinates", id))),
        };
        if !position.is_valid() {
            return Err(malformed(&format!(
                "trail '{}' has invalid coordinates ({}, {})",
                id, position.latitude, position.longitude
            )));
        }

        let distance = non_negative(column(row, "Distance")?.and_then(value_to_f64));
        let elevation_gain = non_negative(column(row, "Elevation_Gain")?.and_then(value_to_f64));
        let rating = column(row, "Rating")?
            .and_then(value_to_f64)
            .filter(|r| r.is_finite())
            .unwrap_or(0.0)
            .clamp(0.0, 5.0);
        let review_count = column(row, "Review_Count")?
            .and_then(value_to_f64)
            .filter(|c| c.is_finite() && *c >= 0.0)
            .map(|c| c.min(f64::from(u32::MAX)) as u32)
            .unwrap_or(0);

        let category = column(row, "Difficulty_Category")?
            .and_then(value_to_text)
            .and_then(|label| Difficulty::from_label(&label));
        let code = column(row, "Difficulty")?
            .and_then(value_to_f64)
            .map(|c| c.round() as i64);
        let difficulty = category.or_else(|| code.and_then(Difficulty::from_code));
        let difficulty_code = code
            .and_then(|c| u8::try_from(c).ok())
            .or_else(|| difficulty.map(|d| d.code()));

        let trail_type = column(row, "Trail_Type_Category")?
            .and_then(value_to_text)
            .and_then(|label| TrailType::from_label(&label));
        let length_category = column(row, "Length_Category")?
            .and_then(value_to_text)
            .and_then(|label| LengthCategory::from_label(&label))
            .or_else(|| Some(LengthCategory::from_distance(distance)));

        Ok(Self {
            id,
            name: text(row, "Trail_Name")?.unwrap_or_default(),
            area: text(row, "Area")?.unwrap_or_default(),
            latitude: position.latitude,
            longitude: position.longitude,
            distance,
            elevation_gain,
            rating,
            review_count,
            difficulty,
            difficulty_code,
            trail_type,
            length_category,
            cover_photo_url: text(row, "Cover_Photo")?,
            source_url: text(row, "Url")?,
            country: text(row, "Country")?,
            state: text(row, "State")?,
            highest_point: column(row, "Highest_Point")?.and_then(value_to_f64),
            est_hike_duration: text(row, "Est_Hike_Duration")?,
            permits: text(row, "Permits")?,
            source: text(row, "Source")?,
        })
    }
}

// ============================================================================
// Row helpers
// ============================================================================

/// Read a column by name. Missing columns and NULLs are both `None`.
pub(crate) fn column(row: &Row<'_>, name: &str) -> Result<Option<Value>> {
    match row.get::<_, Value>(name) {
        Ok(Value::Null) => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::InvalidColumnName(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn text(row: &Row<'_>, name: &str) -> Result<Option<String>> {
    Ok(column(row, name)?
        .and_then(value_to_text)
        .filter(|s| !s.is_empty()))
}

pub(crate) fn value_to_text(value: Value) -> Option<String> {
    match value {
        Value::Text(s) => Some(s),
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(f) => Some(f.to_string()),
        Value::Null | Value::Blob(_) => None,
    }
}

pub(crate) fn value_to_f64(value: Value) -> Option<f64> {
    match value {
        Value::Integer(i) => Some(i as f64),
        Value::Real(f) if f.is_finite() => Some(f),
        Value::Text(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn non_negative(value: Option<f64>) -> f64 {
    value.filter(|v| *v >= 0.0).unwrap_or(0.0)
}

fn malformed(message: &str) -> TrailError {
    TrailError::MalformedRow {
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn map_single(sql: &str) -> Result<TrailRecord> {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare(sql).unwrap();
        let mut rows = stmt.query([]).unwrap();
        let row = rows.next().unwrap().unwrap();
        TrailRecord::from_row(row)
    }

    #[test]
    fn test_labels_round_trip_codes() {
        for d in Difficulty::ALL {
            assert_eq!(Difficulty::from_label(d.label()), Some(d));
            assert_eq!(Difficulty::from_code(i64::from(d.code())), Some(d));
        }
        assert_eq!(Difficulty::from_label("unknown"), None);
        assert_eq!(TrailType::from_label("Out & Back"), Some(TrailType::OutAndBack));
    }

    #[test]
    fn test_length_buckets() {
        assert_eq!(LengthCategory::from_distance(0.5), LengthCategory::Short);
        assert_eq!(LengthCategory::from_distance(3.0), LengthCategory::Medium);
        assert_eq!(LengthCategory::from_distance(10.0), LengthCategory::Long);
        assert_eq!(LengthCategory::from_distance(22.0), LengthCategory::VeryLong);
    }

    #[test]
    fn test_summary_row_maps_with_missing_detail_columns() {
        let record = map_single(
            "SELECT 42 AS Unique_Id, 'Mist Trail' AS Trail_Name, 'Yosemite' AS Area,
                    37.73 AS Latitude, -119.55 AS Longitude, 3.0 AS Distance,
                    1000 AS Elevation_Gain, 4.8 AS Rating, 1200 AS Review_Count,
                    '困难' AS Difficulty_Category, 'Out & Back' AS Trail_Type_Category",
        )
        .unwrap();

        assert_eq!(record.id, "42");
        assert_eq!(record.difficulty, Some(Difficulty::Hard));
        assert_eq!(record.difficulty_code, Some(5));
        assert_eq!(record.trail_type, Some(TrailType::OutAndBack));
        assert_eq!(record.elevation_gain, 1000.0);
        assert_eq!(record.review_count, 1200);
        assert_eq!(record.country, None);
        assert_eq!(record.length_category, Some(LengthCategory::Medium));
    }

    #[test]
    fn test_malformed_rows_rejected_or_defaulted() {
        let missing_id = map_single("SELECT NULL AS Unique_Id, 1.0 AS Latitude, 1.0 AS Longitude");
        assert!(matches!(missing_id, Err(TrailError::MalformedRow { .. })));

        let bad_coords = map_single("SELECT 'a' AS Unique_Id, 123.0 AS Latitude, 1.0 AS Longitude");
        assert!(matches!(bad_coords, Err(TrailError::MalformedRow { .. })));

        let defaulted = map_single(
            "SELECT 'b' AS Unique_Id, 1.0 AS Latitude, 1.0 AS Longitude,
                    -4 AS Distance, 9.5 AS Rating, '???' AS Difficulty_Category",
        )
        .unwrap();
        assert_eq!(defaulted.distance, 0.0);
        assert_eq!(defaulted.rating, 5.0);
        assert_eq!(defaulted.difficulty, None);
        assert_eq!(defaulted.name, "");
    }
}
