//! Aggregate statistics over the full `trails` relation.
//!
//! Feeds the home and analysis views. Every query is soft: a failure is logged
//! and the view gets an empty value instead of an error.

use log::error;
use rusqlite::types::Value;
use serde::Serialize;

use crate::config::ExplorerConfig;
use crate::dataset::{Dataset, TRAILS, TRAIL_SUMMARY};
use crate::error::Result;
use crate::types::{value_to_f64, value_to_text, Difficulty, LengthCategory, TrailRecord};

/// Longest distance (mi) kept in the length-vs-elevation sample.
const SCATTER_MAX_DISTANCE: f64 = 50.0;
/// Highest elevation gain (ft) kept in the length-vs-elevation sample.
const SCATTER_MAX_ELEVATION: f64 = 10_000.0;
/// Highest review count kept in the rating-vs-reviews sample.
const SCATTER_MAX_REVIEWS: i64 = 5000;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSummary {
    pub total_trails: u64,
    pub avg_rating: f64,
    pub avg_length: f64,
    pub avg_elevation: f64,
}

/// Labelled counts, in display order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Distribution {
    pub labels: Vec<String>,
    pub counts: Vec<u64>,
}

impl Distribution {
    fn from_pairs(pairs: Vec<(String, u64)>) -> Self {
        let (labels, counts) = pairs.into_iter().unzip();
        Self { labels, counts }
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScatterPoint {
    pub x: f64,
    pub y: f64,
    /// Difficulty code, for colouring
    pub difficulty: Option<u8>,
}

/// Everything the analysis view shows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisStats {
    pub summary: DatasetSummary,
    pub difficulty: Distribution,
    pub trail_types: Distribution,
    pub lengths: Distribution,
    pub ratings: Distribution,
    pub top_areas: Distribution,
    pub length_vs_elevation: Vec<ScatterPoint>,
    pub rating_vs_reviews: Vec<ScatterPoint>,
}

fn soft<T: Default>(what: &str, result: Result<T>) -> T {
    result.unwrap_or_else(|e| {
        error!("trailmap: [Stats] {} failed: {}", what, e);
        T::default()
    })
}

fn label_counts(dataset: &Dataset, sql: &str, params: &[Value]) -> Result<Vec<(String, u64)>> {
    dataset.query(sql, params, |row| {
        let label = row
            .get::<_, Value>(0)
            .ok()
            .and_then(value_to_text)
            .unwrap_or_default();
        let count: i64 = row.get(1)?;
        Ok((label, count.max(0) as u64))
    })
}

/// Sort `pairs` by the position of their label in `order`; unknown labels last.
fn in_label_order(mut pairs: Vec<(String, u64)>, order: &[&str]) -> Vec<(String, u64)> {
    pairs.sort_by_key(|(label, _)| {
        order
            .iter()
            .position(|o| *o == label.as_str())
            .unwrap_or(order.len())
    });
    pairs
}

pub fn summary(dataset: &Dataset) -> DatasetSummary {
    let sql = format!(
        "SELECT COUNT(*), AVG(Rating), AVG(Distance), AVG(Elevation_Gain) FROM {}",
        TRAILS
    );
    let rows = dataset.query(&sql, &[], |row| {
        let avg = |i: usize| -> Result<f64> {
            Ok(row.get::<_, Option<f64>>(i)?.unwrap_or(0.0))
        };
        Ok(DatasetSummary {
            total_trails: row.get::<_, i64>(0)?.max(0) as u64,
            avg_rating: avg(1)?,
            avg_length: avg(2)?,
            avg_elevation: avg(3)?,
        })
    });
    soft("Summary", rows.map(|r| r.into_iter().next().unwrap_or_default()))
}

/// Counts per difficulty label, easiest first.
pub fn difficulty_distribution(dataset: &Dataset) -> Distribution {
    let sql = format!(
        "SELECT Difficulty_Category, COUNT(*) FROM {} GROUP BY Difficulty_Category",
        TRAILS
    );
    let order: Vec<&str> = Difficulty::ALL.iter().map(|d| d.label()).collect();
    let pairs = soft("Difficulty distribution", label_counts(dataset, &sql, &[]));
    Distribution::from_pairs(in_label_order(pairs, &order))
}

/// Counts per trail type, most common first.
pub fn trail_type_distribution(dataset: &Dataset) -> Distribution {
    let sql = format!(
        "SELECT Trail_Type_Category, COUNT(*) AS n FROM {} \
         GROUP BY Trail_Type_Category ORDER BY n DESC, Trail_Type_Category ASC",
        TRAILS
    );
    Distribution::from_pairs(soft("Trail type distribution", label_counts(dataset, &sql, &[])))
}

/// Counts per length bucket, shortest first.
pub fn length_distribution(dataset: &Dataset) -> Distribution {
    let sql = format!(
        "SELECT Length_Category, COUNT(*) FROM {} GROUP BY Length_Category",
        TRAILS
    );
    let order: Vec<&str> = LengthCategory::ALL.iter().map(|l| l.label()).collect();
    let pairs = soft("Length distribution", label_counts(dataset, &sql, &[]));
    Distribution::from_pairs(in_label_order(pairs, &order))
}

/// Half-star rating histogram over rated trails.
pub fn rating_distribution(dataset: &Dataset) -> Distribution {
    let sql = format!(
        "SELECT ROUND(Rating * 2) / 2 AS bin, COUNT(*) FROM {} \
         WHERE Rating > 0 GROUP BY bin ORDER BY bin",
        TRAILS
    );
    let rows = dataset.query(&sql, &[], |row| {
        let bin = row
            .get::<_, Value>(0)
            .ok()
            .and_then(value_to_f64)
            .unwrap_or(0.0);
        let count: i64 = row.get(1)?;
        Ok((format!("{:.1}", bin), count.max(0) as u64))
    });
    Distribution::from_pairs(soft("Rating distribution", rows))
}

/// Areas with the most trails.
pub fn top_areas(dataset: &Dataset, limit: u32) -> Distribution {
    let sql = format!(
        "SELECT Area, COUNT(*) AS n FROM {} GROUP BY Area ORDER BY n DESC, Area ASC LIMIT {}",
        TRAILS, limit
    );
    Distribution::from_pairs(soft("Top areas", label_counts(dataset, &sql, &[])))
}

/// Area names for the filter panel, most trails first.
pub fn area_options(dataset: &Dataset, limit: u32) -> Vec<String> {
    top_areas(dataset, limit)
        .labels
        .into_iter()
        .filter(|a| !a.is_empty())
        .collect()
}

fn scatter(dataset: &Dataset, what: &str, sql: &str, params: &[Value]) -> Vec<ScatterPoint> {
    let rows = dataset.query(sql, params, |row| {
        let num = |i: usize| row.get::<_, Value>(i).ok().and_then(value_to_f64);
        Ok(ScatterPoint {
            x: num(0).unwrap_or(0.0),
            y: num(1).unwrap_or(0.0),
            difficulty: num(2).and_then(|c| u8::try_from(c.round() as i64).ok()),
        })
    });
    soft(what, rows)
}

/// Distance (x) against elevation gain (y) for moderate-sized trails.
pub fn length_vs_elevation(dataset: &Dataset, limit: u32) -> Vec<ScatterPoint> {
    let sql = format!(
        "SELECT Distance, Elevation_Gain, Difficulty FROM {} \
         WHERE Distance <= ? AND Elevation_Gain <= ? ORDER BY Unique_Id LIMIT {}",
        TRAILS, limit
    );
    scatter(
        dataset,
        "Length vs elevation",
        &sql,
        &[
            Value::Real(SCATTER_MAX_DISTANCE),
            Value::Real(SCATTER_MAX_ELEVATION),
        ],
    )
}

/// Rating (x) against review count (y) for reviewed trails.
pub fn rating_vs_reviews(dataset: &Dataset, limit: u32) -> Vec<ScatterPoint> {
    let sql = format!(
        "SELECT Rating, Review_Count, Difficulty FROM {} \
         WHERE Rating > 0 AND Review_Count > 0 AND Review_Count <= ? ORDER BY Unique_Id LIMIT {}",
        TRAILS, limit
    );
    scatter(
        dataset,
        "Rating vs reviews",
        &sql,
        &[Value::Integer(SCATTER_MAX_REVIEWS)],
    )
}

/// Highly rated, much reviewed trails for the home view.
pub fn featured_trails(dataset: &Dataset, config: &ExplorerConfig) -> Vec<TrailRecord> {
    let sql = format!(
        "SELECT * FROM {} WHERE Rating >= ? AND Review_Count > ? \
         ORDER BY Review_Count DESC, Unique_Id ASC LIMIT {}",
        TRAIL_SUMMARY, config.featured_limit
    );
    soft(
        "Featured trails",
        dataset.query_records(
            &sql,
            &[
                Value::Real(config.featured_min_rating),
                Value::Integer(config.featured_min_reviews),
            ],
        ),
    )
}

pub fn analysis(dataset: &Dataset, config: &ExplorerConfig) -> AnalysisStats {
    AnalysisStats {
        summary: summary(dataset),
        difficulty: difficulty_distribution(dataset),
        trail_types: trail_type_distribution(dataset),
        lengths: length_distribution(dataset),
        ratings: rating_distribution(dataset),
        top_areas: top_areas(dataset, config.top_area_limit),
        length_vs_elevation: length_vs_elevation(dataset, config.scatter_sample_limit),
        rating_vs_reviews: rating_vs_reviews(dataset, config.scatter_sample_limit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic;
    use rusqlite::Connection;

    #[test]
    fn test_summary_counts_all_trails() {
        let dataset = synthetic::sample_dataset().unwrap();
        let s = summary(&dataset);
        assert_eq!(s.total_trails, synthetic::SAMPLE_TRAIL_COUNT as u64);
        assert!(s.avg_rating > 0.0 && s.avg_rating <= 5.0);
        assert!(s.avg_length > 0.0);
    }

    #[test]
    fn test_distributions_are_ordered() {
        let dataset = synthetic::sample_dataset().unwrap();

        let d = difficulty_distribution(&dataset);
        assert_eq!(d.labels, vec!["简单", "中等", "困难", "极难"]);
        assert_eq!(d.total(), synthetic::SAMPLE_TRAIL_COUNT as u64);

        let t = trail_type_distribution(&dataset);
        assert!(t.counts.windows(2).all(|w| w[0] >= w[1]));

        let l = length_distribution(&dataset);
        let positions: Vec<usize> = l
            .labels
            .iter()
            .map(|label| {
                LengthCategory::ALL
                    .iter()
                    .position(|c| c.label() == label)
                    .unwrap()
            })
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));

        let r = rating_distribution(&dataset);
        assert!(!r.is_empty());
        for label in &r.labels {
            let bin: f64 = label.parse().unwrap();
            assert_eq!((bin * 2.0).fract(), 0.0);
        }
    }

    #[test]
    fn test_areas_and_featured() {
        let dataset = synthetic::sample_dataset().unwrap();
        let config = ExplorerConfig::default();

        let areas = area_options(&dataset, 3);
        assert_eq!(areas.len(), 3);

        for t in featured_trails(&dataset, &config) {
            assert!(t.rating >= 4.7);
            assert!(t.review_count > 1000);
        }
    }

    #[test]
    fn test_scatter_samples_respect_bounds() {
        let dataset = synthetic::sample_dataset().unwrap();
        let points = length_vs_elevation(&dataset, 1000);
        assert!(!points.is_empty());
        assert!(points
            .iter()
            .all(|p| p.x <= SCATTER_MAX_DISTANCE && p.y <= SCATTER_MAX_ELEVATION));
        assert!(points.iter().all(|p| p.difficulty.is_some()));

        let capped = rating_vs_reviews(&dataset, 5);
        assert!(capped.len() <= 5);
    }

    #[test]
    fn test_failures_are_soft() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE trails (Unique_Id TEXT);
             CREATE VIEW trail_summary AS SELECT Unique_Id FROM trails;",
        )
        .unwrap();
        let dataset = Dataset::from_connection(conn).unwrap();
        let stats = analysis(&dataset, &ExplorerConfig::default());
        assert_eq!(stats.difficulty, Distribution::default());
        assert!(stats.length_vs_elevation.is_empty());
        assert!(featured_trails(&dataset, &ExplorerConfig::default()).is_empty());
    }
}
