//! Trail detail lookup and navigation.
//!
//! Hosts route to a details view by trail id and resolve the id back to a
//! record here. Resolved records are kept in a small LRU cache since the
//! dataset never changes during a session.

use std::num::NonZeroUsize;

use log::{debug, error};
use lru::LruCache;
use rusqlite::types::Value;
use serde::Serialize;

use crate::config::ExplorerConfig;
use crate::dataset::{Dataset, TRAILS, TRAIL_SUMMARY};
use crate::error::{OptionExt, Result, TrailError};
use crate::types::TrailRecord;

/// Records kept by [`TrailLookup`].
const DETAIL_CACHE_SIZE: usize = 100;

/// Navigation seam implemented by the host.
pub trait Navigator {
    fn open_details(&mut self, trail_id: &str);
}

/// Route of the details view for `trail_id`.
pub fn details_route(trail_id: &str) -> String {
    format!("/details/{}", trail_id)
}

/// What the details view renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum DetailState {
    Found {
        trail: TrailRecord,
        similar: Vec<TrailRecord>,
    },
    NotFound {
        id: String,
    },
    /// The lookup itself failed (dataset not ready, engine error)
    Failed {
        message: String,
    },
}

#[derive(Debug)]
pub struct TrailLookup {
    cache: LruCache<String, TrailRecord>,
    similar_limit: u32,
    difficulty_window: i64,
}

impl TrailLookup {
    pub fn new(config: &ExplorerConfig) -> Self {
        let capacity = NonZeroUsize::new(DETAIL_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
            similar_limit: config.similar_limit,
            difficulty_window: config.similar_difficulty_window.max(0),
        }
    }

    /// Resolve an id against the full `trails` relation.
    pub fn resolve(&mut self, dataset: &Dataset, trail_id: &str) -> Result<TrailRecord> {
        let trail_id = trail_id.trim();
        if let Some(record) = self.cache.get(trail_id) {
            debug!("trailmap: [Details] Cache hit for '{}'", trail_id);
            return Ok(record.clone());
        }

        let sql = format!("SELECT * FROM {} WHERE Unique_Id = ? LIMIT 1", TRAILS);
        let record = dataset
            .query_records(&sql, &[Value::Text(trail_id.to_string())])?
            .into_iter()
            .next()
            .ok_or_not_found(trail_id)?;

        self.cache.put(trail_id.to_string(), record.clone());
        Ok(record)
    }

    /// Trails in the same area with a nearby difficulty, best rated first.
    pub fn try_similar(&self, dataset: &Dataset, trail: &TrailRecord) -> Result<Vec<TrailRecord>> {
        let mut sql = format!(
            "SELECT * FROM {} WHERE Area = ? AND Unique_Id != ?",
            TRAIL_SUMMARY
        );
        let mut params = vec![Value::Text(trail.area.clone()), Value::Text(trail.id.clone())];
        if let Some(code) = trail.difficulty_code {
            sql.push_str(" AND ABS(Difficulty - ?) <= ?");
            params.push(Value::Integer(i64::from(code)));
            params.push(Value::Integer(self.difficulty_window));
        }
        sql.push_str(&format!(
            " ORDER BY Rating DESC, Unique_Id ASC LIMIT {}",
            self.similar_limit
        ));
        dataset.query_records(&sql, &params)
    }

    /// Like [`Self::try_similar`], but a failure is logged and yields nothing.
    pub fn similar(&self, dataset: &Dataset, trail: &TrailRecord) -> Vec<TrailRecord> {
        self.try_similar(dataset, trail).unwrap_or_else(|e| {
            error!(
                "trailmap: [Details] Similar trails for '{}' failed: {}",
                trail.id, e
            );
            Vec::new()
        })
    }

    /// Everything the details view needs for `trail_id`.
    pub fn load(&mut self, dataset: &Dataset, trail_id: &str) -> DetailState {
        match self.resolve(dataset, trail_id) {
            Ok(trail) => {
                let similar = self.similar(dataset, &trail);
                DetailState::Found { trail, similar }
            }
            Err(TrailError::NotFound { id }) => DetailState::NotFound { id },
            Err(e) => {
                error!("trailmap: [Details] Lookup of '{}' failed: {}", trail_id, e);
                DetailState::Failed {
                    message: e.to_string(),
                }
            }
        }
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic;

    struct RecordingNavigator(Vec<String>);

    impl Navigator for RecordingNavigator {
        fn open_details(&mut self, trail_id: &str) {
            self.0.push(details_route(trail_id));
        }
    }

    #[test]
    fn test_resolve_and_cache() {
        let dataset = synthetic::sample_dataset().unwrap();
        let mut lookup = TrailLookup::new(&ExplorerConfig::default());

        let record = lookup.resolve(&dataset, "1").unwrap();
        assert_eq!(record.id, "1");
        // Detail-only columns come from the full relation
        assert!(record.country.is_some());
        assert_eq!(lookup.cached(), 1);

        let again = lookup.resolve(&dataset, " 1 ").unwrap();
        assert_eq!(again, record);
        assert_eq!(lookup.cached(), 1);
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let dataset = synthetic::sample_dataset().unwrap();
        let mut lookup = TrailLookup::new(&ExplorerConfig::default());
        assert!(matches!(
            lookup.resolve(&dataset, "does-not-exist"),
            Err(TrailError::NotFound { ref id }) if id == "does-not-exist"
        ));
        assert_eq!(
            lookup.load(&dataset, "does-not-exist"),
            DetailState::NotFound {
                id: "does-not-exist".into()
            }
        );
    }

    #[test]
    fn test_similar_trails() {
        let dataset = synthetic::sample_dataset().unwrap();
        let mut lookup = TrailLookup::new(&ExplorerConfig::default());
        let DetailState::Found { trail, similar } = lookup.load(&dataset, "1") else {
            panic!("trail 1 should exist");
        };
        assert!(!similar.is_empty());
        assert!(similar.len() <= 4);
        let code = i64::from(trail.difficulty_code.unwrap());
        for s in &similar {
            assert_eq!(s.area, trail.area);
            assert_ne!(s.id, trail.id);
            assert!((i64::from(s.difficulty_code.unwrap()) - code).abs() <= 2);
        }
        assert!(similar.windows(2).all(|w| w[0].rating >= w[1].rating));
    }

    #[test]
    fn test_navigator_route() {
        let mut nav = RecordingNavigator(Vec::new());
        nav.open_details("T123");
        assert_eq!(nav.0, vec!["/details/T123".to_string()]);
    }
}
