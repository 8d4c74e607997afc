//! # Trailmap
//!
//! Filter, paginate and map an embedded hiking-trail dataset.
//!
//! This library provides:
//! - A parameterized query builder over composable filter criteria
//! - A result page manager that keeps paging consistent with the count
//! - A marker manager with radius clustering behind a map provider trait
//! - A selection state machine shared by marker clicks and external selection
//!
//! ## Features
//!
//! - **`synthetic`** - Fixture datasets and a recording map provider for tests
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use trailmap::{
//!     Difficulty, DatasetService, ExplorerConfig, FileLoader, FilterCriteria,
//!     ResultPageManager,
//! };
//!
//! let config = ExplorerConfig::default();
//! let mut service = DatasetService::new(FileLoader::new("trails.db"));
//! service.init()?;
//!
//! let mut pages = ResultPageManager::new(&config);
//! pages.set_criteria(
//!     FilterCriteria::new()
//!         .with_difficulties([Difficulty::Easy, Difficulty::Moderate])
//!         .with_distance(0.0, 10.0)
//!         .with_min_rating(4.0),
//! );
//! let page = pages.refresh(service.dataset()?);
//! println!("{} of {} trails", page.records.len(), page.total_count);
//! # Ok::<(), trailmap::TrailError>(())
//! ```

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, TrailError};

// Tunable constants
pub mod config;
pub use config::{ClusterConfig, ExplorerConfig, ViewportConfig};

// Trail records and typed row mapping
pub mod types;
pub use types::{Difficulty, GeoPoint, LengthCategory, TrailRecord, TrailType};

// Dataset handle and session lifecycle
pub mod dataset;
pub use dataset::{Dataset, DatasetLoader, DatasetService, FileLoader, LoadState};

// Filter/sort compilation and soft-failing execution
pub mod query;
pub use query::{
    execute, BuiltQuery, Clause, FilterCriteria, PageResult, QueryBuilder, RangeFilter,
    SortDirection, SortField, SortSpec,
};

// List paging
pub mod paging;
pub use paging::{total_pages, ResultPageManager};

// Marker clustering
pub mod cluster;
pub use cluster::{Cluster, ClusterIndex, ClusterNode};

// Markers and the map provider seam
pub mod markers;
pub use markers::{
    MapProvider, MarkerColor, MarkerHandle, MarkerManager, MarkerSpec, MarkerState, SyncReport,
};

// Single-selection state machine
pub mod selection;
pub use selection::{SelectionEffect, SelectionMachine, SelectionState, Viewport};

// Map view wiring
pub mod map_view;
pub use map_view::{open_map, MapSurface, MapView, MAP_FALLBACK_MESSAGE};

// Detail lookup and navigation
pub mod details;
pub use details::{details_route, DetailState, Navigator, TrailLookup};

// Aggregate statistics
pub mod stats;
pub use stats::{AnalysisStats, DatasetSummary, Distribution};

// Test fixtures
#[cfg(any(test, feature = "synthetic"))]
pub mod synthetic;
