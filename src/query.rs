//! # Query Builder
//!
//! Compiles a [`FilterCriteria`] into a matched count/data statement pair.
//!
//! Filters are first turned into tagged [`Clause`]s, each carrying its own
//! bound values. The count and data statements share one WHERE text and one
//! parameter list, so `totalCount` always describes the rows the data
//! statement can page through. Only allow-listed columns ever reach SQL text;
//! user input travels as bound parameters.

use std::collections::BTreeSet;

use log::error;
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

use crate::config::ExplorerConfig;
use crate::dataset::{Dataset, TRAIL_SUMMARY};
use crate::error::{Result, TrailError};
use crate::types::{Difficulty, TrailRecord, TrailType};

// ============================================================================
// Columns and sorting
// ============================================================================

/// Columns that may appear in generated SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    UniqueId,
    TrailName,
    Area,
    Distance,
    ElevationGain,
    Rating,
    ReviewCount,
    DifficultyCategory,
    TrailTypeCategory,
}

impl Column {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Column::UniqueId => "Unique_Id",
            Column::TrailName => "Trail_Name",
            Column::Area => "Area",
            Column::Distance => "Distance",
            Column::ElevationGain => "Elevation_Gain",
            Column::Rating => "Rating",
            Column::ReviewCount => "Review_Count",
            Column::DifficultyCategory => "Difficulty_Category",
            Column::TrailTypeCategory => "Trail_Type_Category",
        }
    }
}

/// Allow-listed sort fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    Rating,
    Distance,
    ElevationGain,
    ReviewCount,
    TrailName,
}

impl SortField {
    pub const ALL: [SortField; 5] = [
        SortField::Rating,
        SortField::Distance,
        SortField::ElevationGain,
        SortField::ReviewCount,
        SortField::TrailName,
    ];

    pub fn column(&self) -> Column {
        match self {
            SortField::Rating => Column::Rating,
            SortField::Distance => Column::Distance,
            SortField::ElevationGain => Column::ElevationGain,
            SortField::ReviewCount => Column::ReviewCount,
            SortField::TrailName => Column::TrailName,
        }
    }

    /// Parse a column name such as `"Elevation_Gain"`. Anything outside the
    /// allow-list is rejected.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.column().as_sql().eq_ignore_ascii_case(name.trim()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ASC" => Some(SortDirection::Asc),
            "DESC" => Some(SortDirection::Desc),
            _ => None,
        }
    }
}

/// Sort field and direction. Defaults to rating, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            field: SortField::Rating,
            direction: SortDirection::Desc,
        }
    }
}

impl SortSpec {
    pub fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    /// Parse untrusted field/direction strings; `None` if either is not allowed.
    pub fn parse(field: &str, direction: &str) -> Option<Self> {
        Some(Self::new(SortField::parse(field)?, SortDirection::parse(direction)?))
    }

    /// ORDER BY body. Ties fall back to the primary key so repeated queries
    /// return equal-keyed rows in the same order.
    pub fn order_by_sql(&self) -> String {
        format!(
            "{} {}, {} ASC",
            self.field.column().as_sql(),
            self.direction.as_sql(),
            Column::UniqueId.as_sql()
        )
    }
}

// ============================================================================
// Filter criteria
// ============================================================================

/// Inclusive numeric range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeFilter {
    pub min: f64,
    pub max: f64,
}

impl RangeFilter {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Resolve against a default domain: non-finite bounds fall back to the
    /// domain, reversed bounds are swapped.
    fn resolve(range: Option<RangeFilter>, domain: (f64, f64)) -> (f64, f64) {
        let Some(range) = range else {
            return domain;
        };
        let min = if range.min.is_finite() { range.min } else { domain.0 };
        let max = if range.max.is_finite() { range.max } else { domain.1 };
        if min <= max {
            (min, max)
        } else {
            (max, min)
        }
    }
}

/// The complete set of active filter constraints. Fields combine with AND.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FilterCriteria {
    /// Case-insensitive substring of name or area
    pub search: Option<String>,
    /// Empty = any difficulty
    pub difficulties: BTreeSet<Difficulty>,
    /// `None` = the configured distance domain
    pub distance: Option<RangeFilter>,
    /// `None` = the configured elevation domain
    pub elevation: Option<RangeFilter>,
    /// 0 = unrestricted
    pub min_rating: f64,
    /// Empty = any type
    pub trail_types: BTreeSet<TrailType>,
    /// Empty = any area
    pub areas: BTreeSet<String>,
}

impl FilterCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub fn with_difficulties(mut self, difficulties: impl IntoIterator<Item = Difficulty>) -> Self {
        self.difficulties = difficulties.into_iter().collect();
        self
    }

    pub fn with_distance(mut self, min: f64, max: f64) -> Self {
        self.distance = Some(RangeFilter::new(min, max));
        self
    }

    pub fn with_elevation(mut self, min: f64, max: f64) -> Self {
        self.elevation = Some(RangeFilter::new(min, max));
        self
    }

    pub fn with_min_rating(mut self, rating: f64) -> Self {
        self.min_rating = rating;
        self
    }

    pub fn with_trail_types(mut self, types: impl IntoIterator<Item = TrailType>) -> Self {
        self.trail_types = types.into_iter().collect();
        self
    }

    pub fn with_areas<S: Into<String>>(mut self, areas: impl IntoIterator<Item = S>) -> Self {
        self.areas = areas.into_iter().map(Into::into).collect();
        self
    }

    /// Add the difficulty if absent, remove it if present (chip toggles).
    pub fn toggle_difficulty(&mut self, difficulty: Difficulty) {
        if !self.difficulties.remove(&difficulty) {
            self.difficulties.insert(difficulty);
        }
    }

    pub fn toggle_trail_type(&mut self, trail_type: TrailType) {
        if !self.trail_types.remove(&trail_type) {
            self.trail_types.insert(trail_type);
        }
    }

    pub fn toggle_area(&mut self, area: &str) {
        if !self.areas.remove(area) {
            self.areas.insert(area.to_string());
        }
    }

    fn search_term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

// ============================================================================
// Clauses
// ============================================================================

/// One tagged WHERE clause and the values it binds.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// `(Trail_Name LIKE ? OR Area LIKE ?)` with an escaped `%term%` pattern
    Search { pattern: String },
    /// `column IN (?, ?, ...)`; never built for an empty set
    InSet { column: Column, values: Vec<String> },
    /// `column BETWEEN ? AND ?`
    Between { column: Column, min: f64, max: f64 },
    /// `column >= ?`
    AtLeast { column: Column, min: f64 },
}

impl Clause {
    /// Build a search clause, escaping LIKE wildcards in the term.
    pub fn search(term: &str) -> Self {
        let mut pattern = String::with_capacity(term.len() + 2);
        pattern.push('%');
        for c in term.chars() {
            if matches!(c, '%' | '_' | '\\') {
                pattern.push('\\');
            }
            pattern.push(c);
        }
        pattern.push('%');
        Clause::Search { pattern }
    }

    pub fn sql(&self) -> String {
        match self {
            Clause::Search { .. } => format!(
                "({} LIKE ? ESCAPE '\\' OR {} LIKE ? ESCAPE '\\')",
                Column::TrailName.as_sql(),
                Column::Area.as_sql()
            ),
            Clause::InSet { column, values } => {
                let placeholders = vec!["?"; values.len()].join(", ");
                format!("{} IN ({})", column.as_sql(), placeholders)
            }
            Clause::Between { column, .. } => format!("{} BETWEEN ? AND ?", column.as_sql()),
            Clause::AtLeast { column, .. } => format!("{} >= ?", column.as_sql()),
        }
    }

    pub fn params(&self) -> Vec<Value> {
        match self {
            Clause::Search { pattern } => {
                vec![Value::Text(pattern.clone()), Value::Text(pattern.clone())]
            }
            Clause::InSet { values, .. } => values.iter().cloned().map(Value::Text).collect(),
            Clause::Between { min, max, .. } => vec![Value::Real(*min), Value::Real(*max)],
            Clause::AtLeast { min, .. } => vec![Value::Real(*min)],
        }
    }
}

/// A conjunction of clauses over an always-true base.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    clauses: Vec<Clause>,
}

impl Predicate {
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn push(&mut self, clause: Clause) {
        self.clauses.push(clause);
    }

    /// WHERE body, starting from `1=1`.
    pub fn where_sql(&self) -> String {
        let mut sql = String::from("1=1");
        for clause in &self.clauses {
            sql.push_str(" AND ");
            sql.push_str(&clause.sql());
        }
        sql
    }

    /// Bound values in placeholder order.
    pub fn params(&self) -> Vec<Value> {
        self.clauses.iter().flat_map(Clause::params).collect()
    }
}

// ============================================================================
// Built queries
// ============================================================================

/// Matched count and data statements over one parameter list.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltQuery {
    pub count_sql: String,
    pub data_sql: String,
    params: Vec<Value>,
    pub page: u32,
    pub limit: u32,
    pub offset: u64,
}

impl BuiltQuery {
    pub fn count_params(&self) -> &[Value] {
        &self.params
    }

    pub fn data_params(&self) -> &[Value] {
        &self.params
    }
}

/// Compiles criteria into statements against the summary relation.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    relation: &'static str,
    distance_domain: (f64, f64),
    elevation_domain: (f64, f64),
    max_rows: u32,
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self::new(&ExplorerConfig::default())
    }
}

impl QueryBuilder {
    pub fn new(config: &ExplorerConfig) -> Self {
        Self {
            relation: TRAIL_SUMMARY,
            distance_domain: config.distance_domain,
            elevation_domain: config.elevation_domain,
            max_rows: config.max_rows.max(1),
        }
    }

    pub fn max_rows(&self) -> u32 {
        self.max_rows
    }

    /// Compile criteria to clauses, in a fixed order.
    pub fn predicate(&self, criteria: &FilterCriteria) -> Predicate {
        let mut predicate = Predicate::default();

        if let Some(term) = criteria.search_term() {
            predicate.push(Clause::search(term));
        }

        if !criteria.difficulties.is_empty() {
            predicate.push(Clause::InSet {
                column: Column::DifficultyCategory,
                values: criteria
                    .difficulties
                    .iter()
                    .map(|d| d.label().to_string())
                    .collect(),
            });
        }

        let (min, max) = RangeFilter::resolve(criteria.distance, self.distance_domain);
        predicate.push(Clause::Between {
            column: Column::Distance,
            min,
            max,
        });

        let (min, max) = RangeFilter::resolve(criteria.elevation, self.elevation_domain);
        predicate.push(Clause::Between {
            column: Column::ElevationGain,
            min,
            max,
        });

        if criteria.min_rating.is_finite() && criteria.min_rating > 0.0 {
            predicate.push(Clause::AtLeast {
                column: Column::Rating,
                min: criteria.min_rating.min(5.0),
            });
        }

        if !criteria.trail_types.is_empty() {
            predicate.push(Clause::InSet {
                column: Column::TrailTypeCategory,
                values: criteria
                    .trail_types
                    .iter()
                    .map(|t| t.label().to_string())
                    .collect(),
            });
        }

        if !criteria.areas.is_empty() {
            predicate.push(Clause::InSet {
                column: Column::Area,
                values: criteria.areas.iter().cloned().collect(),
            });
        }

        predicate
    }

    /// Build the count/data pair for one page.
    ///
    /// `page` is 1-based (0 is treated as 1); `page_size` is clamped to
    /// `1..=max_rows` so no data statement is unbounded.
    pub fn build(
        &self,
        criteria: &FilterCriteria,
        sort: &SortSpec,
        page: u32,
        page_size: u32,
    ) -> BuiltQuery {
        let page = page.max(1);
        let limit = page_size.clamp(1, self.max_rows);
        let offset = u64::from(page - 1) * u64::from(limit);

        let predicate = self.predicate(criteria);
        let where_sql = predicate.where_sql();

        let count_sql = format!("SELECT COUNT(*) FROM {} WHERE {}", self.relation, where_sql);
        let data_sql = format!(
            "SELECT * FROM {} WHERE {} ORDER BY {} LIMIT {} OFFSET {}",
            self.relation,
            where_sql,
            sort.order_by_sql(),
            limit,
            offset
        );

        BuiltQuery {
            count_sql,
            data_sql,
            params: predicate.params(),
            page,
            limit,
            offset,
        }
    }

    /// Build the map query: first page at the row cap.
    pub fn build_capped(&self, criteria: &FilterCriteria, sort: &SortSpec) -> BuiltQuery {
        self.build(criteria, sort, 1, self.max_rows)
    }
}

// ============================================================================
// Execution
// ============================================================================

/// One page of results.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult {
    pub records: Vec<TrailRecord>,
    pub total_count: u64,
    /// Set when the query failed and this result is the empty fallback
    #[serde(skip)]
    pub error: Option<TrailError>,
}

impl PageResult {
    pub fn empty_with_error(error: TrailError) -> Self {
        Self {
            records: Vec::new(),
            total_count: 0,
            error: Some(error),
        }
    }

    pub fn is_soft_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// Run the count statement.
pub fn try_count(dataset: &Dataset, query: &BuiltQuery) -> Result<u64> {
    dataset.query_count(&query.count_sql, query.count_params())
}

/// Run the data statement.
pub fn try_records(dataset: &Dataset, query: &BuiltQuery) -> Result<Vec<TrailRecord>> {
    dataset.query_records(&query.data_sql, query.data_params())
}

/// Run both statements, propagating errors.
pub fn try_execute(dataset: &Dataset, query: &BuiltQuery) -> Result<PageResult> {
    let total_count = try_count(dataset, query)?;
    let records = try_records(dataset, query)?;
    Ok(PageResult {
        records,
        total_count,
        error: None,
    })
}

/// Run both statements; a failure is logged and becomes an empty page.
pub fn execute(dataset: &Dataset, query: &BuiltQuery) -> PageResult {
    match try_execute(dataset, query) {
        Ok(result) => result,
        Err(e) => {
            error!(
                "trailmap: [Query] Query failed, returning empty result: {} ({})",
                e, query.data_sql
            );
            PageResult::empty_with_error(e)
        }
    }
}

/// Run only the data statement; a failure is logged and becomes no records.
pub fn fetch_records(dataset: &Dataset, query: &BuiltQuery) -> Vec<TrailRecord> {
    try_records(dataset, query).unwrap_or_else(|e| {
        error!(
            "trailmap: [Query] Query failed, returning no records: {} ({})",
            e, query.data_sql
        );
        Vec::new()
    })
}
