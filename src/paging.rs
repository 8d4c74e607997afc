//! # Result Page Manager
//!
//! Owns the list view's paging state (`page`, `pageSize`, sort, criteria) and
//! the last fetched page.
//!
//! Rules:
//! - changing criteria or sort resets to page 1
//! - changing the page alone never touches criteria or sort
//! - `total_pages = max(1, ceil(total_count / page_size))`
//! - after a refresh the page never points past `total_pages`

use log::{debug, error};

use crate::config::ExplorerConfig;
use crate::dataset::Dataset;
use crate::error::TrailError;
use crate::query::{
    try_count, try_records, BuiltQuery, FilterCriteria, PageResult, QueryBuilder, SortDirection,
    SortField, SortSpec,
};
use crate::types::TrailRecord;

/// Number of pages needed for `total_count` rows, never less than 1.
pub fn total_pages(total_count: u64, page_size: u32) -> u32 {
    let page_size = u64::from(page_size.max(1));
    let pages = total_count.div_ceil(page_size).max(1);
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// Paging state machine for the list view.
#[derive(Debug, Clone)]
pub struct ResultPageManager {
    builder: QueryBuilder,
    criteria: FilterCriteria,
    sort: SortSpec,
    page: u32,
    page_size: u32,
    total_count: u64,
    records: Vec<TrailRecord>,
    last_error: Option<TrailError>,
}

impl ResultPageManager {
    pub fn new(config: &ExplorerConfig) -> Self {
        let builder = QueryBuilder::new(config);
        let page_size = config.page_size.clamp(1, builder.max_rows());
        Self {
            builder,
            criteria: FilterCriteria::default(),
            sort: SortSpec::default(),
            page: 1,
            page_size,
            total_count: 0,
            records: Vec::new(),
            last_error: None,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    pub fn sort(&self) -> SortSpec {
        self.sort
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn total_pages(&self) -> u32 {
        total_pages(self.total_count, self.page_size)
    }

    pub fn records(&self) -> &[TrailRecord] {
        &self.records
    }

    /// Error from the last refresh, if it fell back to an empty page.
    pub fn last_error(&self) -> Option<&TrailError> {
        self.last_error.as_ref()
    }

    /// Snapshot of the current page.
    pub fn page_result(&self) -> PageResult {
        PageResult {
            records: self.records.clone(),
            total_count: self.total_count,
            error: self.last_error.clone(),
        }
    }

    /// Statements for the current state.
    pub fn current_query(&self) -> BuiltQuery {
        self.builder
            .build(&self.criteria, &self.sort, self.page, self.page_size)
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Replace the criteria. Returns whether anything changed; a change resets
    /// to the first page.
    pub fn set_criteria(&mut self, criteria: FilterCriteria) -> bool {
        if criteria == self.criteria {
            return false;
        }
        self.criteria = criteria;
        self.page = 1;
        true
    }

    /// Edit the criteria in place, e.g. `|c| c.toggle_area("Yosemite")`.
    pub fn update_criteria<F>(&mut self, edit: F) -> bool
    where
        F: FnOnce(&mut FilterCriteria),
    {
        let mut criteria = self.criteria.clone();
        edit(&mut criteria);
        self.set_criteria(criteria)
    }

    /// Clear every filter.
    pub fn reset_filters(&mut self) -> bool {
        self.set_criteria(FilterCriteria::default())
    }

    /// Replace the sort. A change resets to the first page.
    pub fn set_sort(&mut self, sort: SortSpec) -> bool {
        if sort == self.sort {
            return false;
        }
        self.sort = sort;
        self.page = 1;
        true
    }

    /// Sort menu behaviour: picking the active field flips its direction,
    /// picking another field selects it descending. Always lands on page 1.
    pub fn select_sort_field(&mut self, field: SortField) {
        let sort = if self.sort.field == field {
            SortSpec::new(field, self.sort.direction.toggled())
        } else {
            SortSpec::new(field, SortDirection::Desc)
        };
        self.sort = sort;
        self.page = 1;
    }

    /// Move to a page (1-based). Criteria and sort are untouched.
    pub fn set_page(&mut self, page: u32) {
        self.page = page.max(1);
    }

    pub fn next_page(&mut self) {
        if self.page < self.total_pages() {
            self.page += 1;
        }
    }

    pub fn prev_page(&mut self) {
        if self.page > 1 {
            self.page -= 1;
        }
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    /// Re-run the count and data statements for the current state.
    ///
    /// The page is clamped to the new page count before the data statement is
    /// built. Query failures are logged and leave an empty page.
    pub fn refresh(&mut self, dataset: &Dataset) -> PageResult {
        let query = self.current_query();
        let total_count = match try_count(dataset, &query) {
            Ok(count) => count,
            Err(e) => return self.fail(e, &query),
        };
        self.total_count = total_count;

        let last_page = self.total_pages();
        let query = if self.page > last_page {
            debug!(
                "trailmap: [Paging] Page {} past end, clamping to {}",
                self.page, last_page
            );
            self.page = last_page;
            self.current_query()
        } else {
            query
        };

        match try_records(dataset, &query) {
            Ok(records) => {
                self.records = records;
                self.last_error = None;
                self.page_result()
            }
            Err(e) => self.fail(e, &query),
        }
    }

    fn fail(&mut self, e: TrailError, query: &BuiltQuery) -> PageResult {
        error!(
            "trailmap: [Paging] Refresh failed, showing no results: {} ({})",
            e, query.data_sql
        );
        self.records.clear();
        self.total_count = 0;
        self.page = 1;
        self.last_error = Some(e);
        self.page_result()
    }
}
