use serde::Serialize;

use crate::{constants::MAX_COUNT_PER_PAGE, error::Error, form::QueryParams};

/// Largest page whose offset still fits in an `i64`.
const MAX_PAGE: i64 = i64::MAX / MAX_COUNT_PER_PAGE;

/// A 1-based page request with a bounded page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl PageRequest {
    pub fn new(page: i64, limit: i64) -> Self {
        Self {
            page: page.clamp(1, MAX_PAGE),
            limit: limit.clamp(1, MAX_COUNT_PER_PAGE),
        }
    }

    /// Reads `page` and `limit` from the query string.
    pub fn from_query(query: &QueryParams, default_limit: i64) -> Result<Self, Error> {
        let page = query.get_number::<i64>("page")?.unwrap_or(1);
        let limit = query.get_number::<i64>("limit")?.unwrap_or(default_limit);

        Ok(Self::new(page, limit))
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

#[derive(Serialize, Debug)]
pub struct Page<T> {
    pub count: i64,
    pub next: Option<i64>,
    pub previous: Option<i64>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn from_rows(rows: Vec<T>, total_rows: i64, request: PageRequest) -> Self {
        let last_page = ((total_rows + request.limit - 1) / request.limit).max(1);

        let next = (request.page < last_page).then_some(request.page + 1);
        let previous = (request.page > 1).then(|| (request.page - 1).min(last_page));

        Self {
            count: total_rows,
            next,
            previous,
            results: rows,
        }
    }

    pub fn no_rows() -> Self {
        Self {
            count: 0,
            next: None,
            previous: None,
            results: vec![],
        }
    }
}
