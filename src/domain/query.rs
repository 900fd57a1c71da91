use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Statement, date_format};

/// Optional, inclusive time window over an account's history.
/// A missing bound leaves that side unconstrained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    #[serde(default, with = "date_format::option")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, with = "date_format::option")]
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    /// A range is invalid only when both bounds are set and end precedes start.
    pub fn is_valid(&self) -> bool {
        match (self.start, self.end) {
            (Some(start), Some(end)) => end >= start,
            _ => true,
        }
    }

    pub fn contains(&self, date: DateTime<Utc>) -> bool {
        self.start.is_none_or(|start| date >= start) && self.end.is_none_or(|end| date <= end)
    }

    /// Keep the statements inside the range, preserving their order.
    pub fn filter(&self, statements: Vec<Statement>) -> Vec<Statement> {
        statements
            .into_iter()
            .filter(|s| self.contains(s.operation_date))
            .collect()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PageRequestError {
    #[error("Invalid page number: {0}")]
    InvalidPage(i64),

    #[error("Invalid page size: {0}")]
    InvalidPageSize(i64),
}

/// Zero-based page number plus page size. Only `new` builds one, so the
/// size is always at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: usize,
    size: usize,
}

impl PageRequest {
    pub fn new(page: i64, size: i64) -> Result<Self, PageRequestError> {
        if page < 0 {
            return Err(PageRequestError::InvalidPage(page));
        }
        if size < 1 {
            return Err(PageRequestError::InvalidPageSize(size));
        }
        let page = usize::try_from(page).map_err(|_| PageRequestError::InvalidPage(page))?;
        let size = usize::try_from(size).map_err(|_| PageRequestError::InvalidPageSize(size))?;
        Ok(Self { page, size })
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn offset(&self) -> usize {
        self.page.saturating_mul(self.size)
    }
}

/// One slice of an ordered result set, with totals for the whole set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    #[serde(rename = "accountStatement")]
    pub items: Vec<T>,
    pub page: usize,
    pub size: usize,
    pub total_pages: usize,
    pub total_elements: usize,
}

impl<T> Page<T> {
    /// Cut `request` out of the full result set. Pages past the end are empty
    /// but still report the totals.
    pub fn slice(all: Vec<T>, request: PageRequest) -> Self {
        let total_elements = all.len();
        let total_pages = total_elements.div_ceil(request.size);
        let start = request.offset().min(total_elements);
        let end = start.saturating_add(request.size).min(total_elements);

        let items = all.into_iter().skip(start).take(end - start).collect();

        Self {
            items,
            page: request.page,
            size: request.size,
            total_pages,
            total_elements,
        }
    }

    /// The whole result set as a single page.
    pub fn single(all: Vec<T>) -> Self {
        let total_elements = all.len();
        Self {
            items: all,
            page: 0,
            size: total_elements,
            total_pages: usize::from(total_elements > 0),
            total_elements,
        }
    }

    pub fn is_last(&self) -> bool {
        self.page + 1 >= self.total_pages
    }
}
