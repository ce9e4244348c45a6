use std::ops::Range;

use axum::http::StatusCode;
use serde::Serialize;

use crate::error::ApiRequestError;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum PageError {
    #[error("That page number is less than 1")]
    LessThanOne,

    #[error("That page contains no results")]
    OutOfRange,
}

impl ApiRequestError for PageError {
    fn status_code(&self) -> StatusCode {
        StatusCode::NOT_FOUND
    }
}

/// Reads the `p` query parameter. Anything that isn't an integer means the
/// first page.
pub fn page_number(raw: Option<&str>) -> i64 {
    raw.and_then(|p| p.trim().parse().ok()).unwrap_or(1)
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct PageInfo {
    pub number: usize,
    pub num_pages: usize,
    pub count: usize,
    pub per_page: usize,
    pub has_next: bool,
    pub has_previous: bool,
}

impl PageInfo {
    /// Validates `number` against a list of `count` items. An empty list
    /// still has one (empty) page.
    pub fn new(count: usize, number: i64, per_page: usize) -> Result<Self, PageError> {
        let per_page = per_page.max(1);
        let num_pages = count.div_ceil(per_page).max(1);

        if number < 1 {
            return Err(PageError::LessThanOne);
        }
        let number = usize::try_from(number).map_err(|_| PageError::OutOfRange)?;
        if number > num_pages {
            return Err(PageError::OutOfRange);
        }

        Ok(PageInfo {
            number,
            num_pages,
            count,
            per_page,
            has_next: number < num_pages,
            has_previous: number > 1,
        })
    }

    pub fn range(&self) -> Range<usize> {
        let start = (self.number - 1) * self.per_page;
        start..(start + self.per_page).min(self.count)
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub info: PageInfo,
}

/// Slices an already ordered list. The cut ignores thread boundaries, so a
/// thread's replies may continue on the next page.
pub fn paginate<T>(mut items: Vec<T>, number: i64, per_page: usize) -> Result<Page<T>, PageError> {
    let info = PageInfo::new(items.len(), number, per_page)?;
    let range = info.range();

    items.truncate(range.end);
    let items = items.split_off(range.start);

    Ok(Page { items, info })
}
