//! 1-indexed, fixed-size page selection over a counted queryset.

use crate::error::ApiError;
use crate::store::Window;

pub const NOT_AN_INTEGER: &str = "Invalid page parameter: not a valid integer";
pub const OUT_OF_RANGE: &str = "Invalid page parameter: out of range";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    pub number: u64,
    pub num_pages: u64,
    pub window: Window,
}

/// Select a page from the raw `page` query value. A missing value means page 1, and page 1 of
/// an empty collection exists.
pub fn paginate(param: Option<&str>, per_page: u32, total: u64) -> Result<Page, ApiError> {
    let number = match param {
        None => 1,
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map_err(|_| ApiError::BadRequest(NOT_AN_INTEGER.into()))?,
    };
    let per_page = u64::from(per_page.max(1));
    let num_pages = total.div_ceil(per_page).max(1);
    if number < 1 || number as u64 > num_pages {
        return Err(ApiError::BadRequest(OUT_OF_RANGE.into()));
    }
    let number = number as u64;
    Ok(Page {
        number,
        num_pages,
        window: Window {
            offset: ((number - 1) * per_page) as usize,
            limit: per_page as usize,
        },
    })
}
