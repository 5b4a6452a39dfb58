//! Client-side pagination over a fully fetched hit list.

use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// One page of results with its position in the whole list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<'a, T> {
    pub items: &'a [T],
    /// 1-based page number actually served (after clamping).
    pub page: usize,
    pub total_pages: usize,
    pub total_items: usize,
    pub page_size: usize,
}

/// Slice `items` into `page_size` pages and return page `requested`,
/// clamped to `[1, total_pages]`. With no items, page 1 is empty and
/// `total_pages` is 0.
pub fn paginate<T>(items: &[T], page_size: usize, requested: usize) -> Page<'_, T> {
    let page_size = page_size.max(1);
    let total_items = items.len();
    let total_pages = total_items.div_ceil(page_size);
    let page = requested.clamp(1, total_pages.max(1));

    let start = ((page - 1) * page_size).min(total_items);
    let end = (start + page_size).min(total_items);

    Page {
        items: &items[start..end],
        page,
        total_pages,
        total_items,
        page_size,
    }
}
