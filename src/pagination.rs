// Fixed-size pagination over ordered result sets. Semantics follow the
// classic paginator contract: 1-based page numbers, out-of-range numbers
// clamp to the last valid page, an empty set still has one (empty) page.

use serde::Serialize;

pub const POSTS_PER_PAGE: u32 = 10;

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u32,
    pub num_pages: u32,
    pub total_items: i64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, number: u32, total_items: i64, per_page: u32) -> Self {
        let num_pages = num_pages(total_items, per_page);
        Page {
            items,
            number,
            num_pages,
            total_items,
            has_next: number < num_pages,
            has_previous: number > 1,
        }
    }
}

pub fn num_pages(total_items: i64, per_page: u32) -> u32 {
    if total_items <= 0 {
        return 1;
    }
    ((total_items + per_page as i64 - 1) / per_page as i64) as u32
}

/// Resolve the raw `page` request parameter against the total count.
/// Missing or unparsable values fall back to page 1; values past the end
/// clamp to the last page.
pub fn resolve_page(requested: Option<&str>, total_items: i64, per_page: u32) -> u32 {
    let last = num_pages(total_items, per_page);
    let number = requested
        .and_then(|raw| raw.trim().parse::<u32>().ok())
        .unwrap_or(1);
    number.clamp(1, last)
}

pub fn page_offset(number: u32, per_page: u32) -> i64 {
    (number as i64 - 1) * per_page as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_num_pages() {
        assert_eq!(num_pages(0, 10), 1);
        assert_eq!(num_pages(1, 10), 1);
        assert_eq!(num_pages(10, 10), 1);
        assert_eq!(num_pages(11, 10), 2);
        assert_eq!(num_pages(13, 10), 2);
    }

    #[test]
    fn test_resolve_page_clamps() {
        // 13 items, 2 pages
        assert_eq!(resolve_page(None, 13, 10), 1);
        assert_eq!(resolve_page(Some("2"), 13, 10), 2);
        assert_eq!(resolve_page(Some("99"), 13, 10), 2);
        assert_eq!(resolve_page(Some("0"), 13, 10), 1);
        assert_eq!(resolve_page(Some("not-a-number"), 13, 10), 1);
        assert_eq!(resolve_page(Some(""), 13, 10), 1);
    }

    #[test]
    fn test_page_flags() {
        let page = Page::new(vec![1, 2, 3], 2, 13, 10);
        assert_eq!(page.num_pages, 2);
        assert!(page.has_previous);
        assert!(!page.has_next);

        let page = Page::new((0..10).collect(), 1, 13, 10);
        assert!(page.has_next);
        assert!(!page.has_previous);
    }

    #[test]
    fn test_empty_set_has_one_page() {
        let page: Page<i32> = Page::new(vec![], 1, 0, 10);
        assert_eq!(page.num_pages, 1);
        assert!(!page.has_next);
        assert!(!page.has_previous);
    }

    #[test]
    fn test_page_offset() {
        assert_eq!(page_offset(1, 10), 0);
        assert_eq!(page_offset(2, 10), 10);
    }
}
