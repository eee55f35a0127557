//! Page windows for list queries

use serde::{Deserialize, Serialize};

const MAX_PER_PAGE: u32 = 100;
const DEFAULT_PER_PAGE: u32 = 20;

/// 1-indexed page request, clamped to `1..=100` rows per page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Pagination {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, MAX_PER_PAGE),
        }
    }

    /// SQL `OFFSET`.
    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.per_page as i64
    }

    /// SQL `LIMIT`.
    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(1, DEFAULT_PER_PAGE)
    }
}

/// One page of results plus the total row count across all pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> Paginated<T> {
    /// Build from rows fetched with a `COUNT(*) OVER()` column.
    ///
    /// An empty page past the end reports a total of zero; callers that care
    /// re-query page one.
    pub(crate) fn from_counted(rows: Vec<(T, i64)>, page: Pagination) -> Self {
        let total = rows.first().map(|(_, total)| *total).unwrap_or(0);
        Self {
            items: rows.into_iter().map(|(item, _)| item).collect(),
            total,
            page: page.page,
            per_page: page.per_page,
        }
    }

    pub fn total_pages(&self) -> u32 {
        let per_page = self.per_page.max(1) as i64;
        (((self.total + per_page - 1) / per_page).max(1)) as u32
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_of(total: i64, page: u32, per_page: u32) -> Paginated<()> {
        Paginated {
            items: vec![],
            total,
            page,
            per_page,
        }
    }

    #[test]
    fn window_bounds() {
        assert_eq!(Pagination::new(1, 10).offset(), 0);
        assert_eq!(Pagination::new(3, 25).offset(), 50);
        assert_eq!(Pagination::new(0, 0), Pagination::new(1, 1));
        assert_eq!(Pagination::new(2, 500).limit(), 100);
        assert_eq!(Pagination::default().limit(), 20);
    }

    #[test]
    fn counted_rows_carry_total() {
        let rows = vec![("a", 7), ("b", 7)];
        let page = Paginated::from_counted(rows, Pagination::new(2, 2));
        assert_eq!(page.items, vec!["a", "b"]);
        assert_eq!(page.total, 7);
        assert_eq!(page.total_pages(), 4);
        assert!(page.has_next() && page.has_prev());

        let empty: Paginated<&str> = Paginated::from_counted(vec![], Pagination::default());
        assert_eq!(empty.total, 0);
    }

    #[test]
    fn page_navigation() {
        assert_eq!(page_of(0, 1, 10).total_pages(), 1);
        assert_eq!(page_of(25, 1, 10).total_pages(), 3);
        assert!(!page_of(30, 3, 10).has_next());
        assert!(!page_of(30, 1, 10).has_prev());
    }
}
