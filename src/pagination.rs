//! Page results returned by [`crate::repositories::Repository::paginate`].

use serde::Serialize;

/// One page of results plus the totals needed to render page links.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Rows matching the query across all pages.
    pub total: u64,
    pub per_page: u64,
    /// 1-based.
    pub current_page: u64,
    pub last_page: u64,
}

impl<T> Page<T> {
    pub fn has_more_pages(&self) -> bool {
        self.current_page < self.last_page
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            per_page: self.per_page,
            current_page: self.current_page,
            last_page: self.last_page,
        }
    }
}
