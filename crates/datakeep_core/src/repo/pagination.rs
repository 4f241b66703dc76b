//! Page request/result model.

use crate::error::{StoreError, StoreResult};

/// Pagination request (`page`, `page_length`) and result (`total_items`,
/// `items`) in one value.
#[derive(Debug, Clone, PartialEq)]
pub struct Pagination<E> {
    /// 1-based page number.
    pub page: u64,
    pub page_length: u64,
    /// Count of the base query at computation time.
    pub total_items: u64,
    pub items: Vec<E>,
}

impl<E> Pagination<E> {
    pub fn new(page: u64, page_length: u64) -> Self {
        Self {
            page,
            page_length,
            total_items: 0,
            items: Vec::new(),
        }
    }

    /// Number of pages needed for `total_items`; zero when there are none.
    pub fn total_pages(&self) -> u64 {
        if self.page_length == 0 {
            return 0;
        }
        self.total_items.div_ceil(self.page_length)
    }

    pub fn has_next_page(&self) -> bool {
        self.page < self.total_pages()
    }

    /// Rows skipped before this page.
    pub(crate) fn offset(&self) -> StoreResult<u64> {
        if self.page == 0 {
            return Err(StoreError::InvalidArgument(
                "page must be at least 1".to_string(),
            ));
        }
        if self.page_length == 0 {
            return Err(StoreError::InvalidArgument(
                "page_length must be greater than zero".to_string(),
            ));
        }
        (self.page - 1)
            .checked_mul(self.page_length)
            .ok_or_else(|| StoreError::InvalidArgument("page offset overflows u64".to_string()))
    }
}
