//! Offset pagination over select statements.

use serde::Serialize;
use sea_query::SelectStatement;

use crate::diesel_runtime::{render, Session, SessionError};
use crate::model::SqlModel;

pub const DEFAULT_PER_PAGE: u64 = 10;

/// Largest LIMIT/OFFSET value every backend accepts
const MAX_ROWS: u64 = i64::MAX as u64;

/// One page of results
///
/// `next` and `previous` are page numbers, `None` at either boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OffsetPage<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub next: Option<u64>,
    pub previous: Option<u64>,
}

/// Splits a select statement into fixed-size, 1-based pages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetPaginator {
    per_page: u64,
}

impl OffsetPaginator {
    /// `per_page` is clamped so the extra look-ahead row still fits in a LIMIT
    pub fn new(per_page: u64) -> Self {
        OffsetPaginator {
            per_page: per_page.clamp(1, MAX_ROWS - 1),
        }
    }

    pub fn per_page(&self) -> u64 {
        self.per_page
    }

    /// Offset of the first row of `page`; page 0 is treated as page 1
    pub fn offset(&self, page: u64) -> u64 {
        (page.max(1) - 1).saturating_mul(self.per_page)
    }

    /// Last page whose rows can be addressed with LIMIT/OFFSET
    pub fn max_page(&self) -> u64 {
        (MAX_ROWS - self.per_page - 1) / self.per_page + 1
    }

    pub fn contains_page(&self, page: u64) -> bool {
        page <= self.max_page()
    }

    /// Narrow `stmt` to `page`, fetching one extra row to detect a next page
    pub fn page_stmt(&self, stmt: &SelectStatement, page: u64) -> SelectStatement {
        let mut stmt = stmt.clone();
        stmt.limit(self.per_page.saturating_add(1))
            .offset(self.offset(page));
        stmt
    }

    /// Build a page from the rows `page_stmt` returned
    pub fn paginate<T>(&self, mut rows: Vec<T>, page: u64) -> OffsetPage<T> {
        let page = page.max(1);
        let has_next = rows.len() as u64 > self.per_page;
        rows.truncate(self.per_page as usize);

        OffsetPage {
            items: rows,
            page,
            next: has_next.then(|| page.saturating_add(1)),
            previous: (page > 1).then(|| page - 1),
        }
    }

    /// Fetch one page inside a transaction on `session`
    pub async fn get_page<M: SqlModel>(
        &self,
        session: &Session,
        stmt: &SelectStatement,
        page: u64,
    ) -> Result<OffsetPage<M>, SessionError> {
        if !self.contains_page(page) {
            return Err(SessionError::Statement(format!(
                "page {} is past the last addressable page {}",
                page,
                self.max_page()
            )));
        }
        let sql = render(&self.page_stmt(stmt, page));
        tracing::debug!(page, per_page = self.per_page, "fetching page");

        let rows = session
            .begin(move |conn| {
                use diesel::RunQueryDsl;
                diesel::sql_query(sql).load::<M>(conn)
            })
            .await?;
        Ok(self.paginate(rows, page))
    }
}

impl Default for OffsetPaginator {
    fn default() -> Self {
        Self::new(DEFAULT_PER_PAGE)
    }
}

/// Access to the paginator and the requested page of a list view
pub trait Paginated {
    fn paginator(&self) -> &OffsetPaginator;
    fn page_number(&self) -> u64;
}
