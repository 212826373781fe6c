//! Collection view with offset pagination.

use std::borrow::Cow;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::Serialize;
use serde_json::Value as JsonValue;
use sea_query::{
    Alias, ConditionalStatement, DeleteStatement, Order, OrderedStatement, SelectStatement,
    SimpleExpr, UpdateStatement, Value,
};

use crate::constants::PAGE_PARAM;
use crate::model::SqlModel;
use crate::pagination::{OffsetPage, OffsetPaginator, Paginated};
use crate::statements::{ModelStatements, StatementBuilder};
use crate::views::{RequestScope, SessionBound, ViewContext, ViewError};

/// View over the rows of `M`, paged by the `page_key` query parameter
///
/// Statements are unfiltered unless conditions are added with
/// [`ListView::filter`]; filters apply to select, update and delete alike.
///
/// # Example
/// ```ignore
/// async fn list_heroes(mut view: ListView<Hero>) -> Result<ViewContext, ViewError> {
///     view.prepare_context().await?;
///     Ok(view.context)
/// }
/// ```
#[derive(Debug)]
pub struct ListView<M: SqlModel> {
    scope: RequestScope,
    session_key: Cow<'static, str>,
    statements: ModelStatements<M>,
    paginator: OffsetPaginator,
    page: u64,
    filters: Vec<SimpleExpr>,
    ordering: Vec<(Alias, Order)>,
    pub items: Vec<M>,
    pub next: Option<u64>,
    pub previous: Option<u64>,
    pub context: ViewContext,
}

impl<M: SqlModel> ListView<M> {
    /// Build the view from a request scope, reading the page number
    pub fn from_scope(scope: RequestScope) -> Result<Self, ViewError> {
        let page = match scope.query(PAGE_PARAM) {
            None => 1,
            Some(raw) => match raw.parse::<u64>() {
                Ok(page) if page >= 1 => page,
                _ => {
                    return Err(ViewError::BadRequest(format!(
                        "`{}` must be a positive integer, got `{}`",
                        PAGE_PARAM, raw
                    )))
                }
            },
        };

        Ok(ListView {
            scope,
            session_key: Cow::Borrowed(M::BIND_KEY),
            statements: ModelStatements::new(),
            paginator: OffsetPaginator::default(),
            page,
            filters: Vec::new(),
            ordering: Vec::new(),
            items: Vec::new(),
            next: None,
            previous: None,
            context: ViewContext::new(),
        })
    }

    pub fn with_session_key(mut self, key: impl Into<String>) -> Self {
        self.session_key = Cow::Owned(key.into());
        self
    }

    pub fn with_paginator(mut self, paginator: OffsetPaginator) -> Self {
        self.paginator = paginator;
        self
    }

    /// Narrow every statement with `condition`
    pub fn filter(mut self, condition: SimpleExpr) -> Self {
        self.filters.push(condition);
        self
    }

    /// Order selected rows; calls accumulate
    pub fn order_by(mut self, column: &str, order: Order) -> Self {
        self.ordering.push((Alias::new(column), order));
        self
    }

    /// Base statements of the bound model, for building filters
    pub fn statements(&self) -> &ModelStatements<M> {
        &self.statements
    }

    /// Every matching row, unpaginated
    pub async fn fetch_all(&self) -> Result<Vec<M>, ViewError> {
        let stmt = self.ordered_select();
        Ok(self.session()?.load::<M>(&stmt).await?)
    }

    /// Stage `items` for insertion; they are written when the session flushes
    pub fn add_all<'a, I>(&self, items: I) -> Result<(), ViewError>
    where
        I: IntoIterator<Item = &'a M>,
    {
        self.session()?.add_all(items)?;
        Ok(())
    }

    /// Update the given columns on every matching row
    pub async fn update_all(&self, values: Vec<(&'static str, Value)>) -> Result<usize, ViewError> {
        if values.is_empty() {
            return Ok(0);
        }
        let mut stmt = self.update_stmt();
        for (column, value) in values {
            stmt.value(Alias::new(column), value);
        }
        Ok(self.session()?.execute(&stmt).await?)
    }

    /// Delete every matching row
    pub async fn delete_all(&self) -> Result<usize, ViewError> {
        let stmt = self.delete_stmt();
        Ok(self.session()?.execute(&stmt).await?)
    }

    /// Fetch the requested page, keeping its rows and neighbours on the view
    ///
    /// A page past [`OffsetPaginator::max_page`] is a bad request.
    pub async fn execute_select_stmt(&mut self) -> Result<&[M], ViewError> {
        if !self.paginator.contains_page(self.page) {
            return Err(ViewError::BadRequest(format!(
                "`{}` must be at most {}, got {}",
                PAGE_PARAM,
                self.paginator.max_page(),
                self.page
            )));
        }
        let session = self.session()?;
        let stmt = self.ordered_select();
        let OffsetPage {
            items,
            next,
            previous,
            ..
        } = self.paginator.get_page::<M>(&session, &stmt, self.page).await?;

        self.items = items;
        self.next = next;
        self.previous = previous;
        Ok(&self.items)
    }

    fn ordered_select(&self) -> SelectStatement {
        let mut stmt = self.select_stmt();
        if self.ordering.is_empty() {
            stmt.order_by(Alias::new(M::PRIMARY_KEY), Order::Asc);
        } else {
            for (column, order) in &self.ordering {
                stmt.order_by(column.clone(), order.clone());
            }
        }
        stmt
    }

    fn page_url(&self, page: Option<u64>) -> JsonValue {
        match page {
            Some(page) => JsonValue::String(self.scope.url_with_query(PAGE_PARAM, page)),
            None => JsonValue::Null,
        }
    }
}

impl<M: SqlModel + Serialize> ListView<M> {
    /// Fetch the page and fill `items`, `next_url` and `previous_url`
    ///
    /// Both url keys are always present; a missing neighbour is `null`.
    pub async fn prepare_context(&mut self) -> Result<&ViewContext, ViewError> {
        self.execute_select_stmt().await?;

        let items = serde_json::to_value(&self.items)?;
        let next_url = self.page_url(self.next);
        let previous_url = self.page_url(self.previous);

        self.context.insert("items", items);
        self.context.insert("next_url", next_url);
        self.context.insert("previous_url", previous_url);
        Ok(&self.context)
    }
}

impl<M: SqlModel> SessionBound for ListView<M> {
    fn scope(&self) -> &RequestScope {
        &self.scope
    }

    fn session_key(&self) -> &str {
        &self.session_key
    }
}

impl<M: SqlModel> StatementBuilder for ListView<M> {
    fn select_stmt(&self) -> SelectStatement {
        let mut stmt = self.statements.select_stmt();
        for condition in &self.filters {
            stmt.and_where(condition.clone());
        }
        stmt
    }

    fn update_stmt(&self) -> UpdateStatement {
        let mut stmt = self.statements.update_stmt();
        for condition in &self.filters {
            stmt.and_where(condition.clone());
        }
        stmt
    }

    fn delete_stmt(&self) -> DeleteStatement {
        let mut stmt = self.statements.delete_stmt();
        for condition in &self.filters {
            stmt.and_where(condition.clone());
        }
        stmt
    }
}

impl<M: SqlModel> Paginated for ListView<M> {
    fn paginator(&self) -> &OffsetPaginator {
        &self.paginator
    }

    fn page_number(&self) -> u64 {
        self.page
    }
}

#[async_trait]
impl<S, M> FromRequestParts<S> for ListView<M>
where
    S: Send + Sync,
    M: SqlModel,
{
    type Rejection = ViewError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let scope = RequestScope::from_parts(parts, state).await?;
        ListView::from_scope(scope)
    }
}
