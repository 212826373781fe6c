//! Single-row view addressed by the `pk` path parameter.

use std::borrow::Cow;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use sea_query::{Alias, DeleteStatement, SelectStatement, UpdateStatement, Value};

use crate::constants::PK_PARAM;
use crate::model::SqlModel;
use crate::statements::{ModelStatements, PrimaryKeyScoped, PrimaryKeyed, StatementBuilder};
use crate::views::{RequestScope, SessionBound, ViewContext, ViewError};

/// View over the one row of `M` whose primary key matches the route's `pk`
///
/// Every statement it builds carries exactly one primary-key equality
/// filter.
///
/// # Example
/// ```ignore
/// async fn get_hero(mut view: UnitView<Hero>) -> Result<Json<Hero>, ViewError> {
///     view.fetch().await?.map(Json).ok_or(ViewError::NotFound)
/// }
///
/// let app = Router::new().route("/heroes/:pk", get(get_hero));
/// ```
#[derive(Debug)]
pub struct UnitView<M: SqlModel> {
    scope: RequestScope,
    session_key: Cow<'static, str>,
    pk: M::PrimaryKey,
    statements: PrimaryKeyScoped<ModelStatements<M>>,
    pub item: Option<M>,
    pub context: ViewContext,
}

impl<M: SqlModel> UnitView<M> {
    /// Build the view from a request scope, parsing `pk` from the path
    pub fn from_scope(scope: RequestScope) -> Result<Self, ViewError> {
        let raw = scope
            .param(PK_PARAM)
            .ok_or_else(|| ViewError::BadRequest(format!("missing path parameter `{}`", PK_PARAM)))?;
        let pk: M::PrimaryKey = raw
            .parse()
            .map_err(|_| ViewError::BadRequest(format!("invalid primary key `{}`", raw)))?;

        Ok(UnitView {
            statements: PrimaryKeyScoped::new(ModelStatements::new(), M::PRIMARY_KEY, pk.clone()),
            scope,
            session_key: Cow::Borrowed(M::BIND_KEY),
            pk,
            item: None,
            context: ViewContext::new(),
        })
    }

    /// Read the session from another binding key
    pub fn with_session_key(mut self, key: impl Into<String>) -> Self {
        self.session_key = Cow::Owned(key.into());
        self
    }

    /// Load the row, keeping it in `item`
    pub async fn fetch(&mut self) -> Result<Option<&M>, ViewError> {
        let stmt = self.select_stmt();
        self.item = self.session()?.first::<M>(&stmt).await?;
        Ok(self.item.as_ref())
    }

    /// Stage `item` for insertion; it is written when the session flushes
    pub fn add(&self, item: &M) -> Result<(), ViewError> {
        self.session()?.add(item)?;
        Ok(())
    }

    /// Overwrite every non-key column of the row with `item`'s values
    pub async fn edit(&self, item: &M) -> Result<usize, ViewError> {
        self.update(item.changes()).await
    }

    /// Update the given columns of the row
    pub async fn update(&self, values: Vec<(&'static str, Value)>) -> Result<usize, ViewError> {
        if values.is_empty() {
            return Ok(0);
        }
        let mut stmt = self.update_stmt();
        for (column, value) in values {
            stmt.value(Alias::new(column), value);
        }
        Ok(self.session()?.execute(&stmt).await?)
    }

    /// Delete the row
    pub async fn delete(&self) -> Result<usize, ViewError> {
        let stmt = self.delete_stmt();
        Ok(self.session()?.execute(&stmt).await?)
    }
}

impl<M: SqlModel> SessionBound for UnitView<M> {
    fn scope(&self) -> &RequestScope {
        &self.scope
    }

    fn session_key(&self) -> &str {
        &self.session_key
    }
}

impl<M: SqlModel> StatementBuilder for UnitView<M> {
    fn select_stmt(&self) -> SelectStatement {
        self.statements.select_stmt()
    }

    fn update_stmt(&self) -> UpdateStatement {
        self.statements.update_stmt()
    }

    fn delete_stmt(&self) -> DeleteStatement {
        self.statements.delete_stmt()
    }
}

impl<M: SqlModel> PrimaryKeyed for UnitView<M> {
    type Key = M::PrimaryKey;

    fn pk_column(&self) -> &'static str {
        M::PRIMARY_KEY
    }

    fn pk(&self) -> &M::PrimaryKey {
        &self.pk
    }
}

#[async_trait]
impl<S, M> FromRequestParts<S> for UnitView<M>
where
    S: Send + Sync,
    M: SqlModel,
{
    type Rejection = ViewError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let scope = RequestScope::from_parts(parts, state).await?;
        UnitView::from_scope(scope)
    }
}
