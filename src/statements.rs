//! Statement builders.
//!
//! [`ModelStatements`] produces the unfiltered select/update/delete for a
//! model. [`PrimaryKeyScoped`] wraps any [`StatementBuilder`] and narrows
//! every statement to a single row.

use std::fmt;
use std::marker::PhantomData;

use sea_query::{
    Alias, Asterisk, ConditionalStatement, DeleteStatement, Expr, Func, LikeExpr, Order, Query,
    SelectStatement, SimpleExpr, UpdateStatement, Value,
};

use crate::model::SqlModel;

/// Builds the three statement kinds a view works with
pub trait StatementBuilder {
    fn select_stmt(&self) -> SelectStatement;
    fn update_stmt(&self) -> UpdateStatement;
    fn delete_stmt(&self) -> DeleteStatement;
}

/// Unfiltered statements against `M::TABLE`
pub struct ModelStatements<M> {
    _model: PhantomData<fn() -> M>,
}

impl<M: SqlModel> ModelStatements<M> {
    pub fn new() -> Self {
        ModelStatements {
            _model: PhantomData,
        }
    }

    pub fn table(&self) -> Alias {
        Alias::new(M::TABLE)
    }

    /// `column LIKE pattern`, with an optional escape character
    pub fn like(&self, column: &str, pattern: &str, escape: Option<char>) -> SimpleExpr {
        Expr::col((self.table(), Alias::new(column))).like(like_expr(pattern, escape))
    }

    /// Case-insensitive `LIKE`, portable across backends
    pub fn ilike(&self, column: &str, pattern: &str, escape: Option<char>) -> SimpleExpr {
        Expr::expr(Func::lower(Expr::col((self.table(), Alias::new(column)))))
            .like(like_expr(&pattern.to_lowercase(), escape))
    }

    /// Ascending ordering on a column of this model
    pub fn asc(&self, column: &str) -> (Alias, Order) {
        (Alias::new(column), Order::Asc)
    }

    /// Descending ordering on a column of this model
    pub fn desc(&self, column: &str) -> (Alias, Order) {
        (Alias::new(column), Order::Desc)
    }
}

fn like_expr(pattern: &str, escape: Option<char>) -> LikeExpr {
    let like = LikeExpr::new(pattern);
    match escape {
        Some(c) => like.escape(c),
        None => like,
    }
}

impl<M: SqlModel> StatementBuilder for ModelStatements<M> {
    fn select_stmt(&self) -> SelectStatement {
        Query::select().column(Asterisk).from(self.table()).to_owned()
    }

    fn update_stmt(&self) -> UpdateStatement {
        Query::update().table(self.table()).to_owned()
    }

    fn delete_stmt(&self) -> DeleteStatement {
        Query::delete().from_table(self.table()).to_owned()
    }
}

impl<M: SqlModel> Default for ModelStatements<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Clone for ModelStatements<M> {
    fn clone(&self) -> Self {
        ModelStatements {
            _model: PhantomData,
        }
    }
}

impl<M: SqlModel> fmt::Debug for ModelStatements<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelStatements")
            .field("table", &M::TABLE)
            .finish()
    }
}

/// Adds exactly one `column = value` filter to every statement of `base`
#[derive(Debug, Clone)]
pub struct PrimaryKeyScoped<B> {
    base: B,
    column: &'static str,
    value: Value,
}

impl<B: StatementBuilder> PrimaryKeyScoped<B> {
    pub fn new(base: B, column: &'static str, value: impl Into<Value>) -> Self {
        PrimaryKeyScoped {
            base,
            column,
            value: value.into(),
        }
    }

    pub fn base(&self) -> &B {
        &self.base
    }

    pub fn column(&self) -> &'static str {
        self.column
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    fn condition(&self) -> SimpleExpr {
        Expr::col(Alias::new(self.column)).eq(self.value.clone())
    }
}

impl<B: StatementBuilder> StatementBuilder for PrimaryKeyScoped<B> {
    fn select_stmt(&self) -> SelectStatement {
        self.base
            .select_stmt()
            .and_where(self.condition())
            .to_owned()
    }

    fn update_stmt(&self) -> UpdateStatement {
        self.base
            .update_stmt()
            .and_where(self.condition())
            .to_owned()
    }

    fn delete_stmt(&self) -> DeleteStatement {
        self.base
            .delete_stmt()
            .and_where(self.condition())
            .to_owned()
    }
}

/// Primary key column and value of a single-row view
pub trait PrimaryKeyed {
    type Key;

    fn pk_column(&self) -> &'static str;
    fn pk(&self) -> &Self::Key;
}
