//! # axum-sqlmodel: pooled Diesel sessions for Axum handlers
//!
//! Binds a database session factory into an [`App`], opens one [`Session`] per
//! request through middleware, and offers composable CRUD views on top.
//!
//! ## Features
//!
//! - **Binding**: [`bind`] turns a database URL, [`Engine`] or [`SessionFactory`]
//!   into a keyed binding; [`setup`] registers bindings on an [`App`]
//! - **Per-request sessions**: [`session_middleware`] opens a session before the
//!   handler and closes it after the response
//! - **Accessors**: [`get_session_factory`], [`get_engine`], [`get_session`]
//! - **Views**: [`UnitView`] for one row addressed by `pk`, [`ListView`] for
//!   offset-paginated collections
//! - **Backends**: `sqlite` (default), `postgres` or `mysql` cargo features
//!
//! ## Example
//!
//! ```ignore
//! use axum::{routing::get, Router};
//! use axum_sqlmodel::{bind, setup, App, ListView, ViewContext, ViewError, DEFAULT_KEY};
//!
//! async fn list_heroes(mut view: ListView<Hero>) -> Result<ViewContext, ViewError> {
//!     view.prepare_context().await?;
//!     Ok(view.context)
//! }
//!
//! let mut app = App::new();
//! setup(&mut app, [bind("heroes.db", DEFAULT_KEY, true)?])?;
//! let router = app.into_router(Router::new().route("/heroes", get(list_heroes)));
//! ```

pub mod app;
pub mod binding;
pub mod constants;
pub mod middleware;
pub mod model;
pub mod pagination;
pub mod statements;
pub mod utils;
pub mod views;

// Diesel runtime infrastructure
pub mod diesel_runtime;

// Re-export key types
pub use app::{App, AppHandle, BindingSource, Namespace, RequestSource};
pub use binding::{bind, setup, BindError, BindTarget, Binding};
pub use constants::{DEFAULT_KEY, PAGE_PARAM, PK_PARAM};
pub use middleware::{session_middleware, SessionMiddleware};
pub use model::{Metadata, SqlModel};
pub use pagination::{OffsetPage, OffsetPaginator, Paginated, DEFAULT_PER_PAGE};
pub use statements::{ModelStatements, PrimaryKeyScoped, PrimaryKeyed, StatementBuilder};
pub use utils::{get_engine, get_session, get_session_factory, init_db};
pub use views::{
    DbSession, ListView, RequestScope, SessionBound, UnitView, ViewContext, ViewError,
};

// Re-export diesel_runtime types
pub use diesel_runtime::{
    DatabaseConfig, DbConnection, Engine, Session, SessionError, SessionFactory, SessionOptions,
};

// Re-exported so models and filters can be written without extra imports
pub use sea_query;
