//! Composable CRUD views.
//!
//! Views are axum extractors. Each one combines small capabilities:
//!
//! - [`SessionBound`]: reach the request's database session
//! - [`StatementBuilder`](crate::statements::StatementBuilder): build select/update/delete
//! - [`PrimaryKeyed`](crate::statements::PrimaryKeyed): single row addressed by `pk`
//! - [`Paginated`](crate::pagination::Paginated): offset pages of a list
//!
//! [`UnitView`] works on one row, [`ListView`] on a collection, and
//! [`DbSession`] only hands out the session.

pub mod context;
pub mod error;
pub mod list;
pub mod unit;

pub use context::{DbSession, RequestScope, SessionBound, ViewContext};
pub use error::ViewError;
pub use list::ListView;
pub use unit::UnitView;
