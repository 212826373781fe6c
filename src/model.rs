//! Bound model trait and table metadata.
//!
//! A [`SqlModel`] describes the table a view works against: its name, its
//! primary key, the values an instance contributes to an insert or update,
//! and how rows are read back (through Diesel's `QueryableByName`).

use std::fmt;
use std::str::FromStr;

use diesel::QueryableByName;
use sea_query::{TableCreateStatement, Value};

use crate::constants::DEFAULT_KEY;
use crate::diesel_runtime::database::DbBackend;

/// A table-backed model that views can build statements for.
///
/// # Example
///
/// ```ignore
/// diesel::table! {
///     heroes (id) {
///         id -> Integer,
///         name -> Text,
///     }
/// }
///
/// #[derive(QueryableByName, Serialize)]
/// #[diesel(table_name = heroes)]
/// struct Hero {
///     id: i32,
///     name: String,
/// }
///
/// impl SqlModel for Hero {
///     type PrimaryKey = i32;
///     const TABLE: &'static str = "heroes";
///
///     fn primary_key(&self) -> i32 {
///         self.id
///     }
///
///     fn values(&self) -> Vec<(&'static str, Value)> {
///         vec![("id", self.id.into()), ("name", self.name.clone().into())]
///     }
/// }
/// ```
pub trait SqlModel: QueryableByName<DbBackend> + Send + Sync + Sized + 'static {
    /// Primary key type, parsed from the `pk` path parameter
    type PrimaryKey: FromStr + Into<Value> + Clone + fmt::Debug + Send + Sync + 'static;

    /// Table name
    const TABLE: &'static str;

    /// Primary key column
    const PRIMARY_KEY: &'static str = "id";

    /// Binding key of the database this model lives in
    const BIND_KEY: &'static str = DEFAULT_KEY;

    /// Primary key of this instance
    fn primary_key(&self) -> Self::PrimaryKey;

    /// Column/value pairs written on insert, primary key included
    fn values(&self) -> Vec<(&'static str, Value)>;

    /// Column/value pairs written on update (everything but the primary key)
    fn changes(&self) -> Vec<(&'static str, Value)> {
        self.values()
            .into_iter()
            .filter(|(column, _)| *column != Self::PRIMARY_KEY)
            .collect()
    }
}

/// Collection of table definitions created together by [`crate::init_db`]
#[derive(Clone, Default)]
pub struct Metadata {
    tables: Vec<TableCreateStatement>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table definition
    pub fn table(mut self, table: TableCreateStatement) -> Self {
        self.tables.push(table);
        self
    }

    pub fn tables(&self) -> &[TableCreateStatement] {
        &self.tables
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl fmt::Debug for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metadata")
            .field("tables", &self.tables.len())
            .finish()
    }
}
