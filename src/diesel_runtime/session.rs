//! Sessions and session factories
//!
//! A [`SessionFactory`] is the long-lived, shareable object stored on the
//! application. Each request gets its own [`Session`] from it. Diesel is
//! synchronous, so every statement a session runs is moved onto tokio's
//! blocking pool and awaited.

use std::fmt;
use std::sync::{Arc, Mutex};

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use sea_query::{InsertStatement, QueryStatementWriter, SelectStatement};

use crate::diesel_runtime::database::{DbConnection, Engine, PooledConnection, SqlBuilder};
use crate::model::SqlModel;

/// Error type for session operations
#[derive(Debug)]
pub enum SessionError {
    Pool(r2d2::Error),
    Database(diesel::result::Error),
    Statement(String),
    Closed,
    Poisoned,
    Join(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Pool(e) => write!(f, "Database pool error: {}", e),
            SessionError::Database(e) => write!(f, "Database error: {}", e),
            SessionError::Statement(msg) => write!(f, "Invalid statement: {}", msg),
            SessionError::Closed => write!(f, "Session is closed"),
            SessionError::Poisoned => write!(f, "Session connection lock is poisoned"),
            SessionError::Join(msg) => write!(f, "Blocking task failed: {}", msg),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<r2d2::Error> for SessionError {
    fn from(e: r2d2::Error) -> Self {
        SessionError::Pool(e)
    }
}

impl From<diesel::result::Error> for SessionError {
    fn from(e: diesel::result::Error) -> Self {
        SessionError::Database(e)
    }
}

impl From<tokio::task::JoinError> for SessionError {
    fn from(e: tokio::task::JoinError) -> Self {
        SessionError::Join(e.to_string())
    }
}

/// Behaviour shared by every session a factory creates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Flush staged inserts before running any other statement
    pub autoflush: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions { autoflush: true }
    }
}

/// Produces sessions bound to one engine
///
/// The engine is kept as an explicit field so it can be recovered with
/// [`SessionFactory::engine`].
#[derive(Debug, Clone)]
pub struct SessionFactory {
    engine: Engine,
    options: SessionOptions,
}

impl SessionFactory {
    pub fn new(engine: Engine) -> Self {
        Self::with_options(engine, SessionOptions::default())
    }

    pub fn with_options(engine: Engine, options: SessionOptions) -> Self {
        SessionFactory { engine, options }
    }

    /// Create a new session. No connection is checked out until the session
    /// runs its first statement.
    pub fn create(&self) -> Session {
        Session {
            inner: Arc::new(SessionInner {
                engine: self.engine.clone(),
                options: self.options,
                state: Mutex::new(SessionState::default()),
            }),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn options(&self) -> SessionOptions {
        self.options
    }
}

/// A unit of work against one pooled connection
///
/// Cloning a session yields another handle to the same connection and the
/// same staged inserts.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    engine: Engine,
    options: SessionOptions,
    state: Mutex<SessionState>,
}

#[derive(Default)]
struct SessionState {
    conn: Option<PooledConnection>,
    pending: Vec<String>,
    closed: bool,
}

impl SessionState {
    fn connection(&mut self, engine: &Engine) -> Result<&mut DbConnection, SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        if self.conn.is_none() {
            self.conn = Some(engine.get_connection()?);
        }
        match self.conn.as_mut() {
            Some(conn) => Ok(&mut **conn),
            None => Err(SessionError::Closed),
        }
    }
}

fn flush_pending(conn: &mut DbConnection, pending: &[String]) -> QueryResult<usize> {
    if pending.is_empty() {
        return Ok(0);
    }
    conn.transaction(|conn| {
        let mut affected = 0;
        for sql in pending {
            affected += diesel::sql_query(sql.as_str()).execute(conn)?;
        }
        Ok(affected)
    })
}

impl Session {
    /// Stage one model instance for insertion
    ///
    /// Nothing is written until [`Session::flush`] (or autoflush before the
    /// next statement).
    pub fn add<M: SqlModel>(&self, item: &M) -> Result<(), SessionError> {
        let sql = render(&insert_stmt(item)?);
        let mut state = self.lock()?;
        if state.closed {
            return Err(SessionError::Closed);
        }
        state.pending.push(sql);
        Ok(())
    }

    /// Stage many model instances for insertion
    pub fn add_all<'a, M, I>(&self, items: I) -> Result<(), SessionError>
    where
        M: SqlModel + 'a,
        I: IntoIterator<Item = &'a M>,
    {
        let staged = items
            .into_iter()
            .map(|item| insert_stmt(item).map(|stmt| render(&stmt)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut state = self.lock()?;
        if state.closed {
            return Err(SessionError::Closed);
        }
        state.pending.extend(staged);
        Ok(())
    }

    /// Number of staged inserts not yet written
    pub fn pending(&self) -> usize {
        self.lock().map(|state| state.pending.len()).unwrap_or(0)
    }

    /// Drop every staged insert
    ///
    /// Statements that already ran are not undone; use [`Session::begin`]
    /// for work that must roll back as a whole.
    pub fn expunge_pending(&self) {
        if let Ok(mut state) = self.lock() {
            state.pending.clear();
        }
    }

    /// Write staged inserts in one transaction, returning affected rows
    ///
    /// On failure nothing is written and every insert stays staged.
    pub async fn flush(&self) -> Result<usize, SessionError> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || -> Result<usize, SessionError> {
            let mut state = inner.state.lock().map_err(|_| SessionError::Poisoned)?;
            let pending = std::mem::take(&mut state.pending);
            let result = state
                .connection(&inner.engine)
                .and_then(|conn| Ok(flush_pending(conn, &pending)?));

            match result {
                Ok(affected) => {
                    tracing::debug!(statements = pending.len(), rows = affected, "flushed session");
                    Ok(affected)
                }
                Err(e) => {
                    state.pending = pending;
                    Err(e)
                }
            }
        })
        .await?
    }

    /// Alias of [`Session::flush`]; outside an explicit transaction every
    /// statement is committed as it runs.
    pub async fn commit(&self) -> Result<usize, SessionError> {
        self.flush().await
    }

    /// Run a closure against the session's connection on the blocking pool
    ///
    /// With autoflush, staged inserts are written first in their own
    /// transaction.
    pub async fn run<F, R>(&self, f: F) -> Result<R, SessionError>
    where
        F: FnOnce(&mut DbConnection) -> QueryResult<R> + Send + 'static,
        R: Send + 'static,
    {
        self.dispatch(false, f).await
    }

    /// Run a closure inside a transaction: committed when it returns `Ok`,
    /// rolled back otherwise
    ///
    /// With autoflush, staged inserts are written inside the same
    /// transaction, so a rollback undoes them too and leaves them staged.
    pub async fn begin<F, R>(&self, f: F) -> Result<R, SessionError>
    where
        F: FnOnce(&mut DbConnection) -> QueryResult<R> + Send + 'static,
        R: Send + 'static,
    {
        self.dispatch(true, f).await
    }

    async fn dispatch<F, R>(&self, transactional: bool, f: F) -> Result<R, SessionError>
    where
        F: FnOnce(&mut DbConnection) -> QueryResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || -> Result<R, SessionError> {
            let mut state = inner.state.lock().map_err(|_| SessionError::Poisoned)?;
            let pending = if inner.options.autoflush {
                std::mem::take(&mut state.pending)
            } else {
                Vec::new()
            };

            let mut flushed = false;
            let result = state.connection(&inner.engine).and_then(|conn| {
                let work = |conn: &mut DbConnection| -> QueryResult<R> {
                    flush_pending(conn, &pending)?;
                    flushed = true;
                    f(conn)
                };
                let out = if transactional {
                    conn.transaction(work)
                } else {
                    work(conn)
                };
                Ok(out?)
            });

            // Inserts survive unless they were committed
            if result.is_err() && (transactional || !flushed) {
                state.pending = pending;
            }
            result
        })
        .await?
    }

    /// Load every row a select statement returns
    pub async fn load<M>(&self, stmt: &SelectStatement) -> Result<Vec<M>, SessionError>
    where
        M: SqlModel,
    {
        let sql = render(stmt);
        self.run(move |conn| diesel::sql_query(sql).load::<M>(conn)).await
    }

    /// Load the first row a select statement returns
    pub async fn first<M>(&self, stmt: &SelectStatement) -> Result<Option<M>, SessionError>
    where
        M: SqlModel,
    {
        let mut stmt = stmt.clone();
        stmt.limit(1);
        Ok(self.load::<M>(&stmt).await?.into_iter().next())
    }

    /// Execute an insert/update/delete statement, returning affected rows
    pub async fn execute<S: QueryStatementWriter>(&self, stmt: &S) -> Result<usize, SessionError> {
        let sql = render(stmt);
        self.run(move |conn| diesel::sql_query(sql).execute(conn)).await
    }

    /// Execute raw SQL (possibly several `;`-separated statements)
    pub async fn batch_execute(&self, sql: impl Into<String>) -> Result<(), SessionError> {
        let sql = sql.into();
        self.run(move |conn| conn.batch_execute(&sql)).await
    }

    /// Return the connection to the pool and discard staged inserts
    pub fn close(&self) {
        let Ok(mut state) = self.lock() else {
            return;
        };
        if state.closed {
            return;
        }
        if !state.pending.is_empty() {
            tracing::warn!(
                discarded = state.pending.len(),
                "closing session with unflushed inserts"
            );
        }
        state.pending.clear();
        state.conn = None;
        state.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().map(|state| state.closed).unwrap_or(true)
    }

    /// Whether both handles point at the same underlying session
    pub fn ptr_eq(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn engine(&self) -> &Engine {
        &self.inner.engine
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, SessionState>, SessionError> {
        self.inner.state.lock().map_err(|_| SessionError::Poisoned)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("pending", &self.pending())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Render a statement for the active backend with values inlined
pub fn render<S: QueryStatementWriter>(stmt: &S) -> String {
    stmt.to_string(SqlBuilder::default())
}

fn insert_stmt<M: SqlModel>(item: &M) -> Result<InsertStatement, SessionError> {
    let values = item.values();
    let mut stmt = sea_query::Query::insert();
    stmt.into_table(sea_query::Alias::new(M::TABLE))
        .columns(values.iter().map(|(column, _)| sea_query::Alias::new(*column)));
    stmt.values(values.into_iter().map(|(_, value)| sea_query::SimpleExpr::from(value)))
        .map_err(|e| SessionError::Statement(e.to_string()))?;
    Ok(stmt)
}
