//! Lookups for bound engines, factories and request sessions.

use diesel::connection::SimpleConnection;
use diesel::Connection;
use sea_query::SchemaStatementBuilder;

use crate::app::{App, BindingSource, RequestSource};
use crate::binding::BindError;
use crate::diesel_runtime::{Engine, Session, SessionError, SessionFactory, SqlBuilder};
use crate::model::Metadata;

/// Return the session factory bound under `key`
///
/// `source` is the [`App`] or a request routed through it. Returns
/// `Ok(None)` when nothing is bound under `key`.
pub fn get_session_factory<S: BindingSource + ?Sized>(
    source: &S,
    key: &str,
) -> Result<Option<SessionFactory>, BindError> {
    let namespace = source.app_namespace()?;
    Ok(namespace
        .get::<SessionFactory>(key)?
        .map(|factory| (*factory).clone()))
}

/// Return the engine behind the factory bound under `key`
pub fn get_engine<S: BindingSource + ?Sized>(source: &S, key: &str) -> Result<Engine, BindError> {
    get_session_factory(source, key)?
        .map(|factory| factory.engine().clone())
        .ok_or_else(|| BindError::UnknownKey(key.to_string()))
}

/// Return the session the middleware injected under `key`
///
/// Returns `Ok(None)` when the request carries no session under `key`, and
/// [`BindError::TypeMismatch`] when something other than a [`Session`] is
/// stored there.
pub fn get_session<R: RequestSource + ?Sized>(
    request: &R,
    key: &str,
) -> Result<Option<Session>, BindError> {
    match request.request_namespace() {
        None => Ok(None),
        Some(namespace) => Ok(namespace.get::<Session>(key)?.map(|session| (*session).clone())),
    }
}

/// Create every table in `metadata` on the database bound under `key`
///
/// All statements run in one transaction.
pub async fn init_db(app: &App, metadata: &Metadata, key: &str) -> Result<(), BindError> {
    let engine = get_engine(app, key)?;
    let statements: Vec<String> = metadata
        .tables()
        .iter()
        .map(|table| table.to_string(SqlBuilder::default()))
        .collect();
    let count = statements.len();

    tokio::task::spawn_blocking(move || -> Result<(), SessionError> {
        let mut conn = engine.get_connection()?;
        conn.transaction(|conn| {
            for sql in &statements {
                conn.batch_execute(sql)?;
            }
            Ok::<_, diesel::result::Error>(())
        })?;
        Ok(())
    })
    .await
    .map_err(SessionError::from)??;

    tracing::info!(key, tables = count, "initialized database schema");
    Ok(())
}
