//! Binding registration.
//!
//! [`bind`] normalizes a connection URL, engine or session factory into a
//! [`Binding`]; [`setup`] applies bindings to an [`App`].

use std::fmt;

use crate::app::App;
use crate::diesel_runtime::{
    DatabaseConfig, DbConnection, Engine, Session, SessionError, SessionFactory,
};
use crate::middleware::SessionMiddleware;

/// Error type for binding configuration and lookups
#[derive(Debug)]
pub enum BindError {
    DuplicateKey(String),
    UnsupportedTarget(String),
    TypeMismatch {
        key: String,
        expected: &'static str,
    },
    UnknownKey(String),
    NoApplication,
    Session(SessionError),
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindError::DuplicateKey(key) => {
                write!(f, "Key '{}' is already bound on this application", key)
            }
            BindError::UnsupportedTarget(what) => {
                write!(f, "{} is unsupported type of argument `target`", what)
            }
            BindError::TypeMismatch { key, expected } => {
                write!(f, "Value stored under '{}' is not {}", key, expected)
            }
            BindError::UnknownKey(key) => write!(f, "Nothing is bound under key '{}'", key),
            BindError::NoApplication => {
                write!(f, "Request was not routed through an application with bindings")
            }
            BindError::Session(e) => write!(f, "Session error: {}", e),
        }
    }
}

impl std::error::Error for BindError {}

impl From<SessionError> for BindError {
    fn from(e: SessionError) -> Self {
        BindError::Session(e)
    }
}

/// Anything [`bind`] may be called with
///
/// Only `Url`, `Engine` and `Factory` are accepted. An already-open
/// `Session` or a bare, unpooled `Connection` is always rejected.
pub enum BindTarget {
    Url(String),
    Engine(Engine),
    Factory(SessionFactory),
    Session(Session),
    Connection(DbConnection),
}

impl BindTarget {
    fn kind(&self) -> &'static str {
        match self {
            BindTarget::Url(_) => "Url",
            BindTarget::Engine(_) => "Engine",
            BindTarget::Factory(_) => "SessionFactory",
            BindTarget::Session(_) => "Session",
            BindTarget::Connection(_) => "Connection",
        }
    }
}

impl fmt::Debug for BindTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BindTarget::{}", self.kind())
    }
}

impl From<&str> for BindTarget {
    fn from(url: &str) -> Self {
        BindTarget::Url(url.to_string())
    }
}

impl From<String> for BindTarget {
    fn from(url: String) -> Self {
        BindTarget::Url(url)
    }
}

impl From<Engine> for BindTarget {
    fn from(engine: Engine) -> Self {
        BindTarget::Engine(engine)
    }
}

impl From<SessionFactory> for BindTarget {
    fn from(factory: SessionFactory) -> Self {
        BindTarget::Factory(factory)
    }
}

impl From<Session> for BindTarget {
    fn from(session: Session) -> Self {
        BindTarget::Session(session)
    }
}

impl From<DbConnection> for BindTarget {
    fn from(conn: DbConnection) -> Self {
        BindTarget::Connection(conn)
    }
}

/// A normalized `(factory, key, middleware)` triple ready for [`setup`]
#[derive(Debug, Clone)]
pub struct Binding {
    factory: SessionFactory,
    key: String,
    middleware: bool,
}

impl Binding {
    /// Bind a URL with custom pool settings
    pub fn with_config(
        url: &str,
        config: DatabaseConfig,
        key: &str,
        middleware: bool,
    ) -> Result<Self, BindError> {
        let url = checked_url(url)?;
        Ok(Binding {
            factory: SessionFactory::new(Engine::lazy(url, config)),
            key: key.to_string(),
            middleware,
        })
    }

    pub fn factory(&self) -> &SessionFactory {
        &self.factory
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn middleware(&self) -> bool {
        self.middleware
    }

    pub fn into_parts(self) -> (SessionFactory, String, bool) {
        (self.factory, self.key, self.middleware)
    }
}

fn checked_url(url: &str) -> Result<&str, BindError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(BindError::UnsupportedTarget("An empty URL".to_string()));
    }
    Ok(url)
}

/// Normalize `target` into a session factory bound under `key`
///
/// # Arguments
/// * `target` - database URL, [`Engine`] or [`SessionFactory`]
/// * `key` - binding key, usually [`crate::DEFAULT_KEY`]
/// * `middleware` - install the request-scoped session middleware
///
/// # Example
/// ```ignore
/// let binding = bind("postgres://localhost/heroes", DEFAULT_KEY, true)?;
/// ```
pub fn bind(
    target: impl Into<BindTarget>,
    key: &str,
    middleware: bool,
) -> Result<Binding, BindError> {
    let factory = match target.into() {
        BindTarget::Url(url) => {
            let url = checked_url(&url)?;
            SessionFactory::new(Engine::lazy(url, DatabaseConfig::default()))
        }
        BindTarget::Engine(engine) => SessionFactory::new(engine),
        BindTarget::Factory(factory) => factory,
        other => return Err(BindError::UnsupportedTarget(other.kind().to_string())),
    };

    Ok(Binding {
        factory,
        key: key.to_string(),
        middleware,
    })
}

/// Register bindings on an application
///
/// Fails on the first binding whose key is already present; bindings before
/// it stay registered.
pub fn setup(app: &mut App, binds: impl IntoIterator<Item = Binding>) -> Result<(), BindError> {
    for binding in binds {
        let (factory, key, middleware) = binding.into_parts();
        if app.contains_key(&key) {
            return Err(BindError::DuplicateKey(key));
        }

        app.insert(key.clone(), factory.clone())?;
        if middleware {
            app.push_middleware(SessionMiddleware::new(&key, factory));
        }
        tracing::info!(key = %key, middleware, "registered database binding");
    }
    Ok(())
}
