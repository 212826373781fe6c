//! Application and request namespaces.
//!
//! Bindings are addressed by string key so several databases can coexist in
//! one application. Both the application and each request carry a
//! [`Namespace`]: a string-keyed map of type-erased values with typed lookup.

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use axum::extract::Request;
use axum::http::request::Parts;
use axum::middleware::from_fn_with_state;
use axum::{Extension, Router};

use crate::binding::BindError;
use crate::middleware::{session_middleware, SessionMiddleware};

/// String-keyed store of shared values
#[derive(Clone, Default)]
pub struct Namespace {
    values: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value under a key that must not exist yet
    pub fn insert<T: Any + Send + Sync>(
        &mut self,
        key: impl Into<String>,
        value: T,
    ) -> Result<(), BindError> {
        let key = key.into();
        if self.values.contains_key(&key) {
            return Err(BindError::DuplicateKey(key));
        }
        self.values.insert(key, Arc::new(value));
        Ok(())
    }

    /// Insert or replace a value
    pub fn set<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Arc::new(value));
    }

    /// Typed lookup
    ///
    /// Returns `Ok(None)` when nothing is stored under `key` and
    /// [`BindError::TypeMismatch`] when the stored value is not a `T`.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Result<Option<Arc<T>>, BindError> {
        match self.values.get(key) {
            None => Ok(None),
            Some(value) => value
                .clone()
                .downcast::<T>()
                .map(Some)
                .map_err(|_| BindError::TypeMismatch {
                    key: key.to_string(),
                    expected: type_name::<T>(),
                }),
        }
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.keys().collect();
        keys.sort_unstable();
        f.debug_struct("Namespace").field("keys", &keys).finish()
    }
}

/// Frozen application namespace, reachable from every request routed
/// through [`App::into_router`]
#[derive(Clone, Debug)]
pub struct AppHandle(Arc<Namespace>);

impl AppHandle {
    pub fn namespace(&self) -> &Namespace {
        &self.0
    }
}

/// Application being configured: bindings plus the session middlewares
/// they asked for
#[derive(Debug, Default)]
pub struct App {
    namespace: Namespace,
    middlewares: Vec<SessionMiddleware>,
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an arbitrary shared value; keys are unique
    pub fn insert<T: Any + Send + Sync>(
        &mut self,
        key: impl Into<String>,
        value: T,
    ) -> Result<(), BindError> {
        self.namespace.insert(key, value)
    }

    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Result<Option<Arc<T>>, BindError> {
        self.namespace.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.namespace.contains_key(key)
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn middlewares(&self) -> &[SessionMiddleware] {
        &self.middlewares
    }

    pub(crate) fn push_middleware(&mut self, middleware: SessionMiddleware) {
        self.middlewares.push(middleware);
    }

    /// Wrap a router with the registered session middlewares
    ///
    /// The first registered middleware is the outermost one. Every request
    /// also receives an [`AppHandle`] extension.
    pub fn into_router(self, router: Router) -> Router {
        let App {
            namespace,
            middlewares,
        } = self;

        let mut router = router;
        for middleware in middlewares.into_iter().rev() {
            router = router.layer(from_fn_with_state(middleware, session_middleware));
        }
        router.layer(Extension(AppHandle(Arc::new(namespace))))
    }
}

/// Something bindings can be looked up from: the application itself or a
/// request routed through it
pub trait BindingSource {
    fn app_namespace(&self) -> Result<&Namespace, BindError>;
}

impl BindingSource for App {
    fn app_namespace(&self) -> Result<&Namespace, BindError> {
        Ok(&self.namespace)
    }
}

impl BindingSource for AppHandle {
    fn app_namespace(&self) -> Result<&Namespace, BindError> {
        Ok(self.namespace())
    }
}

impl BindingSource for Parts {
    fn app_namespace(&self) -> Result<&Namespace, BindError> {
        self.extensions
            .get::<AppHandle>()
            .map(AppHandle::namespace)
            .ok_or(BindError::NoApplication)
    }
}

impl BindingSource for Request {
    fn app_namespace(&self) -> Result<&Namespace, BindError> {
        self.extensions()
            .get::<AppHandle>()
            .map(AppHandle::namespace)
            .ok_or(BindError::NoApplication)
    }
}

/// Something carrying a per-request namespace
pub trait RequestSource {
    /// `None` when no middleware stored anything on this request
    fn request_namespace(&self) -> Option<&Namespace>;
}

impl RequestSource for Parts {
    fn request_namespace(&self) -> Option<&Namespace> {
        self.extensions.get::<Namespace>()
    }
}

impl RequestSource for Request {
    fn request_namespace(&self) -> Option<&Namespace> {
        self.extensions().get::<Namespace>()
    }
}
