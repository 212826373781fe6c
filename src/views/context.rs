//! Request scope, view context and the session capability.

use std::collections::HashMap;
use std::ops::Deref;

use axum::async_trait;
use axum::extract::rejection::RawPathParamsRejection;
use axum::extract::{FromRequestParts, OriginalUri, Query, RawPathParams};
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::app::{AppHandle, BindingSource, Namespace, RequestSource};
use crate::binding::BindError;
use crate::constants::DEFAULT_KEY;
use crate::diesel_runtime::Session;
use crate::utils::get_session;
use crate::views::ViewError;

/// What a view needs from the incoming request, detached from its body
#[derive(Debug, Clone)]
pub struct RequestScope {
    path: String,
    query: HashMap<String, String>,
    params: HashMap<String, String>,
    namespace: Option<Namespace>,
    app: Option<AppHandle>,
}

impl RequestScope {
    pub async fn from_parts<S: Send + Sync>(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Self, ViewError> {
        let params = match RawPathParams::from_request_parts(parts, state).await {
            Ok(raw) => raw
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            // Not routed, so there is nothing to capture
            Err(RawPathParamsRejection::MissingPathParams(_)) => HashMap::new(),
            Err(e) => return Err(ViewError::BadRequest(e.body_text())),
        };
        let Query(query) = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
            .map_err(|e| ViewError::BadRequest(e.body_text()))?;

        // Nested routers see the uri with their prefix stripped
        let path = match parts.extensions.get::<OriginalUri>() {
            Some(OriginalUri(uri)) => uri.path().to_string(),
            None => parts.uri.path().to_string(),
        };

        Ok(RequestScope {
            path,
            query,
            params,
            namespace: parts.extensions.get::<Namespace>().cloned(),
            app: parts.extensions.get::<AppHandle>().cloned(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query string parameter
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Path parameter captured by the matched route
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// The current route with a single query parameter
    pub fn url_with_query(&self, name: &str, value: impl std::fmt::Display) -> String {
        format!("{}?{}={}", self.path, name, value)
    }
}

impl RequestSource for RequestScope {
    fn request_namespace(&self) -> Option<&Namespace> {
        self.namespace.as_ref()
    }
}

impl BindingSource for RequestScope {
    fn app_namespace(&self) -> Result<&Namespace, BindError> {
        self.app
            .as_ref()
            .map(AppHandle::namespace)
            .ok_or(BindError::NoApplication)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestScope
where
    S: Send + Sync,
{
    type Rejection = ViewError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        RequestScope::from_parts(parts, state).await
    }
}

/// Values a view hands to its response
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ViewContext(Map<String, Value>);

impl ViewContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Serialize `value` into the context
    pub fn insert_serialized<T: Serialize + ?Sized>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<(), ViewError> {
        self.0.insert(key.into(), serde_json::to_value(value)?);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn into_json(self) -> Value {
        Value::Object(self.0)
    }
}

impl IntoResponse for ViewContext {
    fn into_response(self) -> Response {
        Json(self.into_json()).into_response()
    }
}

/// Access to the database session the middleware injected
pub trait SessionBound {
    fn scope(&self) -> &RequestScope;

    /// Binding key this view reads its session from
    fn session_key(&self) -> &str;

    fn session(&self) -> Result<Session, ViewError> {
        self.session_with_key(self.session_key())
    }

    fn session_with_key(&self, key: &str) -> Result<Session, ViewError> {
        get_session(self.scope(), key)?.ok_or_else(|| ViewError::MissingSession(key.to_string()))
    }
}

/// Extractor yielding the session bound under [`DEFAULT_KEY`]
#[derive(Debug, Clone)]
pub struct DbSession {
    scope: RequestScope,
    session: Session,
}

impl DbSession {
    pub fn into_inner(self) -> Session {
        self.session
    }
}

impl SessionBound for DbSession {
    fn scope(&self) -> &RequestScope {
        &self.scope
    }

    fn session_key(&self) -> &str {
        DEFAULT_KEY
    }
}

impl Deref for DbSession {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for DbSession
where
    S: Send + Sync,
{
    type Rejection = ViewError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let scope = RequestScope::from_parts(parts, state).await?;
        let session = get_session(&scope, DEFAULT_KEY)?
            .ok_or_else(|| ViewError::MissingSession(DEFAULT_KEY.to_string()))?;
        Ok(DbSession { scope, session })
    }
}
