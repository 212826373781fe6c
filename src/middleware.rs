//! Request-scoped session middleware.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::app::Namespace;
use crate::diesel_runtime::SessionFactory;

/// State of one session middleware layer: which key to inject under and
/// which factory to draw sessions from
#[derive(Clone, Debug)]
pub struct SessionMiddleware {
    key: Arc<str>,
    factory: SessionFactory,
}

impl SessionMiddleware {
    pub fn new(key: &str, factory: SessionFactory) -> Self {
        SessionMiddleware {
            key: Arc::from(key),
            factory,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn factory(&self) -> &SessionFactory {
        &self.factory
    }
}

/// Inject a fresh session under the middleware's key, run the rest of the
/// chain, then close the session.
pub async fn session_middleware(
    State(binding): State<SessionMiddleware>,
    mut request: Request,
    next: Next,
) -> Response {
    let session = binding.factory.create();

    let extensions = request.extensions_mut();
    match extensions.get_mut::<Namespace>() {
        Some(namespace) => namespace.set(binding.key(), session.clone()),
        None => {
            let mut namespace = Namespace::new();
            namespace.set(binding.key(), session.clone());
            extensions.insert(namespace);
        }
    }
    tracing::debug!(key = binding.key(), "opened request session");

    let response = next.run(request).await;

    session.close();
    tracing::debug!(key = binding.key(), status = %response.status(), "closed request session");
    response
}
