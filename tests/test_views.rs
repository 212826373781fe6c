//! Integration tests for request sessions and CRUD views
//!
//! Each test binds a fresh SQLite database in a temporary directory and
//! drives an axum router end to end.

#![cfg(feature = "sqlite")]

use std::sync::{Arc, Mutex};

use axum::body::{to_bytes, Body};
use axum::extract::Extension;
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use diesel::sql_types::{Integer, Nullable, Text};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tower::ServiceExt;

use axum_sqlmodel::sea_query::{Alias, ColumnDef, Table, Value};
use axum_sqlmodel::{
    bind, get_session, get_session_factory, init_db, setup, App, DbSession, ListView, Metadata,
    OffsetPaginator, RequestScope, Session, SessionBound, SqlModel, UnitView, ViewContext,
    ViewError, DEFAULT_KEY,
};

#[derive(Debug, Clone, PartialEq, diesel::QueryableByName, Serialize, Deserialize)]
struct Hero {
    #[diesel(sql_type = Integer)]
    id: i32,
    #[diesel(sql_type = Text)]
    name: String,
    #[diesel(sql_type = Nullable<Integer>)]
    age: Option<i32>,
}

impl SqlModel for Hero {
    type PrimaryKey = i32;
    const TABLE: &'static str = "heroes";

    fn primary_key(&self) -> i32 {
        self.id
    }

    fn values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", self.id.into()),
            ("name", self.name.clone().into()),
            ("age", self.age.into()),
        ]
    }
}

fn hero(id: i32, name: &str) -> Hero {
    Hero {
        id,
        name: name.to_string(),
        age: Some(20 + id),
    }
}

fn metadata() -> Metadata {
    Metadata::new().table(
        Table::create()
            .table(Alias::new(Hero::TABLE))
            .if_not_exists()
            .col(ColumnDef::new(Alias::new("id")).integer().not_null().primary_key())
            .col(ColumnDef::new(Alias::new("name")).string().not_null())
            .col(ColumnDef::new(Alias::new("age")).integer().null())
            .to_owned(),
    )
}

// Handlers

/// Narrow to heroes whose name starts with `?name=`, if given
fn named(view: ListView<Hero>) -> ListView<Hero> {
    match view.scope().query("name").map(str::to_string) {
        Some(name) => {
            let condition = view.statements().ilike("name", &format!("{}%", name), None);
            view.filter(condition)
        }
        None => view,
    }
}

async fn list_heroes(view: ListView<Hero>) -> Result<ViewContext, ViewError> {
    let mut view = named(view.with_paginator(OffsetPaginator::new(2)));
    view.prepare_context().await?;
    Ok(view.context)
}

#[derive(Deserialize)]
struct AgeUpdate {
    age: i32,
}

async fn update_heroes(view: ListView<Hero>, Json(update): Json<AgeUpdate>) -> Result<Json<JsonValue>, ViewError> {
    let updated = named(view).update_all(vec![("age", update.age.into())]).await?;
    Ok(Json(json!({ "updated": updated })))
}

async fn delete_heroes(view: ListView<Hero>) -> Result<Json<JsonValue>, ViewError> {
    let deleted = named(view).delete_all().await?;
    Ok(Json(json!({ "deleted": deleted })))
}

async fn get_hero(mut view: UnitView<Hero>) -> Result<Json<Hero>, ViewError> {
    view.fetch().await?.cloned().map(Json).ok_or(ViewError::NotFound)
}

async fn edit_hero(view: UnitView<Hero>, Json(hero): Json<Hero>) -> Result<Json<JsonValue>, ViewError> {
    let updated = view.edit(&hero).await?;
    Ok(Json(json!({ "updated": updated })))
}

async fn delete_hero(view: UnitView<Hero>) -> Result<Json<JsonValue>, ViewError> {
    let deleted = view.delete().await?;
    Ok(Json(json!({ "deleted": deleted })))
}

/// Stage a hero and return without flushing
async fn stage_only(session: DbSession, Json(hero): Json<Hero>) -> Result<Json<JsonValue>, ViewError> {
    session.add(&hero)?;
    Ok(Json(json!({ "pending": session.pending() })))
}

/// Stage a hero, then read through the same session
async fn stage_then_read(view: ListView<Hero>, Json(hero): Json<Hero>) -> Result<Json<JsonValue>, ViewError> {
    view.add_all([&hero])?;
    let seen = view.fetch_all().await?.len();
    Ok(Json(json!({ "seen": seen })))
}

async fn session_lookup(scope: RequestScope) -> Result<Json<JsonValue>, ViewError> {
    let main = get_session(&scope, DEFAULT_KEY)?;
    let audit = get_session(&scope, AUDIT_KEY)?;
    let distinct = match (&main, &audit) {
        (Some(main), Some(audit)) => !main.ptr_eq(audit),
        _ => false,
    };
    Ok(Json(json!({
        "default": main.is_some(),
        "audit": audit.is_some(),
        "other": get_session(&scope, "other")?.is_some(),
        "distinct": distinct,
    })))
}

async fn remember_session(
    Extension(slot): Extension<Arc<Mutex<Option<Session>>>>,
    session: DbSession,
) -> StatusCode {
    *slot.lock().unwrap() = Some(session.into_inner());
    StatusCode::OK
}

// Helpers

struct TestApp {
    _dir: tempfile::TempDir,
    router: Router,
    slot: Arc<Mutex<Option<Session>>>,
}

const AUDIT_KEY: &str = "audit";

fn sqlite_url(dir: &tempfile::TempDir, name: &str) -> String {
    dir.path().join(name).to_string_lossy().into_owned()
}

fn routes() -> Router {
    Router::new()
        .route("/heroes", get(list_heroes).patch(update_heroes).delete(delete_heroes))
        .route("/heroes/:pk", get(get_hero).put(edit_hero).delete(delete_hero))
        .route("/stage", post(stage_only))
        .route("/stage-read", post(stage_then_read))
        .route("/lookup", get(session_lookup))
        .route("/remember", get(remember_session))
}

async fn test_app(seed: &[Hero]) -> TestApp {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let url = sqlite_url(&dir, "heroes.sqlite");

    let mut app = App::new();
    setup(&mut app, [bind(url, DEFAULT_KEY, true).expect("Failed to bind")])
        .expect("Failed to set up binding");
    seed_heroes(&app, seed).await;

    let slot = Arc::new(Mutex::new(None));
    let router = app.into_router(routes()).layer(Extension(slot.clone()));

    TestApp {
        _dir: dir,
        router,
        slot,
    }
}

async fn seed_heroes(app: &App, seed: &[Hero]) {
    init_db(app, &metadata(), DEFAULT_KEY)
        .await
        .expect("Failed to create schema");

    if !seed.is_empty() {
        let factory = get_session_factory(app, DEFAULT_KEY)
            .unwrap()
            .expect("Factory should be bound");
        let session = factory.create();
        session.add_all(seed).unwrap();
        assert_eq!(session.commit().await.unwrap(), seed.len());
        session.close();
    }
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<JsonValue>) -> (StatusCode, JsonValue) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(body) => {
            builder = builder.header("content-type", "application/json");
            Body::from(body.to_string())
        }
        None => Body::empty(),
    };

    let response = router
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        JsonValue::Null
    } else {
        serde_json::from_slice(&bytes).expect("Response should be JSON")
    };
    (status, json)
}

fn ids(context: &JsonValue) -> Vec<i64> {
    context["items"]
        .as_array()
        .expect("items should be an array")
        .iter()
        .map(|item| item["id"].as_i64().unwrap())
        .collect()
}

// Tests

#[tokio::test]
async fn test_pages_follow_next_url() {
    let seed: Vec<Hero> = (1..=5).map(|id| hero(id, &format!("hero-{}", id))).collect();
    let app = test_app(&seed).await;

    let (status, first) = send(&app.router, "GET", "/heroes", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&first), vec![1, 2]);
    assert_eq!(first["next_url"], json!("/heroes?page_key=2"));
    assert_eq!(first["previous_url"], JsonValue::Null);

    let next = first["next_url"].as_str().unwrap();
    let (_, second) = send(&app.router, "GET", next, None).await;
    assert_eq!(ids(&second), vec![3, 4]);
    assert_eq!(second["previous_url"], json!("/heroes?page_key=1"));

    let next = second["next_url"].as_str().unwrap();
    let (_, third) = send(&app.router, "GET", next, None).await;
    assert_eq!(ids(&third), vec![5]);
    assert_eq!(third["next_url"], JsonValue::Null);
    assert_eq!(third["previous_url"], json!("/heroes?page_key=2"));
}

#[tokio::test]
async fn test_empty_list_has_null_markers() {
    let app = test_app(&[]).await;

    let (status, context) = send(&app.router, "GET", "/heroes", None).await;
    assert_eq!(status, StatusCode::OK);

    let object = context.as_object().unwrap();
    assert!(object.contains_key("next_url"), "next_url must always be present");
    assert!(object.contains_key("previous_url"), "previous_url must always be present");
    assert_eq!(context["items"], json!([]));
    assert_eq!(context["next_url"], JsonValue::Null);
    assert_eq!(context["previous_url"], JsonValue::Null);
}

#[tokio::test]
async fn test_invalid_page_is_bad_request() {
    let app = test_app(&[]).await;

    let (status, body) = send(&app.router, "GET", "/heroes?page_key=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("page_key"));
}

#[tokio::test]
async fn test_list_filter() {
    let app = test_app(&[hero(1, "Deadpond"), hero(2, "Spider-Boy"), hero(3, "deadlock")]).await;

    let (_, context) = send(&app.router, "GET", "/heroes?name=DEAD", None).await;
    assert_eq!(ids(&context), vec![1, 3]);
    assert_eq!(context["next_url"], JsonValue::Null);
}

#[tokio::test]
async fn test_unit_view_crud() {
    let app = test_app(&[hero(1, "Deadpond"), hero(2, "Spider-Boy")]).await;

    let (status, body) = send(&app.router, "GET", "/heroes/2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], json!("Spider-Boy"));

    let edited = json!({ "id": 2, "name": "Spider-Man", "age": null });
    let (status, body) = send(&app.router, "PUT", "/heroes/2", Some(edited)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], json!(1));

    let (_, body) = send(&app.router, "GET", "/heroes/2", None).await;
    assert_eq!(body["name"], json!("Spider-Man"));
    assert_eq!(body["age"], JsonValue::Null);

    // Only the addressed row is touched
    let (_, body) = send(&app.router, "GET", "/heroes/1", None).await;
    assert_eq!(body["name"], json!("Deadpond"));

    let (_, body) = send(&app.router, "DELETE", "/heroes/2", None).await;
    assert_eq!(body["deleted"], json!(1));

    let (status, _) = send(&app.router, "GET", "/heroes/2", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(&app.router, "GET", "/heroes", None).await;
    assert_eq!(ids(&body), vec![1]);
}

#[tokio::test]
async fn test_unparsable_pk_is_bad_request() {
    let app = test_app(&[]).await;

    let (status, _) = send(&app.router, "GET", "/heroes/not-a-number", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_add_without_flush_is_discarded() {
    let app = test_app(&[]).await;

    let (status, body) = send(&app.router, "POST", "/stage", Some(json!(hero(7, "Rusty-Man")))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pending"], json!(1));

    let (status, _) = send(&app.router, "GET", "/heroes/7", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_autoflush_before_read() {
    let app = test_app(&[hero(1, "Deadpond")]).await;

    let (status, body) = send(&app.router, "POST", "/stage-read", Some(json!(hero(8, "Tarantula")))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["seen"], json!(2));

    let (status, _) = send(&app.router, "GET", "/heroes/8", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_get_session_by_key() {
    let app = test_app(&[]).await;

    let (_, body) = send(&app.router, "GET", "/lookup", None).await;
    assert_eq!(body["default"], json!(true));
    assert_eq!(body["audit"], json!(false));
    assert_eq!(body["other"], json!(false));
}

#[tokio::test]
async fn test_session_closed_after_response() {
    let app = test_app(&[]).await;

    let (status, _) = send(&app.router, "GET", "/remember", None).await;
    assert_eq!(status, StatusCode::OK);

    let session = app.slot.lock().unwrap().take().expect("Handler should store its session");
    assert!(session.is_closed());
}

#[tokio::test]
async fn test_next_url_on_nested_router() {
    let seed: Vec<Hero> = (1..=5).map(|id| hero(id, &format!("hero-{}", id))).collect();
    let dir = tempfile::tempdir().unwrap();
    let mut app = App::new();
    setup(&mut app, [bind(sqlite_url(&dir, "nested.sqlite"), DEFAULT_KEY, true).unwrap()]).unwrap();
    seed_heroes(&app, &seed).await;
    let router = Router::new().nest("/api", app.into_router(routes()));

    let (status, first) = send(&router, "GET", "/api/heroes", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["next_url"], json!("/api/heroes?page_key=2"));

    let next = first["next_url"].as_str().unwrap();
    let (status, second) = send(&router, "GET", next, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&second), vec![3, 4]);
    assert_eq!(second["previous_url"], json!("/api/heroes?page_key=1"));
}

#[tokio::test]
async fn test_unaddressable_page_is_bad_request() {
    let app = test_app(&[hero(1, "Deadpond")]).await;

    let uri = format!("/heroes?page_key={}", u64::MAX);
    let (status, body) = send(&app.router, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("page_key"));
}

#[tokio::test]
async fn test_undecodable_pk_is_bad_request() {
    let app = test_app(&[]).await;

    let (status, body) = send(&app.router, "GET", "/heroes/%FF", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let message = body["error"].as_str().unwrap();
    assert!(!message.contains("missing path parameter"), "{}", message);
}

#[tokio::test]
async fn test_list_update_and_delete_all() {
    let app = test_app(&[hero(1, "Deadpond"), hero(2, "Spider-Boy"), hero(3, "deadlock")]).await;

    let (status, body) = send(&app.router, "PATCH", "/heroes?name=dead", Some(json!({ "age": 99 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], json!(2));

    let (_, body) = send(&app.router, "GET", "/heroes/3", None).await;
    assert_eq!(body["age"], json!(99));
    let (_, body) = send(&app.router, "GET", "/heroes/2", None).await;
    assert_eq!(body["age"], json!(22));

    let (_, body) = send(&app.router, "DELETE", "/heroes?name=dead", None).await;
    assert_eq!(body["deleted"], json!(2));

    let (_, context) = send(&app.router, "GET", "/heroes", None).await;
    assert_eq!(ids(&context), vec![2]);
}

#[tokio::test]
async fn test_two_bindings_inject_two_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = App::new();
    setup(
        &mut app,
        [
            bind(sqlite_url(&dir, "main.sqlite"), DEFAULT_KEY, true).unwrap(),
            bind(sqlite_url(&dir, "audit.sqlite"), AUDIT_KEY, true).unwrap(),
        ],
    )
    .unwrap();

    // Registration order is layering order: the first binding is outermost
    let keys: Vec<&str> = app.middlewares().iter().map(|mw| mw.key()).collect();
    assert_eq!(keys, vec![DEFAULT_KEY, AUDIT_KEY]);

    let slot: Arc<Mutex<Option<Session>>> = Arc::new(Mutex::new(None));
    let router = app.into_router(routes()).layer(Extension(slot.clone()));

    let (status, body) = send(&router, "GET", "/lookup", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["default"], json!(true));
    assert_eq!(body["audit"], json!(true));
    assert_eq!(body["other"], json!(false));
    assert_eq!(body["distinct"], json!(true));

    let (status, _) = send(&router, "GET", "/remember", None).await;
    assert_eq!(status, StatusCode::OK);
    let session = slot.lock().unwrap().take().expect("Handler should store its session");
    assert!(session.is_closed());
}
