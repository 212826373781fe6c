//! Heroes API - small CRUD service over a `heroes` table
//!
//! Binds one database under the default key, creates the schema on startup
//! and serves list/unit views of heroes.

use axum::{
    extract::Extension,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use clap::Parser;
use diesel::QueryableByName;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use axum_sqlmodel::sea_query::{Alias, ColumnDef, Table, Value};
use axum_sqlmodel::{
    bind, get_engine, init_db, setup, App, AppHandle, BindingSource, ListView, Metadata,
    OffsetPaginator, SessionBound, SqlModel, UnitView, ViewContext, ViewError, DEFAULT_KEY, DEFAULT_PER_PAGE,
};

/// Namespace key holding the configured page size
const PER_PAGE_KEY: &str = "heroes_per_page";

#[derive(Parser, Debug)]
#[command(name = "heroes-api")]
#[command(about = "CRUD service over a heroes table", long_about = None)]
struct Args {
    /// Database URL (falls back to DATABASE_URL)
    #[arg(long, env = "DATABASE_URL", default_value = "heroes.db")]
    database_url: String,

    /// Port to listen on (falls back to PORT)
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Heroes per page on list endpoints
    #[arg(long, default_value_t = DEFAULT_PER_PAGE)]
    per_page: u64,
}

diesel::table! {
    heroes (id) {
        id -> Integer,
        name -> Text,
        secret_name -> Text,
        age -> Nullable<Integer>,
    }
}

#[derive(Debug, Clone, QueryableByName, Serialize, Deserialize)]
#[diesel(table_name = heroes)]
struct Hero {
    id: i32,
    name: String,
    secret_name: String,
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
            ("secret_name", self.secret_name.clone().into()),
            ("age", self.age.into()),
        ]
    }
}

fn metadata() -> Metadata {
    Metadata::new().table(
        Table::create()
            .table(Alias::new(Hero::TABLE))
            .if_not_exists()
            .col(ColumnDef::new(Alias::new("id")).integer().not_null().primary_key())
            .col(ColumnDef::new(Alias::new("name")).string().not_null())
            .col(ColumnDef::new(Alias::new("secret_name")).string().not_null())
            .col(ColumnDef::new(Alias::new("age")).integer().null())
            .to_owned(),
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables before clap reads its env fallbacks
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("axum_sqlmodel=debug,tower_http=debug")),
        )
        .init();

    let args = Args::parse();

    let mut app = App::new();
    setup(&mut app, [bind(args.database_url.as_str(), DEFAULT_KEY, true)?])?;
    app.insert(PER_PAGE_KEY, args.per_page)?;
    init_db(&app, &metadata(), DEFAULT_KEY).await?;

    let routes = Router::new()
        .route("/heroes", get(list_heroes).post(create_heroes).delete(delete_heroes))
        .route("/heroes/:pk", get(get_hero).put(edit_hero).delete(delete_hero))
        .route("/health", get(health_check));

    let router = app
        .into_router(routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    tracing::info!("Heroes API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

/// List view configured with the page size and an optional `name` filter
fn heroes_view(view: ListView<Hero>) -> Result<ListView<Hero>, ViewError> {
    let per_page = view
        .scope()
        .app_namespace()?
        .get::<u64>(PER_PAGE_KEY)?
        .map_or(DEFAULT_PER_PAGE, |n| *n);
    let name = view.scope().query("name").map(str::to_string);

    let view = view.with_paginator(OffsetPaginator::new(per_page));
    Ok(match name {
        Some(name) => {
            let condition = view.statements().ilike("name", &format!("%{}%", name), None);
            view.filter(condition)
        }
        None => view,
    })
}

/// One page of heroes with `next_url`/`previous_url`
async fn list_heroes(view: ListView<Hero>) -> Result<ViewContext, ViewError> {
    let mut view = heroes_view(view)?;
    view.prepare_context().await?;
    Ok(view.context)
}

/// Insert a batch of heroes
async fn create_heroes(
    view: ListView<Hero>,
    Json(heroes): Json<Vec<Hero>>,
) -> Result<(StatusCode, Json<serde_json::Value>), ViewError> {
    view.add_all(&heroes)?;
    let inserted = view.session()?.commit().await?;
    tracing::info!("Inserted {} heroes", inserted);

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "inserted": inserted })),
    ))
}

/// Delete every hero (or those matching `name`)
async fn delete_heroes(view: ListView<Hero>) -> Result<Json<serde_json::Value>, ViewError> {
    let deleted = heroes_view(view)?.delete_all().await?;
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}

async fn get_hero(mut view: UnitView<Hero>) -> Result<Json<Hero>, ViewError> {
    view.fetch().await?.cloned().map(Json).ok_or(ViewError::NotFound)
}

/// Replace a hero's fields; the id in the path wins over the body
async fn edit_hero(
    view: UnitView<Hero>,
    Json(hero): Json<Hero>,
) -> Result<Json<serde_json::Value>, ViewError> {
    match view.edit(&hero).await? {
        0 => Err(ViewError::NotFound),
        updated => Ok(Json(serde_json::json!({ "updated": updated }))),
    }
}

async fn delete_hero(view: UnitView<Hero>) -> Result<StatusCode, ViewError> {
    match view.delete().await? {
        0 => Err(ViewError::NotFound),
        _ => Ok(StatusCode::NO_CONTENT),
    }
}

/// Health check endpoint - verifies the database answers
async fn health_check(
    Extension(handle): Extension<AppHandle>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let engine = get_engine(&handle, DEFAULT_KEY).map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    match engine.ping().await {
        Ok(()) => Ok(Json(serde_json::json!({
            "status": "healthy",
            "service": "heroes-api",
            "version": env!("CARGO_PKG_VERSION"),
        }))),
        Err(e) => {
            tracing::warn!("Database ping failed: {}", e);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}
