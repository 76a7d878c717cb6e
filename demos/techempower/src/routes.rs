// Copyright 2025 FastLabs Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Benchmark routes.
//!
//! Every database route takes exactly one connection per request. The connection goes back to
//! the pool when the guard drops, on success and error paths alike.

use std::sync::Arc;

use askama::Template;
use axum::Json;
use axum::Router;
use axum::extract::Query;
use axum::extract::State;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::http::header;
use axum::response::Html;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use boundpool::Pool;
use serde::Deserialize;
use serde::Serialize;

use crate::db;
use crate::db::Fortune;
use crate::db::ManageConnection;
use crate::db::World;

const SERVER_NAME: &str = "boundpool";
const MAX_QUERIES: i64 = 500;

#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<Pool<ManageConnection>>,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Pool(#[from] boundpool::Error<sqlx::Error>),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Template(#[from] askama::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "request failed");
        (StatusCode::BAD_REQUEST, format!("Error: {self}")).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/plaintext", get(plaintext))
        .route("/json", get(json))
        .route("/db", get(single_query))
        .route("/queries", get(multiple_queries))
        .route("/updates", get(updates))
        .route("/fortunes", get(fortunes))
        .route("/create", get(create_tables))
        .route("/delete", get(drop_tables))
        .route("/populate", get(populate))
        .layer(axum::middleware::map_response(server_header))
        .with_state(state)
}

async fn server_header(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(header::SERVER, HeaderValue::from_static(SERVER_NAME));
    response
}

#[derive(Debug, Default, Deserialize)]
pub struct QueriesParams {
    queries: Option<String>,
}

/// Parses the `queries` parameter. Missing or malformed values count as 1, and the result is
/// clamped to `1..=500`.
pub fn clamp_queries(raw: Option<&str>) -> usize {
    let n = raw
        .and_then(|q| q.trim().parse::<i64>().ok())
        .unwrap_or(1)
        .clamp(1, MAX_QUERIES);
    n as usize
}

async fn plaintext() -> &'static str {
    "Hello, world!"
}

#[derive(Serialize)]
struct Message {
    message: &'static str,
}

async fn json() -> Json<Message> {
    Json(Message {
        message: "Hello, World!",
    })
}

async fn single_query(State(state): State<AppState>) -> Result<Json<World>, AppError> {
    let mut conn = state.pool.acquire().await?;
    let world = db::random_world(&mut conn).await?;
    Ok(Json(world))
}

async fn multiple_queries(
    State(state): State<AppState>,
    Query(params): Query<QueriesParams>,
) -> Result<Json<Vec<World>>, AppError> {
    let n = clamp_queries(params.queries.as_deref());
    let mut conn = state.pool.acquire().await?;
    let mut worlds = Vec::with_capacity(n);
    for _ in 0..n {
        worlds.push(db::random_world(&mut conn).await?);
    }
    Ok(Json(worlds))
}

async fn updates(
    State(state): State<AppState>,
    Query(params): Query<QueriesParams>,
) -> Result<Json<Vec<World>>, AppError> {
    let n = clamp_queries(params.queries.as_deref());
    let mut conn = state.pool.acquire().await?;
    let mut worlds = Vec::with_capacity(n);
    for _ in 0..n {
        let mut world = db::random_world(&mut conn).await?;
        world.random_number = db::random_number();
        db::update_world(&mut conn, world).await?;
        worlds.push(world);
    }
    Ok(Json(worlds))
}

#[derive(Template)]
#[template(
    ext = "html",
    source = "<!DOCTYPE html><html><head><title>Fortunes</title></head><body><table>\
<tr><th>id</th><th>message</th></tr>\
{% for fortune in fortunes %}<tr><td>{{ fortune.id }}</td><td>{{ fortune.message }}</td></tr>{% endfor %}\
</table></body></html>"
)]
struct FortunesTemplate {
    fortunes: Vec<Fortune>,
}

/// Adds the request-time fortune, sorts by message and renders the page.
pub fn render_fortunes(mut fortunes: Vec<Fortune>) -> Result<String, askama::Error> {
    fortunes.push(Fortune {
        id: 0,
        message: "Additional fortune added at request time.".to_string(),
    });
    fortunes.sort_by(|a, b| a.message.cmp(&b.message));
    FortunesTemplate { fortunes }.render()
}

async fn fortunes(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let mut conn = state.pool.acquire().await?;
    let fortunes = db::fortunes(&mut conn).await?;
    drop(conn);
    Ok(Html(render_fortunes(fortunes)?))
}

async fn create_tables(State(state): State<AppState>) -> Result<Html<&'static str>, AppError> {
    let mut conn = state.pool.acquire().await?;
    db::create_tables(&mut conn).await?;
    tracing::info!("created tables");
    Ok(Html("<h3>Tables 'World' and 'Fortune' created</h3>"))
}

async fn drop_tables(State(state): State<AppState>) -> Result<Html<&'static str>, AppError> {
    let mut conn = state.pool.acquire().await?;
    db::drop_tables(&mut conn).await?;
    tracing::info!("dropped tables");
    Ok(Html("<h3>Tables 'World' and 'Fortune' deleted</h3>"))
}

async fn populate(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let mut conn = state.pool.acquire().await?;
    db::populate(&mut conn).await?;
    tracing::info!(rows = db::WORLD_ROWS, "populated tables");
    Ok(Html(format!(
        "<h3>Populated World table with {} rows</h3><p>Done.</p>",
        db::WORLD_ROWS
    )))
}
