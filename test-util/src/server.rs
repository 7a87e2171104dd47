//! Fixture HTTP servers used by integration suites.
//!
//! Routers are plain `axum` apps so they can be mounted either through
//! [`TestApp::spawn`] (an already running server on an ephemeral port) or
//! through [`task_server`] for runs bracketed by `with_servant_server`.

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use anyhow::Context as _;
use axum::{
    Json,
    Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures_util::{FutureExt as _, future::BoxFuture};
use serde_json::{Value, json};
use servecheck::TaskServer;
use tokio::{net::TcpListener, task::JoinHandle};
use tracing::{debug, warn};
use url::Url;

use crate::AnyError;

/// How the items server answers `GET /items/{id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemsBehaviour {
    /// Every id yields a JSON object.
    Healthy,
    /// Negative ids yield `500 Internal Server Error`.
    FailsOnNegative,
}

/// Router for [`crate::items_api`].
pub fn items_app(behaviour: ItemsBehaviour) -> Router {
    Router::new().route(
        "/items/:id",
        get(move |Path(id): Path<i64>| async move {
            if behaviour == ItemsBehaviour::FailsOnNegative && id < 0 {
                return (StatusCode::INTERNAL_SERVER_ERROR, "negative id").into_response();
            }
            Json(json!({ "id": id, "name": format!("item {id}") })).into_response()
        }),
    )
}

/// Router for [`crate::named_items_api`] that echoes the id and name.
///
/// With a `limit`, names longer than `limit` characters are dropped from the
/// reply.
pub fn named_items_app(limit: Option<usize>) -> Router {
    Router::new().route(
        "/items/:id",
        get(
            move |Path(id): Path<i64>, Query(query): Query<HashMap<String, String>>| async move {
                let name = query.get("name").cloned().unwrap_or_default();
                if limit.is_some_and(|limit| name.chars().count() > limit) {
                    Json(json!({ "id": id }))
                } else {
                    Json(json!({ "id": id, "name": name }))
                }
            },
        ),
    )
}

/// How the catalogue stores notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogueBehaviour {
    /// Notes are returned as posted.
    Consistent,
    /// The optional `tag` field is lost on storage.
    LosesTags,
}

#[derive(Clone)]
struct Catalogue {
    behaviour: CatalogueBehaviour,
    notes: Arc<Mutex<Vec<Value>>>,
}

async fn create_note(State(catalogue): State<Catalogue>, Json(mut note): Json<Value>) -> Response {
    if catalogue.behaviour == CatalogueBehaviour::LosesTags {
        if let Some(fields) = note.as_object_mut() {
            fields.remove("tag");
        }
    }
    let Ok(mut notes) = catalogue.notes.lock() else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };
    notes.push(note.clone());
    let location = format!("/notes/{}", notes.len());
    (StatusCode::CREATED, [(header::LOCATION, location)], Json(note)).into_response()
}

async fn fetch_note(State(catalogue): State<Catalogue>, Path(id): Path<i64>) -> Response {
    let Ok(notes) = catalogue.notes.lock() else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };
    let note = usize::try_from(id)
        .ok()
        .and_then(|id| id.checked_sub(1))
        .and_then(|index| notes.get(index));
    match note {
        Some(note) => Json(note.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Router for [`crate::catalogue_api`].
pub fn catalogue_app(behaviour: CatalogueBehaviour) -> Router {
    let catalogue = Catalogue {
        behaviour,
        notes: Arc::default(),
    };
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/notes", post(create_note))
        .route("/notes/:id", get(fetch_note))
        .with_state(catalogue)
}

async fn serve(listener: TcpListener, app: Router) {
    if let Err(error) = axum::serve(listener, app).await {
        warn!(%error, "fixture server stopped");
    }
}

/// A server factory running `app` inside the test runtime.
pub fn task_server(app: Router) -> TaskServer<impl Fn(TcpListener) -> BoxFuture<'static, ()> + Send + Sync> {
    TaskServer::new(move |listener| serve(listener, app.clone()).boxed())
}

/// A fixture server running on an ephemeral port until dropped.
pub struct TestApp {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl TestApp {
    /// Bind `127.0.0.1:0` and serve `app`.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn spawn(app: Router) -> Result<Self, AnyError> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind fixture server")?;
        let addr = listener.local_addr()?;
        let task = tokio::spawn(serve(listener, app));
        debug!(%addr, "fixture server started");
        Ok(Self { addr, task })
    }

    /// Base URL of the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the address does not form a URL.
    pub fn url(&self) -> Result<Url, AnyError> {
        Url::parse(&format!("http://{}/", self.addr)).context("fixture server URL")
    }

    /// Port the server listens on.
    #[must_use]
    pub const fn port(&self) -> u16 { self.addr.port() }
}

impl Drop for TestApp {
    fn drop(&mut self) { self.task.abort(); }
}
