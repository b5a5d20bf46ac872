mod auth;
mod redirect;

use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::{Html, IntoResponse},
};
use proxreport_core::{NodeSummary, Report, compose, compose_cluster};
use serde_json::{Value, json};
use tracing::debug;

use crate::{AppState, cluster::peer_summaries, render};

pub use auth::AuthedUser;
pub use redirect::redirect_to_https;

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

pub async fn stylesheet() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/css; charset=utf-8")],
        render::STYLESHEET,
    )
}

pub async fn not_found(_: AuthedUser) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        "Not found\n",
    )
}

pub async fn dashboard(AuthedUser(user): AuthedUser, State(state): State<AppState>) -> Html<String> {
    debug!(%user, "rendering dashboard");
    let report = local_report(&state).await;
    Html(render::dashboard(
        &report,
        &state.config,
        state.autorefresh_seconds,
    ))
}

pub async fn cluster(AuthedUser(user): AuthedUser, State(state): State<AppState>) -> Html<String> {
    debug!(%user, peers = state.peers.len(), "rendering cluster overview");
    let (local, peers) = tokio::join!(local_report(&state), peer_summaries(&state.peers));

    let mut nodes = Vec::with_capacity(peers.len() + 1);
    nodes.push(NodeSummary::from_report(&local));
    nodes.extend(peers);

    Html(render::cluster(&compose_cluster(nodes)))
}

pub async fn report(_: AuthedUser, State(state): State<AppState>) -> Json<Report> {
    Json(local_report(&state).await)
}

pub async fn summary(_: AuthedUser, State(state): State<AppState>) -> Json<NodeSummary> {
    Json(NodeSummary::from_report(&local_report(&state).await))
}

pub async fn local_report(state: &AppState) -> Report {
    let snapshot = state.probe.snapshot(&state.config.mountpoints).await;
    compose(&state.config, &snapshot)
}
