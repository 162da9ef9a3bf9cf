// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Transport Bridge
//!
//! HTTP surface of the gateway. The radio side runs in a separate process
//! that forwards transport events over a WebSocket:
//!
//! - `GET /v1/peer`: WebSocket carrying [`peer::PeerEvent`]s in and
//!   [`peer::PeerCommand`]s out, one peer at a time
//! - `GET /health`, `/health/live`, `/health/ready`: probes

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

pub mod health;
pub mod peer;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/peer", get(peer::peer_socket))
        .with_state(state.clone());

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state);

    Router::new()
        .nest("/v1", v1_routes)
        .merge(health_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
