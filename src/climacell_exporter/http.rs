// climacell_exporter - Prometheus metrics exporter for the ClimaCell weather API
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::client::Upstream;
use crate::collector::ScrapeCoordinator;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub const TEXT_FORMAT: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

pub struct RequestState<U> {
    pub coordinator: ScrapeCoordinator<U>,
}

impl<U> RequestState<U> {
    pub fn new(coordinator: ScrapeCoordinator<U>) -> Self {
        RequestState { coordinator }
    }
}

/// Scrape the upstream API (or cache) and encode the result in the text exposition format.
pub async fn text_metrics_handler<U>(State(state): State<Arc<RequestState<U>>>) -> Response
where
    U: Upstream + 'static,
{
    let exposition = state.coordinator.scrape().await;

    match exposition.encode() {
        Ok(buf) => {
            tracing::debug!(message = "encoded prometheus metrics to text format", bytes = buf.len());
            (StatusCode::OK, [(CONTENT_TYPE, TEXT_FORMAT)], buf).into_response()
        }
        Err(e) => {
            tracing::error!(message = "error encoding metrics to text format", error = %e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Router serving metrics at `/metrics`, with requests traced.
pub fn router<U>(state: Arc<RequestState<U>>) -> Router
where
    U: Upstream + 'static,
{
    Router::new()
        .route("/metrics", get(text_metrics_handler::<U>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
