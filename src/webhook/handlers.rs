use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    Json as BodyJson,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
    endpoint::Endpoint,
    plan::{Changes, Update},
    webhook::AppState,
};

/// Content-Type required by the external-dns webhook protocol
pub const WEBHOOK_CONTENT_TYPE: &str = "application/external.dns.webhook+json;version=1";

/// The payload sent by external-dns to POST /records.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookChanges {
    #[serde(default, alias = "Create")]
    pub create: Vec<Endpoint>,
    #[serde(default, alias = "UpdateOld")]
    pub update_old: Vec<Endpoint>,
    #[serde(default, alias = "UpdateNew")]
    pub update_new: Vec<Endpoint>,
    #[serde(default, alias = "Delete")]
    pub delete: Vec<Endpoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("updateOld has {old} endpoint(s) but updateNew has {new}")]
pub struct MismatchedUpdates {
    pub old: usize,
    pub new: usize,
}

impl TryFrom<WebhookChanges> for Changes {
    type Error = MismatchedUpdates;

    /// The two update lists are paired by position.
    fn try_from(wire: WebhookChanges) -> Result<Self, Self::Error> {
        if wire.update_old.len() != wire.update_new.len() {
            return Err(MismatchedUpdates {
                old: wire.update_old.len(),
                new: wire.update_new.len(),
            });
        }
        let update = wire
            .update_old
            .into_iter()
            .zip(wire.update_new)
            .map(|(old, new)| Update { old, new })
            .collect();
        Ok(Changes {
            create: wire.create,
            update,
            delete: wire.delete,
        })
    }
}

impl From<Changes> for WebhookChanges {
    fn from(changes: Changes) -> Self {
        let (update_old, update_new) = changes.update.into_iter().map(|u| (u.old, u.new)).unzip();
        Self {
            create: changes.create,
            update_old,
            update_new,
            delete: changes.delete,
        }
    }
}

fn webhook_headers() -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert(header::CONTENT_TYPE, HeaderValue::from_static(WEBHOOK_CONTENT_TYPE));
    h
}

// ── GET /healthz ──────────────────────────────────────────────────────────────

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"})))
}

// ── GET / ─────────────────────────────────────────────────────────────────────
// Domain-filter negotiation.

pub async fn negotiate(State(state): State<AppState>) -> impl IntoResponse {
    (webhook_headers(), Json(state.provider.domain_filter()))
}

// ── GET /records ──────────────────────────────────────────────────────────────

pub async fn get_records(State(state): State<AppState>) -> Response {
    match state.provider.records().await {
        Ok(eps) => {
            info!("GET /records → {} endpoint(s)", eps.len());
            (webhook_headers(), Json(eps)).into_response()
        }
        Err(e) => {
            error!("GET /records error: {e}");
            error_response(status_for(e.is_soft()), e.to_string())
        }
    }
}

// ── POST /records ─────────────────────────────────────────────────────────────

pub async fn apply_changes(
    State(state): State<AppState>,
    BodyJson(wire): BodyJson<WebhookChanges>,
) -> Response {
    let changes = match Changes::try_from(wire) {
        Ok(changes) => changes,
        Err(e) => {
            warn!("POST /records rejected: {e}");
            return error_response(StatusCode::BAD_REQUEST, e.to_string());
        }
    };

    info!("POST /records → {changes}");
    match state.provider.apply_changes(&changes).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            error!("POST /records error: {e}");
            error_response(status_for(e.is_soft()), e.to_string())
        }
    }
}

// ── POST /adjustendpoints ─────────────────────────────────────────────────────
//
// Called by external-dns before planning so the provider can drop or rewrite
// endpoints it cannot represent.

pub async fn adjust_endpoints(
    State(state): State<AppState>,
    BodyJson(endpoints): BodyJson<Vec<Endpoint>>,
) -> Response {
    let received = endpoints.len();
    match state.provider.adjust_endpoints(endpoints).await {
        Ok(adjusted) => {
            info!("POST /adjustendpoints → kept {} of {received} endpoint(s)", adjusted.len());
            (webhook_headers(), Json(adjusted)).into_response()
        }
        Err(e) => {
            error!("POST /adjustendpoints error: {e}");
            error_response(status_for(e.is_soft()), e.to_string())
        }
    }
}

// ── helpers ───────────────────────────────────────────────────────────────────

fn status_for(soft: bool) -> StatusCode {
    if soft {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

fn error_response(status: StatusCode, msg: String) -> Response {
    (status, Json(serde_json::json!({"error": msg}))).into_response()
}
