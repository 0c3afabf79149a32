//! # Custody HTTP API
//!
//! Builds the axum router for the six custody endpoints. All requests are
//! POST with `application/x-www-form-urlencoded` bodies; anything else on
//! a known path is a 400. Handlers are stateless — every request reads
//! its parsed fields and drives the token store and share store, both
//! shared through [`AppState`].
//!
//! | Path                   | Purpose                                        |
//! |------------------------|------------------------------------------------|
//! | `/get_storage_token`   | Mint a store-scoped token, deliver out of band |
//! | `/get_retrieval_token` | Same, retrieve-scoped; share must exist        |
//! | `/get_deletion_token`  | Same, delete-scoped; share must exist          |
//! | `/store_share`         | Store a base64 share under a valid token       |
//! | `/retrieve_share`      | Return base64 share bytes under a valid token  |
//! | `/delete_share`        | Destroy a share under a valid token            |
//!
//! Response bodies are informational text and never echo the share value,
//! the token, or any salt.

use std::sync::Arc;

use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use svalbard_protocol::channel::{Recipient, SecondaryChannel, TokenMessage};
use svalbard_protocol::crypto::share_id;
use svalbard_protocol::store::{ShareStore, StoreError};
use svalbard_protocol::token::{Operation, TokenStore, TokenValidation};

use crate::metrics::ServerMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone — everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Registry of live capability tokens.
    pub tokens: Arc<TokenStore>,
    /// The share-id → blob store.
    pub shares: Arc<dyn ShareStore>,
    /// Out-of-band token delivery path.
    pub channel: Arc<dyn SecondaryChannel>,
    /// Operational counters.
    pub metrics: Arc<ServerMetrics>,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with the six custody routes and
/// request tracing.
///
/// TLS is terminated in front of this router; within the process the
/// traffic is already plaintext.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/get_storage_token",
            post(get_storage_token).fallback(non_post),
        )
        .route(
            "/get_retrieval_token",
            post(get_retrieval_token).fallback(non_post),
        )
        .route(
            "/get_deletion_token",
            post(get_deletion_token).fallback(non_post),
        )
        .route("/store_share", post(store_share).fallback(non_post))
        .route("/retrieve_share", post(retrieve_share).fallback(non_post))
        .route("/delete_share", post(delete_share).fallback(non_post))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Any non-POST method on a custody path.
async fn non_post() -> Response {
    (StatusCode::BAD_REQUEST, "only POST is supported\n").into_response()
}

// ---------------------------------------------------------------------------
// Request Forms
// ---------------------------------------------------------------------------

/// Fields of the three `get_*_token` requests. Everything is optional at
/// the deserialization layer so missing fields produce a clean 400
/// instead of a deserializer error.
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub request_id: Option<String>,
    pub owner_id_type: Option<String>,
    pub owner_id: Option<String>,
    pub secret_name: Option<String>,
}

/// Fields of the three execute requests.
#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub token: Option<String>,
    pub owner_id_type: Option<String>,
    pub owner_id: Option<String>,
    pub secret_name: Option<String>,
    pub share_value: Option<String>,
}

/// Pulls a required field out of an `Option`, or produces the 400
/// response for its absence. Empty counts as missing.
fn require<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, Response> {
    match value.as_deref() {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err((
            StatusCode::BAD_REQUEST,
            format!("missing field '{name}'.\n"),
        )
            .into_response()),
    }
}

// ---------------------------------------------------------------------------
// Token Handlers
// ---------------------------------------------------------------------------

async fn get_storage_token(
    State(state): State<AppState>,
    Form(form): Form<TokenRequest>,
) -> Response {
    issue_token(state, Operation::Store, form).await
}

async fn get_retrieval_token(
    State(state): State<AppState>,
    Form(form): Form<TokenRequest>,
) -> Response {
    issue_token(state, Operation::Retrieve, form).await
}

async fn get_deletion_token(
    State(state): State<AppState>,
    Form(form): Form<TokenRequest>,
) -> Response {
    issue_token(state, Operation::Delete, form).await
}

/// Shared body of the three token endpoints: validate fields, check the
/// share exists where the operation demands one, mint, deliver out of
/// band, acknowledge.
async fn issue_token(state: AppState, operation: Operation, form: TokenRequest) -> Response {
    state.metrics.requests_total.inc();

    let (request_id, owner_id_type, owner_id, secret_name) = match (
        require(&form.request_id, "request_id"),
        require(&form.owner_id_type, "owner_id_type"),
        require(&form.owner_id, "owner_id"),
        require(&form.secret_name, "secret_name"),
    ) {
        (Ok(r), Ok(t), Ok(o), Ok(s)) => (r, t, o, s),
        (Err(resp), ..) | (_, Err(resp), ..) | (_, _, Err(resp), _) | (.., Err(resp)) => {
            return resp
        }
    };

    let id = share_id(owner_id_type, owner_id, secret_name);

    // Storage tokens may target a share that does not exist yet; the
    // other two operations need something to act on.
    if operation != Operation::Store {
        match state.shares.retrieve(&id) {
            Ok(_) => {}
            Err(StoreError::NotFound) => {
                return (
                    StatusCode::NOT_FOUND,
                    format!("Req. {request_id}: share not found.\n"),
                )
                    .into_response();
            }
            Err(e) => {
                tracing::error!(%e, "share store failed during token issuance");
                return (StatusCode::INTERNAL_SERVER_ERROR, "storage failure.\n")
                    .into_response();
            }
        }
    }

    let token = state.tokens.mint(&id, operation);
    state.metrics.tokens_minted_total.inc();

    let message = match (TokenMessage {
        request_id: request_id.to_string(),
        token,
    })
    .format()
    {
        Ok(line) => line,
        Err(e) => {
            // A colon in the request id would corrupt the channel line.
            return (StatusCode::BAD_REQUEST, format!("{e}.\n")).into_response();
        }
    };

    let recipient = Recipient::new(owner_id_type, owner_id);
    if let Err(e) = state.channel.send(&recipient, &message).await {
        tracing::error!(%e, "secondary channel send failed");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "secondary channel failure.\n",
        )
            .into_response();
    }

    tracing::info!(
        request_id,
        operation = %operation,
        "token minted and sent over the secondary channel"
    );
    (
        StatusCode::OK,
        format!(
            "Req. {request_id}: {} token for secret '{secret_name}' sent to {owner_id_type}:{owner_id}.\n",
            operation.token_noun()
        ),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Execute Handlers
// ---------------------------------------------------------------------------

/// Checks the token binding for an execute request. Every failure mode —
/// wrong length, unknown, expired, wrong share, wrong operation —
/// collapses into one opaque 403.
fn check_token(state: &AppState, token: &str, id: &str, operation: Operation) -> Result<(), Response> {
    match state.tokens.validate(token, id, operation, Utc::now()) {
        TokenValidation::Valid => Ok(()),
        outcome => {
            tracing::warn!(?outcome, operation = %operation, "token rejected");
            state.metrics.token_rejections_total.inc();
            Err((StatusCode::FORBIDDEN, "token not valid\n").into_response())
        }
    }
}

async fn store_share(State(state): State<AppState>, Form(form): Form<ExecuteRequest>) -> Response {
    state.metrics.requests_total.inc();

    let (token, owner_id_type, owner_id, secret_name, share_value) = match (
        require(&form.token, "token"),
        require(&form.owner_id_type, "owner_id_type"),
        require(&form.owner_id, "owner_id"),
        require(&form.secret_name, "secret_name"),
        require(&form.share_value, "share_value"),
    ) {
        (Ok(t), Ok(it), Ok(o), Ok(s), Ok(v)) => (t, it, o, s, v),
        (Err(resp), ..)
        | (_, Err(resp), ..)
        | (_, _, Err(resp), ..)
        | (_, _, _, Err(resp), _)
        | (.., Err(resp)) => return resp,
    };

    let id = share_id(owner_id_type, owner_id, secret_name);
    if let Err(resp) = check_token(&state, token, &id, Operation::Store) {
        return resp;
    }

    let bytes = match BASE64.decode(share_value) {
        Ok(bytes) => bytes,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                "share_value is not valid base64.\n",
            )
                .into_response();
        }
    };

    match state.shares.store(&id, &bytes) {
        Ok(()) => {
            state.metrics.shares_stored_total.inc();
            tracing::info!("share stored");
            (StatusCode::OK, "share stored.\n").into_response()
        }
        Err(StoreError::AlreadyExists) => {
            (StatusCode::FORBIDDEN, "share already exists.\n").into_response()
        }
        Err(StoreError::Invalid) => {
            (StatusCode::BAD_REQUEST, "invalid share value.\n").into_response()
        }
        Err(e) => {
            tracing::error!(%e, "share store failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "storage failure.\n").into_response()
        }
    }
}

async fn retrieve_share(
    State(state): State<AppState>,
    Form(form): Form<ExecuteRequest>,
) -> Response {
    state.metrics.requests_total.inc();

    let (token, owner_id_type, owner_id, secret_name) = match (
        require(&form.token, "token"),
        require(&form.owner_id_type, "owner_id_type"),
        require(&form.owner_id, "owner_id"),
        require(&form.secret_name, "secret_name"),
    ) {
        (Ok(t), Ok(it), Ok(o), Ok(s)) => (t, it, o, s),
        (Err(resp), ..) | (_, Err(resp), ..) | (_, _, Err(resp), _) | (.., Err(resp)) => {
            return resp
        }
    };

    let id = share_id(owner_id_type, owner_id, secret_name);
    if let Err(resp) = check_token(&state, token, &id, Operation::Retrieve) {
        return resp;
    }

    match state.shares.retrieve(&id) {
        Ok(bytes) => {
            state.metrics.shares_retrieved_total.inc();
            tracing::info!("share retrieved");
            (StatusCode::OK, BASE64.encode(bytes)).into_response()
        }
        Err(StoreError::NotFound) => {
            (StatusCode::NOT_FOUND, "share not found.\n").into_response()
        }
        Err(e) => {
            tracing::error!(%e, "share retrieval failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "storage failure.\n").into_response()
        }
    }
}

async fn delete_share(State(state): State<AppState>, Form(form): Form<ExecuteRequest>) -> Response {
    state.metrics.requests_total.inc();

    let (token, owner_id_type, owner_id, secret_name) = match (
        require(&form.token, "token"),
        require(&form.owner_id_type, "owner_id_type"),
        require(&form.owner_id, "owner_id"),
        require(&form.secret_name, "secret_name"),
    ) {
        (Ok(t), Ok(it), Ok(o), Ok(s)) => (t, it, o, s),
        (Err(resp), ..) | (_, Err(resp), ..) | (_, _, Err(resp), _) | (.., Err(resp)) => {
            return resp
        }
    };

    let id = share_id(owner_id_type, owner_id, secret_name);
    if let Err(resp) = check_token(&state, token, &id, Operation::Delete) {
        return resp;
    }

    // A delete of an absent share is a backend-level failure, not a 404.
    // Fleet tooling keys on that distinction; see DESIGN.md.
    match state.shares.delete(&id) {
        Ok(()) => {
            state.metrics.shares_deleted_total.inc();
            tracing::info!("share deleted");
            (StatusCode::OK, "share deleted.\n").into_response()
        }
        Err(e) => {
            tracing::error!(%e, "share deletion failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "deletion failure.\n").into_response()
        }
    }
}
