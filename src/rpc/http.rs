//! Default transport adapter: one POST route per command, JSON bodies.
//! A binary framed transport is an external collaborator this crate
//! never owns; this is a runnable stand-in so the crate works
//! end-to-end without that layer existing.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::post;
use axum::Router;

use crate::config::ConfigHandle;
use crate::dependency::alert::Alerter;
use crate::propagate::outbound::OutboundRpc;
use crate::propagate::{AlertQueue, ChangeQueue};
use crate::store::StoreAdapter;

use super::wire::{CommandKind, Reply, RequestBody};
use super::{dispatch, RpcError};

#[derive(Clone)]
pub struct RpcState {
    pub store: Arc<dyn StoreAdapter>,
    pub config: ConfigHandle,
    pub change_queue: ChangeQueue,
    pub alert_queue: AlertQueue,
    pub outbound: Arc<dyn OutboundRpc>,
    pub alerter: Arc<dyn Alerter>,
}

async fn handle(state: &RpcState, kind: CommandKind, body: RequestBody) -> Result<Json<Reply>, RpcErrorResponse> {
    let reply = dispatch(
        state.store.as_ref(),
        &state.config,
        &state.change_queue,
        &state.alert_queue,
        state.outbound.as_ref(),
        kind,
        body,
    )
    .await?;
    Ok(Json(reply))
}

async fn hello(State(state): State<RpcState>, Json(body): Json<RequestBody>) -> Result<Json<Reply>, RpcErrorResponse> {
    handle(&state, CommandKind::Hello, body).await
}

async fn register(State(state): State<RpcState>, Json(body): Json<RequestBody>) -> Result<Json<Reply>, RpcErrorResponse> {
    handle(&state, CommandKind::Register, body).await
}

async fn online(State(state): State<RpcState>, Json(body): Json<RequestBody>) -> Result<Json<Reply>, RpcErrorResponse> {
    handle(&state, CommandKind::Online, body).await
}

async fn offline(State(state): State<RpcState>, Json(body): Json<RequestBody>) -> Result<Json<Reply>, RpcErrorResponse> {
    handle(&state, CommandKind::Offline, body).await
}

async fn ping(State(state): State<RpcState>, Json(body): Json<RequestBody>) -> Result<Json<Reply>, RpcErrorResponse> {
    handle(&state, CommandKind::Ping, body).await
}

async fn check(State(state): State<RpcState>, Json(body): Json<RequestBody>) -> Result<Json<Reply>, RpcErrorResponse> {
    handle(&state, CommandKind::Check, body).await
}

pub fn rpc_router(state: RpcState) -> Router {
    Router::new()
        .route("/rpc/hello", post(hello))
        .route("/rpc/register", post(register))
        .route("/rpc/online", post(online))
        .route("/rpc/offline", post(offline))
        .route("/rpc/ping", post(ping))
        .route("/rpc/check", post(check))
        .with_state(state)
}

struct RpcErrorResponse(RpcError);

impl From<RpcError> for RpcErrorResponse {
    fn from(err: RpcError) -> Self {
        Self(err)
    }
}

impl IntoResponse for RpcErrorResponse {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            RpcError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            RpcError::Domain(crate::error::Error::UnknownGroup(_)) => StatusCode::NOT_FOUND,
            RpcError::Domain(crate::error::Error::FieldMissing(_)) => StatusCode::BAD_REQUEST,
            RpcError::Domain(crate::error::Error::LockBusy { .. }) => StatusCode::CONFLICT,
            RpcError::Domain(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.0.to_string()).into_response()
    }
}
