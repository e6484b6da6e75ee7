use super::protocol::*;
use super::server::RpcService;
use crate::broker::broker::Broker;
use crate::error::MqError;

use axum::routing::{MethodRouter, post};
use axum::{Extension, Json, http::StatusCode};
use std::sync::Arc;

pub type RpcReply<T> = Result<Json<T>, (StatusCode, Json<RpcFault>)>;

impl RpcService for Broker {
    const NAME: &'static str = SERVICE_BROKER;

    fn methods(self: Arc<Self>) -> Vec<(&'static str, MethodRouter)> {
        vec![(METHOD_PRODUCE, post(handle_produce).layer(Extension(self)))]
    }
}

pub async fn handle_produce(
    Extension(broker): Extension<Arc<Broker>>,
    Json(args): Json<ProduceArgs>,
) -> RpcReply<bool> {
    let queue = args.queue.clone();

    match broker.produce_remote(args).await {
        Ok(reply) => Ok(Json(reply)),
        Err(e) => {
            tracing::warn!("Remote produce to {} failed: {}", queue, e);
            Err(fault(&e))
        }
    }
}

pub async fn handle_ping() -> Json<bool> {
    Json(true)
}

/// Maps an error onto the status and fault body sent back to the caller.
pub fn fault(err: &MqError) -> (StatusCode, Json<RpcFault>) {
    match err {
        MqError::QueueNotFound(name) => (
            StatusCode::NOT_FOUND,
            Json(RpcFault {
                kind: FAULT_NOT_FOUND.to_string(),
                message: name.clone(),
            }),
        ),
        other => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(RpcFault {
                kind: FAULT_INTERNAL.to_string(),
                message: other.to_string(),
            }),
        ),
    }
}
