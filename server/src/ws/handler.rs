use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use std::collections::HashMap;

use crate::auth::handshake::Handshake;
use crate::state::AppState;
use crate::ws::actor;

/// Close code sent when the connection authorizer refuses a handshake.
pub const CLOSE_UNAUTHORIZED: u16 = 4001;

/// GET /ws
/// WebSocket upgrade endpoint. The origin check has already run as router
/// middleware; here the connection authorizer decides admission.
/// On rejection, upgrades then immediately closes with 4001.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let handshake = Handshake { headers, query };

    match state.authorizer.authorize(&handshake).await {
        Ok(()) => ws.on_upgrade(move |socket| handle_admitted(socket, state)),
        Err(rejection) => {
            tracing::warn!(
                close_code = CLOSE_UNAUTHORIZED,
                reason = %rejection,
                "WebSocket handshake rejected"
            );

            ws.on_upgrade(move |mut socket| async move {
                let close_frame = CloseFrame {
                    code: CLOSE_UNAUTHORIZED,
                    reason: rejection.reason.into(),
                };
                let _ = socket.send(Message::Close(Some(close_frame))).await;
            })
        }
    }
}

async fn handle_admitted(socket: WebSocket, state: AppState) {
    actor::run_connection(socket, state.connections).await;
}
