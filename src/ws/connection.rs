//! WebSocket connection loop.
//!
//! Registers the socket, then multiplexes inbound frames (dispatched
//! through the [`ProtocolHandler`]) with the connection's outbound queue,
//! which carries protocol replies, relayed commands and close requests
//! from the relay and the sweeper. The connection is removed from the
//! registry on every exit path.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use futures_util::{SinkExt, StreamExt};

use super::messages::Envelope;
use super::protocol::{Dispatch, ProtocolHandler};
use crate::domain::{ConnectionHandle, Outbound, now_millis};

/// Runs the read/write loop for a single WebSocket connection.
pub async fn run_connection(socket: WebSocket, handler: Arc<ProtocolHandler>) {
    let (handle, mut outbound_rx) = ConnectionHandle::channel();
    let conn = handler.registry().register(handle.clone(), now_millis()).await;
    let id = conn.id();
    tracing::debug!(
        connection = %id,
        session_id = %conn.session_id,
        "ws connection opened"
    );

    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            // Incoming message from client
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match handler.handle_text(id, text.as_str()).await {
                            Dispatch::Reply(reply) => queue_reply(&handle, &reply),
                            Dispatch::ReplyAndClose(reply, reason) => {
                                queue_reply(&handle, &reply);
                                handle.close(reason);
                            }
                            Dispatch::Ignored(reason) => {
                                tracing::trace!(connection = %id, ?reason, "frame ignored");
                            }
                            Dispatch::Rejected(violation) => {
                                tracing::debug!(connection = %id, ?violation, "protocol violation");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(connection = %id, error = %e, "ws read error");
                        break;
                    }
                    _ => {}
                }
            }
            // Replies, relayed commands and close requests
            out = outbound_rx.recv() => {
                match out {
                    Some(Outbound::Text(text)) => {
                        if ws_tx.send(Message::text(text)).await.is_err() {
                            break;
                        }
                    }
                    Some(Outbound::Close(reason)) => {
                        let frame = CloseFrame {
                            code: reason.code,
                            reason: Utf8Bytes::from_static(reason.reason),
                        };
                        let _ = ws_tx.send(Message::Close(Some(frame))).await;
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    handler.registry().remove(id).await;
    tracing::debug!(connection = %id, "ws connection closed");
}

fn queue_reply(handle: &ConnectionHandle, reply: &Envelope) {
    match reply.encode() {
        Ok(json) => {
            let _ = handle.send_text(json);
        }
        Err(e) => tracing::warn!(error = %e, "failed to encode reply"),
    }
}
