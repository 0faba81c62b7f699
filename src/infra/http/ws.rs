//! WebSocket adapter: binds an upgraded socket to the hub.

use async_trait::async_trait;
use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use bytes::Bytes;
use futures::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tracing::{debug, info};

use crate::domain::types::UserId;
use crate::realtime::{
    ConnectionHandle, ConnectionId, Hub, OutboundFrame, Transport, TransportError,
};

use super::HttpState;
use super::auth::VerifiedUser;

/// Outbound half of an upgraded socket.
pub struct WebSocketTransport {
    sink: SplitSink<WebSocket, Message>,
}

impl WebSocketTransport {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, frame: OutboundFrame) -> Result<(), TransportError> {
        self.sink
            .send(Message::Text(frame.as_ref().into()))
            .await
            .map_err(|err| TransportError::Write(err.to_string()))
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        self.sink
            .send(Message::Ping(Bytes::new()))
            .await
            .map_err(|err| TransportError::Write(err.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.sink.send(Message::Close(None)).await;
        let _ = self.sink.close().await;
    }
}

pub(super) async fn ws_handler(
    State(state): State<HttpState>,
    VerifiedUser(user): VerifiedUser,
    upgrade: WebSocketUpgrade,
) -> Response {
    upgrade.on_upgrade(move |socket| run_session(state.hub, user, socket))
}

async fn run_session(hub: Hub, user: UserId, socket: WebSocket) {
    let (sink, stream) = socket.split();
    let handle = hub.register(ConnectionId::new(), user, WebSocketTransport::new(sink));

    read_until_closed(&handle, stream).await;

    handle.close();
    info!(connection_id = %handle.id(), user_id = %user, "WebSocket session ended");
}

/// Drain inbound traffic until the peer leaves or the hub closes the connection.
async fn read_until_closed(handle: &ConnectionHandle, mut stream: SplitStream<WebSocket>) {
    loop {
        tokio::select! {
            _ = handle.closed() => return,
            message = stream.next() => match message {
                Some(Ok(Message::Close(_))) | None => return,
                Some(Ok(Message::Text(text))) => {
                    debug!(
                        connection_id = %handle.id(),
                        len = text.len(),
                        "Ignoring inbound text frame"
                    );
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    debug!(connection_id = %handle.id(), error = %err, "WebSocket read failed");
                    return;
                }
            },
        }
    }
}
