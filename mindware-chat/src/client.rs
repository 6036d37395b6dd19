//! WebSocket client for the Mindware chat relay.
//!
//! One [`RelayClient`] is one connection, bound to a room and a user id by
//! the URL it connects to. Switching rooms closes the connection and opens
//! a new one, then asks for the new room's history.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use mindware_proto::ProtocolError;
use mindware_proto::frame::{self, ClientFrame, ServerFrame};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Default timeout for connecting to the relay server.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long [`RelayClient::close`] waits for the relay to finish the close
/// handshake.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors returned by [`RelayClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The relay closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// The operation did not complete in time.
    #[error("relay operation timed out")]
    Timeout,

    /// The relay URL could not be turned into a room endpoint.
    #[error("invalid relay url {url}: {reason}")]
    InvalidUrl {
        /// URL as given.
        url: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Transport-level WebSocket failure.
    #[error("websocket error: {0}")]
    WebSocket(Box<tungstenite::Error>),

    /// The relay sent a frame this client does not understand.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl From<tungstenite::Error> for ClientError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                Self::ConnectionClosed
            }
            other => Self::WebSocket(Box::new(other)),
        }
    }
}

/// Builds `<base>/ws/<room>/<user>`, percent-encoding both segments.
///
/// `http` and `https` bases are mapped to `ws` and `wss`.
///
/// # Errors
///
/// Returns [`ClientError::InvalidUrl`] if `base` does not parse or uses an
/// unsupported scheme.
pub fn room_url(base: &str, room: &str, user_id: &str) -> Result<Url, ClientError> {
    let invalid = |reason: String| ClientError::InvalidUrl {
        url: base.to_string(),
        reason,
    };

    let mut url = Url::parse(base).map_err(|e| invalid(e.to_string()))?;
    let scheme = match url.scheme() {
        "ws" | "http" => "ws",
        "wss" | "https" => "wss",
        other => return Err(invalid(format!("unsupported scheme {other}"))),
    };
    url.set_scheme(scheme)
        .map_err(|()| invalid(format!("cannot use scheme {scheme}")))?;
    url.path_segments_mut()
        .map_err(|()| invalid("url cannot have a path".to_string()))?
        .pop_if_empty()
        .extend(["ws", room, user_id]);
    Ok(url)
}

/// A live connection to one room of the relay.
pub struct RelayClient {
    ws: WsStream,
    base_url: String,
    room: String,
    user_id: String,
    closed: bool,
}

impl RelayClient {
    /// Connects to `room` on the relay at `base_url` as `user_id`.
    ///
    /// The first frame the relay sends is the room's `user_list`, which will
    /// already include this connection.
    ///
    /// # Errors
    ///
    /// - [`ClientError::InvalidUrl`] if the URL cannot be built.
    /// - [`ClientError::Timeout`] if the connection is not established within
    ///   10 seconds.
    /// - [`ClientError::WebSocket`] if the handshake fails, including an
    ///   HTTP 400 for an invalid room or user id.
    pub async fn connect(base_url: &str, room: &str, user_id: &str) -> Result<Self, ClientError> {
        let url = room_url(base_url, room, user_id)?;
        let (ws, _response) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(url.as_str()))
            .await
            .map_err(|_| {
                tracing::warn!(url = %url, "relay connect timed out");
                ClientError::Timeout
            })?
            .map_err(|e| {
                tracing::warn!(url = %url, error = %e, "relay connect failed");
                ClientError::from(e)
            })?;

        tracing::info!(room = %room, user_id = %user_id, "connected to relay");
        Ok(Self {
            ws,
            base_url: base_url.to_string(),
            room: room.to_string(),
            user_id: user_id.to_string(),
            closed: false,
        })
    }

    /// Room this connection is bound to. Empty after a failed
    /// [`RelayClient::switch_room`].
    #[must_use]
    pub fn room(&self) -> &str {
        &self.room
    }

    /// Returns `true` once [`RelayClient::close`] has run, or after a
    /// failed [`RelayClient::switch_room`].
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// User id this connection is bound to.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Sends a client frame.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ConnectionClosed`] or
    /// [`ClientError::WebSocket`] if the frame cannot be written.
    pub async fn send(&mut self, frame: &ClientFrame) -> Result<(), ClientError> {
        self.send_raw(&frame.to_json()).await
    }

    /// Sends an arbitrary text frame.
    ///
    /// # Errors
    ///
    /// See [`RelayClient::send`].
    pub async fn send_raw(&mut self, text: &str) -> Result<(), ClientError> {
        self.ws.send(Message::Text(text.into())).await?;
        Ok(())
    }

    /// Asks the relay for the room's history.
    ///
    /// # Errors
    ///
    /// See [`RelayClient::send`].
    pub async fn request_history(&mut self) -> Result<(), ClientError> {
        self.send(&ClientFrame::GetHistory).await
    }

    /// Broadcasts `text` to the room.
    ///
    /// # Errors
    ///
    /// See [`RelayClient::send`].
    pub async fn send_text(&mut self, text: &str) -> Result<(), ClientError> {
        self.send(&ClientFrame::Broadcast {
            text: text.to_string(),
        })
        .await
    }

    /// Sends a direct message to `recipient_id`.
    ///
    /// # Errors
    ///
    /// See [`RelayClient::send`].
    pub async fn send_private(&mut self, recipient_id: &str, text: &str) -> Result<(), ClientError> {
        self.send(&ClientFrame::PrivateMessage {
            recipient_id: recipient_id.to_string(),
            text: text.to_string(),
        })
        .await
    }

    /// Invites `recipient_id` to a private chat.
    ///
    /// # Errors
    ///
    /// See [`RelayClient::send`].
    pub async fn request_private_chat(&mut self, recipient_id: &str) -> Result<(), ClientError> {
        self.send(&ClientFrame::PrivateChatRequest {
            recipient_id: recipient_id.to_string(),
        })
        .await
    }

    /// Waits for the next server frame.
    ///
    /// Ping, pong and binary frames are skipped.
    ///
    /// # Errors
    ///
    /// - [`ClientError::ConnectionClosed`] when the relay closes the socket.
    /// - [`ClientError::Protocol`] if a text frame does not decode.
    /// - [`ClientError::WebSocket`] on transport failure.
    pub async fn next_frame(&mut self) -> Result<ServerFrame, ClientError> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => return Ok(frame::decode(text.as_str())?),
                Some(Ok(Message::Close(_))) | None => return Err(ClientError::ConnectionClosed),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    /// [`RelayClient::next_frame`] bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Timeout`] if no frame arrives in time, or any
    /// error of [`RelayClient::next_frame`].
    pub async fn next_frame_timeout(&mut self, timeout: Duration) -> Result<ServerFrame, ClientError> {
        tokio::time::timeout(timeout, self.next_frame())
            .await
            .map_err(|_| ClientError::Timeout)?
    }

    /// Leaves the current room and joins `room` on a fresh connection, then
    /// requests its history.
    ///
    /// # Errors
    ///
    /// Any error of [`RelayClient::connect`] or [`RelayClient::send`]. The
    /// old connection is closed even if the new one fails; the client is
    /// then left closed with no room.
    pub async fn switch_room(&mut self, room: &str) -> Result<(), ClientError> {
        self.close().await?;
        match Self::connect(&self.base_url, room, &self.user_id).await {
            Ok(next) => *self = next,
            Err(e) => {
                tracing::warn!(room = %room, user_id = %self.user_id, error = %e, "room switch failed");
                self.room.clear();
                return Err(e);
            }
        }
        self.request_history().await
    }

    /// Closes the connection and waits for the relay to hang up.
    ///
    /// Closing an already-closed connection is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::WebSocket`] if the close frame cannot be sent.
    pub async fn close(&mut self) -> Result<(), ClientError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.ws.close(None).await {
            Ok(()) => {}
            Err(e) => match ClientError::from(e) {
                ClientError::ConnectionClosed => return Ok(()),
                other => return Err(other),
            },
        }
        let _ = tokio::time::timeout(CLOSE_TIMEOUT, async {
            while let Some(Ok(_)) = self.ws.next().await {}
        })
        .await;
        tracing::debug!(room = %self.room, user_id = %self.user_id, "disconnected from relay");
        Ok(())
    }
}
