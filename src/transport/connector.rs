//! Network seam of the transport
//!
//! [`Connector`] opens connections, [`Link`] is one open connection carrying
//! text frames. The production pair runs over `tokio-tungstenite`.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::error::{TransportError, TransportResult};

/// One open streaming connection
#[async_trait]
pub trait Link: Send {
    /// Send one text frame
    async fn send_text(&mut self, text: String) -> TransportResult<()>;

    /// Next text frame; `None` once the peer has closed the connection.
    ///
    /// Must be cancel-safe.
    async fn recv_text(&mut self) -> Option<TransportResult<String>>;

    /// Close the connection
    async fn close(&mut self) -> TransportResult<()>;
}

/// Opens links to a URL
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> TransportResult<Box<dyn Link>>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connector for `ws://` and `wss://` URLs
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> TransportResult<Box<dyn Link>> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(format!("{url}: {e}")))?;
        tracing::debug!(url = %url, "WebSocket opened");
        Ok(Box::new(WsLink { stream }))
    }
}

/// A WebSocket connection
pub struct WsLink {
    stream: WsStream,
}

#[async_trait]
impl Link for WsLink {
    async fn send_text(&mut self, text: String) -> TransportResult<()> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv_text(&mut self) -> Option<TransportResult<String>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Close(frame)) => {
                    tracing::debug!(frame = ?frame, "Peer closed WebSocket");
                    return None;
                }
                // tungstenite answers pings while reading
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
                Ok(Message::Binary(bytes)) => {
                    tracing::debug!(len = bytes.len(), "Ignoring binary frame");
                }
                Err(e) => return Some(Err(TransportError::Receive(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.stream
            .close(None)
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}
