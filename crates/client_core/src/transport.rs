//! Transport seam for the session loop and its websocket implementation.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::debug;

use crate::error::TransportError;

/// One inbound occurrence on an open link.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    Text(String),
    Binary(Vec<u8>),
    /// The link is finished. Every later `recv` keeps returning this.
    Closed { error: Option<TransportError> },
}

#[async_trait]
pub trait TransportLink: Send {
    /// Must be cancel safe: the session loop races it against commands.
    async fn recv(&mut self) -> LinkEvent;
    async fn send_clip(&mut self, clip: Vec<u8>) -> Result<(), TransportError>;
    async fn close(&mut self);
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn TransportLink>, TransportError>;
}

pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn TransportLink>, TransportError> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|err| TransportError::Connect {
                url: url.to_string(),
                reason: err.to_string(),
            })?;
        debug!(url, "websocket connected");
        Ok(Box::new(WsLink {
            stream,
            finished: false,
        }))
    }
}

pub struct WsLink {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    finished: bool,
}

#[async_trait]
impl TransportLink for WsLink {
    async fn recv(&mut self) -> LinkEvent {
        while !self.finished {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return LinkEvent::Text(text),
                Some(Ok(Message::Binary(clip))) => return LinkEvent::Binary(clip),
                Some(Ok(Message::Close(_))) | None => self.finished = true,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    self.finished = true;
                    return LinkEvent::Closed {
                        error: Some(TransportError::Receive(err.to_string())),
                    };
                }
            }
        }
        LinkEvent::Closed { error: None }
    }

    async fn send_clip(&mut self, clip: Vec<u8>) -> Result<(), TransportError> {
        self.stream
            .send(Message::Binary(clip))
            .await
            .map_err(|err| TransportError::Send(err.to_string()))
    }

    async fn close(&mut self) {
        self.finished = true;
        if let Err(err) = self.stream.close(None).await {
            debug!(error = %err, "websocket close handshake failed");
        }
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
