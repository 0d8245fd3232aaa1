use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::TransportError;

/// Close codes the backend uses to say "do not reconnect"
pub const TERMINAL_CLOSE_CODES: [u16; 2] = [1008, 4001];

#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Text(String),
    /// The peer went away. `reconnect` is false when the server asked the
    /// client not to come back.
    Closed { reconnect: bool },
}

/// One established bidirectional connection
#[async_trait::async_trait]
pub trait Link: Send {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Next inbound event. Must be cancel-safe.
    async fn next_event(&mut self) -> LinkEvent;

    async fn close(&mut self);
}

/// Factory for [`Link`]s to the assistant backend
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Link>, TransportError>;

    /// Endpoint description for logging
    fn endpoint(&self) -> &str;
}

/// WebSocket connector with JSON text framing
pub struct WebSocketConnector {
    url: String,
    display_url: String,
}

impl WebSocketConnector {
    pub fn new(url: &str, auth_token: Option<&str>) -> Result<Self, TransportError> {
        let mut endpoint =
            Url::parse(url).map_err(|e| TransportError::InvalidUrl(format!("{}: {}", url, e)))?;
        if !matches!(endpoint.scheme(), "ws" | "wss") {
            return Err(TransportError::InvalidUrl(url.to_string()));
        }

        if let Some(token) = auth_token {
            endpoint.query_pairs_mut().append_pair("token", token);
        }

        Ok(Self {
            url: endpoint.into(),
            display_url: url.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<Box<dyn Link>, TransportError> {
        debug!("Opening WebSocket to {}", self.display_url);

        let (ws, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        info!("WebSocket connected to {}", self.display_url);
        Ok(Box::new(WebSocketLink { ws }))
    }

    fn endpoint(&self) -> &str {
        &self.display_url
    }
}

pub struct WebSocketLink {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait::async_trait]
impl Link for WebSocketLink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.ws
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn next_event(&mut self) -> LinkEvent {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => return LinkEvent::Text(text.to_string()),
                Some(Ok(Message::Close(frame))) => {
                    let reconnect = match frame {
                        Some(frame) => {
                            let code = u16::from(frame.code);
                            info!("Server closed link (code {}): {}", code, frame.reason);
                            !TERMINAL_CLOSE_CODES.contains(&code)
                        }
                        None => true,
                    };
                    return LinkEvent::Closed { reconnect };
                }
                // Pings are answered by tungstenite itself; binary frames are not part
                // of the protocol.
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    warn!("WebSocket read error: {}", e);
                    return LinkEvent::Closed { reconnect: true };
                }
                None => return LinkEvent::Closed { reconnect: true },
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.ws.close(None).await {
            debug!("WebSocket close: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_websocket_url() {
        assert!(matches!(
            WebSocketConnector::new("http://localhost:8000", None),
            Err(TransportError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_token_is_appended_but_not_logged() {
        let connector = WebSocketConnector::new("ws://localhost:8000/ws", Some("abc")).unwrap();
        assert_eq!(connector.url, "ws://localhost:8000/ws?token=abc");
        assert_eq!(connector.endpoint(), "ws://localhost:8000/ws");

        let connector = WebSocketConnector::new("wss://host/ws?v=1", Some("abc")).unwrap();
        assert_eq!(connector.url, "wss://host/ws?v=1&token=abc");
    }

    #[test]
    fn test_token_is_query_encoded() {
        let connector = WebSocketConnector::new("ws://localhost:8000/ws", Some("a&b=c#d")).unwrap();
        assert_eq!(connector.url, "ws://localhost:8000/ws?token=a%26b%3Dc%23d");

        assert!(matches!(
            WebSocketConnector::new("not a url", None),
            Err(TransportError::InvalidUrl(_))
        ));
    }
}
