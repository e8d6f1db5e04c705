//! WebSocket transport for feed subscriptions.
//!
//! [`WsDialer`] connects to the exchange endpoint (TLS) and wraps the stream
//! in a [`WsChannel`]. The channel splits the stream so a send never waits on
//! a pending read. `close` cancels a token to unblock a pending read from
//! another task, and drops both halves of the stream (releasing the socket)
//! as soon as neither is in use.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vw_core::error::ChannelError;

use crate::channel::{Channel, Dialer};
use crate::messages::{FeedMessage, SubscribeRequest};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dials WebSocket feed endpoints.
#[derive(Debug, Clone)]
pub struct WsDialer {
    /// Upper bound on TCP + TLS + WebSocket handshake.
    pub timeout: Duration,
}

impl Default for WsDialer {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
        }
    }
}

#[async_trait]
impl Dialer for WsDialer {
    async fn dial(
        &self,
        url: &str,
        extra_headers: &HashMap<String, String>,
    ) -> Result<Arc<dyn Channel>, ChannelError> {
        info!("[ws] connecting to {url}");
        let connect = connect_ws(url, extra_headers);
        let stream = match tokio::time::timeout(self.timeout, connect).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ChannelError::DialTimeout {
                    url: url.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                });
            }
        };
        info!("[ws] connected to {url}");
        Ok(Arc::new(WsChannel::new(url, stream)))
    }
}

/// Establish a (possibly TLS) WebSocket connection.
async fn connect_ws(
    url: &str,
    extra_headers: &HashMap<String, String>,
) -> Result<WsStream, ChannelError> {
    let dial_err = |reason: String| ChannelError::Dial {
        url: url.to_string(),
        reason,
    };

    let mut request = url
        .into_client_request()
        .map_err(|e| dial_err(e.to_string()))?;
    for (key, value) in extra_headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| dial_err(format!("header {key}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| dial_err(format!("header {key}: {e}")))?;
        request.headers_mut().insert(name, value);
    }

    let (stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| dial_err(e.to_string()))?;
    Ok(stream)
}

/// A [`Channel`] over one WebSocket connection.
///
/// Each half is `None` once released by `close`. The socket itself shuts
/// when both halves are gone.
pub struct WsChannel {
    url: String,
    writer: Mutex<Option<SplitSink<WsStream, Message>>>,
    reader: Mutex<Option<SplitStream<WsStream>>>,
    closed: CancellationToken,
}

impl WsChannel {
    fn new(url: &str, stream: WsStream) -> Self {
        let (writer, reader) = stream.split();
        Self {
            url: url.to_string(),
            writer: Mutex::new(Some(writer)),
            reader: Mutex::new(Some(reader)),
            closed: CancellationToken::new(),
        }
    }

    async fn next_message(&self) -> Result<FeedMessage, ChannelError> {
        let mut guard = self.reader.lock().await;
        let Some(reader) = guard.as_mut() else {
            return Err(ChannelError::Closed);
        };
        loop {
            match reader.next().await {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str(&text)
                        .map_err(|e| ChannelError::Decode(e.to_string()));
                }
                Some(Ok(Message::Binary(data))) => {
                    return serde_json::from_slice(&data)
                        .map_err(|e| ChannelError::Decode(e.to_string()));
                }
                Some(Ok(Message::Close(frame))) => {
                    warn!("[ws] {} sent close frame: {frame:?}", self.url);
                    return Err(ChannelError::Closed);
                }
                Some(Err(e)) => return Err(ChannelError::WebSocket(e.to_string())),
                None => return Err(ChannelError::Closed),
                _ => {} // Ping, Pong, Frame — ignore
            }
        }
    }

    async fn write(&self, text: String) -> Result<(), ChannelError> {
        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Err(ChannelError::Closed);
        };
        writer
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| ChannelError::WebSocket(e.to_string()))
    }

    /// Drop whichever halves are not in use right now. A half held by a
    /// pending send or receive is dropped when that call returns.
    fn release(&self) {
        if let Ok(mut writer) = self.writer.try_lock() {
            writer.take();
        }
        if let Ok(mut reader) = self.reader.try_lock() {
            reader.take();
        }
    }
}

#[async_trait]
impl Channel for WsChannel {
    async fn send(&self, request: &SubscribeRequest) -> Result<(), ChannelError> {
        if self.closed.is_cancelled() {
            return Err(ChannelError::Closed);
        }
        let text = serde_json::to_string(request)
            .map_err(|e| ChannelError::Encode(e.to_string()))?;
        debug!("[ws] {} sending: {text}", self.url);

        let res = tokio::select! {
            _ = self.closed.cancelled() => Err(ChannelError::Closed),
            res = self.write(text) => res,
        };
        if self.closed.is_cancelled() {
            self.release();
        }
        res
    }

    async fn receive(&self) -> Result<FeedMessage, ChannelError> {
        let res = tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(ChannelError::Closed),
            res = self.next_message() => res,
        };
        if self.closed.is_cancelled() {
            self.release();
        }
        res
    }

    fn close(&self) -> Result<(), ChannelError> {
        if !self.closed.is_cancelled() {
            debug!("[ws] closing {}", self.url);
            self.closed.cancel();
        }
        self.release();
        Ok(())
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}
