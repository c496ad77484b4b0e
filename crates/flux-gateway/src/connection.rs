use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use flux_types::api::OutboundChat;
use flux_types::models::ChatMessage;

use crate::feed::MessageFeed;

/// Fixed delay between reconnect attempts after an unclean close.
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// Per-room connection state, published through a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("not connected to the channel")]
    NotConnected,

    #[error("outbound buffer is full")]
    SendBufferFull,
}

/// Where the connection gets its bearer token. Re-queried on every
/// connection attempt so reconnects pick up a token refreshed in the
/// meantime. `ApiClient::access_token` fits as a closure.
pub trait TokenSource: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

impl<F> TokenSource for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn access_token(&self) -> Option<String> {
        self()
    }
}

#[derive(Debug, Clone)]
pub struct RoomConfig {
    pub ws_base: Url,
    pub channel_id: i64,
    pub reconnect_interval: Duration,
}

impl RoomConfig {
    pub fn new(ws_base: Url, channel_id: i64) -> Self {
        Self {
            ws_base,
            channel_id,
            reconnect_interval: RECONNECT_INTERVAL,
        }
    }
}

/// Live connection to one chat channel.
///
/// Owns a background task running the connect/reconnect loop:
///
/// `Disconnected -> Connecting -> Connected -> Disconnected`, and back to
/// `Connecting` after the fixed delay whenever the close was not ours.
/// Dropping or closing the room cancels the task; that clean shutdown is
/// never retried.
pub struct ChatRoom {
    state_rx: watch::Receiver<ConnectionState>,
    outbound_tx: mpsc::Sender<String>,
    cancel: CancellationToken,
    feed: Arc<MessageFeed>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl ChatRoom {
    /// Spawn the connection loop for a channel. `history` is the REST
    /// message backlog; it lands in the feed before the loop task starts,
    /// so a frame arriving right after connect cannot be wiped by it.
    pub fn connect(
        config: RoomConfig,
        tokens: Arc<dyn TokenSource>,
        history: Vec<ChatMessage>,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let feed = Arc::new(MessageFeed::new());
        feed.seed(history);

        let task = tokio::spawn(run_loop(
            config,
            tokens,
            state_tx,
            outbound_rx,
            cancel.clone(),
            feed.clone(),
        ));

        Self {
            state_rx,
            outbound_tx,
            cancel,
            feed,
            task: Some(task),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch for state transitions (UI spinners, tests).
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    pub fn feed(&self) -> &Arc<MessageFeed> {
        &self.feed
    }

    /// Send a message over the live connection. Rejected, not queued,
    /// while the room is `Connecting` or `Disconnected`.
    pub fn send(&self, content: &str) -> Result<(), GatewayError> {
        if self.state() != ConnectionState::Connected {
            return Err(GatewayError::NotConnected);
        }
        self.outbound_tx
            .try_send(content.to_string())
            .map_err(send_error)
    }

    /// Intentional shutdown: closes the transport cleanly and suppresses
    /// the reconnect path.
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ChatRoom {
    fn drop(&mut self) {
        // A dropped handle is also an intentional teardown.
        self.cancel.cancel();
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Truncate to at most `max` bytes without splitting a UTF-8 character.
/// Log-only; a byte slice here would panic on multibyte frames.
fn truncate_at_boundary(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn send_error(e: mpsc::error::TrySendError<String>) -> GatewayError {
    match e {
        mpsc::error::TrySendError::Full(_) => GatewayError::SendBufferFull,
        mpsc::error::TrySendError::Closed(_) => GatewayError::NotConnected,
    }
}

fn room_url(config: &RoomConfig, token: &str) -> Url {
    let mut url = config.ws_base.clone();
    // Append to any path the base already carries (reverse proxies mount
    // the backend under a prefix).
    let base = url.path().trim_end_matches('/').to_string();
    url.set_path(&format!("{base}/chat/ws/{}", config.channel_id));
    url.query_pairs_mut().clear().append_pair("token", token);
    url
}

async fn run_loop(
    config: RoomConfig,
    tokens: Arc<dyn TokenSource>,
    state_tx: watch::Sender<ConnectionState>,
    mut outbound_rx: mpsc::Receiver<String>,
    cancel: CancellationToken,
    feed: Arc<MessageFeed>,
) {
    let channel_id = config.channel_id;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        state_tx.send_replace(ConnectionState::Connecting);

        let connected = match tokens.access_token() {
            Some(token) => {
                let url = room_url(&config, &token);
                tokio::select! {
                    result = connect_async(url.as_str()) => match result {
                        Ok((stream, _resp)) => Some(stream),
                        Err(e) => {
                            warn!("channel {channel_id}: connect failed: {e}");
                            None
                        }
                    },
                    _ = cancel.cancelled() => break,
                }
            }
            None => {
                warn!("channel {channel_id}: no access token available");
                None
            }
        };

        if let Some(stream) = connected {
            info!("channel {channel_id}: connected");
            state_tx.send_replace(ConnectionState::Connected);

            // Sends accepted for a previous session are stale; drop them
            // rather than replaying them on the new connection.
            while outbound_rx.try_recv().is_ok() {}

            let clean = run_session(stream, &mut outbound_rx, &cancel, &feed).await;
            state_tx.send_replace(ConnectionState::Disconnected);

            if clean {
                info!("channel {channel_id}: closed");
                break;
            }
            warn!("channel {channel_id}: connection lost, reconnecting in {:?}", config.reconnect_interval);
        } else {
            state_tx.send_replace(ConnectionState::Disconnected);
        }

        // Unclean close or failed attempt: retry after the fixed delay,
        // indefinitely. Teardown during the wait exits immediately.
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(config.reconnect_interval) => {}
        }
    }

    state_tx.send_replace(ConnectionState::Disconnected);
}

/// Drive one open connection until it dies or is torn down. Returns true
/// for a clean, client-initiated close.
async fn run_session(
    stream: WsStream,
    outbound_rx: &mut mpsc::Receiver<String>,
    cancel: &CancellationToken,
    feed: &MessageFeed,
) -> bool {
    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ChatMessage>(&text) {
                        Ok(message) => feed.append(message),
                        Err(e) => warn!(
                            "dropping unparseable frame: {e} -- raw: {}",
                            truncate_at_boundary(&text, 200)
                        ),
                    }
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) => {
                    // Server-initiated close: not ours, so the reconnect
                    // loop takes over.
                    return false;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("transport error: {e}");
                    return false;
                }
                None => return false,
            },
            content = outbound_rx.recv() => {
                if let Some(content) = content {
                    let frame = serde_json::to_string(&OutboundChat { content })
                        .expect("OutboundChat serializes");
                    if let Err(e) = sink.send(Message::Text(frame.into())).await {
                        warn!("send failed: {e}");
                        return false;
                    }
                }
            }
            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        // Each '€' is 3 bytes; 200 lands mid-character.
        let text = "€".repeat(100);
        let cut = truncate_at_boundary(&text, 200);
        assert_eq!(cut.len(), 198);
        assert!(text.starts_with(cut));

        assert_eq!(truncate_at_boundary("short", 200), "short");
    }

    #[test]
    fn full_buffer_reports_send_buffer_full() {
        let full = mpsc::error::TrySendError::Full(String::from("hi"));
        assert!(matches!(send_error(full), GatewayError::SendBufferFull));

        let closed = mpsc::error::TrySendError::Closed(String::from("hi"));
        assert!(matches!(send_error(closed), GatewayError::NotConnected));
    }

    #[test]
    fn room_url_keeps_base_path_prefix() {
        let config = RoomConfig::new(
            Url::parse("ws://gateway.example.com/flux/").unwrap(),
            7,
        );
        let url = room_url(&config, "tok");
        assert_eq!(url.path(), "/flux/chat/ws/7");
        assert_eq!(url.query(), Some("token=tok"));
    }
}
