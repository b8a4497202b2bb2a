//! Realtime chat channel: one WebSocket, reconnected automatically.
//!
//! `open()` spawns a driver task that owns the socket and the retry timer.
//! After any unintended disconnect the driver waits a fixed delay and dials
//! again, forever, until `close()` cancels it. Calling `open()` during that
//! wait skips the rest of it. Sends are fire-and-forget: a
//! message is only written if a connection is open at the moment of the call.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{Config, DEFAULT_RECONNECT_DELAY_MS};
use crate::error::ChannelError;
use crate::messages::ChatMessage;
use crate::session::SessionStore;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Subscriber for inbound chat messages.
pub type MessageHandler = Arc<dyn Fn(&ChatMessage) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Connecting,
    Open,
}

struct Driver {
    id: u64,
    cancel: CancellationToken,
    /// Cuts a pending retry wait short.
    wake: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

/// Mutable connection bookkeeping. `outbound` is `Some` exactly while a
/// connection is open.
#[derive(Default)]
struct Live {
    driver: Option<Driver>,
    outbound: Option<mpsc::UnboundedSender<String>>,
    next_id: u64,
}

struct Inner {
    url: String,
    reconnect_delay: Duration,
    session: SessionStore,
    state: watch::Sender<ConnectionState>,
    handlers: Mutex<Vec<MessageHandler>>,
    live: Mutex<Live>,
}

/// Cheap to clone; all clones drive the same connection.
#[derive(Clone)]
pub struct RealtimeChannel {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RealtimeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeChannel")
            .field("url", &self.inner.url)
            .field("state", &self.state())
            .finish()
    }
}

impl RealtimeChannel {
    /// Channel to `url` (e.g. `ws://localhost:3003/ws`) with the default 1 s retry delay.
    pub fn new(url: impl Into<String>, session: SessionStore) -> Self {
        Self::with_reconnect_delay(
            url,
            Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            session,
        )
    }

    pub fn with_reconnect_delay(
        url: impl Into<String>,
        reconnect_delay: Duration,
        session: SessionStore,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Closed);
        Self {
            inner: Arc::new(Inner {
                url: url.into(),
                reconnect_delay,
                session,
                state,
                handlers: Mutex::new(Vec::new()),
                live: Mutex::new(Live::default()),
            }),
        }
    }

    pub fn from_config(config: &Config, session: SessionStore) -> Self {
        Self::with_reconnect_delay(config.chat_url(), config.reconnect_delay(), session)
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Receiver that sees every state transition.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Start connecting. A no-op while connecting or open; while a retry is
    /// pending, the retry happens now. Needs a Tokio runtime.
    pub fn open(&self) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                error!("cannot open chat channel outside a Tokio runtime: {e}");
                return;
            }
        };

        let mut live = self.inner.live();
        if let Some(driver) = live.driver.as_ref() {
            if self.state() == ConnectionState::Closed {
                debug!("chat retry pending; reconnecting now");
                self.inner.state.send_replace(ConnectionState::Connecting);
                driver.wake.notify_one();
            } else {
                debug!("chat channel already active");
            }
            return;
        }
        live.next_id += 1;
        let id = live.next_id;
        let cancel = CancellationToken::new();
        let wake = Arc::new(Notify::new());
        self.inner.state.send_replace(ConnectionState::Connecting);
        let task = runtime.spawn(drive(
            self.inner.clone(),
            id,
            cancel.clone(),
            wake.clone(),
        ));
        live.driver = Some(Driver {
            id,
            cancel,
            wake,
            task: Some(task),
        });
    }

    /// Stop the connection and any pending retry. Nothing reconnects until the
    /// next `open()`.
    pub fn close(&self) {
        drop(self.stop());
    }

    /// [`close`](Self::close), then wait for the driver to finish writing
    /// messages accepted before the call.
    pub async fn shutdown(&self) {
        if let Some(task) = self.stop() {
            if let Err(e) = task.await {
                warn!("chat driver ended abnormally: {e}");
            }
        }
    }

    /// Send `content` as the logged-in user. Dropped silently when the channel
    /// is not open, the content is blank, or nobody is logged in.
    pub fn send(&self, content: &str) {
        if content.trim().is_empty() {
            debug!("ignoring blank chat message");
            return;
        }
        let Some(session) = self.inner.session.current() else {
            debug!("not logged in; chat message dropped");
            return;
        };

        let live = self.inner.live();
        let Some(outbound) = live.outbound.as_ref() else {
            debug!("chat channel not open; message dropped");
            return;
        };
        let message = ChatMessage {
            content: content.to_string(),
            username: session.username,
            user_id: session.user_id,
        };
        match serde_json::to_string(&message) {
            Ok(frame) => {
                if outbound.send(frame).is_err() {
                    debug!("chat connection went away; message dropped");
                }
            }
            Err(e) => warn!("failed to serialize chat message: {e}"),
        }
    }

    /// Register a subscriber; called once per inbound message, in arrival order.
    pub fn on_message<F>(&self, handler: F)
    where
        F: Fn(&ChatMessage) + Send + Sync + 'static,
    {
        self.inner.handlers().push(Arc::new(handler));
    }

    /// Follow the session store: open on login, close on logout or
    /// invalidation. Opens right away if a session already exists.
    pub fn attach_to_session(&self) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        self.inner.session.on_change(move |session| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let channel = RealtimeChannel { inner };
            match session {
                Some(_) => channel.open(),
                None => channel.close(),
            }
        });
        if self.inner.session.is_logged_in() {
            self.open();
        }
    }

    fn stop(&self) -> Option<JoinHandle<()>> {
        let mut live = self.inner.live();
        live.outbound = None;
        self.inner.state.send_replace(ConnectionState::Closed);
        let mut driver = live.driver.take()?;
        driver.cancel.cancel();
        info!(url = %self.inner.url, "chat channel closed");
        driver.task.take()
    }
}

impl Inner {
    fn live(&self) -> MutexGuard<'_, Live> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handlers(&self) -> MutexGuard<'_, Vec<MessageHandler>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a transition on behalf of driver `id`. Returns false, changing
    /// nothing, if that driver has been closed or replaced.
    fn transition(
        &self,
        id: u64,
        state: ConnectionState,
        outbound: Option<mpsc::UnboundedSender<String>>,
    ) -> bool {
        let mut live = self.live();
        if live.driver.as_ref().map(|d| d.id) != Some(id) {
            return false;
        }
        live.outbound = outbound;
        self.state.send_replace(state);
        debug!(?state, "chat state changed");
        true
    }

    fn deliver(&self, text: &str) {
        match ChatMessage::from_frame(text) {
            Ok(message) => {
                let handlers = self.handlers().clone();
                for handler in &handlers {
                    handler(&message);
                }
            }
            Err(e) => warn!("discarding malformed chat frame: {e}"),
        }
    }

    /// Pump one open connection. `Ok(())` means the channel was closed on
    /// purpose; `Err` is an unintended disconnect.
    async fn serve(
        &self,
        id: u64,
        stream: WsStream,
        cancel: &CancellationToken,
    ) -> Result<(), ChannelError> {
        let (mut sink, mut source) = stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        if !self.transition(id, ConnectionState::Open, Some(tx)) {
            return Ok(());
        }
        info!(url = %self.url, "chat connected");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    // Flush what was accepted before close().
                    while let Ok(frame) = rx.try_recv() {
                        if sink.send(Message::Text(frame)).await.is_err() {
                            break;
                        }
                    }
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(());
                }
                outgoing = rx.recv() => match outgoing {
                    Some(frame) => sink
                        .send(Message::Text(frame))
                        .await
                        .map_err(ChannelError::Transport)?,
                    None => {
                        let _ = sink.send(Message::Close(None)).await;
                        return Ok(());
                    }
                },
                incoming = source.next() => match incoming {
                    Some(Ok(Message::Text(text))) => self.deliver(&text),
                    Some(Ok(Message::Close(_))) | None => return Err(ChannelError::ClosedByPeer),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(ChannelError::Transport(e)),
                },
            }
        }
    }
}

/// Driver loop: connect, serve, wait, repeat until cancelled.
async fn drive(inner: Arc<Inner>, id: u64, cancel: CancellationToken, wake: Arc<Notify>) {
    loop {
        if !inner.transition(id, ConnectionState::Connecting, None) {
            return;
        }
        debug!(url = %inner.url, "connecting to chat");

        let connected = tokio::select! {
            _ = cancel.cancelled() => return,
            result = tokio_tungstenite::connect_async(inner.url.as_str()) => result,
        };
        let ended = match connected {
            Ok((stream, _)) => match inner.serve(id, stream, &cancel).await {
                Ok(()) => return,
                Err(e) => e,
            },
            Err(e) => ChannelError::Handshake(e),
        };
        warn!(url = %inner.url, "chat disconnected: {ended}");

        if !inner.transition(id, ConnectionState::Closed, None) {
            return;
        }
        debug!(delay = ?inner.reconnect_delay, "scheduling chat reconnect");
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = wake.notified() => {}
            _ = tokio::time::sleep(inner.reconnect_delay) => {}
        }
    }
}
