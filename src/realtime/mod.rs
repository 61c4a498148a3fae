//! Websocket listener forwarding remote row changes to snapshot listeners
//!
//! [`RealtimeListener`] joins one `postgres_changes` channel per collection
//! and republishes every INSERT/UPDATE/DELETE as a [`ChangeEvent`] on the
//! broadcast channel of the [`RestStore`](crate::store::RestStore), so
//! subscriptions opened through the access layers refresh on remote writes.

mod message;

use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::config::RealtimeOptions;
use crate::error::{Error, Result};
use crate::fetch::AccessToken;
use crate::store::ChangeEvent;

pub use message::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Why a connected session ended
enum SessionEnd {
    Stopped,
    Closed,
}

#[derive(Debug, Clone)]
struct ListenerConfig {
    url: String,
    key: String,
    schema: String,
    access_token: AccessToken,
    collections: Vec<String>,
    options: RealtimeOptions,
}

struct Running {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct RealtimeListener {
    config: ListenerConfig,
    publisher: broadcast::Sender<ChangeEvent>,
    state_tx: watch::Sender<ConnectionState>,
    running: Option<Running>,
}

impl RealtimeListener {
    /// `publisher` is usually [`RestStore::change_publisher`](crate::store::RestStore::change_publisher)
    pub fn new(url: &str, key: &str, publisher: broadcast::Sender<ChangeEvent>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config: ListenerConfig {
                url: url.trim_end_matches('/').to_string(),
                key: key.to_string(),
                schema: "public".to_string(),
                access_token: AccessToken::new(),
                collections: Vec::new(),
                options: RealtimeOptions::default(),
            },
            publisher,
            state_tx,
            running: None,
        }
    }

    pub fn with_options(mut self, options: RealtimeOptions) -> Self {
        self.config.options = options;
        self
    }

    pub fn with_schema(mut self, schema: &str) -> Self {
        self.config.schema = schema.to_string();
        self
    }

    /// Token sent with each join so row level security applies; read again
    /// on every (re)connect
    pub fn with_access_token(mut self, token: AccessToken) -> Self {
        self.config.access_token = token;
        self
    }

    /// Add collections to listen to
    pub fn listen_to(mut self, collections: &[&str]) -> Self {
        for collection in collections {
            if !self.config.collections.iter().any(|c| c == collection) {
                self.config.collections.push(collection.to_string());
            }
        }
        self
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Watch connection state changes
    pub fn on_state_change(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .map(|r| !r.task.is_finished())
            .unwrap_or(false)
    }

    /// Connect in the background, reconnecting with backoff until
    /// [`RealtimeListener::shutdown`]
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(Error::realtime("listener already running"));
        }
        if self.config.collections.is_empty() {
            return Err(Error::realtime("no collections to listen to"));
        }
        websocket_url(&self.config.url, &self.config.key)?;

        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run(
            self.config.clone(),
            self.publisher.clone(),
            self.state_tx.clone(),
            stop_rx,
        ));
        self.running = Some(Running { stop, task });
        Ok(())
    }

    /// Close the socket and wait for the background task
    pub async fn shutdown(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.stop.send(true);
            if let Err(e) = running.task.await {
                log::warn!("Realtime task ended abnormally: {}", e);
            }
        }
        self.state_tx.send_replace(ConnectionState::Disconnected);
    }
}

impl Drop for RealtimeListener {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.stop.send(true);
            running.task.abort();
        }
    }
}

/// `ws(s)://host/realtime/v1/websocket?apikey=..&vsn=1.0.0`
pub fn websocket_url(base: &str, key: &str) -> Result<Url> {
    let mut url = Url::parse(base)?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(Error::realtime(format!("Unsupported URL scheme: {}", other)));
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| Error::realtime(format!("Cannot use {} for {}", scheme, base)))?;
    url.set_path("/realtime/v1/websocket");
    url.query_pairs_mut()
        .clear()
        .append_pair("apikey", key)
        .append_pair("vsn", "1.0.0");
    Ok(url)
}

/// Next reconnect delay: grow by `factor`, never beyond `max`
pub fn next_delay(current: Duration, factor: f64, max: Duration) -> Duration {
    // `f64::max` maps NaN to 1.0
    let factor = factor.max(1.0);
    Duration::try_from_secs_f64(current.as_secs_f64() * factor)
        .map_or(max, |delay| delay.min(max))
}

async fn run(
    config: ListenerConfig,
    publisher: broadcast::Sender<ChangeEvent>,
    state: watch::Sender<ConnectionState>,
    mut stop: watch::Receiver<bool>,
) {
    let options = &config.options;
    let mut attempts: u32 = 0;
    let mut delay = options.reconnect_interval;
    state.send_replace(ConnectionState::Connecting);

    loop {
        match connect_once(&config, &publisher, &state, &mut stop).await {
            Ok(SessionEnd::Stopped) => break,
            Ok(SessionEnd::Closed) => {
                log::info!("Realtime connection closed by server");
                attempts = 0;
                delay = options.reconnect_interval;
            }
            Err(e) => log::warn!("Realtime connection failed: {}", e),
        }

        attempts += 1;
        if let Some(max) = options.max_reconnect_attempts {
            if attempts > max {
                log::error!("Giving up on realtime after {} attempts", max);
                break;
            }
        }

        state.send_replace(ConnectionState::Reconnecting);
        log::debug!("Reconnecting in {:?} (attempt #{})", delay, attempts);
        tokio::select! {
            _ = sleep(delay) => {}
            _ = stop.changed() => break,
        }
        delay = next_delay(delay, options.reconnect_backoff_factor, options.max_reconnect_interval);
    }

    state.send_replace(ConnectionState::Disconnected);
}

async fn connect_once(
    config: &ListenerConfig,
    publisher: &broadcast::Sender<ChangeEvent>,
    state: &watch::Sender<ConnectionState>,
    stop: &mut watch::Receiver<bool>,
) -> Result<SessionEnd> {
    if *stop.borrow() {
        return Ok(SessionEnd::Stopped);
    }

    let url = websocket_url(&config.url, &config.key)?;
    let (stream, _) = tokio::select! {
        connected = connect_async(url.as_str()) => connected?,
        _ = stop.changed() => return Ok(SessionEnd::Stopped),
    };
    state.send_replace(ConnectionState::Connected);
    log::info!("Realtime connected to {}", url.host_str().unwrap_or_default());

    let (mut write, mut read) = stream.split();
    let refs = AtomicU64::new(1);
    let next_ref = || refs.fetch_add(1, Ordering::SeqCst).to_string();

    let token = config.access_token.get();
    for collection in &config.collections {
        let join = RealtimeMessage::join(collection, &config.schema, token.as_deref(), next_ref());
        write.send(Message::Text(serde_json::to_string(&join)?)).await?;
        log::debug!("Joined {}", join.topic);
    }

    let mut heartbeat = interval(config.options.heartbeat_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            _ = stop.changed() => {
                let _ = write.send(Message::Close(None)).await;
                return Ok(SessionEnd::Stopped);
            }
            _ = heartbeat.tick() => {
                let frame = RealtimeMessage::heartbeat(next_ref());
                write.send(Message::Text(serde_json::to_string(&frame)?)).await?;
                log::trace!("Heartbeat sent");
            }
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => dispatch(&text, publisher),
                Some(Ok(Message::Close(_))) | None => return Ok(SessionEnd::Closed),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
        }
    }
}

fn dispatch(text: &str, publisher: &broadcast::Sender<ChangeEvent>) {
    let frame = match serde_json::from_str::<RealtimeMessage>(text) {
        Ok(frame) => frame,
        Err(e) => {
            log::error!("Unreadable realtime frame: {}. Raw: {}", e, text);
            return;
        }
    };

    if let Some(change) = frame.change_event() {
        log::debug!("{:?} on {} ({:?})", change.kind, change.collection, change.id);
        // No receivers just means nobody is subscribed right now
        let _ = publisher.send(change);
    } else if frame.reply_status() == Some("error") || frame.event == ChannelEvent::PhoenixError {
        log::warn!("Realtime error on {}: {}", frame.topic, frame.payload);
    } else {
        log::trace!("Ignoring {:?} on {}", frame.event, frame.topic);
    }
}
