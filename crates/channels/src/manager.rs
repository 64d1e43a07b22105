//! Fan-in/fan-out routing across registered channels.
//!
//! The manager owns the channel registry, supervises connect/disconnect, and
//! merges every channel's inbound stream into one bounded aggregate queue.
//! Ordering is per-source FIFO only: messages from one channel keep their
//! order, nothing is guaranteed across channels.

use std::{collections::HashMap, sync::Arc};

use {
    tokio::{
        sync::{Mutex, RwLock, mpsc},
        task::JoinHandle,
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use crate::{
    channel::Channel,
    error::{Error, Result},
    types::{HealthStatus, IncomingMessage, MediaMessage, OutgoingMessage},
};

/// Capacity of the aggregate inbound queue.
///
/// Publishing into a full queue drops the message (logged) instead of
/// blocking the channel's own receive loop.
pub const INBOX_CAPACITY: usize = 256;

/// Aggregates registered channels into one inbound stream and routes
/// outbound calls by channel name.
///
/// Lifecycle: [`register`](Self::register) channels, [`start`](Self::start),
/// consume [`messages`](Self::messages), [`stop`](Self::stop). The stop
/// ordering is load-bearing: channels are disconnected (closing their
/// streams) and every listener is joined before the aggregate queue closes,
/// so a listener can never publish into a closed queue.
pub struct ChannelManager {
    channels: RwLock<HashMap<String, Arc<dyn Channel>>>,
    inbox_tx: Mutex<Option<mpsc::Sender<IncomingMessage>>>,
    inbox_rx: Mutex<Option<mpsc::Receiver<IncomingMessage>>>,
    listeners: Mutex<Vec<JoinHandle<()>>>,
    cancel: Mutex<CancellationToken>,
}

impl ChannelManager {
    /// Create an empty manager with no registered channels.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        Self {
            channels: RwLock::new(HashMap::new()),
            inbox_tx: Mutex::new(Some(tx)),
            inbox_rx: Mutex::new(Some(rx)),
            listeners: Mutex::new(Vec::new()),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Register a channel before [`start`](Self::start).
    ///
    /// The first registration of a name wins; a collision is an error and
    /// leaves the existing channel in place.
    pub async fn register(&self, channel: Arc<dyn Channel>) -> Result<()> {
        let name = channel.name().to_string();
        let mut channels = self.channels.write().await;
        if channels.contains_key(&name) {
            return Err(Error::duplicate_channel(name));
        }
        info!(channel = %name, "registering channel");
        channels.insert(name, channel);
        Ok(())
    }

    /// Connect every registered channel and spawn a listener per connection.
    ///
    /// A failed connect is logged and skipped; the call errors only when at
    /// least one channel was registered and none connected. Zero registered
    /// channels is a valid, channel-less mode.
    pub async fn start(&self) -> Result<()> {
        let snapshot: Vec<Arc<dyn Channel>> =
            self.channels.read().await.values().cloned().collect();

        // A previous stop() consumed the queue; a restart gets a fresh one.
        {
            let mut tx = self.inbox_tx.lock().await;
            if tx.is_none() {
                let (new_tx, new_rx) = mpsc::channel(INBOX_CAPACITY);
                *tx = Some(new_tx);
                *self.inbox_rx.lock().await = Some(new_rx);
            }
        }
        let cancel = CancellationToken::new();
        *self.cancel.lock().await = cancel.clone();

        if snapshot.is_empty() {
            info!("no channels registered, starting in channel-less mode");
            return Ok(());
        }

        let Some(tx) = self.inbox_tx.lock().await.clone() else {
            return Err(Error::stream_unavailable("aggregate queue missing"));
        };

        let mut connected = 0usize;
        let mut listeners = self.listeners.lock().await;
        for channel in snapshot {
            let name = channel.name().to_string();
            if let Err(e) = channel.connect().await {
                error!(channel = %name, error = %e, "channel failed to connect, skipping");
                continue;
            }
            let rx = match channel.receive().await {
                Ok(rx) => rx,
                Err(e) => {
                    error!(channel = %name, error = %e, "channel has no inbound stream, skipping");
                    continue;
                }
            };
            info!(channel = %name, "channel connected");
            connected += 1;
            listeners.push(tokio::spawn(listen(name, rx, tx.clone(), cancel.clone())));
        }

        if connected == 0 {
            return Err(Error::NoChannelsConnected);
        }
        info!(connected, "channel manager started");
        Ok(())
    }

    /// Disconnect every channel and close the aggregate queue.
    ///
    /// Disconnecting first closes each channel's inbound stream, which
    /// unblocks any listener stuck on it; only after every listener has been
    /// joined is the queue sender dropped.
    pub async fn stop(&self) {
        self.cancel.lock().await.cancel();

        let snapshot: Vec<Arc<dyn Channel>> =
            self.channels.read().await.values().cloned().collect();
        for channel in snapshot {
            if let Err(e) = channel.disconnect().await {
                warn!(channel = %channel.name(), error = %e, "error disconnecting channel");
            }
        }

        let handles: Vec<JoinHandle<()>> = self.listeners.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "listener task failed");
            }
        }

        // Every listener (and its queue sender clone) is gone; dropping ours
        // closes the aggregate stream for the consumer.
        self.inbox_tx.lock().await.take();
        info!("channel manager stopped");
    }

    /// Take the read side of the aggregate stream.
    ///
    /// Can be taken once per start cycle; returns `None` if already taken.
    pub async fn messages(&self) -> Option<mpsc::Receiver<IncomingMessage>> {
        self.inbox_rx.lock().await.take()
    }

    /// Look up a channel by name, e.g. for direct capability access.
    pub async fn get(&self, name: &str) -> Option<Arc<dyn Channel>> {
        self.channels.read().await.get(name).cloned()
    }

    /// Deliver a text message through the named channel.
    pub async fn send(&self, channel: &str, to: &str, msg: &OutgoingMessage) -> Result<()> {
        self.resolve(channel).await?.send(to, msg).await
    }

    /// Deliver a media message through the named channel.
    ///
    /// Errors with [`Error::MediaUnsupported`] when the channel lacks the
    /// media capability.
    pub async fn send_media(&self, channel: &str, to: &str, msg: &MediaMessage) -> Result<()> {
        let ch = self.resolve(channel).await?;
        match ch.media() {
            Some(media) => media.send_media(to, msg).await,
            None => Err(Error::media_unsupported(channel)),
        }
    }

    /// Best-effort typing indicator. Missing channel, missing capability,
    /// and send errors are logged and swallowed.
    pub async fn send_typing(&self, channel: &str, to: &str) {
        let Ok(ch) = self.resolve(channel).await else {
            debug!(channel, "typing indicator for unknown channel, ignored");
            return;
        };
        if let Some(presence) = ch.presence() {
            if let Err(e) = presence.send_typing(to).await {
                debug!(channel, error = %e, "typing indicator failed");
            }
        }
    }

    /// Best-effort read receipt.
    pub async fn mark_read(&self, channel: &str, chat_id: &str, message_id: &str) {
        let Ok(ch) = self.resolve(channel).await else {
            debug!(channel, "read receipt for unknown channel, ignored");
            return;
        };
        if let Some(presence) = ch.presence() {
            if let Err(e) = presence.mark_read(chat_id, message_id).await {
                debug!(channel, error = %e, "read receipt failed");
            }
        }
    }

    /// Best-effort emoji reaction.
    pub async fn send_reaction(&self, channel: &str, chat_id: &str, message_id: &str, emoji: &str) {
        let Ok(ch) = self.resolve(channel).await else {
            debug!(channel, "reaction for unknown channel, ignored");
            return;
        };
        if let Some(reactions) = ch.reactions() {
            if let Err(e) = reactions.send_reaction(chat_id, message_id, emoji).await {
                debug!(channel, error = %e, "reaction failed");
            }
        }
    }

    /// Health snapshot of every registered channel, sorted by name.
    pub async fn health_all(&self) -> Vec<(String, HealthStatus)> {
        let channels = self.channels.read().await;
        let mut result: Vec<(String, HealthStatus)> = channels
            .iter()
            .map(|(name, ch)| (name.clone(), ch.health()))
            .collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }

    async fn resolve(&self, name: &str) -> Result<Arc<dyn Channel>> {
        self.channels
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| Error::unknown_channel(name))
    }
}

impl Default for ChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Forward one channel's inbound stream into the aggregate queue.
///
/// Runs until the channel closes its stream or the manager cancels. A full
/// aggregate queue drops the message rather than blocking; a cancelled
/// listener may leave already-buffered messages undelivered — both are
/// deliberate trades of completeness for liveness.
async fn listen(
    channel: String,
    mut rx: mpsc::Receiver<IncomingMessage>,
    tx: mpsc::Sender<IncomingMessage>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            msg = rx.recv() => match msg {
                Some(msg) => {
                    if tx.try_send(msg).is_err() {
                        warn!(channel = %channel, "aggregate queue full, inbound message dropped");
                    }
                }
                // The channel closed its stream (disconnect or shutdown).
                None => break,
            },
        }
    }
    debug!(channel = %channel, "listener stopped");
}
