//! The channel capability contract.
//!
//! [`Channel`] is the required surface every platform adapter implements.
//! Media, presence, and reaction support are separate traits probed at call
//! time through the defaulted accessors, so an adapter opts in by overriding
//! the accessor rather than by stubbing unsupported methods.

use {async_trait::async_trait, tokio::sync::mpsc};

use crate::{
    error::Result,
    types::{HealthStatus, IncomingMessage, MediaMessage, OutgoingMessage, Presence},
};

/// One concrete connection to a chat platform.
///
/// All methods take `&self`: adapters keep their connection state behind
/// interior mutability so a connected channel can send from several tasks
/// concurrently. Implementations must be `Send + Sync`.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Stable identifier for this channel (e.g. `"whatsapp"`).
    ///
    /// Used as the registry key inside the manager; unique per manager.
    fn name(&self) -> &str;

    /// Establish the connection. Idempotent: a no-op when already connected.
    async fn connect(&self) -> Result<()>;

    /// Close the connection and the inbound stream. Idempotent.
    async fn disconnect(&self) -> Result<()>;

    /// Deliver one text message.
    ///
    /// Must fail with [`Error::NotConnected`](crate::Error::NotConnected)
    /// unless the channel is connected.
    async fn send(&self, to: &str, msg: &OutgoingMessage) -> Result<()>;

    /// Hand over the inbound stream for the current connection.
    ///
    /// Single-producer: the adapter owns the sender side and closes the
    /// stream (drops its sender) when it disconnects. The receiver can be
    /// taken once per connection.
    async fn receive(&self) -> Result<mpsc::Receiver<IncomingMessage>>;

    /// Current connection state without blocking.
    fn is_connected(&self) -> bool;

    /// Current health snapshot without blocking.
    fn health(&self) -> HealthStatus;

    /// Media capability, if the platform supports it.
    fn media(&self) -> Option<&dyn MediaChannel> {
        None
    }

    /// Presence capability, if the platform supports it.
    fn presence(&self) -> Option<&dyn PresenceChannel> {
        None
    }

    /// Reaction capability, if the platform supports it.
    fn reactions(&self) -> Option<&dyn ReactionChannel> {
        None
    }
}

/// Media transfer for channels that support it.
#[async_trait]
pub trait MediaChannel: Send + Sync {
    async fn send_media(&self, to: &str, msg: &MediaMessage) -> Result<()>;

    /// Fetch the raw bytes of a received media message.
    async fn download_media(&self, msg: &IncomingMessage) -> Result<Vec<u8>>;
}

/// Presence affordances for channels that support them.
#[async_trait]
pub trait PresenceChannel: Send + Sync {
    async fn send_typing(&self, to: &str) -> Result<()>;

    async fn send_presence(&self, presence: Presence) -> Result<()>;

    /// Mark a received message as read.
    async fn mark_read(&self, chat_id: &str, message_id: &str) -> Result<()>;
}

/// Emoji reactions for channels that support them.
#[async_trait]
pub trait ReactionChannel: Send + Sync {
    async fn send_reaction(&self, chat_id: &str, message_id: &str, emoji: &str) -> Result<()>;
}
