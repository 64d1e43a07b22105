//! Channel abstraction and fan-in/fan-out routing.
//!
//! Each messaging platform (WhatsApp, Discord, Slack, …) implements the
//! [`Channel`] trait, optionally with the media/presence/reaction capability
//! traits. The [`ChannelManager`] owns the registered channels, merges their
//! inbound streams into one bounded queue, and routes outbound calls by
//! channel name.

pub mod channel;
pub mod error;
pub mod manager;
pub mod types;

pub use {
    channel::{Channel, MediaChannel, PresenceChannel, ReactionChannel},
    error::{Error, Result},
    manager::{ChannelManager, INBOX_CAPACITY},
    types::{
        HealthStatus, IncomingMessage, MediaMessage, MediaRef, MessageKind, OutgoingMessage,
        Presence,
    },
};
