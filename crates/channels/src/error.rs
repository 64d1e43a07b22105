use std::error::Error as StdError;

/// Crate-wide result type for channel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed errors shared across the channel traits and the manager.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A channel with the same name is already registered.
    #[error("channel already registered: {name}")]
    DuplicateChannel { name: String },

    /// No channel with the requested name is registered.
    #[error("unknown channel: {name}")]
    UnknownChannel { name: String },

    /// The channel is not connected; connect before sending.
    #[error("channel not connected: {name}")]
    NotConnected { name: String },

    /// The channel does not implement the media capability.
    #[error("channel does not support media: {name}")]
    MediaUnsupported { name: String },

    /// At least one channel was registered but none connected.
    #[error("no channels connected")]
    NoChannelsConnected,

    /// The inbound stream was already handed out for this connection.
    #[error("inbound stream unavailable: {message}")]
    StreamUnavailable { message: String },

    /// Wrapped source error from a platform adapter.
    #[error("channel operation failed: {context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn duplicate_channel(name: impl Into<String>) -> Self {
        Self::DuplicateChannel { name: name.into() }
    }

    #[must_use]
    pub fn unknown_channel(name: impl Into<String>) -> Self {
        Self::UnknownChannel { name: name.into() }
    }

    #[must_use]
    pub fn not_connected(name: impl Into<String>) -> Self {
        Self::NotConnected { name: name.into() }
    }

    #[must_use]
    pub fn media_unsupported(name: impl Into<String>) -> Self {
        Self::MediaUnsupported { name: name.into() }
    }

    #[must_use]
    pub fn stream_unavailable(message: impl std::fmt::Display) -> Self {
        Self::StreamUnavailable {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }
}
