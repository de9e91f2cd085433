//! Ring transport errors.

/// Errors raised while sending or receiving ring traffic.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connect-with-retry budget was exhausted without success.
    /// Surfaced to the coordinator/participant state machine as fatal,
    /// per spec.md §7's "Transport loss" handling — this is the bounded
    /// replacement for the original's unbounded reconnect loop (see
    /// REDESIGN FLAGS).
    #[error("exhausted {attempts} connection attempts to {addr}: {last_error}")]
    RetryExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// The address that refused every attempt.
        addr: String,
        /// The last I/O error observed.
        last_error: String,
    },

    /// An I/O error occurred reading or writing a frame.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame failed to (de)serialize. A ring protocol violation per
    /// spec.md §7 if it happens mid-deployment (parties disagreeing on
    /// wire format is a deployment bug, not a recoverable condition).
    #[error("frame (de)serialization failed: {0}")]
    Codec(#[from] Box<bincode::ErrorKind>),

    /// A received frame exceeded the maximum accepted length, almost
    /// certainly indicating a corrupted length prefix rather than a
    /// legitimately huge message.
    #[error("frame length {0} exceeds maximum accepted size")]
    FrameTooLarge(u32),

    /// The in-memory test link's channel was closed before a message
    /// arrived.
    #[error("in-memory ring link closed")]
    ChannelClosed,
}

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
