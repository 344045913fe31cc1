//! Error types for the binary API client
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using BinapiError
pub type Result<T> = std::result::Result<T, BinapiError>;

/// Unified error type for codec and connection operations
#[derive(Debug, Error)]
pub enum BinapiError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Encoding Errors
    // -------------------------------------------------------------------------
    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Frame too large: {size} bytes (max 65535)")]
    FrameTooLarge { size: usize },

    // -------------------------------------------------------------------------
    // Channel Errors
    // -------------------------------------------------------------------------
    #[error("Short read: requested {requested} bytes, got {received}")]
    ShortRead { requested: usize, received: usize },

    #[error("Channel is broken and must be discarded")]
    ChannelBroken,

    #[error("Connection is not established")]
    NotConnected,

    #[error("Connection already established (connect called twice?)")]
    AlreadyConnected,

    // -------------------------------------------------------------------------
    // Decoding Errors
    // -------------------------------------------------------------------------
    #[error("Decode error: {0}")]
    Decode(String),

    // -------------------------------------------------------------------------
    // Data Transfer Errors
    // -------------------------------------------------------------------------
    #[error("Payload length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: u64, actual: u64 },

    #[error("Unable to determine payload length")]
    UndeterminedLength,

    #[error("Raw data pending: {remaining} bytes must be drained first")]
    PayloadPending { remaining: u64 },

    // -------------------------------------------------------------------------
    // Exchange Errors
    // -------------------------------------------------------------------------
    #[error("A command result has not been read yet")]
    ExchangePending,

    #[error("No command is awaiting a result")]
    NoPendingResult,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BinapiError {
    /// Whether the channel that produced this error can no longer be used.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BinapiError::Io(_)
                | BinapiError::ShortRead { .. }
                | BinapiError::ChannelBroken
                | BinapiError::Decode(_)
        )
    }
}
