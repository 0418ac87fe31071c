//! Protocol error types
//!
//! The `Display` output of each variant is the exact text sent back to the
//! browser in the corresponding error frame.

use thiserror::Error;

use crate::message::Channel;

/// Errors that can occur while decoding or encoding frames
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Message is not valid JSON
    #[error("Malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),

    /// Binary message whose bytes are not UTF-8 text
    #[error("Malformed frame: invalid UTF-8")]
    InvalidUtf8,

    /// Message is valid JSON but not an object
    #[error("Malformed frame: expected a JSON object")]
    NotAnObject,

    /// No channel field
    #[error("Missing channel.")]
    MissingChannel,

    /// Channel field names no known channel
    #[error("Unknown channel.")]
    UnknownChannel(String),

    /// Known channel but no type field
    #[error("Missing message type.")]
    MissingType { channel: Channel },

    /// Known channel, type not defined for it
    #[error("Unsupported message type: {kind}")]
    UnknownType { channel: Channel, kind: String },

    /// Known type with missing or mistyped fields
    #[error("Invalid {kind} frame: {source}")]
    InvalidPayload {
        channel: Channel,
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Serialization error while encoding
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProtocolError {
    /// Channel the offending frame was addressed to, if it got that far.
    ///
    /// Errors without a channel are reported as top-level error frames.
    pub fn channel(&self) -> Option<Channel> {
        match self {
            ProtocolError::MissingType { channel }
            | ProtocolError::UnknownType { channel, .. }
            | ProtocolError::InvalidPayload { channel, .. } => Some(*channel),
            _ => None,
        }
    }
}
