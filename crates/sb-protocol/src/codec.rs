//! JSON text codec for protocol frames
//!
//! One frame is one transport text message. Decoding is two-phase: the
//! channel and type are extracted first so that routing errors can be told
//! apart from payload errors, then the payload is deserialized into the
//! channel's message enum.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ProtocolError;
use crate::frame::Frame;
use crate::message::{Channel, SftpMessageType, ShellMessageType};

/// Channel frame as it appears on the wire: the channel tag followed by the
/// message's own `type` and fields
#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    channel: Channel,
    #[serde(flatten)]
    message: &'a T,
}

#[derive(Serialize)]
struct TopLevelError<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    message: &'a str,
}

/// Encode a frame into a transport text message
pub fn encode(frame: &Frame) -> Result<String, ProtocolError> {
    let text = match frame {
        Frame::Shell(message) => serde_json::to_string(&Envelope {
            channel: Channel::Shell,
            message,
        })?,
        Frame::Sftp(message) => serde_json::to_string(&Envelope {
            channel: Channel::Sftp,
            message,
        })?,
        Frame::Error { message } => serde_json::to_string(&TopLevelError {
            kind: "error",
            message,
        })?,
    };
    Ok(text)
}

/// Decode a transport text message into a frame
pub fn decode(text: &str) -> Result<Frame, ProtocolError> {
    let value: Value = serde_json::from_str(text).map_err(ProtocolError::Malformed)?;
    let Value::Object(mut fields) = value else {
        return Err(ProtocolError::NotAnObject);
    };

    let channel = match fields.remove("channel") {
        None | Some(Value::Null) => return decode_top_level(&fields),
        Some(Value::String(name)) => {
            Channel::from_wire(&name).ok_or(ProtocolError::UnknownChannel(name))?
        }
        Some(other) => return Err(ProtocolError::UnknownChannel(other.to_string())),
    };

    let kind = match fields.get("type") {
        Some(Value::String(kind)) => kind.clone(),
        _ => return Err(ProtocolError::MissingType { channel }),
    };

    match channel {
        Channel::Shell => {
            let message_type = ShellMessageType::from_wire(&kind)
                .ok_or(ProtocolError::UnknownType { channel, kind })?;
            serde_json::from_value(Value::Object(fields))
                .map(Frame::Shell)
                .map_err(|source| ProtocolError::InvalidPayload {
                    channel,
                    kind: message_type.as_str(),
                    source,
                })
        }
        Channel::Sftp => {
            let message_type = SftpMessageType::from_wire(&kind)
                .ok_or(ProtocolError::UnknownType { channel, kind })?;
            serde_json::from_value(Value::Object(fields))
                .map(Frame::Sftp)
                .map_err(|source| ProtocolError::InvalidPayload {
                    channel,
                    kind: message_type.as_str(),
                    source,
                })
        }
    }
}

/// A channel-less message is only meaningful as a top-level error frame
fn decode_top_level(fields: &Map<String, Value>) -> Result<Frame, ProtocolError> {
    match (fields.get("type"), fields.get("message")) {
        (Some(Value::String(kind)), Some(Value::String(message))) if kind == "error" => {
            Ok(Frame::Error {
                message: message.clone(),
            })
        }
        _ => Err(ProtocolError::MissingChannel),
    }
}
