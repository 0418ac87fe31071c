//! Frame definition
//!
//! A frame is one transport message. Channel frames carry a shell or sftp
//! message; the top-level error frame has no channel and is only used to
//! report frames that could not be routed.

use crate::message::{Channel, SftpMessage, ShellMessage};

/// One unit of wire communication
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Shell channel message
    Shell(ShellMessage),
    /// Sftp channel message
    Sftp(SftpMessage),
    /// Channel-less protocol error
    Error {
        /// Human-readable message
        message: String,
    },
}

impl Frame {
    /// Channel this frame is addressed to
    pub fn channel(&self) -> Option<Channel> {
        match self {
            Frame::Shell(_) => Some(Channel::Shell),
            Frame::Sftp(_) => Some(Channel::Sftp),
            Frame::Error { .. } => None,
        }
    }

    /// Wire name of the frame's type
    pub fn type_name(&self) -> &'static str {
        match self {
            Frame::Shell(msg) => msg.message_type().as_str(),
            Frame::Sftp(msg) => msg.message_type().as_str(),
            Frame::Error { .. } => "error",
        }
    }

    /// Shell status notification
    pub fn shell_status(message: impl Into<String>) -> Self {
        Frame::Shell(ShellMessage::Status {
            message: message.into(),
        })
    }

    /// Shell error report
    pub fn shell_error(message: impl Into<String>) -> Self {
        Frame::Shell(ShellMessage::Error {
            message: message.into(),
        })
    }

    /// Shell output
    pub fn shell_data(data: impl Into<String>) -> Self {
        Frame::Shell(ShellMessage::Data { data: data.into() })
    }

    /// Sftp error report, echoing the request id when there was one
    pub fn sftp_error(message: impl Into<String>, request_id: Option<String>) -> Self {
        Frame::Sftp(SftpMessage::Error {
            message: message.into(),
            request_id,
        })
    }

    /// Top-level protocol error
    pub fn protocol_error(message: impl Into<String>) -> Self {
        Frame::Error {
            message: message.into(),
        }
    }

    /// Error frame addressed to `channel`, or a top-level error when `None`
    pub fn error_on(channel: Option<Channel>, message: impl Into<String>) -> Self {
        match channel {
            Some(Channel::Shell) => Frame::shell_error(message),
            Some(Channel::Sftp) => Frame::sftp_error(message, None),
            None => Frame::protocol_error(message),
        }
    }
}

impl From<ShellMessage> for Frame {
    fn from(msg: ShellMessage) -> Self {
        Frame::Shell(msg)
    }
}

impl From<SftpMessage> for Frame {
    fn from(msg: SftpMessage) -> Self {
        Frame::Sftp(msg)
    }
}
