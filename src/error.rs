//! Error types
//!
//! Lifecycle failures (connect, teardown, display leg) are never returned to
//! the caller of a command; they are logged and turned into a state
//! transition. The variants still exist so that the same values can be
//! recorded as the session's last error and matched in tests.

use thiserror::Error;

use crate::session::PublisherState;

/// Result type for publisher operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error reported by a transport collaborator
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The remote side refused the request
    #[error("rejected: {0}")]
    Rejected(String),

    /// The connection is already gone
    #[error("connection closed")]
    Closed,

    /// Anything else the transport wants to report
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// Error type for publisher operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// Token or stream name absent, the session stays inert
    #[error("publisher credentials are missing")]
    ConfigurationMissing,

    /// The transport rejected `connect`
    #[error("connect failed: {0}")]
    ConnectFailure(TransportError),

    /// The transport failed to tear down; the session is Ready regardless
    #[error("transport teardown failed: {0}")]
    TransportTeardownFailure(TransportError),

    /// The display-share leg failed; never affects the primary session
    #[error("display share leg failed: {0}")]
    DisplayLegFailure(TransportError),

    /// Settings can only change while the session is Ready
    #[error("settings are locked while {0}")]
    SettingsLocked(PublisherState),

    /// Codec is not offered by the transport
    #[error("unknown codec: {0}")]
    UnknownCodec(String),

    /// Operation is deliberately not implemented
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::ConnectFailure(TransportError::rejected("bad token"));
        assert_eq!(err.to_string(), "connect failed: rejected: bad token");

        let err = Error::SettingsLocked(PublisherState::Streaming);
        assert_eq!(err.to_string(), "settings are locked while streaming");

        let err = Error::Unsupported("update_video_track");
        assert_eq!(err.to_string(), "unsupported operation: update_video_track");
    }
}
