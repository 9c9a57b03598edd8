//! Broadcast transport contract
//!
//! The transport negotiates and maintains one outbound media connection.
//! It is an external collaborator: this crate only drives it through
//! [`Transport`] and obtains fresh handles from a [`TransportFactory`].
//!
//! ```text
//!   Session ──create()──► TransportFactory
//!      │                        │
//!      │ connect(stream, opts, events_tx)
//!      ▼                        ▼
//!   event pump ◄── mpsc ── Transport ──► media server
//! ```

pub mod event;
#[cfg(test)]
pub(crate) mod mock;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::Credentials;
use crate::error::TransportError;
use crate::media::MediaStream;
use crate::stats::StreamStatistics;

pub use event::BroadcastEvent;

/// Options passed to [`Transport::connect`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectOptions {
    /// Preferred video codec, `None` lets the transport choose
    pub codec: Option<String>,
    /// Publish multiple encodings
    pub simulcast: bool,
    /// Event names to subscribe to
    pub events: Vec<String>,
    /// Source id for multi-source broadcasts (display share)
    pub source_id: Option<String>,
}

/// A single outbound media connection
#[async_trait]
pub trait Transport: Send + Sync {
    /// Negotiate the connection and start publishing `stream`.
    ///
    /// Subscribed events are delivered on `events` until the connection is
    /// stopped or the receiver is dropped.
    async fn connect(
        &self,
        stream: MediaStream,
        options: ConnectOptions,
        events: mpsc::Sender<BroadcastEvent>,
    ) -> Result<(), TransportError>;

    /// Tear the connection down. Must be idempotent.
    async fn stop(&self) -> Result<(), TransportError>;

    /// Swap the published media without renegotiating.
    async fn replace_stream(&self, stream: MediaStream) -> Result<(), TransportError>;

    /// Current statistics, if the connection has any
    async fn statistics(&self) -> Option<StreamStatistics>;

    /// Whether the connection is currently up
    fn is_active(&self) -> bool;
}

/// Produces transport handles
///
/// Every broadcast attempt gets its own handle, so tearing down an abandoned
/// attempt never touches a newer one.
pub trait TransportFactory: Send + Sync {
    /// Create a new, unconnected transport.
    ///
    /// `source_id` is set for secondary legs such as the display share.
    fn create(&self, credentials: &Credentials, source_id: Option<&str>) -> Arc<dyn Transport>;

    /// Video codecs the transport can negotiate, may be empty
    fn codec_list(&self) -> Vec<String>;
}
