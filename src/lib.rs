//! Publishing session core for live video/audio broadcasts
//!
//! Owns the lifecycle of a broadcast connection and coordinates it with
//! media streams that appear and disappear on their own:
//!
//! - a primary camera/microphone stream, published by [`Session`]
//! - an optional screen-share stream, published on a separate leg by
//!   [`DisplayShare`] while the primary broadcast is live
//! - operator commands, exposed by [`Publisher`]
//!
//! The media transport itself is an external collaborator behind
//! [`Transport`] / [`TransportFactory`].
//!
//! ```text
//!   Ready ──start──► Connecting ──connected──► Streaming
//!     ▲                  │                         │
//!     └──failed / stop───┘◄──────────stop──────────┘
//! ```

pub mod config;
pub mod error;
pub mod media;
pub mod publisher;
pub mod session;
pub mod stats;
pub mod transport;

pub use config::{Credentials, PublisherConfig, DISPLAY_SHARE_SOURCE_ID};
pub use error::{Error, Result, TransportError};
pub use media::{MediaStream, MediaTrack, TrackKind, WeakMediaStream};
pub use publisher::Publisher;
pub use session::{
    BroadcastSettings, Controls, DisplayShare, LegState, PublisherState, Session, SessionGuard,
    SettingsStore,
};
pub use stats::StreamStatistics;
pub use transport::{BroadcastEvent, ConnectOptions, Transport, TransportFactory};
