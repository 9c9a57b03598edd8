//! UI-facing publisher API
//!
//! Every side-effecting method is a command: it returns immediately and the
//! outcome shows up in [`Publisher::publisher_state`],
//! [`Publisher::viewer_count`] and [`Publisher::statistics`] (or their
//! `watch_*` receivers). The returned `JoinHandle`s exist for callers that
//! want to wait, such as tests and shutdown paths.
//!
//! Each command does its bookkeeping (credential install, stream adoption,
//! claiming a start, forcing Ready) before it returns, and only spawns the
//! transport calls. Commands therefore take effect in the order they were
//! issued on any runtime flavor, and a stop issued right after a start
//! always wins.
//!
//! Commands spawn onto the current tokio runtime and panic outside of one.
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use live_publisher::{MediaStream, MediaTrack, Publisher, PublisherConfig, TransportFactory};
//!
//! # async fn example(factory: Arc<dyn TransportFactory>) {
//! let publisher = Publisher::new(factory, PublisherConfig::from_env());
//! let camera = MediaStream::new(vec![MediaTrack::video("cam"), MediaTrack::audio("mic")]);
//!
//! publisher.update_streaming(camera);
//! publisher.start_streaming(None);
//!
//! let mut state = publisher.watch_state();
//! while state.changed().await.is_ok() {
//!     println!("state: {}", *state.borrow());
//! }
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::PublisherConfig;
use crate::error::Result;
use crate::media::MediaStream;
use crate::session::{Controls, PublisherState, Session, SessionGuard};
use crate::stats::StreamStatistics;
use crate::transport::TransportFactory;

/// Command surface over a [`Session`]
///
/// Dropping the last clone stops the session.
#[derive(Clone)]
pub struct Publisher {
    guard: Arc<SessionGuard>,
}

impl Publisher {
    pub fn new(factory: Arc<dyn TransportFactory>, config: PublisherConfig) -> Self {
        Self {
            guard: Arc::new(SessionGuard::new(Session::new(factory, config))),
        }
    }

    /// Underlying session
    pub fn session(&self) -> &Session {
        self.guard.session()
    }

    /// Install credentials; empty token or stream name is ignored
    pub fn setup_publisher(&self, token: &str, stream_name: &str, stream_id: &str) -> JoinHandle<()> {
        let session = self.session().clone();
        let teardown = session.begin_setup(token, stream_name, stream_id);
        tokio::spawn(async move {
            if let Some(teardown) = teardown {
                session.finish_stop(teardown).await;
            }
        })
    }

    /// Go live with `stream`, or the stream last passed to
    /// [`Publisher::update_streaming`] when `None`.
    ///
    /// The session is Connecting (or the start was a no-op) when this
    /// returns. Settings are captured now.
    pub fn start_streaming(&self, stream: Option<MediaStream>) -> JoinHandle<()> {
        let session = self.session().clone();
        let settings = session.settings().snapshot();
        let attempt = session.begin_start(stream, settings);
        tokio::spawn(async move {
            if let Some(attempt) = attempt {
                session.finish_connect(attempt).await;
            }
        })
    }

    /// Stop the broadcast and the display leg. Ready when this returns.
    pub fn stop_streaming(&self) -> JoinHandle<()> {
        let session = self.session().clone();
        let teardown = session.begin_stop();
        tokio::spawn(async move { session.finish_stop(teardown).await })
    }

    /// Publish a new primary stream without a stop/start cycle
    pub fn update_streaming(&self, stream: MediaStream) -> JoinHandle<()> {
        let session = self.session().clone();
        let transport = session.adopt_stream(&stream);
        tokio::spawn(async move {
            if let Some(transport) = transport {
                session.finish_replace(transport, stream).await;
            }
        })
    }

    /// Share `stream` on the display leg; connected only while streaming
    pub fn start_display_streaming(&self, stream: MediaStream) -> JoinHandle<()> {
        let session = self.session().clone();
        session.display().set_stream(Some(&stream));
        tokio::spawn(async move { session.reconcile_display().await })
    }

    /// Stop sharing on the display leg
    pub fn stop_display_streaming(&self) -> JoinHandle<()> {
        let session = self.session().clone();
        session.display().set_stream(None);
        tokio::spawn(async move { session.reconcile_display().await })
    }

    /// Selected codec, or the first offered one
    pub fn codec(&self) -> Option<String> {
        self.session().settings().codec()
    }

    /// Codecs offered by the transport
    pub fn codec_list(&self) -> Vec<String> {
        self.session().settings().codec_list().to_vec()
    }

    /// Select a codec. Rejected unless Ready.
    pub fn update_codec(&self, codec: &str) -> Result<()> {
        self.session().settings().update_codec(codec)
    }

    /// Whether the next broadcast uses simulcast
    pub fn simulcast(&self) -> bool {
        self.session().settings().simulcast()
    }

    /// Toggle simulcast. Rejected unless Ready.
    pub fn set_simulcast(&self, enabled: bool) -> Result<()> {
        self.session().settings().set_simulcast(enabled)
    }

    /// Current lifecycle state
    pub fn publisher_state(&self) -> PublisherState {
        self.session().state()
    }

    /// Receiver notified on every state change
    pub fn watch_state(&self) -> watch::Receiver<PublisherState> {
        self.session().watch_state()
    }

    /// Viewers reported by the media server, 0 unless streaming
    pub fn viewer_count(&self) -> u32 {
        self.session().viewer_count()
    }

    pub fn watch_viewer_count(&self) -> watch::Receiver<u32> {
        self.session().watch_viewer_count()
    }

    /// Last statistics snapshot of the running broadcast
    pub fn statistics(&self) -> Option<StreamStatistics> {
        self.session().statistics()
    }

    pub fn watch_statistics(&self) -> watch::Receiver<Option<StreamStatistics>> {
        self.session().watch_statistics()
    }

    /// Which inputs the UI should enable right now
    pub fn controls(&self) -> Controls {
        self.session().controls()
    }

    /// Whether closing the surface should ask the operator first
    pub fn needs_close_confirmation(&self) -> bool {
        self.session().needs_close_confirmation()
    }
}
