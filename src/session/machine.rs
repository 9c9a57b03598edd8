//! Publishing session state machine
//!
//! Owns the lifecycle of the primary broadcast connection and reconciles it
//! with three independently changing inputs: the primary media stream, the
//! display-share stream, and operator commands.
//!
//! # Races
//!
//! Every `start` stamps the attempt with a fresh generation. `stop` and
//! credential replacement bump the generation, so a connect that resolves
//! afterwards finds itself stale, tears down its own transport handle and
//! leaves the session alone. Stop always wins.
//!
//! Session data lives behind a `std::sync::Mutex` that is never held across
//! an `.await`; the only suspension points are transport calls.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::display::{DisplayShare, LegState};
use super::settings::{BroadcastSettings, SettingsStore};
use super::state::PublisherState;
use crate::config::{Credentials, PublisherConfig};
use crate::error::{Error, Result};
use crate::media::MediaStream;
use crate::stats::StreamStatistics;
use crate::transport::{BroadcastEvent, ConnectOptions, Transport, TransportFactory};

/// Which inputs the UI should currently enable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controls {
    /// Start button: Ready with a publishable stream adopted
    pub start: bool,
    /// Stop button: connecting or streaming
    pub stop: bool,
    /// Codec select: Ready and at least one codec offered
    pub codec_select: bool,
    /// Simulcast switch: Ready
    pub simulcast: bool,
    /// Camera/microphone select: not while connecting
    pub device_select: bool,
}

struct Connection {
    transport: Arc<dyn Transport>,
    generation: u64,
}

struct Inner {
    credentials: Option<Credentials>,
    state: PublisherState,
    generation: u64,
    /// Stream currently published, or adopted for the next start
    active_stream: Option<MediaStream>,
    /// Settings frozen by the running broadcast
    broadcast_settings: Option<BroadcastSettings>,
    connection: Option<Connection>,
    pump: Option<JoinHandle<()>>,
    live_since: Option<Instant>,
    last_error: Option<Error>,
}

struct Shared {
    config: PublisherConfig,
    factory: Arc<dyn TransportFactory>,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<PublisherState>,
    viewers_tx: watch::Sender<u32>,
    stats_tx: watch::Sender<Option<StreamStatistics>>,
    settings: SettingsStore,
    display: DisplayShare,
}

/// A start that has claimed the session and still needs to connect
pub(crate) struct StartAttempt {
    transport: Arc<dyn Transport>,
    stream: MediaStream,
    options: ConnectOptions,
    generation: u64,
}

enum StartOutcome {
    /// Connected, now streaming; swap in a stream adopted while connecting
    Streaming(Option<MediaStream>),
    /// Connect failed
    Failed,
    /// Stopped while connecting
    Stale,
}

/// Publishing session
///
/// Cheap to clone; all clones drive the same session.
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

impl Session {
    /// Create a session.
    ///
    /// Credentials from `config` are installed immediately; without them the
    /// session is inert until [`Session::setup`] succeeds.
    pub fn new(factory: Arc<dyn TransportFactory>, config: PublisherConfig) -> Self {
        let (state_tx, state_rx) = watch::channel(PublisherState::Ready);
        let (viewers_tx, _) = watch::channel(0);
        let (stats_tx, _) = watch::channel(None);
        let settings = SettingsStore::new(factory.codec_list(), state_rx);
        let display = DisplayShare::new(config.display_source_id.clone(), state_tx.subscribe());

        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    credentials: config.credentials.clone(),
                    state: PublisherState::Ready,
                    generation: 0,
                    active_stream: None,
                    broadcast_settings: None,
                    connection: None,
                    pump: None,
                    live_since: None,
                    last_error: None,
                }),
                config,
                factory,
                state_tx,
                viewers_tx,
                stats_tx,
                settings,
                display,
            }),
        }
    }

    /// Install credentials.
    ///
    /// Empty token or stream name is ignored and leaves the session inert.
    /// Installing the same credentials again does nothing. Replacing
    /// credentials while connecting or streaming stops the broadcast first.
    pub async fn setup(&self, token: &str, stream_name: &str, stream_id: &str) {
        if let Some(teardown) = self.begin_setup(token, stream_name, stream_id) {
            self.finish_stop(teardown).await;
        }
    }

    /// Synchronous part of [`Session::setup`].
    ///
    /// Returns `Some` when the replacement forced a stop that still needs
    /// finishing with [`Session::finish_stop`].
    pub(crate) fn begin_setup(
        &self,
        token: &str,
        stream_name: &str,
        stream_id: &str,
    ) -> Option<Option<Arc<dyn Transport>>> {
        let Some(credentials) = Credentials::new(token, stream_name, stream_id) else {
            tracing::debug!(error = %Error::ConfigurationMissing, "Setup ignored");
            return None;
        };

        let mut inner = self.lock();
        if inner.credentials.as_ref() == Some(&credentials) {
            return None;
        }
        tracing::info!(stream_name = %credentials.stream_name, "Publisher configured");
        inner.credentials = Some(credentials);
        if inner.state.is_ready() {
            return None;
        }
        Some(self.shared.stop_locked(&mut inner))
    }

    /// Start broadcasting.
    ///
    /// Uses `stream` or, when `None`, the stream adopted through
    /// [`Session::update_active_stream`]. Does nothing unless the session is
    /// Ready, has credentials and the stream has a live track. `settings`
    /// are frozen for the lifetime of this broadcast.
    ///
    /// Resolves once the connect attempt has settled. Failures are logged
    /// and recorded in [`Session::last_error`].
    pub async fn start(&self, stream: Option<MediaStream>, settings: BroadcastSettings) {
        if let Some(attempt) = self.begin_start(stream, settings) {
            self.finish_connect(attempt).await;
        }
    }

    /// Connect a claimed attempt and settle it.
    ///
    /// A stop issued after [`Session::begin_start`] wins: the attempt finds
    /// itself stale and tears its transport down.
    pub(crate) async fn finish_connect(&self, attempt: StartAttempt) {
        let StartAttempt {
            transport,
            stream,
            options,
            generation,
        } = attempt;

        let (events_tx, events_rx) = mpsc::channel(self.shared.config.event_channel_capacity);
        let result = transport.connect(stream.clone(), options, events_tx).await;

        match self.finish_start(&transport, &stream, generation, result, events_rx) {
            StartOutcome::Streaming(swap) => {
                if let Some(next) = swap {
                    self.replace_on(&transport, next).await;
                }
                self.reconcile_display().await;
            }
            StartOutcome::Failed => {
                if let Err(e) = transport.stop().await {
                    tracing::debug!(error = %e, "Release after failed connect");
                }
            }
            StartOutcome::Stale => {
                tracing::info!(generation = generation, "Connect settled after stop, tearing down");
                if let Err(e) = transport.stop().await {
                    let err = Error::TransportTeardownFailure(e);
                    tracing::warn!(error = %err, "Teardown of abandoned connection failed");
                }
            }
        }
    }

    /// Stop broadcasting. Safe from any state and any number of times.
    ///
    /// The session is Ready once the future is first polled; the rest of
    /// the future only finishes the transport teardown.
    pub async fn stop(&self) {
        let teardown = self.begin_stop();
        self.finish_stop(teardown).await;
    }

    /// Synchronous part of [`Session::stop`].
    ///
    /// Returns the transport that still needs tearing down.
    pub(crate) fn begin_stop(&self) -> Option<Arc<dyn Transport>> {
        let mut inner = self.lock();
        self.shared.stop_locked(&mut inner)
    }

    pub(crate) async fn finish_stop(&self, teardown: Option<Arc<dyn Transport>>) {
        if let Some(transport) = teardown {
            match transport.stop().await {
                Ok(()) => tracing::debug!("Transport stopped"),
                Err(e) => {
                    let err = Error::TransportTeardownFailure(e);
                    tracing::warn!(error = %err, "Transport teardown failed");
                }
            }
        }
        self.reconcile_display().await;
    }

    /// Replace the published media without a stop/start cycle.
    ///
    /// While Ready the stream is adopted for the next start. While
    /// connecting it is swapped in once the connection is up. The
    /// observable state never changes.
    pub async fn update_active_stream(&self, stream: MediaStream) {
        if let Some(transport) = self.adopt_stream(&stream) {
            self.finish_replace(transport, stream).await;
        }
    }

    /// Synchronous part of [`Session::update_active_stream`].
    ///
    /// Returns the live transport that should receive the new stream.
    pub(crate) fn adopt_stream(&self, stream: &MediaStream) -> Option<Arc<dyn Transport>> {
        let mut inner = self.lock();
        if inner.active_stream.as_ref() == Some(stream) {
            return None;
        }
        inner.active_stream = Some(stream.clone());
        match (inner.state, &inner.connection) {
            (PublisherState::Streaming, Some(conn)) => Some(conn.transport.clone()),
            _ => {
                tracing::debug!(stream = stream.id(), state = %inner.state, "Stream adopted");
                None
            }
        }
    }

    /// Push an adopted stream to `transport`, unless it was superseded
    pub(crate) async fn finish_replace(&self, transport: Arc<dyn Transport>, stream: MediaStream) {
        let current = self.lock().active_stream.as_ref() == Some(&stream);
        if current {
            self.replace_on(&transport, stream).await;
        } else {
            tracing::debug!(stream = stream.id(), "Stream swap superseded");
        }
    }

    /// Audio track hot-swap is not supported
    pub async fn update_audio_track(&self, _track: crate::media::MediaTrack) -> Result<()> {
        Err(Error::Unsupported("update_audio_track"))
    }

    /// Video track hot-swap is not supported
    pub async fn update_video_track(&self, _track: crate::media::MediaTrack) -> Result<()> {
        Err(Error::Unsupported("update_video_track"))
    }

    /// Report the supplier's display stream and reconcile the display leg
    pub async fn set_display_stream(&self, stream: Option<&MediaStream>) {
        self.shared.display.set_stream(stream);
        self.reconcile_display().await;
    }

    /// Re-evaluate the display leg against the current inputs
    pub async fn reconcile_display(&self) {
        let credentials = self.credentials();
        self.shared
            .display
            .reconcile(credentials.as_ref(), self.shared.factory.as_ref())
            .await;
    }

    pub(crate) fn display(&self) -> &DisplayShare {
        &self.shared.display
    }

    /// Whether the display-share leg is started
    pub fn display_leg_state(&self) -> LegState {
        self.shared.display.leg_state()
    }

    /// Codec/simulcast choices for the next broadcast
    pub fn settings(&self) -> &SettingsStore {
        &self.shared.settings
    }

    /// Configuration the session was created with
    pub fn config(&self) -> &PublisherConfig {
        &self.shared.config
    }

    pub fn state(&self) -> PublisherState {
        *self.shared.state_tx.borrow()
    }

    /// Receiver notified on every state change
    pub fn watch_state(&self) -> watch::Receiver<PublisherState> {
        self.shared.state_tx.subscribe()
    }

    pub fn viewer_count(&self) -> u32 {
        *self.shared.viewers_tx.borrow()
    }

    pub fn watch_viewer_count(&self) -> watch::Receiver<u32> {
        self.shared.viewers_tx.subscribe()
    }

    /// Last statistics snapshot of the running broadcast
    pub fn statistics(&self) -> Option<StreamStatistics> {
        self.shared.stats_tx.borrow().clone()
    }

    pub fn watch_statistics(&self) -> watch::Receiver<Option<StreamStatistics>> {
        self.shared.stats_tx.subscribe()
    }

    pub fn credentials(&self) -> Option<Credentials> {
        self.lock().credentials.clone()
    }

    pub fn active_stream(&self) -> Option<MediaStream> {
        self.lock().active_stream.clone()
    }

    /// Settings frozen by the current broadcast
    pub fn broadcast_settings(&self) -> Option<BroadcastSettings> {
        self.lock().broadcast_settings.clone()
    }

    /// Most recent connect failure, cleared by the next start
    pub fn last_error(&self) -> Option<Error> {
        self.lock().last_error.clone()
    }

    /// Connecting or streaming
    pub fn is_live(&self) -> bool {
        self.state().is_live()
    }

    /// Whether closing the surface should ask for confirmation
    pub fn needs_close_confirmation(&self) -> bool {
        self.is_live()
    }

    /// Time spent streaming, `None` unless Streaming
    pub fn live_duration(&self) -> Option<Duration> {
        self.lock().live_since.map(|t| t.elapsed())
    }

    pub fn controls(&self) -> Controls {
        let inner = self.lock();
        let ready = inner.state.is_ready();
        let publishable = inner
            .active_stream
            .as_ref()
            .is_some_and(MediaStream::is_publishable);

        Controls {
            start: ready && publishable && inner.credentials.is_some(),
            stop: !ready,
            codec_select: ready && !self.shared.settings.codec_list().is_empty(),
            simulcast: ready,
            device_select: inner.state != PublisherState::Connecting,
        }
    }

    /// Synchronous part of [`Session::start`]: claim the session for a new
    /// attempt, or `None` if the start is a no-op.
    pub(crate) fn begin_start(
        &self,
        stream: Option<MediaStream>,
        settings: BroadcastSettings,
    ) -> Option<StartAttempt> {
        let mut inner = self.lock();

        if !inner.state.is_ready() {
            tracing::debug!(state = %inner.state, "Start ignored, broadcast already in progress");
            return None;
        }
        let Some(credentials) = inner.credentials.clone() else {
            tracing::debug!(error = %Error::ConfigurationMissing, "Start ignored");
            return None;
        };
        let stream = match stream.or_else(|| inner.active_stream.clone()) {
            Some(stream) if stream.is_publishable() => stream,
            _ => {
                tracing::debug!("Start ignored, no live media track");
                return None;
            }
        };

        inner.generation += 1;
        let generation = inner.generation;
        let transport = self.shared.factory.create(&credentials, None);
        let options = ConnectOptions {
            codec: settings.codec.clone(),
            simulcast: settings.simulcast,
            events: self.shared.config.events.clone(),
            source_id: None,
        };

        inner.active_stream = Some(stream.clone());
        inner.broadcast_settings = Some(settings);
        inner.connection = Some(Connection {
            transport: transport.clone(),
            generation,
        });
        inner.last_error = None;
        self.shared.set_state(&mut inner, PublisherState::Connecting);

        tracing::info!(
            stream_name = %credentials.stream_name,
            stream = stream.id(),
            codec = ?options.codec,
            simulcast = options.simulcast,
            generation = generation,
            "Connecting"
        );

        Some(StartAttempt {
            transport,
            stream,
            options,
            generation,
        })
    }

    fn finish_start(
        &self,
        transport: &Arc<dyn Transport>,
        stream: &MediaStream,
        generation: u64,
        result: std::result::Result<(), crate::error::TransportError>,
        events_rx: mpsc::Receiver<BroadcastEvent>,
    ) -> StartOutcome {
        let mut inner = self.lock();

        if inner.generation != generation {
            return StartOutcome::Stale;
        }

        match result {
            Ok(()) => {
                let pump = tokio::spawn(run_pump(
                    Arc::downgrade(&self.shared),
                    transport.clone(),
                    generation,
                    events_rx,
                ));
                inner.pump = Some(pump);
                inner.live_since = Some(Instant::now());
                self.shared.set_state(&mut inner, PublisherState::Streaming);
                tracing::info!(generation = generation, "Streaming");

                let swap = inner
                    .active_stream
                    .clone()
                    .filter(|current| !current.same_as(stream));
                StartOutcome::Streaming(swap)
            }
            Err(e) => {
                let err = Error::ConnectFailure(e);
                tracing::error!(error = %err, generation = generation, "Connect failed");
                inner.connection = None;
                inner.broadcast_settings = None;
                inner.last_error = Some(err);
                self.shared.set_state(&mut inner, PublisherState::Ready);
                StartOutcome::Failed
            }
        }
    }

    async fn replace_on(&self, transport: &Arc<dyn Transport>, stream: MediaStream) {
        let id = stream.id().to_string();
        match transport.replace_stream(stream).await {
            Ok(()) => tracing::info!(stream = %id, "Published stream replaced"),
            Err(e) => tracing::warn!(stream = %id, error = %e, "Stream replacement failed"),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.shared.lock()
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, inner: &mut Inner, next: PublisherState) {
        debug_assert!(
            inner.state.can_transition_to(next),
            "illegal transition {} -> {}",
            inner.state,
            next
        );
        inner.state = next;
        self.state_tx.send_replace(next);
    }

    /// Force Ready. Returns the transport that still needs tearing down.
    fn stop_locked(&self, inner: &mut Inner) -> Option<Arc<dyn Transport>> {
        let was = inner.state;
        inner.generation += 1;
        if let Some(pump) = inner.pump.take() {
            pump.abort();
        }
        inner.broadcast_settings = None;
        inner.live_since = None;
        self.set_state(inner, PublisherState::Ready);
        self.viewers_tx.send_replace(0);
        self.stats_tx.send_replace(None);

        let connection = inner.connection.take();
        if was.is_live() {
            tracing::info!(
                from = %was,
                generation = ?connection.as_ref().map(|c| c.generation),
                "Stopped"
            );
        }
        connection.map(|c| c.transport)
    }

    fn apply_event(&self, generation: u64, event: BroadcastEvent) {
        let inner = self.lock();
        if inner.generation != generation || inner.state != PublisherState::Streaming {
            tracing::debug!(event = event.name(), "Event after stop ignored");
            return;
        }
        match event {
            BroadcastEvent::ViewerCount(count) => {
                tracing::debug!(viewers = count, "Viewer count");
                self.viewers_tx.send_replace(count);
            }
            BroadcastEvent::Active => tracing::info!("Broadcast active"),
            BroadcastEvent::Inactive => tracing::info!("Broadcast inactive"),
            BroadcastEvent::Other { name, data } => {
                tracing::debug!(event = %name, payload = %data, "Unhandled broadcast event");
            }
        }
    }

    fn apply_statistics(&self, generation: u64, stats: StreamStatistics) {
        let inner = self.lock();
        if inner.generation == generation && inner.state == PublisherState::Streaming {
            self.stats_tx.send_replace(Some(stats));
        }
    }
}

/// Delivers transport events and statistics into the session until aborted
async fn run_pump(
    shared: Weak<Shared>,
    transport: Arc<dyn Transport>,
    generation: u64,
    mut events: mpsc::Receiver<BroadcastEvent>,
) {
    let period = match shared.upgrade() {
        Some(s) => s.config.stats_interval,
        None => return,
    };
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut events_open = true;

    loop {
        tokio::select! {
            event = events.recv(), if events_open => match event {
                Some(event) => match shared.upgrade() {
                    Some(s) => s.apply_event(generation, event),
                    None => return,
                },
                None => {
                    tracing::debug!(generation = generation, "Event channel closed");
                    events_open = false;
                }
            },
            _ = ticker.tick() => {
                if let Some(stats) = transport.statistics().await {
                    match shared.upgrade() {
                        Some(s) => s.apply_statistics(generation, stats),
                        None => return,
                    }
                }
            }
        }
    }
}
