//! Display-share leg coordination
//!
//! The display share is a second, independent broadcast carrying a screen
//! capture. Its presence is controlled by the device supplier, not by the
//! operator's start/stop button. The leg is only connected while the primary
//! session is Streaming.
//!
//! Every input change calls [`DisplayShare::reconcile`], which computes the
//! desired leg state with [`desired_leg_state`] and diffs it against the
//! current one. Reconciling with unchanged inputs does nothing.
//!
//! The primary state is read from the session's state channel while the leg
//! lock is held, so a reconcile always plans against the latest state no
//! matter how late it runs. A display stream counts as present only while
//! the supplier still holds it and it has a live track.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{mpsc, watch};

use super::state::PublisherState;
use crate::config::Credentials;
use crate::error::Error;
use crate::media::{MediaStream, WeakMediaStream};
use crate::transport::{ConnectOptions, Transport, TransportFactory};

/// Whether the display leg is (or should be) connected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegState {
    Stopped,
    Started,
}

/// Desired leg state for the given inputs
pub fn desired_leg_state(display_present: bool, primary: PublisherState) -> LegState {
    if display_present && primary == PublisherState::Streaming {
        LegState::Started
    } else {
        LegState::Stopped
    }
}

enum LegPhase {
    Stopped,
    Starting {
        transport: Arc<dyn Transport>,
        bound: WeakMediaStream,
    },
    Active {
        transport: Arc<dyn Transport>,
        bound: WeakMediaStream,
    },
}

impl LegPhase {
    fn leg_state(&self) -> LegState {
        match self {
            LegPhase::Stopped => LegState::Stopped,
            LegPhase::Starting { .. } | LegPhase::Active { .. } => LegState::Started,
        }
    }
}

struct LegInner {
    /// Display stream reported by the supplier
    stream: Option<WeakMediaStream>,
    phase: LegPhase,
    /// Bumped whenever a start is issued or the leg is stopped
    generation: u64,
}

enum Action {
    Start {
        transport: Arc<dyn Transport>,
        stream: MediaStream,
        generation: u64,
    },
    Replace {
        transport: Arc<dyn Transport>,
        stream: MediaStream,
    },
    Stop(Arc<dyn Transport>),
}

/// Coordinator for the display-share leg
pub struct DisplayShare {
    source_id: String,
    primary: watch::Receiver<PublisherState>,
    inner: Mutex<LegInner>,
}

impl DisplayShare {
    /// `primary` follows the state of the primary session.
    pub fn new(source_id: impl Into<String>, primary: watch::Receiver<PublisherState>) -> Self {
        Self {
            source_id: source_id.into(),
            primary,
            inner: Mutex::new(LegInner {
                stream: None,
                phase: LegPhase::Stopped,
                generation: 0,
            }),
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Record the supplier's display stream, `None` when sharing ended.
    ///
    /// Only a weak reference is kept.
    pub fn set_stream(&self, stream: Option<&MediaStream>) {
        self.lock().stream = stream.map(MediaStream::downgrade);
    }

    /// Display stream, if the supplier still has a live one
    pub fn stream(&self) -> Option<MediaStream> {
        present(&self.lock().stream)
    }

    /// Current leg state. Starting counts as started.
    pub fn leg_state(&self) -> LegState {
        self.lock().phase.leg_state()
    }

    /// Bring the leg in line with the current inputs.
    ///
    /// Failures are logged and leave the leg stopped; they never propagate
    /// to the primary session.
    pub(crate) async fn reconcile(
        &self,
        credentials: Option<&Credentials>,
        factory: &dyn TransportFactory,
    ) {
        let Some(action) = self.plan(credentials, factory) else {
            return;
        };

        match action {
            Action::Start {
                transport,
                stream,
                generation,
            } => self.start_leg(transport, stream, generation).await,
            Action::Replace { transport, stream } => {
                if let Err(e) = transport.replace_stream(stream).await {
                    let err = Error::DisplayLegFailure(e);
                    tracing::warn!(source_id = %self.source_id, error = %err, "Display stream swap failed");
                }
            }
            Action::Stop(transport) => stop_leg(&self.source_id, transport).await,
        }
    }

    /// Synchronous part of a forced stop, returns the handle to tear down
    pub(crate) fn begin_shutdown(&self) -> Option<Arc<dyn Transport>> {
        let mut inner = self.lock();
        inner.generation += 1;
        match std::mem::replace(&mut inner.phase, LegPhase::Stopped) {
            LegPhase::Stopped => None,
            LegPhase::Starting { transport, .. } | LegPhase::Active { transport, .. } => {
                Some(transport)
            }
        }
    }

    fn plan(
        &self,
        credentials: Option<&Credentials>,
        factory: &dyn TransportFactory,
    ) -> Option<Action> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let primary = *self.primary.borrow();
        let stream = present(&inner.stream);
        let desired = desired_leg_state(stream.is_some(), primary);

        match (desired, &inner.phase) {
            (LegState::Stopped, LegPhase::Stopped) => None,
            (LegState::Stopped, _) => {
                inner.generation += 1;
                match std::mem::replace(&mut inner.phase, LegPhase::Stopped) {
                    LegPhase::Starting { transport, .. } | LegPhase::Active { transport, .. } => {
                        Some(Action::Stop(transport))
                    }
                    LegPhase::Stopped => None,
                }
            }
            (LegState::Started, LegPhase::Stopped) => {
                let stream = stream?;
                let Some(credentials) = credentials else {
                    tracing::debug!("Display share skipped, no credentials");
                    return None;
                };
                inner.generation += 1;
                let transport = factory.create(credentials, Some(self.source_id.as_str()));
                inner.phase = LegPhase::Starting {
                    transport: transport.clone(),
                    bound: stream.downgrade(),
                };
                Some(Action::Start {
                    transport,
                    stream,
                    generation: inner.generation,
                })
            }
            (LegState::Started, LegPhase::Active { transport, bound }) => {
                let stream = stream?;
                if bound.refers_to(&stream) {
                    return None;
                }
                let transport = transport.clone();
                inner.phase = LegPhase::Active {
                    transport: transport.clone(),
                    bound: stream.downgrade(),
                };
                Some(Action::Replace { transport, stream })
            }
            // The in-flight start picks up a swapped stream once it lands
            (LegState::Started, LegPhase::Starting { .. }) => None,
        }
    }

    async fn start_leg(&self, transport: Arc<dyn Transport>, stream: MediaStream, generation: u64) {
        tracing::info!(source_id = %self.source_id, stream = stream.id(), "Starting display share");

        let options = ConnectOptions {
            codec: None,
            simulcast: false,
            events: Vec::new(),
            source_id: Some(self.source_id.clone()),
        };
        // The display leg does not consume events
        let (events_tx, _events_rx) = mpsc::channel(1);
        let result = transport.connect(stream.clone(), options, events_tx).await;

        let (stale, swap) = {
            let mut inner = self.lock();
            if inner.generation != generation {
                (true, None)
            } else {
                match result {
                    Ok(()) => {
                        let current = present(&inner.stream);
                        let swap = current.filter(|s| !s.same_as(&stream));
                        let bound = swap.as_ref().unwrap_or(&stream).downgrade();
                        inner.phase = LegPhase::Active {
                            transport: transport.clone(),
                            bound,
                        };
                        tracing::info!(source_id = %self.source_id, "Display share started");
                        (false, swap)
                    }
                    Err(e) => {
                        inner.phase = LegPhase::Stopped;
                        let err = Error::DisplayLegFailure(e);
                        tracing::warn!(source_id = %self.source_id, error = %err, "Display share failed to start");
                        (true, None)
                    }
                }
            }
        };

        if stale {
            // Stopped while connecting, or failed: release whatever was set up
            stop_leg(&self.source_id, transport).await;
        } else if let Some(stream) = swap {
            if let Err(e) = transport.replace_stream(stream).await {
                tracing::warn!(source_id = %self.source_id, error = %Error::DisplayLegFailure(e), "Display stream swap failed");
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, LegInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn present(stream: &Option<WeakMediaStream>) -> Option<MediaStream> {
    stream
        .as_ref()
        .and_then(WeakMediaStream::upgrade)
        .filter(MediaStream::is_publishable)
}

pub(crate) async fn stop_leg(source_id: &str, transport: Arc<dyn Transport>) {
    match transport.stop().await {
        Ok(()) => tracing::info!(source_id = source_id, "Display share stopped"),
        Err(e) => {
            let err = Error::DisplayLegFailure(e);
            tracing::warn!(source_id = source_id, error = %err, "Display share teardown failed");
        }
    }
}
