//! In-memory transport used by unit tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};

use super::{BroadcastEvent, ConnectOptions, Transport, TransportFactory};
use crate::config::Credentials;
use crate::error::TransportError;
use crate::media::MediaStream;
use crate::stats::StreamStatistics;

#[derive(Default)]
struct Behavior {
    fail_connect: bool,
    fail_display: bool,
    gate: Option<Arc<Notify>>,
}

/// Factory that records every transport it hands out
pub(crate) struct MockFactory {
    codecs: Vec<String>,
    behavior: Mutex<Behavior>,
    created: Mutex<Vec<Arc<MockTransport>>>,
}

impl MockFactory {
    pub fn new() -> Arc<Self> {
        Self::with_codecs(&["h264", "vp8", "vp9", "av1"])
    }

    pub fn with_codecs(codecs: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            codecs: codecs.iter().map(|c| c.to_string()).collect(),
            behavior: Mutex::new(Behavior::default()),
            created: Mutex::new(Vec::new()),
        })
    }

    /// Make primary connects fail
    pub fn fail_connect(&self, fail: bool) {
        self.behavior.lock().unwrap().fail_connect = fail;
    }

    /// Make display-leg connects fail
    pub fn fail_display(&self, fail: bool) {
        self.behavior.lock().unwrap().fail_display = fail;
    }

    /// Hold every subsequent connect until the returned notify fires
    pub fn gate_connects(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.behavior.lock().unwrap().gate = Some(gate.clone());
        gate
    }

    pub fn primary(&self) -> Vec<Arc<MockTransport>> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.source_id.is_none())
            .cloned()
            .collect()
    }

    pub fn display(&self) -> Vec<Arc<MockTransport>> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.source_id.is_some())
            .cloned()
            .collect()
    }

    pub fn last_primary(&self) -> Arc<MockTransport> {
        self.primary().pop().expect("no primary transport created")
    }

    pub fn primary_connects(&self) -> usize {
        self.primary().iter().map(|t| t.connect_count()).sum()
    }

    pub fn display_connects(&self) -> usize {
        self.display().iter().map(|t| t.connect_count()).sum()
    }

    pub fn display_stops(&self) -> usize {
        self.display().iter().map(|t| t.stop_count()).sum()
    }
}

impl TransportFactory for MockFactory {
    fn create(&self, _credentials: &Credentials, source_id: Option<&str>) -> Arc<dyn Transport> {
        let behavior = self.behavior.lock().unwrap();
        let fail = if source_id.is_some() {
            behavior.fail_display
        } else {
            behavior.fail_connect
        };
        let transport = Arc::new(MockTransport {
            source_id: source_id.map(str::to_string),
            fail,
            gate: behavior.gate.clone(),
            connects: Mutex::new(Vec::new()),
            replaced: Mutex::new(Vec::new()),
            stops: AtomicUsize::new(0),
            active: AtomicBool::new(false),
            events: Mutex::new(None),
            stats: Mutex::new(None),
        });
        self.created.lock().unwrap().push(transport.clone());
        transport
    }

    fn codec_list(&self) -> Vec<String> {
        self.codecs.clone()
    }
}

/// Transport that records calls and lets tests push events
pub(crate) struct MockTransport {
    pub source_id: Option<String>,
    fail: bool,
    gate: Option<Arc<Notify>>,
    connects: Mutex<Vec<(MediaStream, ConnectOptions)>>,
    replaced: Mutex<Vec<MediaStream>>,
    stops: AtomicUsize,
    active: AtomicBool,
    events: Mutex<Option<mpsc::Sender<BroadcastEvent>>>,
    stats: Mutex<Option<StreamStatistics>>,
}

impl MockTransport {
    pub fn connect_count(&self) -> usize {
        self.connects.lock().unwrap().len()
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn last_options(&self) -> ConnectOptions {
        self.connects.lock().unwrap().last().expect("never connected").1.clone()
    }

    pub fn last_stream(&self) -> MediaStream {
        self.connects.lock().unwrap().last().expect("never connected").0.clone()
    }

    pub fn replaced(&self) -> Vec<MediaStream> {
        self.replaced.lock().unwrap().clone()
    }

    pub fn set_statistics(&self, stats: StreamStatistics) {
        *self.stats.lock().unwrap() = Some(stats);
    }

    /// Deliver an event as the media server would
    pub async fn emit(&self, event: BroadcastEvent) {
        let tx = self.events.lock().unwrap().clone();
        if let Some(tx) = tx {
            let _ = tx.send(event).await;
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(
        &self,
        stream: MediaStream,
        options: ConnectOptions,
        events: mpsc::Sender<BroadcastEvent>,
    ) -> Result<(), TransportError> {
        self.connects.lock().unwrap().push((stream, options));
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail {
            return Err(TransportError::rejected("mock connect failure"));
        }
        *self.events.lock().unwrap() = Some(events);
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.active.store(false, Ordering::SeqCst);
        self.events.lock().unwrap().take();
        Ok(())
    }

    async fn replace_stream(&self, stream: MediaStream) -> Result<(), TransportError> {
        self.replaced.lock().unwrap().push(stream);
        Ok(())
    }

    async fn statistics(&self) -> Option<StreamStatistics> {
        self.stats.lock().unwrap().clone()
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}
