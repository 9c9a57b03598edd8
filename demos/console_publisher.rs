//! Console publisher demo
//!
//! Drives the publisher against an in-process loopback transport that
//! pretends viewers are joining.
//!
//! Run with: cargo run --example console_publisher
//!
//! Credentials come from the environment, with demo values as fallback:
//!   PUBLISHER_TOKEN=... PUBLISHER_STREAM_NAME=... cargo run --example console_publisher
//!
//! Set RUST_LOG=live_publisher=debug to see every transition.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use live_publisher::{
    BroadcastEvent, ConnectOptions, Credentials, MediaStream, MediaTrack, Publisher,
    PublisherConfig, StreamStatistics, Transport, TransportError, TransportFactory,
};

/// Transport that accepts every connect and invents an audience
struct LoopbackTransport {
    label: String,
    active: Arc<AtomicBool>,
    connected_at: Mutex<Option<Instant>>,
    bytes_sent: AtomicU64,
    audience: Mutex<Option<JoinHandle<()>>>,
}

impl LoopbackTransport {
    fn new(label: String) -> Self {
        Self {
            label,
            active: Arc::new(AtomicBool::new(false)),
            connected_at: Mutex::new(None),
            bytes_sent: AtomicU64::new(0),
            audience: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn connect(
        &self,
        stream: MediaStream,
        options: ConnectOptions,
        events: mpsc::Sender<BroadcastEvent>,
    ) -> Result<(), TransportError> {
        println!(
            "[{}] connecting {} (codec={:?}, simulcast={})",
            self.label,
            stream.id(),
            options.codec,
            options.simulcast
        );
        tokio::time::sleep(Duration::from_millis(300)).await;

        self.active.store(true, Ordering::SeqCst);
        *self.connected_at.lock().unwrap() = Some(Instant::now());

        if options.events.iter().any(|e| e == "viewercount") {
            let audience = tokio::spawn(async move {
                let _ = events.send(BroadcastEvent::Active).await;
                for viewers in 1..=5u64 {
                    tokio::time::sleep(Duration::from_millis(400)).await;
                    let data = serde_json::json!({ "viewercount": viewers });
                    if events
                        .send(BroadcastEvent::from_named("viewercount", data))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            });
            *self.audience.lock().unwrap() = Some(audience);
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        if let Some(audience) = self.audience.lock().unwrap().take() {
            audience.abort();
        }
        if self.active.swap(false, Ordering::SeqCst) {
            println!("[{}] disconnected", self.label);
        }
        Ok(())
    }

    async fn replace_stream(&self, stream: MediaStream) -> Result<(), TransportError> {
        println!("[{}] now sending {}", self.label, stream.id());
        Ok(())
    }

    async fn statistics(&self) -> Option<StreamStatistics> {
        let connected_at = (*self.connected_at.lock().unwrap())?;
        let bytes = self.bytes_sent.fetch_add(250_000, Ordering::Relaxed) + 250_000;
        let duration = connected_at.elapsed();
        let mut stats = StreamStatistics {
            bytes_sent: bytes,
            video_frames: duration.as_secs() * 30,
            duration,
            width: Some(1280),
            height: Some(720),
            ..Default::default()
        };
        stats.calculate_bitrate();
        Some(stats)
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

struct LoopbackFactory;

impl TransportFactory for LoopbackFactory {
    fn create(&self, credentials: &Credentials, source_id: Option<&str>) -> Arc<dyn Transport> {
        let label = match source_id {
            Some(source) => format!("{}/{}", credentials.stream_name, source),
            None => credentials.stream_name.clone(),
        };
        Arc::new(LoopbackTransport::new(label))
    }

    fn codec_list(&self) -> Vec<String> {
        vec!["h264".into(), "vp8".into(), "vp9".into(), "av1".into()]
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("live_publisher=info")),
        )
        .init();

    let config = PublisherConfig::from_env().with_stats_interval(Duration::from_millis(500));
    let has_credentials = config.credentials.is_some();
    let publisher = Publisher::new(Arc::new(LoopbackFactory), config);
    if !has_credentials {
        publisher.setup_publisher("demo-token", "demo-stream", "demo-id").await.ok();
    }

    let mut state = publisher.watch_state();
    let watcher = tokio::spawn(async move {
        while state.changed().await.is_ok() {
            println!("state: {}", *state.borrow_and_update());
        }
    });

    let camera = MediaStream::new(vec![MediaTrack::video("camera"), MediaTrack::audio("microphone")]);
    publisher.update_streaming(camera).await.ok();

    if let Err(e) = publisher.update_codec("vp9") {
        println!("codec not changed: {}", e);
    }

    // Double click: the second start is ignored
    let first = publisher.start_streaming(None);
    let second = publisher.start_streaming(None);
    let _ = tokio::join!(first, second);

    let screen = MediaStream::new(vec![MediaTrack::video("screen")]);
    publisher.start_display_streaming(screen.clone()).await.ok();

    tokio::time::sleep(Duration::from_secs(2)).await;
    println!("viewers: {}", publisher.viewer_count());
    if let Some(stats) = publisher.statistics() {
        println!(
            "bitrate: {} bps, framerate: {:.1} fps, resolution: {}",
            stats.bitrate,
            stats.framerate(),
            stats.resolution().as_deref().unwrap_or("unknown")
        );
    }

    publisher.stop_display_streaming().await.ok();
    publisher.stop_streaming().await.ok();
    println!("close prompt needed: {}", publisher.needs_close_confirmation());

    drop(publisher);
    watcher.await.ok();
}
