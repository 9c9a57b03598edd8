//! Media streams and tracks

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

/// Kind of media carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

/// A single audio or video track
///
/// Clones share the same liveness flag, so ending a track through any
/// clone ends it everywhere.
#[derive(Debug, Clone)]
pub struct MediaTrack {
    id: String,
    kind: TrackKind,
    live: Arc<AtomicBool>,
}

impl MediaTrack {
    /// Create a live track
    pub fn new(id: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id: id.into(),
            kind,
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn audio(id: impl Into<String>) -> Self {
        Self::new(id, TrackKind::Audio)
    }

    pub fn video(id: impl Into<String>) -> Self {
        Self::new(id, TrackKind::Video)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// Whether the track still produces media
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// End the track. Irreversible.
    pub fn stop(&self) {
        self.live.store(false, Ordering::Release);
    }
}

struct StreamInner {
    id: String,
    tracks: Vec<MediaTrack>,
}

/// Handle to a media stream owned by the device supplier
///
/// Cloning is cheap and yields the same stream; equality is identity.
#[derive(Clone)]
pub struct MediaStream {
    inner: Arc<StreamInner>,
}

impl MediaStream {
    /// Create a stream with a generated id
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        let n = NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed);
        Self::with_id(format!("stream-{}", n), tracks)
    }

    /// Create a stream with an explicit id
    pub fn with_id(id: impl Into<String>, tracks: Vec<MediaTrack>) -> Self {
        Self {
            inner: Arc::new(StreamInner {
                id: id.into(),
                tracks,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.inner.tracks
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks().iter().filter(|t| t.kind() == TrackKind::Audio)
    }

    pub fn video_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks().iter().filter(|t| t.kind() == TrackKind::Video)
    }

    pub fn has_audio(&self) -> bool {
        self.audio_tracks().next().is_some()
    }

    pub fn has_video(&self) -> bool {
        self.video_tracks().next().is_some()
    }

    /// A stream can be published when at least one track is live
    pub fn is_publishable(&self) -> bool {
        self.tracks().iter().any(MediaTrack::is_live)
    }

    /// Non-owning reference to this stream
    pub fn downgrade(&self) -> WeakMediaStream {
        WeakMediaStream {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Whether both handles refer to the same stream
    pub fn same_as(&self, other: &MediaStream) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for MediaStream {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl Eq for MediaStream {}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStream")
            .field("id", &self.inner.id)
            .field("tracks", &self.inner.tracks.len())
            .finish()
    }
}

/// Weak reference to a [`MediaStream`]
///
/// Held by the display-share leg, which never keeps the supplier's stream
/// alive on its own.
#[derive(Clone, Default)]
pub struct WeakMediaStream {
    inner: Weak<StreamInner>,
}

impl WeakMediaStream {
    /// Get the stream back if the supplier still holds it
    pub fn upgrade(&self) -> Option<MediaStream> {
        self.inner.upgrade().map(|inner| MediaStream { inner })
    }

    /// Whether this reference points at `stream`
    pub fn refers_to(&self, stream: &MediaStream) -> bool {
        Weak::ptr_eq(&self.inner, &Arc::downgrade(&stream.inner))
    }
}

impl fmt::Debug for WeakMediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(stream) => write!(f, "WeakMediaStream({})", stream.id()),
            None => write!(f, "WeakMediaStream(<dropped>)"),
        }
    }
}
