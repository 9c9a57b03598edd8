//! Outbound stream statistics

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Last statistics snapshot pulled from the transport
///
/// The session treats this as opaque and only republishes the latest value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamStatistics {
    /// Total bytes sent
    pub bytes_sent: u64,
    /// Time since the connection was established
    pub duration: Duration,
    /// Number of video frames sent
    pub video_frames: u64,
    /// Number of audio frames sent
    pub audio_frames: u64,
    /// Frames dropped by the encoder or pacer
    pub dropped_frames: u64,
    /// Current bitrate estimate (bits/sec)
    pub bitrate: u64,
    /// Round trip time to the media server
    pub round_trip_time_ms: Option<f64>,
    /// Fraction of packets lost, 0.0 - 1.0
    pub packet_loss: Option<f64>,
    /// Negotiated video codec
    pub video_codec: Option<String>,
    /// Negotiated audio codec
    pub audio_codec: Option<String>,
    /// Video width
    pub width: Option<u32>,
    /// Video height
    pub height: Option<u32>,
}

impl StreamStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calculate bitrate from bytes and duration
    pub fn calculate_bitrate(&mut self) {
        let secs = self.duration.as_secs();
        if secs > 0 {
            self.bitrate = self.bytes_sent.saturating_mul(8) / secs;
        }
    }

    /// Video framerate over the whole connection
    pub fn framerate(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.video_frames as f64 / secs
        } else {
            0.0
        }
    }

    /// Resolution as `WIDTHxHEIGHT`, if both are known
    pub fn resolution(&self) -> Option<String> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some(format!("{}x{}", w, h)),
            _ => None,
        }
    }
}
