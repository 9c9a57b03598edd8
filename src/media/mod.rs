//! Media stream model
//!
//! Streams are produced by the device supplier (camera/microphone composite,
//! screen capture). The publisher only references them.

pub mod stream;

pub use stream::{MediaStream, MediaTrack, TrackKind, WeakMediaStream};
