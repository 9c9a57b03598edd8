//! Publisher lifecycle state
//!
//! ```text
//!   Ready ──start──► Connecting ──connected──► Streaming
//!     ▲                  │                         │
//!     └──failed / stop───┘◄──────────stop──────────┘
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Externally observable state of the publishing session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublisherState {
    /// No outbound connection exists
    #[default]
    Ready,
    /// A connect attempt is in flight
    Connecting,
    /// Connected and publishing
    Streaming,
}

impl PublisherState {
    /// Whether `next` is a legal edge from this state.
    ///
    /// Staying in Ready is allowed so that repeated stops are no-ops.
    pub fn can_transition_to(self, next: PublisherState) -> bool {
        use PublisherState::*;
        matches!(
            (self, next),
            (Ready, Ready)
                | (Ready, Connecting)
                | (Connecting, Streaming)
                | (Connecting, Ready)
                | (Streaming, Ready)
        )
    }

    pub fn is_ready(self) -> bool {
        self == PublisherState::Ready
    }

    /// Connecting or streaming
    pub fn is_live(self) -> bool {
        !self.is_ready()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PublisherState::Ready => "ready",
            PublisherState::Connecting => "connecting",
            PublisherState::Streaming => "streaming",
        }
    }
}

impl fmt::Display for PublisherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
