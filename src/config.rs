//! Publisher configuration

use std::env;
use std::time::Duration;

/// Source identifier attached to the display-share leg
pub const DISPLAY_SHARE_SOURCE_ID: &str = "DisplayShare";

/// Broadcast events subscribed to on connect
pub const DEFAULT_EVENTS: &[&str] = &["active", "inactive", "viewercount"];

/// Environment variable holding the publishing token
pub const ENV_TOKEN: &str = "PUBLISHER_TOKEN";
/// Environment variable holding the stream name
pub const ENV_STREAM_NAME: &str = "PUBLISHER_STREAM_NAME";
/// Environment variable holding the stream id
pub const ENV_STREAM_ID: &str = "PUBLISHER_STREAM_ID";

/// Connection credentials
///
/// Opaque strings handed to the transport. A session without credentials is
/// inert and never leaves Ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    pub stream_name: String,
    pub stream_id: String,
}

impl Credentials {
    /// Build credentials, or `None` if token or stream name is empty.
    ///
    /// The stream id is only used for viewer links and may be empty.
    pub fn new(
        token: impl Into<String>,
        stream_name: impl Into<String>,
        stream_id: impl Into<String>,
    ) -> Option<Self> {
        let token = token.into();
        let stream_name = stream_name.into();
        if token.is_empty() || stream_name.is_empty() {
            return None;
        }
        Some(Self {
            token,
            stream_name,
            stream_id: stream_id.into(),
        })
    }
}

/// Publisher configuration options
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Credentials used by `setup` when none are passed explicitly
    pub credentials: Option<Credentials>,

    /// Event names subscribed to on connect
    pub events: Vec<String>,

    /// Source id of the display-share leg
    pub display_source_id: String,

    /// Capacity of the transport event channel
    pub event_channel_capacity: usize,

    /// How often statistics are pulled from the transport
    pub stats_interval: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            credentials: None,
            events: DEFAULT_EVENTS.iter().map(|e| e.to_string()).collect(),
            display_source_id: DISPLAY_SHARE_SOURCE_ID.to_string(),
            event_channel_capacity: 256,
            stats_interval: Duration::from_secs(1),
        }
    }
}

impl PublisherConfig {
    /// Create a config with default values and no credentials
    pub fn new() -> Self {
        Self::default()
    }

    /// Read credentials from the process environment.
    ///
    /// Missing variables are treated as empty strings, so an incomplete
    /// environment produces a config without credentials.
    pub fn from_env() -> Self {
        let var = |name: &str| env::var(name).unwrap_or_default();
        let credentials = Credentials::new(var(ENV_TOKEN), var(ENV_STREAM_NAME), var(ENV_STREAM_ID));
        if credentials.is_none() {
            tracing::debug!("Publisher credentials not found in environment");
        }
        Self {
            credentials,
            ..Self::default()
        }
    }

    /// Set credentials
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Set the subscribed event names
    pub fn with_events<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.events = events.into_iter().map(Into::into).collect();
        self
    }

    /// Set the display-share source id
    pub fn with_display_source_id(mut self, id: impl Into<String>) -> Self {
        self.display_source_id = id.into();
        self
    }

    /// Set the event channel capacity
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the statistics polling interval
    pub fn with_stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }
}
