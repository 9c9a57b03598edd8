//! Pending broadcast settings
//!
//! The store is editable only while the session is Ready. `start` copies the
//! current values into an immutable [`BroadcastSettings`] snapshot.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::state::PublisherState;
use crate::error::{Error, Result};

/// Codec and simulcast choice for one broadcast
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastSettings {
    /// Video codec, `None` when the transport offers no choice
    pub codec: Option<String>,
    /// Publish multiple encodings
    pub simulcast: bool,
}

impl BroadcastSettings {
    pub fn new(codec: Option<&str>, simulcast: bool) -> Self {
        Self {
            codec: codec.map(str::to_string),
            simulcast,
        }
    }
}

#[derive(Debug, Default)]
struct Pending {
    codec: Option<String>,
    simulcast: bool,
}

/// Holds codec/simulcast selections until the next broadcast starts
#[derive(Debug)]
pub struct SettingsStore {
    codec_list: Vec<String>,
    pending: Mutex<Pending>,
    state: watch::Receiver<PublisherState>,
}

impl SettingsStore {
    /// Create a store for the codecs the transport offers
    pub fn new(codec_list: Vec<String>, state: watch::Receiver<PublisherState>) -> Self {
        Self {
            codec_list,
            pending: Mutex::new(Pending::default()),
            state,
        }
    }

    pub fn codec_list(&self) -> &[String] {
        &self.codec_list
    }

    /// Selected codec, falling back to the first offered one
    pub fn codec(&self) -> Option<String> {
        self.lock()
            .codec
            .clone()
            .or_else(|| self.codec_list.first().cloned())
    }

    pub fn simulcast(&self) -> bool {
        self.lock().simulcast
    }

    /// Whether the settings can currently be edited
    pub fn is_editable(&self) -> bool {
        self.state.borrow().is_ready()
    }

    /// Select a codec from the offered list
    pub fn update_codec(&self, codec: &str) -> Result<()> {
        self.ensure_editable()?;
        if !self.codec_list.iter().any(|c| c == codec) {
            return Err(Error::UnknownCodec(codec.to_string()));
        }
        self.lock().codec = Some(codec.to_string());
        tracing::debug!(codec = codec, "Codec selected");
        Ok(())
    }

    /// Enable or disable simulcast
    pub fn set_simulcast(&self, enabled: bool) -> Result<()> {
        self.ensure_editable()?;
        self.lock().simulcast = enabled;
        tracing::debug!(simulcast = enabled, "Simulcast updated");
        Ok(())
    }

    /// Copy of the current values
    pub fn snapshot(&self) -> BroadcastSettings {
        BroadcastSettings {
            codec: self.codec(),
            simulcast: self.simulcast(),
        }
    }

    fn ensure_editable(&self) -> Result<()> {
        let state = *self.state.borrow();
        if state.is_ready() {
            Ok(())
        } else {
            Err(Error::SettingsLocked(state))
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(codecs: &[&str]) -> (SettingsStore, watch::Sender<PublisherState>) {
        let (tx, rx) = watch::channel(PublisherState::Ready);
        let list = codecs.iter().map(|c| c.to_string()).collect();
        (SettingsStore::new(list, rx), tx)
    }

    #[test]
    fn test_defaults() {
        let (store, _tx) = store(&["h264", "vp8"]);
        assert_eq!(store.codec().as_deref(), Some("h264"));
        assert!(!store.simulcast());
        assert_eq!(store.snapshot(), BroadcastSettings::new(Some("h264"), false));
    }

    #[test]
    fn test_empty_codec_list() {
        let (store, _tx) = store(&[]);
        assert!(store.codec().is_none());
        assert_eq!(
            store.update_codec("h264"),
            Err(Error::UnknownCodec("h264".into()))
        );
    }

    #[test]
    fn test_update_while_ready() {
        let (store, _tx) = store(&["h264", "vp8"]);
        store.update_codec("vp8").unwrap();
        store.set_simulcast(true).unwrap();
        assert_eq!(store.snapshot(), BroadcastSettings::new(Some("vp8"), true));
    }

    #[test]
    fn test_locked_while_live() {
        let (store, tx) = store(&["h264", "vp8"]);

        tx.send_replace(PublisherState::Connecting);
        assert!(!store.is_editable());
        assert_eq!(
            store.update_codec("vp8"),
            Err(Error::SettingsLocked(PublisherState::Connecting))
        );

        tx.send_replace(PublisherState::Streaming);
        assert_eq!(
            store.set_simulcast(true),
            Err(Error::SettingsLocked(PublisherState::Streaming))
        );
        assert_eq!(store.snapshot(), BroadcastSettings::new(Some("h264"), false));

        tx.send_replace(PublisherState::Ready);
        assert!(store.update_codec("vp8").is_ok());
    }
}
