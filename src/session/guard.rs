//! Lifetime guard
//!
//! Whoever owns a session must make sure it is stopped on every exit path.
//! [`SessionGuard`] does that on drop: the session becomes Ready right away
//! and the transport teardown is spawned on the current runtime.

use std::ops::Deref;

use super::display::stop_leg;
use super::machine::Session;

/// Owns a [`Session`] and stops it when dropped
pub struct SessionGuard {
    session: Session,
}

impl SessionGuard {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}

impl Deref for SessionGuard {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let primary = self.session.begin_stop();
        let display = self.session.display().begin_shutdown();
        if primary.is_none() && display.is_none() {
            return;
        }

        let source_id = self.session.display().source_id().to_string();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Some(transport) = primary {
                        if let Err(e) = transport.stop().await {
                            tracing::warn!(error = %e, "Transport teardown on drop failed");
                        }
                    }
                    if let Some(transport) = display {
                        stop_leg(&source_id, transport).await;
                    }
                });
            }
            Err(_) => {
                tracing::warn!("No runtime available, transport teardown on drop skipped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PublisherConfig;
    use crate::media::{MediaStream, MediaTrack};
    use crate::session::{BroadcastSettings, LegState, PublisherState};
    use crate::transport::mock::MockFactory;

    #[tokio::test]
    async fn test_drop_forces_stop() {
        let factory = MockFactory::new();
        let session = Session::new(factory.clone(), PublisherConfig::default());
        session.setup("tok", "name", "id").await;

        let guard = SessionGuard::new(session.clone());
        let camera = MediaStream::new(vec![MediaTrack::video("cam")]);
        let screen = MediaStream::new(vec![MediaTrack::video("screen")]);
        guard.start(Some(camera), BroadcastSettings::default()).await;
        guard.set_display_stream(Some(&screen)).await;
        assert_eq!(guard.display_leg_state(), LegState::Started);

        drop(guard);
        assert_eq!(session.state(), PublisherState::Ready);
        assert_eq!(session.display_leg_state(), LegState::Stopped);

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(factory.last_primary().stop_count(), 1);
        assert_eq!(factory.display_stops(), 1);
    }

    #[tokio::test]
    async fn test_drop_while_ready_is_quiet() {
        let factory = MockFactory::new();
        let session = Session::new(factory.clone(), PublisherConfig::default());

        drop(SessionGuard::new(session.clone()));
        assert_eq!(session.state(), PublisherState::Ready);
        assert!(factory.primary().is_empty());
    }
}
