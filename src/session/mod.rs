//! Publishing session
//!
//! - [`Session`]: the state machine owning the primary broadcast
//! - [`SettingsStore`]: codec/simulcast choices for the next broadcast
//! - [`DisplayShare`]: the secondary screen-share leg
//! - [`SessionGuard`]: forces a stop when the owner goes away

pub mod display;
pub mod guard;
pub mod machine;
pub mod settings;
pub mod state;

pub use display::{desired_leg_state, DisplayShare, LegState};
pub use guard::SessionGuard;
pub use machine::{Controls, Session};
pub use settings::{BroadcastSettings, SettingsStore};
pub use state::PublisherState;
