//! Audio session state machine.

mod controller;
mod observer;
mod state;

pub use controller::SessionStateController;
pub use observer::AudioVideoObserver;
pub use state::{RawAudioState, SessionState};
