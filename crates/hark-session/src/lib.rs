//! Hark Session crate - the session state machine.
//!
//! Coordinates audio ingestion, utterance lifecycle, and recognizer-mode
//! switching: keyword search until the wake phrase matches, then grammar
//! search for one command inside a timeout window, then back to keyword.
//! The listener exclusively owns the decoder and all session state; the
//! frame queue is the only shared resource.

pub mod listener;
pub mod state;

pub use listener::{CommandListener, ListenerConfig};
pub use state::{ListenerState, StateTracker};
