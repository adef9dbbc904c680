//! Hark Decoder crate - the speech decoder contract and its implementations.
//!
//! Provides the narrow trait the session state machine drives (frame feed,
//! voice-activity flag, utterance lifecycle, search switching, hypothesis
//! retrieval), a deterministic scripted decoder for tests, and a Vosk-backed
//! implementation behind the `vosk` feature.

use hark_core::error::Result;
use hark_core::types::SearchMode;

pub mod scripted;
pub mod vosk_decoder;

pub use scripted::{LifecycleCall, ScriptedDecoder};
pub use vosk_decoder::{VoskDecoder, VoskDecoderConfig};

/// The acoustic decoder the session state machine drives.
///
/// The decoder is exclusively owned by the single consumer task, so all
/// methods take `&mut self` and no internal locking is required.
///
/// Utterance lifecycle calls must alternate strictly: one `start_utterance`,
/// then one `end_utterance`, then the next `start_utterance`. A lifecycle
/// error (`HarkError::Lifecycle`) means the decoder's internal state machine
/// is corrupted and the session must shut down; there is no safe
/// resynchronization point.
pub trait SpeechDecoder: Send {
    /// Register the wake phrase under the named keyword search.
    fn define_keyphrase(&mut self, name: &str, phrase: &str) -> Result<()>;

    /// Register a command grammar under the named grammar search.
    fn define_grammar(&mut self, name: &str, source: &str) -> Result<()>;

    /// Feed one frame of 16-bit mono PCM.
    ///
    /// `do_search` asks the decoder to run recognition as it buffers;
    /// `full_utterance` hints that the frame completes an utterance.
    fn process_frame(&mut self, frame: &[i16], do_search: bool, full_utterance: bool)
        -> Result<()>;

    /// Whether the decoder currently reports voice activity.
    fn in_speech(&self) -> bool;

    /// Open a new utterance. Failure is unrecoverable.
    fn start_utterance(&mut self) -> Result<()>;

    /// Close the current utterance, making a hypothesis retrievable.
    /// Failure is unrecoverable.
    fn end_utterance(&mut self) -> Result<()>;

    /// The currently active search.
    fn search_mode(&self) -> SearchMode;

    /// Activate a previously defined search.
    fn set_search_mode(&mut self, mode: SearchMode) -> Result<()>;

    /// Best hypothesis for the most recently closed utterance.
    ///
    /// `Ok(None)` is the ordinary "no usable result" outcome; `Err` is a
    /// retrieval failure. Callers treat both as the absence of a result.
    fn hypothesis(&mut self) -> Result<Option<String>>;
}
