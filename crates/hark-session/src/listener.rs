//! The session state machine coordinating frame ingestion, utterance
//! lifecycle, and search-mode switching.
//!
//! One logical loop pulls frames from the queue, feeds the decoder, and
//! evaluates the transition rules in a fixed order: speech onset, the
//! speech-to-silence edge, then the opportunistic command-window timeout.
//! The keyword search runs until the wake phrase matches, the grammar search
//! until a command utterance closes or the window expires.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use uuid::Uuid;

use hark_audio::queue::FrameQueue;
use hark_core::error::Result;
use hark_core::events::{EventSink, SessionEvent};
use hark_core::types::SearchMode;
use hark_decoder::SpeechDecoder;

use crate::state::{ListenerState, StateTracker};

/// Configuration for a command listener session.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// The wake phrase registered under the keyword search.
    pub wake_phrase: String,
    /// Grammar source registered under the grammar search.
    pub grammar: String,
    /// How long after the wake phrase a command utterance may start.
    pub command_window: Duration,
    /// Post-pop queue depth above which a backlog warning is emitted.
    pub backlog_threshold: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            wake_phrase: "hey butler".to_string(),
            grammar: String::new(),
            command_window: Duration::from_secs(5),
            backlog_threshold: 10,
        }
    }
}

/// The session state machine.
///
/// Exclusively owns the decoder and all session state; the frame queue is
/// the only resource shared with another execution context.
pub struct CommandListener<D: SpeechDecoder> {
    id: Uuid,
    decoder: D,
    tracker: StateTracker,
    command_deadline: Option<Instant>,
    config: ListenerConfig,
    sink: Arc<dyn EventSink>,
    frames_processed: u64,
}

impl<D: SpeechDecoder> CommandListener<D> {
    /// Set up the decoder searches and open the initial utterance.
    ///
    /// On return the keyword search is active and the decoder is consuming
    /// audio into an open utterance. Any failure here is a startup error.
    pub fn new(mut decoder: D, config: ListenerConfig, sink: Arc<dyn EventSink>) -> Result<Self> {
        decoder.define_keyphrase(SearchMode::Keyword.as_str(), &config.wake_phrase)?;
        decoder.define_grammar(SearchMode::Grammar.as_str(), &config.grammar)?;
        decoder.set_search_mode(SearchMode::Keyword)?;
        decoder.start_utterance()?;

        let id = Uuid::new_v4();
        tracing::info!(
            session_id = %id,
            wake_phrase = %config.wake_phrase,
            command_window_secs = config.command_window.as_secs_f32(),
            "Command listener ready"
        );

        Ok(Self {
            id,
            decoder,
            tracker: StateTracker::new(),
            command_deadline: None,
            config,
            sink,
            frames_processed: 0,
        })
    }

    /// Unique identifier for this session.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the current listener state.
    pub fn state(&self) -> ListenerState {
        self.tracker.current()
    }

    /// Returns the decoder's active search.
    pub fn search_mode(&self) -> SearchMode {
        self.decoder.search_mode()
    }

    /// Deadline of the open command window, if one is open.
    pub fn command_deadline(&self) -> Option<Instant> {
        self.command_deadline
    }

    /// Total frames processed so far.
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Process one frame against the wall clock.
    pub fn handle_frame(&mut self, frame: &[i16]) -> Result<()> {
        self.handle_frame_at(frame, Instant::now())
    }

    /// Process one frame, evaluating the transition rules in order.
    ///
    /// `now` is passed explicitly so the command window can be exercised in
    /// tests without waiting on the wall clock. A `Lifecycle` error return
    /// means the decoder is unusable and the session must end.
    pub fn handle_frame_at(&mut self, frame: &[i16], now: Instant) -> Result<()> {
        self.decoder.process_frame(frame, true, false)?;
        self.frames_processed += 1;

        // Speech onset.
        if self.decoder.in_speech() {
            if self.tracker.current() != ListenerState::Listening {
                self.tracker.transition(ListenerState::Listening)?;
                self.emit(SessionEvent::ListeningStarted {
                    timestamp: Utc::now(),
                });
            }
            return Ok(());
        }

        // Speech-to-silence edge.
        if self.tracker.current() == ListenerState::Listening {
            return self.close_utterance(now);
        }

        // Opportunistic command-window timeout. Only reachable while frames
        // keep arriving; an idle source cannot expire the window.
        if self.tracker.current() == ListenerState::AwaitingCommand {
            if let Some(deadline) = self.command_deadline {
                if now > deadline {
                    return self.abandon_command();
                }
            }
        }

        Ok(())
    }

    /// Drain the frame queue until it closes.
    ///
    /// Emits the backlog advisory when the post-pop depth exceeds the
    /// threshold. Returns the first fatal error; orderly shutdown (stopping
    /// capture, releasing the decoder) is the caller's job.
    pub fn run(&mut self, queue: &FrameQueue) -> Result<()> {
        tracing::info!(session_id = %self.id, "Session loop started");

        while let Some(frame) = queue.pop() {
            let depth = queue.depth();
            if depth > self.config.backlog_threshold {
                self.emit(SessionEvent::QueueBacklog {
                    depth,
                    timestamp: Utc::now(),
                });
            }
            self.handle_frame(&frame)?;
        }

        tracing::info!(
            session_id = %self.id,
            frames = self.frames_processed,
            "Frame queue closed, session loop stopped"
        );
        Ok(())
    }

    /// Speech-to-silence edge: close the utterance, act on the hypothesis
    /// for the search that was active, and immediately reopen.
    fn close_utterance(&mut self, now: Instant) -> Result<()> {
        self.end_utterance_or_reset()?;

        // Inspect the active search before switching it.
        let mode = self.decoder.search_mode();
        tracing::debug!(search = %mode, "Utterance closed");

        match mode {
            SearchMode::Keyword => match self.take_hypothesis() {
                Some(phrase) => {
                    self.emit(SessionEvent::KeywordDetected {
                        phrase,
                        timestamp: Utc::now(),
                    });
                    self.decoder.set_search_mode(SearchMode::Grammar)?;
                    self.command_deadline = Some(now + self.config.command_window);
                    self.tracker.transition(ListenerState::AwaitingCommand)?;
                }
                None => {
                    self.tracker.transition(ListenerState::Idle)?;
                }
            },
            SearchMode::Grammar => {
                match self.take_hypothesis() {
                    Some(text) => self.emit(SessionEvent::CommandRecognized {
                        text,
                        timestamp: Utc::now(),
                    }),
                    None => self.emit(SessionEvent::CommandMissing {
                        timestamp: Utc::now(),
                    }),
                }
                self.decoder.set_search_mode(SearchMode::Keyword)?;
                self.command_deadline = None;
                self.tracker.transition(ListenerState::Idle)?;
            }
        }

        self.reopen_utterance()
    }

    /// Command window expired with no command utterance: abandon it.
    fn abandon_command(&mut self) -> Result<()> {
        self.end_utterance_or_reset()?;
        self.emit(SessionEvent::CommandTimeout {
            timestamp: Utc::now(),
        });
        self.decoder.set_search_mode(SearchMode::Keyword)?;
        self.command_deadline = None;
        self.tracker.transition(ListenerState::Idle)?;
        self.reopen_utterance()
    }

    fn end_utterance_or_reset(&mut self) -> Result<()> {
        if let Err(e) = self.decoder.end_utterance() {
            self.tracker.reset();
            return Err(e);
        }
        Ok(())
    }

    /// Reopen an utterance after an edge or timeout. Failure leaves the
    /// decoder unusable; no retry is attempted.
    fn reopen_utterance(&mut self) -> Result<()> {
        if let Err(e) = self.decoder.start_utterance() {
            self.tracker.reset();
            return Err(e);
        }
        Ok(())
    }

    /// Fetch the hypothesis for the just-closed utterance. Retrieval
    /// failures are transient: logged and treated as no result.
    fn take_hypothesis(&mut self) -> Option<String> {
        match self.decoder.hypothesis() {
            Ok(hypothesis) => hypothesis.filter(|h| !h.trim().is_empty()),
            Err(e) => {
                tracing::warn!(error = %e, "Hypothesis retrieval failed");
                None
            }
        }
    }

    fn emit(&self, event: SessionEvent) {
        self.sink.emit(event);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use hark_decoder::{LifecycleCall, ScriptedDecoder};

    /// Sink collecting events for assertions.
    #[derive(Clone, Default)]
    struct MemorySink(Arc<Mutex<Vec<SessionEvent>>>);

    impl MemorySink {
        fn events(&self) -> Vec<SessionEvent> {
            self.0.lock().unwrap().clone()
        }

        fn names(&self) -> Vec<&'static str> {
            self.events().iter().map(SessionEvent::event_name).collect()
        }
    }

    impl EventSink for MemorySink {
        fn emit(&self, event: SessionEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    const FRAME_INTERVAL: Duration = Duration::from_millis(32); // 512 samples at 16 kHz

    fn test_config() -> ListenerConfig {
        ListenerConfig {
            wake_phrase: "hey butler".to_string(),
            grammar: "turn on lights\nturn off lights".to_string(),
            command_window: Duration::from_secs(5),
            backlog_threshold: 10,
        }
    }

    fn listener_with(
        decoder: ScriptedDecoder,
    ) -> (CommandListener<ScriptedDecoder>, MemorySink) {
        let sink = MemorySink::default();
        let listener =
            CommandListener::new(decoder, test_config(), Arc::new(sink.clone())).unwrap();
        (listener, sink)
    }

    /// Drive `count` frames starting at `base`, one frame interval apart.
    /// Returns the instant of the last processed frame.
    fn drive_frames(
        listener: &mut CommandListener<ScriptedDecoder>,
        base: Instant,
        count: usize,
    ) -> Instant {
        let mut at = base;
        for i in 0..count {
            at = base + FRAME_INTERVAL * (i as u32);
            listener.handle_frame_at(&[0i16; 512], at).unwrap();
        }
        at
    }

    #[test]
    fn test_initial_state() {
        let (listener, sink) = listener_with(ScriptedDecoder::new());
        assert_eq!(listener.state(), ListenerState::Idle);
        assert_eq!(listener.search_mode(), SearchMode::Keyword);
        assert!(listener.command_deadline().is_none());
        // The initial utterance is already open.
        assert!(listener.decoder.utterance_open());
        assert_eq!(listener.decoder.lifecycle_calls(), &[LifecycleCall::Start]);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_searches_defined_at_startup() {
        let (listener, _sink) = listener_with(ScriptedDecoder::new());
        assert_eq!(
            listener.decoder.defined_source(SearchMode::Keyword),
            Some("hey butler")
        );
        assert_eq!(
            listener.decoder.defined_source(SearchMode::Grammar),
            Some("turn on lights\nturn off lights")
        );
    }

    #[test]
    fn test_speech_onset_enters_listening() {
        let decoder = ScriptedDecoder::new().with_speech_frames([true]);
        let (mut listener, sink) = listener_with(decoder);

        listener.handle_frame(&[0i16; 512]).unwrap();
        assert_eq!(listener.state(), ListenerState::Listening);
        assert_eq!(sink.names(), vec!["listening_started"]);
    }

    #[test]
    fn test_listening_event_fires_once_per_utterance() {
        let decoder = ScriptedDecoder::new().with_speech_frames([true, true, true]);
        let (mut listener, sink) = listener_with(decoder);

        drive_frames(&mut listener, Instant::now(), 3);
        assert_eq!(sink.names(), vec!["listening_started"]);
    }

    #[test]
    fn test_keyword_match_opens_command_window() {
        // Speech for frames 1..=5, silence from frame 6; the closed
        // keyword-mode utterance yields the wake phrase.
        let decoder = ScriptedDecoder::new()
            .with_speech_frames([true, true, true, true, true, false])
            .with_hypothesis(SearchMode::Keyword, Some("hey butler"));
        let (mut listener, sink) = listener_with(decoder);

        let base = Instant::now();
        let t6 = drive_frames(&mut listener, base, 6);

        assert_eq!(listener.state(), ListenerState::AwaitingCommand);
        assert_eq!(listener.search_mode(), SearchMode::Grammar);
        // The deadline is anchored to the frame that closed the utterance.
        assert_eq!(listener.command_deadline(), Some(t6 + Duration::from_secs(5)));
        assert_eq!(sink.names(), vec!["listening_started", "keyword_detected"]);

        match &sink.events()[1] {
            SessionEvent::KeywordDetected { phrase, .. } => assert_eq!(phrase, "hey butler"),
            other => panic!("Expected KeywordDetected, got {:?}", other),
        }

        // Closed and immediately reopened.
        assert_eq!(
            listener.decoder.lifecycle_calls(),
            &[LifecycleCall::Start, LifecycleCall::End, LifecycleCall::Start]
        );
        assert!(listener.decoder.utterance_open());
    }

    #[test]
    fn test_keyword_miss_stays_passive() {
        let decoder = ScriptedDecoder::new()
            .with_speech_frames([true, false])
            .with_hypothesis(SearchMode::Keyword, None);
        let (mut listener, sink) = listener_with(decoder);

        drive_frames(&mut listener, Instant::now(), 2);

        assert_eq!(listener.state(), ListenerState::Idle);
        assert_eq!(listener.search_mode(), SearchMode::Keyword);
        assert!(listener.command_deadline().is_none());
        assert_eq!(sink.names(), vec!["listening_started"]);
        // A fresh utterance is open for the next attempt.
        assert!(listener.decoder.utterance_open());
    }

    #[test]
    fn test_empty_keyword_hypothesis_is_a_miss() {
        let decoder = ScriptedDecoder::new()
            .with_speech_frames([true, false])
            .with_hypothesis(SearchMode::Keyword, Some("   "));
        let (mut listener, _sink) = listener_with(decoder);

        drive_frames(&mut listener, Instant::now(), 2);
        assert_eq!(listener.state(), ListenerState::Idle);
        assert_eq!(listener.search_mode(), SearchMode::Keyword);
    }

    #[test]
    fn test_command_recognized_reverts_to_keyword() {
        // Wake phrase, then a command utterance: "turn on lights".
        let decoder = ScriptedDecoder::new()
            .with_speech_frames([true, true, false, true, true, false])
            .with_hypothesis(SearchMode::Keyword, Some("hey butler"))
            .with_hypothesis(SearchMode::Grammar, Some("turn on lights"));
        let (mut listener, sink) = listener_with(decoder);

        drive_frames(&mut listener, Instant::now(), 6);

        assert_eq!(listener.state(), ListenerState::Idle);
        assert_eq!(listener.search_mode(), SearchMode::Keyword);
        assert!(listener.command_deadline().is_none());
        assert_eq!(
            sink.names(),
            vec![
                "listening_started",
                "keyword_detected",
                "listening_started",
                "command_recognized",
            ]
        );

        let events = sink.events();
        match &events[3] {
            SessionEvent::CommandRecognized { text, .. } => assert_eq!(text, "turn on lights"),
            other => panic!("Expected CommandRecognized, got {:?}", other),
        }
    }

    #[test]
    fn test_command_without_result_reports_missing() {
        let decoder = ScriptedDecoder::new()
            .with_speech_frames([true, false, true, false])
            .with_hypothesis(SearchMode::Keyword, Some("hey butler"))
            .with_hypothesis(SearchMode::Grammar, None);
        let (mut listener, sink) = listener_with(decoder);

        drive_frames(&mut listener, Instant::now(), 4);

        assert_eq!(listener.state(), ListenerState::Idle);
        assert_eq!(listener.search_mode(), SearchMode::Keyword);
        assert!(sink.names().contains(&"command_missing"));
    }

    #[test]
    fn test_command_window_timeout() {
        let decoder = ScriptedDecoder::new()
            .with_speech_frames([true, false])
            .with_hypothesis(SearchMode::Keyword, Some("hey butler"));
        let (mut listener, sink) = listener_with(decoder);

        let base = Instant::now();
        let t_edge = drive_frames(&mut listener, base, 2);
        assert_eq!(listener.state(), ListenerState::AwaitingCommand);

        // Silence continues; 5 s of wall clock elapse before the next frame.
        let late = t_edge + Duration::from_secs(5) + Duration::from_millis(1);
        listener.handle_frame_at(&[0i16; 512], late).unwrap();

        assert_eq!(listener.state(), ListenerState::Idle);
        assert_eq!(listener.search_mode(), SearchMode::Keyword);
        assert!(listener.command_deadline().is_none());
        assert_eq!(
            sink.names(),
            vec!["listening_started", "keyword_detected", "command_timeout"]
        );
        // The abandoned utterance was closed and a fresh one opened.
        assert!(listener.decoder.utterance_open());
    }

    #[test]
    fn test_no_timeout_before_deadline() {
        let decoder = ScriptedDecoder::new()
            .with_speech_frames([true, false])
            .with_hypothesis(SearchMode::Keyword, Some("hey butler"));
        let (mut listener, sink) = listener_with(decoder);

        let base = Instant::now();
        let t_edge = drive_frames(&mut listener, base, 2);

        let early = t_edge + Duration::from_millis(4900);
        listener.handle_frame_at(&[0i16; 512], early).unwrap();

        assert_eq!(listener.state(), ListenerState::AwaitingCommand);
        assert_eq!(listener.search_mode(), SearchMode::Grammar);
        assert!(!sink.names().contains(&"command_timeout"));
    }

    #[test]
    fn test_command_speech_suppresses_timeout() {
        let decoder = ScriptedDecoder::new()
            .with_speech_frames([true, false, true, true])
            .with_hypothesis(SearchMode::Keyword, Some("hey butler"));
        let (mut listener, sink) = listener_with(decoder);

        let base = Instant::now();
        let t_edge = drive_frames(&mut listener, base, 2);

        // Command speech starts, then keeps going past the deadline; the
        // timeout branch must not fire while an utterance is filling.
        let late = t_edge + Duration::from_secs(6);
        listener.handle_frame_at(&[0i16; 512], late).unwrap();
        assert_eq!(listener.state(), ListenerState::Listening);
        assert_eq!(listener.search_mode(), SearchMode::Grammar);

        listener
            .handle_frame_at(&[0i16; 512], late + FRAME_INTERVAL)
            .unwrap();
        assert!(!sink.names().contains(&"command_timeout"));
    }

    #[test]
    fn test_lifecycle_calls_alternate_strictly() {
        let decoder = ScriptedDecoder::new()
            .with_speech_frames([
                true, false, // keyword miss
                true, false, // keyword hit
                true, false, // command
                true, false, // keyword miss again
            ])
            .with_hypothesis(SearchMode::Keyword, None)
            .with_hypothesis(SearchMode::Keyword, Some("hey butler"))
            .with_hypothesis(SearchMode::Grammar, Some("turn off lights"));
        let (mut listener, _sink) = listener_with(decoder);

        drive_frames(&mut listener, Instant::now(), 8);

        let calls = listener.decoder.lifecycle_calls();
        assert!(!calls.is_empty());
        for (i, call) in calls.iter().enumerate() {
            let expected = if i % 2 == 0 {
                LifecycleCall::Start
            } else {
                LifecycleCall::End
            };
            assert_eq!(*call, expected, "call {} out of order", i);
        }
        // Exactly one utterance is open after any sequence of frames.
        assert!(listener.decoder.utterance_open());
    }

    #[test]
    fn test_fatal_start_failure_propagates() {
        let decoder = ScriptedDecoder::new()
            .with_speech_frames([true, false])
            .with_hypothesis(SearchMode::Keyword, None);
        let (mut listener, _sink) = listener_with(decoder);

        let base = Instant::now();
        listener.handle_frame_at(&[0i16; 512], base).unwrap();

        // The reopen after the silence edge fails.
        listener.decoder.fail_next_start_utterance();
        let result = listener.handle_frame_at(&[0i16; 512], base + FRAME_INTERVAL);
        assert!(result.is_err());

        // No utterance is open and the listener is not mid-utterance.
        assert!(!listener.decoder.utterance_open());
        assert_ne!(listener.state(), ListenerState::Listening);
    }

    #[test]
    fn test_fatal_end_failure_propagates() {
        let decoder = ScriptedDecoder::new().with_speech_frames([true, false]);
        let (mut listener, _sink) = listener_with(decoder);

        let base = Instant::now();
        listener.handle_frame_at(&[0i16; 512], base).unwrap();

        listener.decoder.fail_next_end_utterance();
        let result = listener.handle_frame_at(&[0i16; 512], base + FRAME_INTERVAL);
        assert!(result.is_err());
        assert_ne!(listener.state(), ListenerState::Listening);
    }

    #[test]
    fn test_run_drains_queue_and_stops_on_close() {
        let decoder = ScriptedDecoder::new()
            .with_speech_frames([true, false])
            .with_hypothesis(SearchMode::Keyword, None);
        let (mut listener, _sink) = listener_with(decoder);

        let queue = FrameQueue::new(50);
        for _ in 0..5 {
            queue.push(vec![0i16; 512]);
        }
        queue.close();

        listener.run(&queue).unwrap();
        assert_eq!(listener.frames_processed(), 5);
    }

    #[test]
    fn test_backlog_fires_only_above_threshold() {
        let decoder = ScriptedDecoder::new();
        let (mut listener, sink) = listener_with(decoder);

        // 13 queued frames: post-pop depths are 12, 11, 10, ... — exactly
        // two exceed the threshold of 10.
        let queue = FrameQueue::new(50);
        for _ in 0..13 {
            queue.push(vec![0i16; 512]);
        }
        queue.close();

        listener.run(&queue).unwrap();

        let depths: Vec<usize> = sink
            .events()
            .iter()
            .filter_map(|e| match e {
                SessionEvent::QueueBacklog { depth, .. } => Some(*depth),
                _ => None,
            })
            .collect();
        assert_eq!(depths, vec![12, 11]);
    }

    #[test]
    fn test_no_backlog_at_or_below_threshold() {
        let decoder = ScriptedDecoder::new();
        let (mut listener, sink) = listener_with(decoder);

        let queue = FrameQueue::new(50);
        for _ in 0..11 {
            queue.push(vec![0i16; 512]);
        }
        queue.close();

        listener.run(&queue).unwrap();
        assert!(!sink.names().contains(&"queue_backlog"));
    }

    #[test]
    fn test_run_returns_fatal_error() {
        let decoder = ScriptedDecoder::new()
            .with_speech_frames([true, false])
            .with_hypothesis(SearchMode::Keyword, None);
        let (mut listener, _sink) = listener_with(decoder);
        listener.decoder.fail_next_start_utterance();

        let queue = FrameQueue::new(50);
        queue.push(vec![0i16; 512]);
        queue.push(vec![0i16; 512]);
        queue.close();

        let result = listener.run(&queue);
        assert!(result.is_err());
    }

    #[test]
    fn test_full_cycle_then_next_wake() {
        // Two complete keyword->command cycles back to back.
        let decoder = ScriptedDecoder::new()
            .with_speech_frames([
                true, false, // wake 1
                true, false, // command 1
                true, false, // wake 2
                true, false, // command 2
            ])
            .with_hypothesis(SearchMode::Keyword, Some("hey butler"))
            .with_hypothesis(SearchMode::Keyword, Some("hey butler"))
            .with_hypothesis(SearchMode::Grammar, Some("turn on lights"))
            .with_hypothesis(SearchMode::Grammar, Some("turn off lights"));
        let (mut listener, sink) = listener_with(decoder);

        drive_frames(&mut listener, Instant::now(), 8);

        let commands: Vec<String> = sink
            .events()
            .iter()
            .filter_map(|e| match e {
                SessionEvent::CommandRecognized { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(commands, vec!["turn on lights", "turn off lights"]);
        assert_eq!(listener.state(), ListenerState::Idle);
        assert_eq!(listener.search_mode(), SearchMode::Keyword);
    }
}
