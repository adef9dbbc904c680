//! Scripted decoder for driving the session state machine in tests.
//!
//! Speech/silence is replayed from a per-frame script, hypotheses are served
//! from per-search queues, and every utterance lifecycle call is recorded so
//! tests can assert strict start/end alternation. Lifecycle calls can be
//! armed to fail, simulating a corrupted decoder.

use std::collections::{HashMap, VecDeque};

use hark_core::error::{HarkError, Result};
use hark_core::types::SearchMode;

use crate::SpeechDecoder;

/// One recorded utterance lifecycle call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleCall {
    Start,
    End,
}

/// Deterministic stand-in for a real acoustic decoder.
#[derive(Debug, Default)]
pub struct ScriptedDecoder {
    script: VecDeque<bool>,
    hypotheses: HashMap<SearchMode, VecDeque<Option<String>>>,
    defined: HashMap<SearchMode, String>,
    mode: Option<SearchMode>,
    speaking: bool,
    utterance_open: bool,
    lifecycle: Vec<LifecycleCall>,
    frames_fed: usize,
    fail_next_start: bool,
    fail_next_end: bool,
}

impl ScriptedDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append per-frame speech flags to the script. Once the script is
    /// exhausted, further frames report silence.
    pub fn with_speech_frames(mut self, flags: impl IntoIterator<Item = bool>) -> Self {
        self.script.extend(flags);
        self
    }

    /// Queue a hypothesis outcome for the next closed utterance in `mode`.
    /// `None` models a decode failure / empty result.
    pub fn with_hypothesis(mut self, mode: SearchMode, hypothesis: Option<&str>) -> Self {
        self.hypotheses
            .entry(mode)
            .or_default()
            .push_back(hypothesis.map(str::to_string));
        self
    }

    /// Arm the next `start_utterance` call to fail.
    pub fn fail_next_start_utterance(&mut self) {
        self.fail_next_start = true;
    }

    /// Arm the next `end_utterance` call to fail.
    pub fn fail_next_end_utterance(&mut self) {
        self.fail_next_end = true;
    }

    /// Every lifecycle call observed so far, in order.
    pub fn lifecycle_calls(&self) -> &[LifecycleCall] {
        &self.lifecycle
    }

    /// Whether an utterance is currently open.
    pub fn utterance_open(&self) -> bool {
        self.utterance_open
    }

    /// Total frames fed via `process_frame`.
    pub fn frames_fed(&self) -> usize {
        self.frames_fed
    }

    /// The phrase or grammar source registered under `mode`, if any.
    pub fn defined_source(&self, mode: SearchMode) -> Option<&str> {
        self.defined.get(&mode).map(String::as_str)
    }
}

impl SpeechDecoder for ScriptedDecoder {
    fn define_keyphrase(&mut self, name: &str, phrase: &str) -> Result<()> {
        let mode: SearchMode = name.parse()?;
        self.defined.insert(mode, phrase.to_string());
        Ok(())
    }

    fn define_grammar(&mut self, name: &str, source: &str) -> Result<()> {
        let mode: SearchMode = name.parse()?;
        self.defined.insert(mode, source.to_string());
        Ok(())
    }

    fn process_frame(
        &mut self,
        _frame: &[i16],
        _do_search: bool,
        _full_utterance: bool,
    ) -> Result<()> {
        self.frames_fed += 1;
        self.speaking = self.script.pop_front().unwrap_or(false);
        Ok(())
    }

    fn in_speech(&self) -> bool {
        self.speaking
    }

    fn start_utterance(&mut self) -> Result<()> {
        if self.fail_next_start {
            self.fail_next_start = false;
            return Err(HarkError::Lifecycle(
                "scripted start_utterance failure".to_string(),
            ));
        }
        if self.utterance_open {
            return Err(HarkError::Lifecycle(
                "start_utterance called with an utterance already open".to_string(),
            ));
        }
        self.utterance_open = true;
        self.lifecycle.push(LifecycleCall::Start);
        Ok(())
    }

    fn end_utterance(&mut self) -> Result<()> {
        if self.fail_next_end {
            self.fail_next_end = false;
            return Err(HarkError::Lifecycle(
                "scripted end_utterance failure".to_string(),
            ));
        }
        if !self.utterance_open {
            return Err(HarkError::Lifecycle(
                "end_utterance called with no open utterance".to_string(),
            ));
        }
        self.utterance_open = false;
        self.lifecycle.push(LifecycleCall::End);
        Ok(())
    }

    fn search_mode(&self) -> SearchMode {
        self.mode.unwrap_or(SearchMode::Keyword)
    }

    fn set_search_mode(&mut self, mode: SearchMode) -> Result<()> {
        self.mode = Some(mode);
        Ok(())
    }

    fn hypothesis(&mut self) -> Result<Option<String>> {
        let mode = self.search_mode();
        Ok(self
            .hypotheses
            .get_mut(&mode)
            .and_then(VecDeque::pop_front)
            .flatten())
    }
}
