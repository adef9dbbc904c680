//! Vosk-backed speech decoder.
//!
//! When compiled with the `vosk` feature, binds the Vosk engine: the keyword
//! search is a grammar-constrained recognizer over the wake phrase, the
//! grammar search a recognizer over the command phrases, and switching the
//! active search swaps recognizers. Without the feature, `new` returns an
//! error so callers can degrade at startup.
//!
//! Vosk runs its own endpointing, so the voice-activity flag tracks whether
//! the active recognizer is mid-utterance with a non-empty partial result.

#[cfg(feature = "vosk")]
use std::collections::HashMap;
#[cfg(feature = "vosk")]
use std::path::Path;

use hark_core::error::{HarkError, Result};
use hark_core::types::SearchMode;

use crate::SpeechDecoder;

/// Configuration for the Vosk decoder.
#[derive(Debug, Clone)]
pub struct VoskDecoderConfig {
    /// Path to the Vosk acoustic model directory.
    pub model_path: String,
    /// Sample rate of the incoming PCM in Hz.
    pub sample_rate: u32,
}

impl Default for VoskDecoderConfig {
    fn default() -> Self {
        Self {
            model_path: String::new(),
            sample_rate: 16000,
        }
    }
}

/// Split a grammar definition into command phrases.
///
/// One phrase per line; blank lines and `#` comments are skipped.
pub fn parse_grammar_phrases(source: &str) -> Vec<String> {
    source
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Speech decoder backed by the Vosk engine.
#[cfg_attr(not(feature = "vosk"), derive(Debug))]
pub struct VoskDecoder {
    config: VoskDecoderConfig,
    mode: SearchMode,
    // The stub impl never reads this; the real impl does.
    #[cfg_attr(not(feature = "vosk"), allow(dead_code))]
    utterance_open: bool,
    speaking: bool,
    #[cfg(feature = "vosk")]
    model: vosk::Model,
    #[cfg(feature = "vosk")]
    searches: HashMap<SearchMode, vosk::Recognizer>,
    #[cfg(feature = "vosk")]
    pending: Option<String>,
}

impl VoskDecoder {
    /// Load the Vosk acoustic model from the given configuration.
    ///
    /// # Errors
    /// Returns `HarkError::Decoder` if the model directory is missing or the
    /// model cannot be loaded.
    #[cfg(feature = "vosk")]
    pub fn new(config: VoskDecoderConfig) -> Result<Self> {
        if !Path::new(&config.model_path).exists() {
            return Err(HarkError::Decoder(format!(
                "Vosk model not found: {}",
                config.model_path
            )));
        }

        tracing::info!(model = %config.model_path, "Loading Vosk acoustic model");
        tracing::info!("This may take a while depending on the size of the model");

        let model = vosk::Model::new(config.model_path.as_str()).ok_or_else(|| {
            HarkError::Decoder(format!(
                "Failed to load Vosk model from {}",
                config.model_path
            ))
        })?;

        Ok(Self {
            config,
            mode: SearchMode::Keyword,
            utterance_open: false,
            speaking: false,
            model,
            searches: HashMap::new(),
            pending: None,
        })
    }

    /// Stub constructor used when the crate is built without the `vosk`
    /// feature. Always returns an error.
    #[cfg(not(feature = "vosk"))]
    pub fn new(_config: VoskDecoderConfig) -> Result<Self> {
        Err(HarkError::Decoder(
            "hark-decoder was built without the `vosk` feature; no speech backend available"
                .to_string(),
        ))
    }

    /// Get a reference to the decoder configuration.
    pub fn config(&self) -> &VoskDecoderConfig {
        &self.config
    }

    #[cfg(feature = "vosk")]
    fn build_search(&self, phrases: &[String]) -> Result<vosk::Recognizer> {
        let mut grammar: Vec<&str> = phrases.iter().map(String::as_str).collect();
        // "[unk]" lets the recognizer reject out-of-grammar speech instead of
        // force-matching the closest phrase.
        grammar.push("[unk]");
        vosk::Recognizer::new_with_grammar(
            &self.model,
            self.config.sample_rate as f32,
            &grammar,
        )
        .ok_or_else(|| HarkError::Decoder("Failed to create Vosk recognizer".to_string()))
    }
}

#[cfg(feature = "vosk")]
impl SpeechDecoder for VoskDecoder {
    fn define_keyphrase(&mut self, name: &str, phrase: &str) -> Result<()> {
        let mode: SearchMode = name.parse()?;
        let recognizer = self.build_search(&[phrase.to_string()])?;
        self.searches.insert(mode, recognizer);
        tracing::debug!(search = name, %phrase, "Keyphrase search defined");
        Ok(())
    }

    fn define_grammar(&mut self, name: &str, source: &str) -> Result<()> {
        let mode: SearchMode = name.parse()?;
        let phrases = parse_grammar_phrases(source);
        if phrases.is_empty() {
            return Err(HarkError::Decoder(format!(
                "Grammar '{}' defines no phrases",
                name
            )));
        }
        let recognizer = self.build_search(&phrases)?;
        self.searches.insert(mode, recognizer);
        tracing::debug!(search = name, phrases = phrases.len(), "Grammar search defined");
        Ok(())
    }

    fn process_frame(
        &mut self,
        frame: &[i16],
        _do_search: bool,
        _full_utterance: bool,
    ) -> Result<()> {
        // Vosk has no buffer-only mode; both flags are accepted for contract
        // parity and recognition always runs.
        let recognizer = self.searches.get_mut(&self.mode).ok_or_else(|| {
            HarkError::Decoder(format!("Search '{}' is not defined", self.mode))
        })?;

        match recognizer.accept_waveform(frame) {
            vosk::DecodingState::Running => {
                self.speaking = !recognizer.partial_result().partial.trim().is_empty();
            }
            vosk::DecodingState::Finalized => {
                // Endpoint reached: bank the result for hypothesis retrieval.
                let text = recognizer
                    .result()
                    .single()
                    .map(|r| r.text.to_string())
                    .filter(|t| !t.trim().is_empty() && t != "[unk]");
                if text.is_some() {
                    self.pending = text;
                }
                self.speaking = false;
            }
            vosk::DecodingState::Failed => {
                return Err(HarkError::Decoder(
                    "Vosk failed to accept waveform".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn in_speech(&self) -> bool {
        self.speaking
    }

    fn start_utterance(&mut self) -> Result<()> {
        if self.utterance_open {
            return Err(HarkError::Lifecycle(
                "start_utterance called with an utterance already open".to_string(),
            ));
        }
        self.utterance_open = true;
        Ok(())
    }

    fn end_utterance(&mut self) -> Result<()> {
        if !self.utterance_open {
            return Err(HarkError::Lifecycle(
                "end_utterance called with no open utterance".to_string(),
            ));
        }
        self.utterance_open = false;
        self.speaking = false;

        if let Some(recognizer) = self.searches.get_mut(&self.mode) {
            if self.pending.is_none() {
                self.pending = recognizer
                    .final_result()
                    .single()
                    .map(|r| r.text.to_string())
                    .filter(|t| !t.trim().is_empty() && t != "[unk]");
            }
            recognizer.reset();
        }
        Ok(())
    }

    fn search_mode(&self) -> SearchMode {
        self.mode
    }

    fn set_search_mode(&mut self, mode: SearchMode) -> Result<()> {
        let recognizer = self.searches.get_mut(&mode).ok_or_else(|| {
            HarkError::Decoder(format!("Search '{}' is not defined", mode))
        })?;
        // Drop any audio the inactive recognizer buffered while idle.
        recognizer.reset();
        self.mode = mode;
        tracing::debug!(search = %mode, "Active search switched");
        Ok(())
    }

    fn hypothesis(&mut self) -> Result<Option<String>> {
        Ok(self.pending.take())
    }
}

// =============================================================================
// Stub without the `vosk` feature
// =============================================================================

#[cfg(not(feature = "vosk"))]
impl SpeechDecoder for VoskDecoder {
    fn define_keyphrase(&mut self, _name: &str, _phrase: &str) -> Result<()> {
        Err(unavailable())
    }

    fn define_grammar(&mut self, _name: &str, _source: &str) -> Result<()> {
        Err(unavailable())
    }

    fn process_frame(
        &mut self,
        _frame: &[i16],
        _do_search: bool,
        _full_utterance: bool,
    ) -> Result<()> {
        Err(unavailable())
    }

    fn in_speech(&self) -> bool {
        self.speaking
    }

    fn start_utterance(&mut self) -> Result<()> {
        Err(unavailable())
    }

    fn end_utterance(&mut self) -> Result<()> {
        Err(unavailable())
    }

    fn search_mode(&self) -> SearchMode {
        self.mode
    }

    fn set_search_mode(&mut self, _mode: SearchMode) -> Result<()> {
        Err(unavailable())
    }

    fn hypothesis(&mut self) -> Result<Option<String>> {
        Err(unavailable())
    }
}

#[cfg(not(feature = "vosk"))]
fn unavailable() -> HarkError {
    HarkError::Decoder("hark-decoder was built without the `vosk` feature".to_string())
}
