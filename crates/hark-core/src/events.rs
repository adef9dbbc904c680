use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status events emitted by the session state machine.
///
/// These are observability output, not control signals: nothing in the
/// processing path consumes them. The default sink renders each event as a
/// human-readable status line.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub enum SessionEvent {
    /// A silence-to-speech transition was observed; an utterance is filling.
    ListeningStarted { timestamp: DateTime<Utc> },

    /// The keyword search matched the wake phrase.
    KeywordDetected {
        phrase: String,
        timestamp: DateTime<Utc>,
    },

    /// A command utterance closed with a final hypothesis.
    CommandRecognized {
        text: String,
        timestamp: DateTime<Utc>,
    },

    /// A command utterance closed without a usable hypothesis.
    CommandMissing { timestamp: DateTime<Utc> },

    /// The command window expired before a command utterance completed.
    CommandTimeout { timestamp: DateTime<Utc> },

    /// Queue depth after a pop exceeded the backlog threshold.
    QueueBacklog {
        depth: usize,
        timestamp: DateTime<Utc>,
    },
}

impl SessionEvent {
    /// Returns the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            SessionEvent::ListeningStarted { timestamp }
            | SessionEvent::KeywordDetected { timestamp, .. }
            | SessionEvent::CommandRecognized { timestamp, .. }
            | SessionEvent::CommandMissing { timestamp }
            | SessionEvent::CommandTimeout { timestamp }
            | SessionEvent::QueueBacklog { timestamp, .. } => *timestamp,
        }
    }

    /// Returns a stable event name for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            SessionEvent::ListeningStarted { .. } => "listening_started",
            SessionEvent::KeywordDetected { .. } => "keyword_detected",
            SessionEvent::CommandRecognized { .. } => "command_recognized",
            SessionEvent::CommandMissing { .. } => "command_missing",
            SessionEvent::CommandTimeout { .. } => "command_timeout",
            SessionEvent::QueueBacklog { .. } => "queue_backlog",
        }
    }
}

/// Destination for session events.
///
/// Implementations must tolerate being called from the session loop's
/// blocking context; `emit` should not block for unbounded time.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: SessionEvent);
}

/// Default sink: renders events as human-readable status lines via `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl LogSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogSink {
    fn emit(&self, event: SessionEvent) {
        match &event {
            SessionEvent::ListeningStarted { .. } => {
                tracing::info!("Listening..");
            }
            SessionEvent::KeywordDetected { phrase, .. } => {
                tracing::info!(%phrase, "Wake phrase detected, awaiting command");
            }
            SessionEvent::CommandRecognized { text, .. } => {
                tracing::info!("    > hypothesis: {}", text);
            }
            SessionEvent::CommandMissing { .. } => {
                tracing::info!("Command utterance produced no result");
            }
            SessionEvent::CommandTimeout { .. } => {
                tracing::info!("Command window timed out");
            }
            SessionEvent::QueueBacklog { depth, .. } => {
                tracing::warn!(depth, "Frame queue backlog");
            }
        }
    }
}
