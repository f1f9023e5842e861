use std::path::PathBuf;

/// Errors surfaced by the tokenizer library.
///
/// Lossy numeric input (out of range pitches, velocities, malformed token
/// streams) never produces an error; it is clamped or skipped instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse MIDI: {0}")]
    MidiParse(String),

    #[error("Unsupported MIDI timing: {0}")]
    UnsupportedTiming(String),

    #[error("Speed multiplier must be finite and positive, got {0}")]
    InvalidSpeed(f64),

    #[error("Invalid tokenizer config: {0}")]
    InvalidConfig(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Vocabulary mismatch for '{token}': expected id {expected}, found {found}")]
    VocabularyMismatch {
        token: String,
        expected: u32,
        found: u32,
    },

    #[error("Failed to write MIDI: {0}")]
    MidiWrite(#[source] std::io::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
