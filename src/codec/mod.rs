use crate::error::Result;
use crate::midi_importer::import_midi_file;
use crate::model::config::TokenizerConfig;
use crate::model::song::ChordEvent;
use crate::model::token::Token;
use crate::model::vocab::Vocabulary;
use std::path::Path;

pub mod decoder;
pub mod encoder;

pub use decoder::{DEFAULT_DURATION_BEATS, DEFAULT_VELOCITY, decode, decode_strs};
pub use encoder::{MAX_CHORD_NOTES, encode};

/// A vocabulary plus the encode/decode operations that depend on its config.
///
/// Built once and shared read-only; every method takes `&self`.
#[derive(Debug, Clone, PartialEq)]
pub struct Tokenizer {
    vocab: Vocabulary,
}

impl Tokenizer {
    pub fn new(config: TokenizerConfig) -> Result<Self> {
        Ok(Self {
            vocab: Vocabulary::new(config)?,
        })
    }

    pub fn from_vocab(vocab: Vocabulary) -> Self {
        Self { vocab }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Vocabulary::load(path).map(Self::from_vocab)
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn config(&self) -> &TokenizerConfig {
        self.vocab.config()
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    pub fn encode_chords(&self, chords: &[ChordEvent], add_boundary: bool) -> Vec<Token> {
        encode(chords, self.config(), add_boundary)
    }

    /// Parses, groups and encodes a file. A file with no notes gives an empty sequence.
    pub fn encode_file<P: AsRef<Path>>(
        &self,
        path: P,
        speed: f64,
        add_boundary: bool,
    ) -> Result<Vec<Token>> {
        let chords = import_midi_file(path, speed)?;
        Ok(self.encode_chords(&chords, add_boundary))
    }

    pub fn encode_ids(&self, tokens: &[Token]) -> Vec<u32> {
        self.vocab.encode_ids(tokens)
    }

    pub fn decode_ids(&self, ids: &[u32]) -> Vec<Token> {
        self.vocab.decode_ids(ids)
    }

    pub fn decode(&self, tokens: &[Token]) -> Vec<ChordEvent> {
        decode(tokens, self.config())
    }

    pub fn decode_strs<S: AsRef<str>>(&self, tokens: &[S]) -> Vec<ChordEvent> {
        decode_strs(tokens, self.config())
    }

    /// Decodes ids straight to chord events.
    pub fn decode_id_sequence(&self, ids: &[u32]) -> Vec<ChordEvent> {
        self.decode(&self.decode_ids(ids))
    }

    /// Truncates or right-pads with `<pad>` to exactly `max_length` ids.
    pub fn pad_sequence(&self, ids: &[u32], max_length: usize) -> Vec<u32> {
        let mut padded: Vec<u32> = ids.iter().copied().take(max_length).collect();
        padded.resize(max_length, self.vocab.pad_id());
        padded
    }

    /// Shifted input/target pair for next-token training over `block_size` positions.
    pub fn training_pair(&self, ids: &[u32], block_size: usize) -> (Vec<u32>, Vec<u32>) {
        let padded = self.pad_sequence(ids, block_size + 1);
        let x = padded[..block_size].to_vec();
        let y = padded[1..].to_vec();
        (x, y)
    }
}
