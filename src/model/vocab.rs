use crate::error::{Error, Result};
use crate::model::config::TokenizerConfig;
use crate::model::token::{Special, Structural, Token};
use log::debug;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Fixed bijection between tokens and contiguous ids.
///
/// Ids are handed out in category order (special, structural, duration, pitch,
/// velocity), so two vocabularies built from the same config are identical.
#[derive(Debug, Clone, PartialEq)]
pub struct Vocabulary {
    config: TokenizerConfig,
    tokens: Vec<Token>,
    token_to_id: HashMap<String, u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
struct VocabFileConfig {
    #[serde(flatten)]
    tokenizer: TokenizerConfig,
    vocab_size: usize,
}

#[derive(Serialize)]
struct VocabFileOut<'a> {
    token_to_id: IdOrdered<'a>,
    config: VocabFileConfig,
}

#[derive(Deserialize)]
struct VocabFileIn {
    token_to_id: HashMap<String, u32>,
    config: VocabFileConfig,
}

/// Serializes the mapping in id order so saved files are byte-stable.
struct IdOrdered<'a>(&'a [Token]);

impl Serialize for IdOrdered<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (id, token) in self.0.iter().enumerate() {
            map.serialize_entry(&token.to_string(), &(id as u32))?;
        }
        map.end()
    }
}

impl Vocabulary {
    pub fn new(config: TokenizerConfig) -> Result<Self> {
        config.validate()?;

        let mut tokens: Vec<Token> = Vec::with_capacity(
            Special::ALL.len()
                + Structural::ALL.len()
                + config.duration_grid.len()
                + config.max_pitch as usize
                + 1
                + config.num_vel_bins as usize,
        );
        tokens.extend(Special::ALL.map(Token::Special));
        tokens.extend(Structural::ALL.map(Token::Structural));
        tokens.extend(config.duration_grid.iter().copied().map(Token::Duration));
        tokens.extend((0..=config.max_pitch).map(Token::Pitch));
        tokens.extend((1..=config.num_vel_bins).map(Token::Velocity));

        let mut token_to_id = HashMap::with_capacity(tokens.len());
        for (id, token) in tokens.iter().enumerate() {
            let name = token.to_string();
            if token_to_id.insert(name.clone(), id as u32).is_some() {
                return Err(Error::InvalidConfig(format!("token '{}' collides", name)));
            }
        }

        debug!("Built vocabulary with {} tokens", tokens.len());

        Ok(Self {
            config,
            tokens,
            token_to_id,
        })
    }

    pub fn config(&self) -> &TokenizerConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn pad_id(&self) -> u32 {
        0
    }

    pub fn token_to_id(&self) -> &HashMap<String, u32> {
        &self.token_to_id
    }

    /// Tokens in id order.
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn id_of(&self, token: &Token) -> Option<u32> {
        self.id_of_str(&token.to_string())
    }

    pub fn id_of_str(&self, token: &str) -> Option<u32> {
        self.token_to_id.get(token).copied()
    }

    pub fn token(&self, id: u32) -> Option<Token> {
        self.tokens.get(id as usize).copied()
    }

    /// Maps tokens to ids, substituting `<pad>` for anything the vocabulary lacks.
    pub fn encode_ids(&self, tokens: &[Token]) -> Vec<u32> {
        tokens
            .iter()
            .map(|token| {
                self.id_of(token).unwrap_or_else(|| {
                    debug!("Token {} is not in the vocabulary, using <pad>", token);
                    self.pad_id()
                })
            })
            .collect()
    }

    /// Maps ids to tokens, substituting `<pad>` for out of range ids.
    pub fn decode_ids(&self, ids: &[u32]) -> Vec<Token> {
        ids.iter()
            .map(|&id| self.token(id).unwrap_or(Token::PAD))
            .collect()
    }

    pub fn to_json_string(&self) -> Result<String> {
        let file = VocabFileOut {
            token_to_id: IdOrdered(&self.tokens),
            config: VocabFileConfig {
                tokenizer: self.config.clone(),
                vocab_size: self.len(),
            },
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    /// Rebuilds a vocabulary from its saved form, checking the stored mapping
    /// against the one the stored config produces.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: VocabFileIn = serde_json::from_str(json)?;
        let vocab = Vocabulary::new(file.config.tokenizer)?;

        if file.config.vocab_size != vocab.len() || file.token_to_id.len() != vocab.len() {
            return Err(Error::InvalidConfig(format!(
                "stored vocab_size {} ({} entries) does not match the {} tokens its config builds",
                file.config.vocab_size,
                file.token_to_id.len(),
                vocab.len()
            )));
        }

        for (token, &found) in file.token_to_id.iter() {
            let expected = vocab.id_of_str(token);
            if expected != Some(found) {
                return Err(Error::VocabularyMismatch {
                    token: token.clone(),
                    expected: expected.unwrap_or(u32::MAX),
                    found,
                });
            }
        }

        Ok(vocab)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = self.to_json_string()?;
        fs::write(path.as_ref(), json).map_err(|e| Error::io(path.as_ref(), e))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path.as_ref()).map_err(|e| Error::io(path.as_ref(), e))?;
        Self::from_json_str(&json)
    }

    /// Human readable summary of the vocabulary layout.
    pub fn describe(&self) -> String {
        let grid = &self.config.duration_grid;
        let n_special = Special::ALL.len();
        let n_duration = grid.len();
        let n_pitch = self.config.max_pitch as usize + 1;
        let n_velocity = self.config.num_vel_bins as usize;

        let first_dur = grid.first().map(|d| Token::Duration(*d).to_string()).unwrap_or_default();
        let last_dur = grid.last().map(|d| Token::Duration(*d).to_string()).unwrap_or_default();

        let rule = "=".repeat(60);
        let mut out = String::new();
        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out, "MPE 53-TET Tokenizer: Vocabulary Summary");
        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out, "  Total vocab size:   {}", self.len());
        let _ = writeln!(out, "  Special tokens:     {}  (IDs 0-{})", n_special, n_special - 1);
        let _ = writeln!(
            out,
            "  Structural tokens:  {}  ({})",
            Structural::ALL.len(),
            Structural::ALL.map(|s| s.as_str()).join(", ")
        );
        let _ = writeln!(out, "  Duration tokens:    {}  ({} .. {})", n_duration, first_dur, last_dur);
        let _ = writeln!(out, "  Pitch tokens:       {}  (P_0 .. P_{})", n_pitch, self.config.max_pitch);
        let _ = writeln!(out, "  Velocity tokens:    {}  (V_1 .. V_{})", n_velocity, n_velocity);
        let _ = writeln!(out, "  Beats per bar:      {}", self.config.beats_per_bar);
        let _ = write!(out, "{}", rule);
        out
    }
}
