use crate::error::{Error, Result};
use crate::model::pitch::MAX_53TET_STEP;
use crate::model::quantize::{DURATION_GRID, NUM_VELOCITY_BINS};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Everything the vocabulary is derived from.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TokenizerConfig {
    pub max_pitch: u16,
    pub num_vel_bins: u8,
    pub duration_grid: Vec<f64>,
    pub beats_per_bar: u32,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            max_pitch: MAX_53TET_STEP,
            num_vel_bins: NUM_VELOCITY_BINS,
            duration_grid: DURATION_GRID.to_vec(),
            beats_per_bar: 4,
        }
    }
}

impl TokenizerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.duration_grid.is_empty() {
            return Err(Error::InvalidConfig("duration grid is empty".into()));
        }
        if let Some(bad) = self
            .duration_grid
            .iter()
            .find(|d| !d.is_finite() || **d <= 0.0)
        {
            return Err(Error::InvalidConfig(format!(
                "duration grid values must be finite and positive, got {}",
                bad
            )));
        }
        for (i, a) in self.duration_grid.iter().enumerate() {
            if self.duration_grid[..i].contains(a) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate duration grid value {}",
                    a
                )));
            }
        }
        if self.num_vel_bins == 0 {
            return Err(Error::InvalidConfig("num_vel_bins must be at least 1".into()));
        }
        if self.beats_per_bar == 0 {
            return Err(Error::InvalidConfig("beats_per_bar must be at least 1".into()));
        }

        Ok(())
    }
}

/// Settings for rendering chord events back into a MIDI file.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct WriteOptions {
    pub ticks_per_beat: u16,
    pub tempo_bpm: f64,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            ticks_per_beat: 960,
            tempo_bpm: 120.0,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "mpe53_tokenizer",
    about = "Tokenize 53-TET MPE MIDI files for sequence models, and decode them back!"
)]
pub struct Args {
    /// Load the vocabulary (and its config) from a saved vocab.json.
    #[arg(long, global = true)]
    pub vocab: Option<PathBuf>,

    /// Comma separated duration grid in beats, used when no vocab file is given.
    #[arg(long, global = true)]
    pub duration_grid: Option<String>,

    /// Beats per bar for BAR token placement, used when no vocab file is given.
    #[arg(long, global = true)]
    pub beats_per_bar: Option<u32>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print a summary of the token vocabulary.
    Describe,

    /// Tokenize a single MIDI file.
    Encode {
        midi: PathBuf,

        /// Print token distribution statistics.
        #[arg(long, default_value_t = false)]
        stats: bool,

        /// Print token ids instead of token strings.
        #[arg(long, default_value_t = false)]
        ids: bool,

        /// Linear time scale applied to the performance.
        #[arg(long, default_value_t = 1.0)]
        speed: f64,

        /// Maximum tokens to print.
        #[arg(long, default_value_t = 80)]
        max_print: usize,
    },

    /// Decode a token sequence (JSON id array, or whitespace separated tokens) into MIDI.
    Decode {
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        #[arg(long, default_value_t = 960)]
        ticks_per_beat: u16,

        #[arg(long, default_value_t = 120.0)]
        tempo_bpm: f64,
    },

    /// Check the encode/decode round trip for a MIDI file.
    Verify {
        midi: PathBuf,

        /// Write the reconstructed MIDI here.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Tokenize every .mid file in a directory.
    Batch {
        midi_dir: PathBuf,
        output_dir: PathBuf,

        #[arg(long)]
        max_files: Option<usize>,

        /// Worker threads, defaults to one per core.
        #[arg(short, long)]
        jobs: Option<usize>,

        #[arg(long, default_value_t = 1.0)]
        speed: f64,
    },

    /// Save the vocabulary to a JSON file.
    Vocab { output: PathBuf },
}
