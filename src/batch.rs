//! Corpus level tokenization, per-sequence statistics and round-trip checks.

use crate::codec::Tokenizer;
use crate::error::{Error, Result};
use crate::midi_importer::import_midi_file;
use crate::midi_writer::write_midi_file;
use crate::model::config::WriteOptions;
use crate::model::token::{Structural, Token};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use walkdir::WalkDir;

const PROGRESS_EVERY: usize = 1000;
const TOP_TOKENS: usize = 20;

pub const VOCAB_FILE: &str = "vocab.json";
pub const SEQUENCES_FILE: &str = "tokenized_sequences.json";
pub const STATS_FILE: &str = "stats.json";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchOptions {
    pub max_files: Option<usize>,
    /// Worker threads; `None` uses one per core.
    pub jobs: Option<usize>,
    pub speed: f64,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_files: None,
            jobs: None,
            speed: 1.0,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct TokenizedSequence {
    pub file: String,
    pub ids: Vec<u32>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DatasetStats {
    pub total_files: usize,
    pub successful: usize,
    pub failed: usize,
    pub total_tokens: usize,
    pub unique_tokens_used: usize,
    pub vocab_size: usize,
    pub seq_length_min: usize,
    pub seq_length_max: usize,
    pub seq_length_mean: f64,
    pub top_20_tokens: Vec<(String, usize)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub sequences: Vec<TokenizedSequence>,
    pub stats: DatasetStats,
}

/// `*.mid` files directly inside `dir`, sorted by path.
pub fn list_midi_files<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "mid"))
        .collect();

    files.sort();
    Ok(files)
}

/// Tokenizes every MIDI file in `midi_dir` and writes the vocabulary, the id
/// sequences and dataset statistics to `output_dir`.
///
/// Files that fail to parse are counted and skipped. Files without notes are
/// neither successful nor failed.
pub fn tokenize_corpus<P: AsRef<Path>, Q: AsRef<Path>>(
    midi_dir: P,
    output_dir: Q,
    tokenizer: &Tokenizer,
    options: &BatchOptions,
) -> Result<BatchReport> {
    let output_dir = output_dir.as_ref();
    fs::create_dir_all(output_dir).map_err(|e| Error::io(output_dir, e))?;

    let mut files = list_midi_files(midi_dir.as_ref())?;
    if let Some(max) = options.max_files {
        files.truncate(max);
    }

    info!("Tokenizing {} files..!", files.len());

    let processed = AtomicUsize::new(0);
    let failures = AtomicUsize::new(0);
    let total = files.len();

    let work = || -> Vec<Option<Vec<Token>>> {
        files
            .par_iter()
            .map(|path| {
                let result = tokenizer.encode_file(path, options.speed, true);
                let tokens = match result {
                    Ok(tokens) => Some(tokens),
                    Err(e) => {
                        failures.fetch_add(1, Ordering::Relaxed);
                        warn!("Failed to tokenize {}: {}", path.display(), e);
                        None
                    }
                };

                let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
                if done % PROGRESS_EVERY == 0 {
                    info!(
                        "  Processed {}/{} ({} failed)",
                        done,
                        total,
                        failures.load(Ordering::Relaxed)
                    );
                }

                tokens
            })
            .collect()
    };

    let results = match options.jobs {
        Some(jobs) => match rayon::ThreadPoolBuilder::new()
            .num_threads(jobs.max(1))
            .build()
        {
            Ok(pool) => pool.install(work),
            Err(e) => {
                warn!("Could not build a {} thread pool ({}), using the global pool", jobs, e);
                work()
            }
        },
        None => work(),
    };

    let mut sequences: Vec<TokenizedSequence> = Vec::new();
    let mut counter = TokenCounter::default();
    let mut failed = 0;

    for (path, tokens) in files.iter().zip(results) {
        let Some(tokens) = tokens else {
            failed += 1;
            continue;
        };
        if tokens.is_empty() {
            debug!("No notes in {}, skipping", path.display());
            continue;
        }

        counter.extend(&tokens);
        sequences.push(TokenizedSequence {
            file: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            ids: tokenizer.encode_ids(&tokens),
        });
    }

    info!("Done. {} sequences, {} failures", sequences.len(), failed);

    let lengths: Vec<usize> = sequences.iter().map(|s| s.ids.len()).collect();
    let seq_length_mean = if lengths.is_empty() {
        0.0
    } else {
        let mean = lengths.iter().sum::<usize>() as f64 / lengths.len() as f64;
        (mean * 10.0).round_ties_even() / 10.0
    };

    let stats = DatasetStats {
        total_files: files.len(),
        successful: sequences.len(),
        failed,
        total_tokens: counter.total,
        unique_tokens_used: counter.unique(),
        vocab_size: tokenizer.vocab_size(),
        seq_length_min: lengths.iter().copied().min().unwrap_or(0),
        seq_length_max: lengths.iter().copied().max().unwrap_or(0),
        seq_length_mean,
        top_20_tokens: counter.most_common(TOP_TOKENS),
    };

    tokenizer.vocab().save(output_dir.join(VOCAB_FILE))?;
    write_json(&output_dir.join(STATS_FILE), &serde_json::to_string_pretty(&stats)?)?;
    write_json(&output_dir.join(SEQUENCES_FILE), &serde_json::to_string(&sequences)?)?;

    info!(
        "Saved {}, {} ({} sequences) and {} to {}",
        VOCAB_FILE,
        SEQUENCES_FILE,
        sequences.len(),
        STATS_FILE,
        output_dir.display()
    );

    Ok(BatchReport { sequences, stats })
}

fn write_json(path: &Path, json: &str) -> Result<()> {
    fs::write(path, json).map_err(|e| Error::io(path, e))
}

/// Counts tokens by their string form, remembering first appearance for
/// stable ordering of ties.
#[derive(Debug, Default)]
struct TokenCounter {
    total: usize,
    counts: HashMap<String, (usize, usize)>,
}

impl TokenCounter {
    fn extend(&mut self, tokens: &[Token]) {
        for token in tokens {
            let next = self.counts.len();
            let entry = self.counts.entry(token.to_string()).or_insert((0, next));
            entry.0 += 1;
            self.total += 1;
        }
    }

    fn unique(&self) -> usize {
        self.counts.len()
    }

    fn most_common(&self, n: usize) -> Vec<(String, usize)> {
        let mut ranked: Vec<(&String, &(usize, usize))> = self.counts.iter().collect();
        ranked.sort_by(|a, b| b.1.0.cmp(&a.1.0).then(a.1.1.cmp(&b.1.1)));
        ranked
            .into_iter()
            .take(n)
            .map(|(token, (count, _))| (token.clone(), *count))
            .collect()
    }

    fn filtered(&self, keep: impl Fn(&str) -> bool) -> Vec<(String, usize)> {
        let mut ranked: Vec<(String, usize, usize)> = self
            .counts
            .iter()
            .filter(|(token, _)| keep(token))
            .map(|(token, (count, first))| (token.clone(), *count, *first))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
        ranked.into_iter().map(|(t, c, _)| (t, c)).collect()
    }
}

/// Distribution summary of a single token sequence.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TokenStats {
    pub total: usize,
    pub unique: usize,
    pub chords: usize,
    pub bars: usize,
    pub durations: Vec<(String, usize)>,
    pub velocities: Vec<(String, usize)>,
    pub pitch_range: Option<(u16, u16)>,
    pub unique_pitches: usize,
}

pub fn token_stats(tokens: &[Token]) -> TokenStats {
    let mut counter = TokenCounter::default();
    counter.extend(tokens);

    let mut pitches: Vec<u16> = tokens
        .iter()
        .filter_map(|t| match t {
            Token::Pitch(p) => Some(*p),
            _ => None,
        })
        .collect();
    pitches.sort_unstable();
    pitches.dedup();

    let count_of = |s: Structural| tokens.iter().filter(|t| **t == Token::Structural(s)).count();

    TokenStats {
        total: counter.total,
        unique: counter.unique(),
        chords: count_of(Structural::ChordStart),
        bars: count_of(Structural::Bar),
        durations: counter.filtered(|t| t.starts_with("DUR_")),
        velocities: counter.filtered(|t| t.starts_with("V_")),
        pitch_range: pitches.first().zip(pitches.last()).map(|(lo, hi)| (*lo, *hi)),
        unique_pitches: pitches.len(),
    }
}

impl fmt::Display for TokenStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total tokens: {}", self.total)?;
        writeln!(f, "Unique tokens used: {}", self.unique)?;
        writeln!(f, "Chords: {}", self.chords)?;
        writeln!(f, "Bars: {}", self.bars)?;
        writeln!(f, "\nDuration distribution:")?;
        for (token, count) in self.durations.iter() {
            writeln!(f, "  {}: {}", token, count)?;
        }
        writeln!(f, "\nVelocity distribution:")?;
        for (token, count) in self.velocities.iter() {
            writeln!(f, "  {}: {}", token, count)?;
        }
        match self.pitch_range {
            Some((lo, hi)) => write!(
                f,
                "\nPitch range: P_{} .. P_{} ({} unique)",
                lo, hi, self.unique_pitches
            ),
            None => write!(f, "\nPitch range: none"),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RoundtripReport {
    pub file: String,
    pub original_chords: usize,
    pub reconstructed_chords: usize,
    pub token_count: usize,
    #[serde(rename = "match")]
    pub matches: bool,
    /// Percentage of compared chords whose sorted pitch sets agree, to one
    /// decimal. `None` when either side has no chords.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch_accuracy: Option<f64>,
}

impl fmt::Display for RoundtripReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Roundtrip: {}", self.file)?;
        writeln!(f, "  Original chords:       {}", self.original_chords)?;
        writeln!(f, "  Token sequence length: {}", self.token_count)?;
        writeln!(f, "  Reconstructed chords:  {}", self.reconstructed_chords)?;
        match self.pitch_accuracy {
            Some(acc) => write!(f, "  Pitch accuracy:        {:.1}%", acc),
            None => write!(f, "  Pitch accuracy:        n/a"),
        }
    }
}

/// Parses, encodes, maps through ids, decodes, and compares against the
/// parsed original. Writes the reconstruction when `output` is given and
/// something was reconstructed.
pub fn verify_roundtrip<P: AsRef<Path>>(
    tokenizer: &Tokenizer,
    midi_path: P,
    output: Option<&Path>,
) -> Result<RoundtripReport> {
    let midi_path = midi_path.as_ref();
    let original = import_midi_file(midi_path, 1.0)?;

    let tokens = tokenizer.encode_chords(&original, true);
    let ids = tokenizer.encode_ids(&tokens);
    let reconstructed = tokenizer.decode_id_sequence(&ids);

    let compared = original.len().min(reconstructed.len());
    let pitch_accuracy = (compared > 0).then(|| {
        let hits = original
            .iter()
            .zip(reconstructed.iter())
            .filter(|(a, b)| a.pitch_set() == b.pitch_set())
            .count();
        let accuracy = hits as f64 / compared as f64 * 100.0;
        (accuracy * 10.0).round_ties_even() / 10.0
    });

    if let Some(path) = output
        && !reconstructed.is_empty()
    {
        write_midi_file(&reconstructed, path, &WriteOptions::default())?;
        info!("Wrote reconstructed MIDI to {}", path.display());
    }

    Ok(RoundtripReport {
        file: midi_path.display().to_string(),
        original_chords: original.len(),
        reconstructed_chords: reconstructed.len(),
        token_count: tokens.len(),
        matches: original.len() == reconstructed.len(),
        pitch_accuracy,
    })
}
