use anyhow::Result;
use clap::Parser;
use log::{debug, info, warn};
use mpe53_tokenizer::{
    Args, BatchOptions, Command, TokenInput, Tokenizer, TokenizerConfig, WriteOptions,
    format_tokens, parse_duration_grid, read_token_input, token_stats, tokenize_corpus,
    verify_roundtrip, write_midi_file,
};

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let tokenizer = build_tokenizer(&args)?;

    debug!(
        "Tokenizer ready with {} tokens, {} beats per bar..!",
        tokenizer.vocab_size(),
        tokenizer.config().beats_per_bar
    );

    match args.command {
        Command::Describe => {
            println!("{}", tokenizer.vocab().describe());
        }
        Command::Encode {
            midi,
            stats,
            ids,
            speed,
            max_print,
        } => {
            info!("Encoding MIDI file: '{}'...", midi.display());
            let tokens = tokenizer.encode_file(&midi, speed, true)?;

            if tokens.is_empty() {
                warn!("No notes found in '{}'..!", midi.display());
                return Ok(());
            }

            if ids {
                let ids = tokenizer.encode_ids(&tokens);
                let shown: Vec<String> = ids.iter().take(max_print).map(|i| i.to_string()).collect();
                println!("{}", shown.join(" "));
                if ids.len() > max_print {
                    println!("... ({} more)", ids.len() - max_print);
                }
            } else {
                println!("{}", format_tokens(&tokens, max_print));
            }

            if stats {
                println!();
                println!("{}", token_stats(&tokens));
            }
        }
        Command::Decode {
            input,
            output,
            ticks_per_beat,
            tempo_bpm,
        } => {
            info!("Decoding '{}'...", input.display());
            let chords = match read_token_input(&input)? {
                TokenInput::Ids(ids) => tokenizer.decode_id_sequence(&ids),
                TokenInput::Tokens(tokens) => tokenizer.decode_strs(&tokens),
            };

            if chords.is_empty() {
                warn!("Token sequence decoded to no chords, writing an empty song..!");
            }

            let options = WriteOptions {
                ticks_per_beat,
                tempo_bpm,
            };
            write_midi_file(&chords, &output, &options)?;
            info!("Wrote {} chords to '{}'..!", chords.len(), output.display());
        }
        Command::Verify { midi, output } => {
            let report = verify_roundtrip(&tokenizer, &midi, output.as_deref())?;
            println!("{}", report);
        }
        Command::Batch {
            midi_dir,
            output_dir,
            max_files,
            jobs,
            speed,
        } => {
            let options = BatchOptions {
                max_files,
                jobs,
                speed,
            };
            let report = tokenize_corpus(&midi_dir, &output_dir, &tokenizer, &options)?;
            info!(
                "{} of {} files tokenized, {} failed, {} tokens total..!",
                report.stats.successful,
                report.stats.total_files,
                report.stats.failed,
                report.stats.total_tokens
            );
        }
        Command::Vocab { output } => {
            tokenizer.vocab().save(&output)?;
            info!(
                "Saved {} token vocabulary to '{}'..!",
                tokenizer.vocab_size(),
                output.display()
            );
        }
    }

    Ok(())
}

/// A saved vocabulary wins over the config overrides.
fn build_tokenizer(args: &Args) -> Result<Tokenizer> {
    if let Some(path) = args.vocab.as_ref() {
        if args.duration_grid.is_some() || args.beats_per_bar.is_some() {
            warn!("Ignoring --duration-grid/--beats-per-bar, the vocab file carries its own config..!");
        }
        info!("Loading vocabulary: '{}'...", path.display());
        return Ok(Tokenizer::load(path)?);
    }

    let mut config = TokenizerConfig::default();
    if let Some(grid) = args.duration_grid.as_deref() {
        config.duration_grid = parse_duration_grid(grid)?;
    }
    if let Some(beats) = args.beats_per_bar {
        config.beats_per_bar = beats;
    }

    Ok(Tokenizer::new(config)?)
}
