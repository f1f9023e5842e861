use crate::error::{Error, Result};
use crate::model::token::Token;
use log::info;
use std::fs;
use std::path::Path;

/// Parses `"0.5,1,2.0"` into a duration grid. Whitespace around values is ignored.
pub fn parse_duration_grid(input: &str) -> Result<Vec<f64>> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>().map_err(|_| {
                Error::InvalidConfig(format!("'{}' is not a valid duration in beats", s))
            })
        })
        .collect()
}

/// Space separated tokens, cut off after `max` with a count of the remainder.
pub fn format_tokens(tokens: &[Token], max: usize) -> String {
    let mut line = tokens
        .iter()
        .take(max)
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(" ");

    if tokens.len() > max {
        line.push_str(&format!(" ... ({} more)", tokens.len() - max));
    }

    line
}

/// What a `decode` input file contained.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenInput {
    Ids(Vec<u32>),
    Tokens(Vec<String>),
}

/// A JSON array of ids, or whitespace separated token strings.
pub fn parse_token_input(text: &str) -> TokenInput {
    let trimmed = text.trim_start();
    if trimmed.starts_with('[')
        && let Ok(ids) = serde_json::from_str::<Vec<u32>>(trimmed)
    {
        return TokenInput::Ids(ids);
    }

    TokenInput::Tokens(text.split_whitespace().map(String::from).collect())
}

pub fn read_token_input<P: AsRef<Path>>(path: P) -> Result<TokenInput> {
    let text = fs::read_to_string(path.as_ref()).map_err(|e| Error::io(path.as_ref(), e))?;
    let input = parse_token_input(&text);

    match &input {
        TokenInput::Ids(ids) => info!("Read {} token ids..!", ids.len()),
        TokenInput::Tokens(tokens) => info!("Read {} token strings..!", tokens.len()),
    }

    Ok(input)
}
