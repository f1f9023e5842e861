use std::fmt;

pub const PAD_TOKEN: &str = "<pad>";
pub const START_TOKEN: &str = "<start>";
pub const END_TOKEN: &str = "<end>";
pub const SEP_TOKEN: &str = "<sep>";

pub const CHORD_START_TOKEN: &str = "CHORD_START";
pub const CHORD_END_TOKEN: &str = "CHORD_END";
pub const BAR_TOKEN: &str = "BAR";
pub const REST_TOKEN: &str = "REST";

const DURATION_PREFIX: &str = "DUR_";
const PITCH_PREFIX: &str = "P_";
const VELOCITY_PREFIX: &str = "V_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Special {
    Pad,
    Start,
    End,
    Sep,
}

impl Special {
    pub const ALL: [Special; 4] = [Special::Pad, Special::Start, Special::End, Special::Sep];

    pub fn as_str(self) -> &'static str {
        match self {
            Special::Pad => PAD_TOKEN,
            Special::Start => START_TOKEN,
            Special::End => END_TOKEN,
            Special::Sep => SEP_TOKEN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Structural {
    ChordStart,
    ChordEnd,
    Bar,
    Rest,
}

impl Structural {
    pub const ALL: [Structural; 4] = [
        Structural::ChordStart,
        Structural::ChordEnd,
        Structural::Bar,
        Structural::Rest,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Structural::ChordStart => CHORD_START_TOKEN,
            Structural::ChordEnd => CHORD_END_TOKEN,
            Structural::Bar => BAR_TOKEN,
            Structural::Rest => REST_TOKEN,
        }
    }
}

/// A single vocabulary symbol, parsed once so downstream code matches on variants
/// instead of string prefixes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token {
    Special(Special),
    Structural(Structural),
    /// Chord length in beats, one of the configured duration grid values.
    Duration(f64),
    /// Absolute 53-TET step.
    Pitch(u16),
    /// 1-based velocity bin.
    Velocity(u8),
}

impl Token {
    pub const PAD: Token = Token::Special(Special::Pad);
    pub const START: Token = Token::Special(Special::Start);
    pub const END: Token = Token::Special(Special::End);
    pub const CHORD_START: Token = Token::Structural(Structural::ChordStart);
    pub const CHORD_END: Token = Token::Structural(Structural::ChordEnd);
    pub const BAR: Token = Token::Structural(Structural::Bar);

    /// Parses a token string, returning `None` for anything outside the grammar.
    pub fn parse(s: &str) -> Option<Token> {
        if let Some(special) = Special::ALL.into_iter().find(|sp| sp.as_str() == s) {
            return Some(Token::Special(special));
        }
        if let Some(structural) = Structural::ALL.into_iter().find(|st| st.as_str() == s) {
            return Some(Token::Structural(structural));
        }

        if let Some(rest) = s.strip_prefix(DURATION_PREFIX) {
            rest.parse::<f64>().ok().map(Token::Duration)
        } else if let Some(rest) = s.strip_prefix(PITCH_PREFIX) {
            rest.parse::<u16>().ok().map(Token::Pitch)
        } else if let Some(rest) = s.strip_prefix(VELOCITY_PREFIX) {
            rest.parse::<u8>().ok().map(Token::Velocity)
        } else {
            None
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Special(special) => f.write_str(special.as_str()),
            Token::Structural(structural) => f.write_str(structural.as_str()),
            // Debug formatting keeps the literal's shortest form and a trailing ".0" on whole numbers.
            Token::Duration(beats) => write!(f, "{}{:?}", DURATION_PREFIX, beats),
            Token::Pitch(step) => write!(f, "{}{}", PITCH_PREFIX, step),
            Token::Velocity(bin) => write!(f, "{}{}", VELOCITY_PREFIX, bin),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_forms() {
        assert_eq!(Token::PAD.to_string(), "<pad>");
        assert_eq!(Token::CHORD_START.to_string(), "CHORD_START");
        assert_eq!(Token::Duration(1.0).to_string(), "DUR_1.0");
        assert_eq!(Token::Duration(0.67).to_string(), "DUR_0.67");
        assert_eq!(Token::Duration(5.33).to_string(), "DUR_5.33");
        assert_eq!(Token::Pitch(212).to_string(), "P_212");
        assert_eq!(Token::Velocity(3).to_string(), "V_3");
    }

    #[test]
    fn parse_known() {
        assert_eq!(Token::parse("<end>"), Some(Token::END));
        assert_eq!(Token::parse("REST"), Some(Token::Structural(Structural::Rest)));
        assert_eq!(Token::parse("DUR_2.67"), Some(Token::Duration(2.67)));
        assert_eq!(Token::parse("DUR_4"), Some(Token::Duration(4.0)));
        assert_eq!(Token::parse("P_0"), Some(Token::Pitch(0)));
        assert_eq!(Token::parse("V_8"), Some(Token::Velocity(8)));
    }

    #[test]
    fn parse_rejects_garbage() {
        for s in ["", "chord_start", "P_", "P_-3", "V_x", "DUR_", "X_12", "<unk>"] {
            assert_eq!(Token::parse(s), None, "{:?} should not parse", s);
        }
    }

    #[test]
    fn display_parse_agree() {
        let tokens = [
            Token::START,
            Token::BAR,
            Token::Duration(1.33),
            Token::Pitch(529),
            Token::Velocity(1),
        ];
        for token in tokens {
            assert_eq!(Token::parse(&token.to_string()), Some(token));
        }
    }
}
