//! Guesses an imposm column type from the literals a style compares a column
//! against.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuessedType {
    BoolInt,
    Direction,
    Bool,
    Integer,
    String,
}

impl GuessedType {
    /// Column type name as written in the mapping document.
    pub fn as_str(&self) -> &'static str {
        match self {
            GuessedType::BoolInt => "boolint",
            GuessedType::Direction => "direction",
            GuessedType::Bool => "bool",
            GuessedType::Integer => "integer",
            GuessedType::String => "string",
        }
    }
}

impl fmt::Display for GuessedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const BOOLEAN_WORDS: &[&str] = &["true", "false", "yes", "no"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Unset,
    Guessed(GuessedType),
}

#[derive(Debug, Clone, Copy)]
enum Sample {
    Flag,
    MinusOne,
    OtherInteger,
    BooleanWord,
    Text,
}

fn classify_sample(literal: &str) -> Sample {
    match literal.parse::<i64>() {
        Ok(0 | 1) => Sample::Flag,
        Ok(-1) => Sample::MinusOne,
        Ok(_) => Sample::OtherInteger,
        Err(_) if BOOLEAN_WORDS.contains(&literal) => Sample::BooleanWord,
        Err(_) => Sample::Text,
    }
}

fn step(state: State, sample: Sample) -> State {
    use GuessedType::{Bool, BoolInt, Direction, Integer, String};

    let next = match (state, sample) {
        (State::Guessed(String), _) => String,

        (State::Unset, Sample::Flag) => BoolInt,
        (State::Unset, Sample::MinusOne) => Direction,
        (State::Unset, Sample::OtherInteger) => Integer,
        (State::Unset, Sample::BooleanWord) => Bool,

        (State::Guessed(BoolInt), Sample::Flag) => BoolInt,
        (State::Guessed(BoolInt), Sample::MinusOne) => Direction,
        (State::Guessed(BoolInt), Sample::OtherInteger) => Integer,
        (State::Guessed(BoolInt), Sample::BooleanWord) => Bool,

        (State::Guessed(Direction), Sample::Flag | Sample::MinusOne) => Direction,
        (State::Guessed(Direction), Sample::OtherInteger) => Integer,

        (State::Guessed(Bool), Sample::Flag | Sample::BooleanWord) => Bool,

        (
            State::Guessed(Integer),
            Sample::Flag | Sample::MinusOne | Sample::OtherInteger,
        ) => Integer,

        _ => String,
    };
    State::Guessed(next)
}

/// Folds the samples through the type lattice. Anything inconsistent with
/// the current guess falls through to `string`, which is final.
pub fn guess_column_type<I, S>(literals: I) -> GuessedType
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut state = State::Unset;
    for literal in literals {
        state = step(state, classify_sample(literal.as_ref()));
        if state == State::Guessed(GuessedType::String) {
            break;
        }
    }
    match state {
        State::Unset => GuessedType::String,
        State::Guessed(guess) => guess,
    }
}
