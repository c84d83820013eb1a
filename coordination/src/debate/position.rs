//! Position classifier — maps an agent's free-text position onto a
//! tagged stance used by the consensus evaluator.
//!
//! The stored position text is never rewritten; classification is a pure
//! function over a fixed keyword table.

use serde::{Deserialize, Serialize};

/// Keywords that mark an opposing stance. Checked before the supportive
/// table so that "disagree" and "disapprove" never match "agree"/"approve".
pub const OPPOSING_KEYWORDS: &[&str] = &[
    "disagree",
    "disapprove",
    "reject",
    "oppose",
    "veto",
    "against",
];

/// Keywords that mark a supportive stance.
pub const SUPPORTIVE_KEYWORDS: &[&str] = &["approve", "support", "agree", "endorse"];

/// Classified stance of a single opinion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    /// Agent is in favour of the proposal.
    Supportive,
    /// Agent is against the proposal.
    Opposing,
    /// No recognisable stance.
    Neutral,
}

impl Position {
    /// Classify free text by case-insensitive substring match.
    pub fn classify(text: &str) -> Self {
        let lowered = text.to_lowercase();
        if OPPOSING_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
            Self::Opposing
        } else if SUPPORTIVE_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
            Self::Supportive
        } else {
            Self::Neutral
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Supportive => write!(f, "supportive"),
            Self::Opposing => write!(f, "opposing"),
            Self::Neutral => write!(f, "neutral"),
        }
    }
}

/// Per-round count of classified positions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionTally {
    pub supportive: usize,
    pub opposing: usize,
    pub neutral: usize,
}

impl PositionTally {
    /// Add one classified position.
    pub fn record(&mut self, position: Position) {
        match position {
            Position::Supportive => self.supportive += 1,
            Position::Opposing => self.opposing += 1,
            Position::Neutral => self.neutral += 1,
        }
    }

    /// Total opinions counted.
    pub fn total(&self) -> usize {
        self.supportive + self.opposing + self.neutral
    }

    /// The single position shared by every counted opinion, if any.
    pub fn unanimous(&self) -> Option<Position> {
        let total = self.total();
        if total == 0 {
            None
        } else if self.supportive == total {
            Some(Position::Supportive)
        } else if self.opposing == total {
            Some(Position::Opposing)
        } else if self.neutral == total {
            Some(Position::Neutral)
        } else {
            None
        }
    }
}

impl FromIterator<Position> for PositionTally {
    fn from_iter<I: IntoIterator<Item = Position>>(iter: I) -> Self {
        let mut tally = Self::default();
        for position in iter {
            tally.record(position);
        }
        tally
    }
}
