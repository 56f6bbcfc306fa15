use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a bar's IDs are cached locally or unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarKind {
    Hole,
    Filled,
}

impl fmt::Display for BarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BarKind::Hole => f.write_str("H"),
            BarKind::Filled => f.write_str("F"),
        }
    }
}

/// A closed interval `[min, max]` of IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    pub min: i64,
    pub max: i64,
    pub kind: BarKind,
}

impl Bar {
    pub fn new(min: i64, max: i64, kind: BarKind) -> Self {
        Self { min, max, kind }
    }

    pub fn filled(min: i64, max: i64) -> Self {
        Self::new(min, max, BarKind::Filled)
    }

    pub fn hole(min: i64, max: i64) -> Self {
        Self::new(min, max, BarKind::Hole)
    }

    pub fn is_filled(&self) -> bool {
        self.kind == BarKind::Filled
    }

    pub fn contains(&self, pt: i64) -> bool {
        self.min <= pt && pt <= self.max
    }

    pub fn contains_range(&self, min: i64, max: i64) -> bool {
        self.min <= min && max <= self.max
    }
}

impl fmt::Display for Bar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}: {} - {}]", self.kind, self.min, self.max)
    }
}
