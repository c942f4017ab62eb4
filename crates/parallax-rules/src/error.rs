use core::fmt;

use thiserror::Error;

/// Sections of a persisted rule-set block, in file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Section {
    Config,
    Rules,
    GlobalIndices,
    Trailing,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Section::Config => "configuration",
            Section::Rules => "rules",
            Section::GlobalIndices => "global indices",
            Section::Trailing => "trailing",
        })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuleSetError {
    #[error("{section} section truncated: need {needed} bytes, {available} available")]
    Truncated {
        section: Section,
        needed: usize,
        available: usize,
    },
    #[error("{section} count {count} does not fit in the remaining {available} bytes")]
    CountOverflow {
        section: Section,
        count: u32,
        available: usize,
    },
    #[error("rule index {index} out of range ({len} rules)")]
    UnknownRule { index: u32, len: usize },
}
