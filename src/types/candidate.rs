use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Named ranking signal. Each carries a configurable weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    SymbolExact,
    SymbolPartial,
    ImportMatch,
    PathMatch,
    DocMatch,
    Related,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SymbolExact => "symbol_exact",
            Self::SymbolPartial => "symbol_partial",
            Self::ImportMatch => "import_match",
            Self::PathMatch => "path_match",
            Self::DocMatch => "doc_match",
            Self::Related => "related",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a candidate scored: the signal, what triggered it, and how much it added.
///
/// `detail` is the matched query term, or for [`Signal::Related`] the seed path that boosted it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rationale {
    pub signal: Signal,
    pub detail: String,
    pub contribution: f64,
}

/// Query-time ranked file. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub path: String,
    pub score: f64,
    pub rationale: Vec<Rationale>,
}

impl Candidate {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            score: 0.0,
            rationale: Vec::new(),
        }
    }

    pub fn add(&mut self, signal: Signal, detail: impl Into<String>, contribution: f64) {
        self.score += contribution;
        self.rationale.push(Rationale {
            signal,
            detail: detail.into(),
            contribution,
        });
    }

    pub fn has_signal(&self, signal: Signal) -> bool {
        self.rationale.iter().any(|r| r.signal == signal)
    }

    /// Distinct signals that fired, in first-fired order.
    pub fn signals(&self) -> Vec<Signal> {
        let mut seen = Vec::new();
        for r in &self.rationale {
            if !seen.contains(&r.signal) {
                seen.push(r.signal);
            }
        }
        seen
    }

    /// Highest score first; ties by shorter path, then lexical path order.
    pub fn rank_order(a: &Candidate, b: &Candidate) -> Ordering {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.path.len().cmp(&b.path.len()))
            .then_with(|| a.path.cmp(&b.path))
    }
}
