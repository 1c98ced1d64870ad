//! Quality Models
//!
//! Data structures for the quality score attached to a generated plan and
//! the verdict that decides whether a refinement loop is entered.

use serde::{Deserialize, Serialize};

/// Verdict attached to a scored output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QualityDecision {
    /// Output is good enough to ship
    Accept,
    /// Output may be improved by another refinement cycle
    Refine,
    /// Output must go through refinement before it is accepted
    MustRefine,
}

impl QualityDecision {
    /// Wire name of this decision
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityDecision::Accept => "accept",
            QualityDecision::Refine => "refine",
            QualityDecision::MustRefine => "must-refine",
        }
    }

    /// Check if this decision leads into the refinement loop
    pub fn requires_refinement(&self) -> bool {
        matches!(self, QualityDecision::Refine | QualityDecision::MustRefine)
    }
}

impl std::fmt::Display for QualityDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one structural check run against the plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralCheck {
    /// Check identifier (e.g. "has_objectives")
    #[serde(alias = "id")]
    pub name: String,
    /// Whether the check passed
    pub passed: bool,
    /// Optional detail for a failed check
    #[serde(default, alias = "detail", skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Full quality report carried by a `quality.scored` envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    /// Overall score
    pub score: f64,
    /// Structural checks
    pub checks: Vec<StructuralCheck>,
    /// Improvement suggestions
    pub suggestions: Vec<String>,
    /// Verdict for this score
    pub decision: QualityDecision,
}

impl QualityReport {
    /// Checks that passed
    pub fn passed_checks(&self) -> impl Iterator<Item = &StructuralCheck> {
        self.checks.iter().filter(|c| c.passed)
    }

    /// Checks that failed
    pub fn failed_checks(&self) -> impl Iterator<Item = &StructuralCheck> {
        self.checks.iter().filter(|c| !c.passed)
    }

    /// Check if every structural check passed
    pub fn all_checks_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }
}
