//! Derived-Result Extractor
//!
//! Pulls the finished artifact, the quality score, the full quality report
//! and the decision verdict out of the envelopes that carry them.

use serde_json::Value;

use crate::envelope::{PipelineEvent, QualityScoredPayload};
use crate::quality::{QualityDecision, QualityReport};

/// A result surfaced to readers of the run state
#[derive(Debug, Clone, PartialEq)]
pub enum DerivedResult {
    Score(f64),
    Report(QualityReport),
    Decision(QualityDecision),
    Plan(Value),
}

/// Extract every derived result carried by one event.
pub fn extract(event: &PipelineEvent) -> Vec<DerivedResult> {
    match event {
        PipelineEvent::QualityScored(payload) => {
            let mut results = Vec::new();
            if let Some(score) = extract_score(payload) {
                results.push(DerivedResult::Score(score));
            }
            if let Some(report) = extract_report(payload) {
                results.push(DerivedResult::Report(report));
            }
            results
        }
        PipelineEvent::QualityDecision(payload) => vec![DerivedResult::Decision(payload.decision)],
        PipelineEvent::RunCompleted(payload) => payload
            .plan
            .clone()
            .map(DerivedResult::Plan)
            .into_iter()
            .collect(),
        PipelineEvent::RunStarted(_)
        | PipelineEvent::StageStarted(_)
        | PipelineEvent::StageProgress(_)
        | PipelineEvent::StageCompleted(_)
        | PipelineEvent::StageFailed(_)
        | PipelineEvent::RefinementStarted(_)
        | PipelineEvent::RefinementCompleted(_)
        | PipelineEvent::ToolStarted(_)
        | PipelineEvent::ToolCompleted(_)
        | PipelineEvent::AiReceipt(_)
        | PipelineEvent::RunFailed(_)
        | PipelineEvent::Heartbeat
        | PipelineEvent::Unknown { .. } => Vec::new(),
    }
}

pub fn extract_score(payload: &QualityScoredPayload) -> Option<f64> {
    payload.score.filter(|s| s.is_finite())
}

/// Build a full report only when the payload has the complete report shape.
pub fn extract_report(payload: &QualityScoredPayload) -> Option<QualityReport> {
    Some(QualityReport {
        score: extract_score(payload)?,
        checks: payload.checks.clone()?,
        suggestions: payload.suggestions.clone()?,
        decision: payload.decision?,
    })
}
