use serde_json::Value;
use time::OffsetDateTime;

use crate::error::PipelineError;
use crate::models::{AggregatedResult, ManualOverride, Provenance, ReconciledRecord};

/// Which branch reconciliation takes, with the inputs that branch needs
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReconcileState<'a> {
    AiOnly(&'a AggregatedResult),
    ManualOnly { manual_count: u32 },
    AiWithOverride {
        ai: &'a AggregatedResult,
        manual_count: u32,
    },
}

impl<'a> ReconcileState<'a> {
    /// The manual count is validated here, so every state carries a usable count
    pub fn select(
        aggregated: Option<&'a AggregatedResult>,
        manual: Option<&ManualOverride>,
    ) -> Result<Self, PipelineError> {
        let manual_count = manual
            .map(|m| validate_manual_count(m.manual_count))
            .transpose()?;

        match (aggregated, manual_count) {
            (Some(ai), None) => Ok(ReconcileState::AiOnly(ai)),
            (None, Some(manual_count)) => Ok(ReconcileState::ManualOnly { manual_count }),
            (Some(ai), Some(manual_count)) => {
                Ok(ReconcileState::AiWithOverride { ai, manual_count })
            }
            (None, None) => Err(PipelineError::ValidationError(
                "neither an AI result nor a manual count".to_string(),
            )),
        }
    }
}

/// Merges the AI pass and a human count into the one record that gets committed
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconciliationEngine;

impl ReconciliationEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn reconcile(
        &self,
        aggregated: Option<&AggregatedResult>,
        manual: Option<&ManualOverride>,
    ) -> Result<ReconciledRecord, PipelineError> {
        reconcile(aggregated, manual)
    }
}

/// `aggregated` is `None` when no AI pass was attempted (e.g. no photo could be taken).
pub fn reconcile(
    aggregated: Option<&AggregatedResult>,
    manual: Option<&ManualOverride>,
) -> Result<ReconciledRecord, PipelineError> {
    let manual_reason = manual.and_then(|m| normalize_reason(&m.reason));

    let record = match ReconcileState::select(aggregated, manual)? {
        ReconcileState::AiOnly(ai) => ReconciledRecord {
            final_count: ai.count,
            final_confidence: Some(ai.mean_confidence),
            provenance: Provenance::Ai,
            ai_count: None,
            manual_reason: None,
        },
        ReconcileState::ManualOnly { manual_count } => ReconciledRecord {
            final_count: manual_count,
            final_confidence: None,
            provenance: Provenance::Manual,
            ai_count: None,
            manual_reason,
        },
        ReconcileState::AiWithOverride { ai, manual_count } => ReconciledRecord {
            final_count: manual_count,
            // Describes the AI pass, not the human count
            final_confidence: Some(ai.mean_confidence),
            provenance: Provenance::AiWithManualOverride,
            ai_count: Some(ai.count),
            manual_reason,
        },
    };

    Ok(record)
}

/// Manual counts must be non-negative and fit the record's count type
pub fn validate_manual_count(count: i64) -> Result<u32, PipelineError> {
    if count < 0 {
        return Err(PipelineError::ValidationError(format!(
            "manual count must be non-negative, got {}",
            count
        )));
    }
    u32::try_from(count).map_err(|_| {
        PipelineError::ValidationError(format!("manual count {} is too large", count))
    })
}

/// Parse a count typed as text; decimals and words are rejected, not rounded
pub fn parse_manual_count(raw: &str) -> Result<i64, PipelineError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::ValidationError(
            "manual count claimed but empty".to_string(),
        ));
    }
    trimmed.parse::<i64>().map_err(|_| {
        PipelineError::ValidationError(format!("manual count must be an integer, got {:?}", trimmed))
    })
}

/// Build an override from a JSON payload such as `{"manual_count": 30, "reason": "..."}`
pub fn override_from_json(payload: &Value) -> Result<ManualOverride, PipelineError> {
    let manual_count = match payload.get("manual_count") {
        None | Some(Value::Null) => {
            return Err(PipelineError::ValidationError(
                "manual count claimed but absent".to_string(),
            ));
        }
        Some(Value::Number(n)) => n.as_i64().ok_or_else(|| {
            PipelineError::ValidationError(format!("manual count must be an integer, got {}", n))
        })?,
        Some(Value::String(s)) => parse_manual_count(s)?,
        Some(other) => {
            return Err(PipelineError::ValidationError(format!(
                "manual count must be an integer, got {}",
                other
            )));
        }
    };

    let reason = payload
        .get("reason")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(ManualOverride {
        manual_count,
        reason,
        created_at: OffsetDateTime::now_utc(),
    })
}

fn normalize_reason(reason: &str) -> Option<String> {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
