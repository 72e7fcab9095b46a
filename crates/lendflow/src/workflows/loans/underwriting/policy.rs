use serde::{Deserialize, Serialize};

use super::config::UnderwritingConfig;
use super::UnderwritingInput;

/// Adjudication outcome for a completed financial snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UnderwritingOutcome {
    Approved,
    Rejected(RejectionReason),
}

/// Closed set of rejection reasons. `summary` yields the customer-facing text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RejectionReason {
    Validation(Vec<String>),
    PanNotVerified,
    IncomeBelowMinimum,
    FoirExceeded,
    FraudFlagged,
}

impl RejectionReason {
    pub fn summary(&self) -> String {
        match self {
            RejectionReason::Validation(errors) => {
                format!("Validation error: {}", errors.join("; "))
            }
            RejectionReason::PanNotVerified => "PAN not verified".to_string(),
            RejectionReason::IncomeBelowMinimum => {
                "Monthly income below minimum threshold".to_string()
            }
            RejectionReason::FoirExceeded => "FOIR exceeds permissible limit".to_string(),
            RejectionReason::FraudFlagged => "Fraud flag detected".to_string(),
        }
    }
}

/// First failing rule wins, regardless of how strong the remaining factors are.
pub(crate) fn decide_outcome(
    input: &UnderwritingInput,
    foir: f64,
    config: &UnderwritingConfig,
) -> UnderwritingOutcome {
    if !input.pan_verified {
        return UnderwritingOutcome::Rejected(RejectionReason::PanNotVerified);
    }

    if input.monthly_income < config.min_monthly_income {
        return UnderwritingOutcome::Rejected(RejectionReason::IncomeBelowMinimum);
    }

    if foir > config.max_foir {
        return UnderwritingOutcome::Rejected(RejectionReason::FoirExceeded);
    }

    if input.fraud_flag {
        return UnderwritingOutcome::Rejected(RejectionReason::FraudFlagged);
    }

    UnderwritingOutcome::Approved
}

/// Collects every validation problem; an empty list means the input is usable.
pub(crate) fn validate(input: &UnderwritingInput) -> Vec<String> {
    let mut errors = Vec::new();

    if input.application_id.trim().is_empty() {
        errors.push("application_id must be a non-empty string".to_string());
    }

    for (field, value) in [
        ("monthly_income", input.monthly_income),
        ("existing_emis", input.existing_emis),
        ("proposed_emi", input.proposed_emi),
    ] {
        if !value.is_finite() {
            errors.push(format!("{field} must be a finite number"));
        } else if value < 0.0 {
            errors.push(format!("{field} cannot be negative"));
        }
    }

    errors
}
