mod affordability;
mod config;
mod policy;
mod service;

pub use affordability::{calculate_emi, calculate_foir};
pub use config::UnderwritingConfig;
pub use policy::{RejectionReason, UnderwritingOutcome};
pub use service::{UnderwritingError, UnderwritingService};

use policy::{decide_outcome, validate};
use serde::{Deserialize, Serialize};

/// Completed financial snapshot handed to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnderwritingInput {
    pub application_id: String,
    pub monthly_income: f64,
    pub existing_emis: f64,
    pub proposed_emi: f64,
    pub pan_verified: bool,
    pub fraud_flag: bool,
}

/// Engine output: the decision plus the affordability ratio it was based on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnderwritingDecision {
    pub application_id: String,
    pub outcome: UnderwritingOutcome,
    pub foir: f64,
}

impl UnderwritingDecision {
    pub fn approved(&self) -> bool {
        matches!(self.outcome, UnderwritingOutcome::Approved)
    }

    pub fn rejection_reason(&self) -> Option<String> {
        match &self.outcome {
            UnderwritingOutcome::Approved => None,
            UnderwritingOutcome::Rejected(reason) => Some(reason.summary()),
        }
    }
}

/// Stateless evaluator applying the policy dials to an input snapshot.
#[derive(Debug, Clone)]
pub struct UnderwritingEngine {
    config: UnderwritingConfig,
}

impl UnderwritingEngine {
    pub fn new(config: UnderwritingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &UnderwritingConfig {
        &self.config
    }

    /// Pure: validation failures become a not-approved decision with `foir = 0`.
    pub fn evaluate(&self, input: &UnderwritingInput) -> UnderwritingDecision {
        let errors = validate(input);
        if !errors.is_empty() {
            return UnderwritingDecision {
                application_id: input.application_id.clone(),
                outcome: UnderwritingOutcome::Rejected(RejectionReason::Validation(errors)),
                foir: 0.0,
            };
        }

        let foir = calculate_foir(input.monthly_income, input.existing_emis, input.proposed_emi);
        let outcome = decide_outcome(input, foir, &self.config);

        UnderwritingDecision {
            application_id: input.application_id.clone(),
            outcome,
            foir,
        }
    }

    /// Proposed EMI for the requested amount at the configured fixed rate.
    pub fn proposed_emi(&self, amount: f64, tenure_months: u32) -> f64 {
        calculate_emi(amount, self.config.monthly_rate(), i64::from(tenure_months))
    }
}
