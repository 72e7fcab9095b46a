use chrono::Utc;
use tracing::info;

use super::{UnderwritingConfig, UnderwritingDecision, UnderwritingEngine, UnderwritingInput};
use crate::workflows::loans::domain::{
    Applicant, LoanApplication, LoanId, UnderwritingRecord, UserId, VerificationKind,
    VerificationResult, VerificationStatus,
};
use crate::workflows::loans::repository::{LoanStores, RepositoryError};

#[derive(Debug, thiserror::Error)]
pub enum UnderwritingError {
    #[error("loan {0} not found")]
    LoanNotFound(LoanId),
    #[error("applicant {0} could not be read")]
    ApplicantNotFound(UserId),
    #[error("loan {0} has no amount or tenure yet")]
    IncompleteLoan(LoanId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Assembles the engine input from persisted state and upserts the latest decision.
pub struct UnderwritingService {
    stores: LoanStores,
    engine: UnderwritingEngine,
}

impl UnderwritingService {
    pub fn new(stores: LoanStores, config: UnderwritingConfig) -> Self {
        Self {
            stores,
            engine: UnderwritingEngine::new(config),
        }
    }

    pub fn engine(&self) -> &UnderwritingEngine {
        &self.engine
    }

    /// Evaluate the loan and overwrite its underwriting record.
    pub fn process(&self, loan_id: LoanId) -> Result<UnderwritingDecision, UnderwritingError> {
        let loan = self
            .stores
            .loans
            .get(loan_id)?
            .ok_or(UnderwritingError::LoanNotFound(loan_id))?;
        let applicant = self
            .stores
            .applicants
            .get(loan.user_id)?
            .ok_or(UnderwritingError::ApplicantNotFound(loan.user_id))?;
        let results = self.stores.verifications.list_for_loan(loan_id)?;

        let input = self.assemble_input(&loan, &applicant, &results)?;
        let decision = self.engine.evaluate(&input);

        self.stores.underwriting.upsert(UnderwritingRecord {
            loan_id,
            approved: decision.approved(),
            foir: decision.foir,
            rejection_reason: decision.rejection_reason(),
            score: None,
            manual_override: false,
            input_snapshot: serde_json::to_value(&input).unwrap_or(serde_json::Value::Null),
            decided_at: Utc::now(),
        })?;

        info!(
            %loan_id,
            approved = decision.approved(),
            foir = decision.foir,
            "underwriting decision recorded"
        );
        Ok(decision)
    }

    pub fn assemble_input(
        &self,
        loan: &LoanApplication,
        applicant: &Applicant,
        results: &[VerificationResult],
    ) -> Result<UnderwritingInput, UnderwritingError> {
        let (Some(amount), Some(tenure_months)) = (loan.amount, loan.tenure_months) else {
            return Err(UnderwritingError::IncompleteLoan(loan.id));
        };

        let financial = latest(results, |result| result.findings.carries_financials());
        let monthly_income = financial
            .and_then(|result| result.findings.monthly_income)
            .unwrap_or(0.0);
        let existing_emis = financial
            .and_then(|result| result.findings.existing_emis)
            .or_else(|| {
                latest(results, |result| result.findings.existing_emis.is_some())
                    .and_then(|result| result.findings.existing_emis)
            })
            .unwrap_or(0.0);

        let has_pan = applicant
            .pan_number
            .as_deref()
            .is_some_and(|pan| !pan.trim().is_empty());
        let kyc_cleared = match latest(results, |result| result.kind == VerificationKind::Kyc) {
            Some(kyc) => kyc.status == VerificationStatus::Approved,
            None => self.engine.config().pan_verified_without_kyc,
        };

        Ok(UnderwritingInput {
            application_id: loan.id.to_string(),
            monthly_income,
            existing_emis,
            proposed_emi: self.engine.proposed_emi(amount, tenure_months),
            pan_verified: has_pan && kyc_cleared,
            fraud_flag: results
                .iter()
                .any(|result| result.status == VerificationStatus::Fraud),
        })
    }
}

fn latest<F>(results: &[VerificationResult], predicate: F) -> Option<&VerificationResult>
where
    F: Fn(&VerificationResult) -> bool,
{
    results
        .iter()
        .filter(|result| predicate(result))
        .max_by_key(|result| result.id)
}
