use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use super::domain::{Applicant, LoanApplication, LoanId, UnderwritingRecord};
use super::gateway::{GatewayError, ObjectStorage};
use super::repository::{LoanStores, RepositoryError};

#[derive(Debug, thiserror::Error)]
pub enum SanctionError {
    #[error("loan {0} not found")]
    LoanNotFound(LoanId),
    #[error("applicant for loan {0} not found")]
    ApplicantNotFound(LoanId),
    #[error("loan {0} has no approved underwriting decision")]
    NotApproved(LoanId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Storage(#[from] GatewayError),
}

/// Produces the sanction letter artifact for an approved loan.
#[async_trait]
pub trait SanctionLetterGenerator: Send + Sync {
    async fn generate(&self, loan_id: LoanId) -> Result<String, SanctionError>;
}

/// Renders a plain-text letter and stores it next to the uploaded documents.
pub struct StoredSanctionLetterGenerator {
    stores: LoanStores,
    storage: Arc<dyn ObjectStorage>,
}

impl StoredSanctionLetterGenerator {
    pub fn new(stores: LoanStores, storage: Arc<dyn ObjectStorage>) -> Self {
        Self { stores, storage }
    }
}

#[async_trait]
impl SanctionLetterGenerator for StoredSanctionLetterGenerator {
    async fn generate(&self, loan_id: LoanId) -> Result<String, SanctionError> {
        let loan = self
            .stores
            .loans
            .get(loan_id)?
            .ok_or(SanctionError::LoanNotFound(loan_id))?;
        let decision = self
            .stores
            .underwriting
            .get(loan_id)?
            .filter(|record| record.approved)
            .ok_or(SanctionError::NotApproved(loan_id))?;
        let applicant = self
            .stores
            .applicants
            .get(loan.user_id)?
            .ok_or(SanctionError::ApplicantNotFound(loan_id))?;

        let letter = render_letter(&loan, &applicant, &decision, Utc::now().date_naive());
        let key = format!("sanction-letters/loan-{loan_id}.txt");
        let reference = self.storage.store(&key, letter.into_bytes()).await?;
        Ok(reference)
    }
}

pub fn render_letter(
    loan: &LoanApplication,
    applicant: &Applicant,
    decision: &UnderwritingRecord,
    issued_on: NaiveDate,
) -> String {
    let mut letter = String::new();
    let _ = writeln!(letter, "LOAN SANCTION LETTER");
    let _ = writeln!(letter, "Date: {}", issued_on.format("%d/%m/%Y"));
    let _ = writeln!(letter);
    let _ = writeln!(letter, "To: {}", applicant.name);
    if let Some(pan) = &applicant.pan_number {
        let _ = writeln!(letter, "PAN: {pan}");
    }
    let _ = writeln!(letter);
    let _ = writeln!(letter, "Subject: Loan Sanction Approval - Loan ID #{}", loan.id);
    let _ = writeln!(letter);
    if let Some(amount) = loan.amount {
        let _ = writeln!(letter, "Sanctioned Amount: Rs. {amount:.2}");
    }
    if let Some(tenure) = loan.tenure_months {
        let _ = writeln!(letter, "Loan Tenure: {tenure} months");
    }
    let _ = writeln!(letter, "FOIR at approval: {:.2}%", decision.foir * 100.0);
    let _ = writeln!(
        letter,
        "Application Date: {}",
        loan.created_at.date_naive().format("%d/%m/%Y")
    );
    let _ = writeln!(
        letter,
        "Approval Date: {}",
        decision.decided_at.date_naive().format("%d/%m/%Y")
    );
    let _ = writeln!(letter);
    let _ = writeln!(
        letter,
        "This sanction is valid for 30 days from the date of issue and is subject to \
         completion of documentation before disbursement."
    );
    letter
}
