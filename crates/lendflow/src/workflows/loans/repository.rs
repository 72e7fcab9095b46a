use std::sync::Arc;

use serde::Serialize;

use super::domain::{
    Applicant, ApplicantUpdate, Document, DocumentStatus, DocumentType, LoanApplication,
    LoanFieldUpdate, LoanId, LoanStatus, NewVerificationResult, UnderwritingRecord, UserId,
    VerificationKind, VerificationResult,
};

/// Loan lifecycle storage. Each write is a single keyed update.
pub trait LoanRepository: Send + Sync {
    fn create(&self, user_id: UserId) -> Result<LoanApplication, RepositoryError>;
    fn get(&self, id: LoanId) -> Result<Option<LoanApplication>, RepositoryError>;
    fn update_status(&self, id: LoanId, status: LoanStatus) -> Result<(), RepositoryError>;
    fn update_fields(&self, id: LoanId, update: &LoanFieldUpdate) -> Result<(), RepositoryError>;
    fn set_sanction_reference(&self, id: LoanId, reference: &str) -> Result<(), RepositoryError>;
}

/// Applicant identity records.
pub trait ApplicantDirectory: Send + Sync {
    fn get(&self, id: UserId) -> Result<Option<Applicant>, RepositoryError>;
    fn update(&self, id: UserId, update: &ApplicantUpdate) -> Result<(), RepositoryError>;
    /// Another applicant (not `excluding`) holding the given PAN, if any.
    fn find_by_pan(
        &self,
        pan: &str,
        excluding: UserId,
    ) -> Result<Option<Applicant>, RepositoryError>;
}

/// Uploaded documents, at most one per (loan, type).
pub trait DocumentRepository: Send + Sync {
    /// Stores the document, replacing any prior upload of the same type for the loan.
    fn create(&self, document: Document) -> Result<Document, RepositoryError>;
    fn find_by_loan_and_type(
        &self,
        loan_id: LoanId,
        document_type: DocumentType,
    ) -> Result<Option<Document>, RepositoryError>;
    fn update_status(
        &self,
        loan_id: LoanId,
        document_type: DocumentType,
        status: DocumentStatus,
    ) -> Result<(), RepositoryError>;
}

pub trait VerificationRepository: Send + Sync {
    fn create(&self, result: NewVerificationResult)
        -> Result<VerificationResult, RepositoryError>;
    /// Returns the number of rows removed.
    fn delete_where(&self, loan_id: LoanId, kind: VerificationKind)
        -> Result<usize, RepositoryError>;
    fn list_for_loan(&self, loan_id: LoanId) -> Result<Vec<VerificationResult>, RepositoryError>;
}

pub trait UnderwritingRepository: Send + Sync {
    fn upsert(&self, record: UnderwritingRecord) -> Result<UnderwritingRecord, RepositoryError>;
    fn get(&self, loan_id: LoanId) -> Result<Option<UnderwritingRecord>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Storage handles injected into the pipeline, engine and orchestrator.
#[derive(Clone)]
pub struct LoanStores {
    pub loans: Arc<dyn LoanRepository>,
    pub applicants: Arc<dyn ApplicantDirectory>,
    pub documents: Arc<dyn DocumentRepository>,
    pub verifications: Arc<dyn VerificationRepository>,
    pub underwriting: Arc<dyn UnderwritingRepository>,
}

impl LoanStores {
    /// Uses one backing store for every concern.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: LoanRepository
            + ApplicantDirectory
            + DocumentRepository
            + VerificationRepository
            + UnderwritingRepository
            + 'static,
    {
        Self {
            loans: store.clone(),
            applicants: store.clone(),
            documents: store.clone(),
            verifications: store.clone(),
            underwriting: store,
        }
    }
}

/// Sanitized representation of a loan's exposed status.
#[derive(Debug, Clone, Serialize)]
pub struct LoanStatusView {
    pub loan_id: LoanId,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenure_months: Option<u32>,
    pub documents: Vec<DocumentStatusView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_rationale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foir: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sanction_reference: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentStatusView {
    pub document_type: DocumentType,
    pub status: DocumentStatus,
}

impl LoanStatusView {
    pub fn build(
        loan: &LoanApplication,
        documents: Vec<DocumentStatusView>,
        underwriting: Option<&UnderwritingRecord>,
    ) -> Self {
        let decision_rationale = underwriting.map(|record| {
            if record.approved {
                "approved".to_string()
            } else {
                record
                    .rejection_reason
                    .clone()
                    .unwrap_or_else(|| "not approved".to_string())
            }
        });

        Self {
            loan_id: loan.id,
            status: loan.status.label(),
            amount: loan.amount,
            tenure_months: loan.tenure_months,
            documents,
            decision_rationale,
            foir: underwriting.map(|record| record.foir),
            sanction_reference: loan.sanction_reference.clone(),
        }
    }
}
