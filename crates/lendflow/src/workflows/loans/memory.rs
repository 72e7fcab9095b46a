//! In-process stores used by the API binary's demo mode and by tests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use super::domain::{
    Applicant, ApplicantUpdate, Document, DocumentStatus, DocumentType, LoanApplication,
    LoanFieldUpdate, LoanId, LoanStatus, NewVerificationResult, UnderwritingRecord, UserId,
    VerificationKind, VerificationResult,
};
use super::gateway::{GatewayError, ObjectStorage};
use super::repository::{
    ApplicantDirectory, DocumentRepository, LoanRepository, RepositoryError,
    UnderwritingRepository, VerificationRepository,
};

#[derive(Default)]
struct Tables {
    next_loan_id: u64,
    next_result_id: u64,
    loans: HashMap<LoanId, LoanApplication>,
    applicants: HashMap<UserId, Applicant>,
    documents: HashMap<(LoanId, DocumentType), Document>,
    verifications: Vec<VerificationResult>,
    underwriting: HashMap<LoanId, UnderwritingRecord>,
}

/// Single-mutex store implementing every loan repository contract.
#[derive(Default)]
pub struct InMemoryLoanStore {
    tables: Mutex<Tables>,
}

impl InMemoryLoanStore {
    pub fn with_applicants(applicants: impl IntoIterator<Item = Applicant>) -> Self {
        let tables = Tables {
            applicants: applicants
                .into_iter()
                .map(|applicant| (applicant.id, applicant))
                .collect(),
            ..Tables::default()
        };
        Self {
            tables: Mutex::new(tables),
        }
    }

    pub fn insert_applicant(&self, applicant: Applicant) -> Result<(), RepositoryError> {
        self.tables()?.applicants.insert(applicant.id, applicant);
        Ok(())
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, RepositoryError> {
        self.tables
            .lock()
            .map_err(|_| RepositoryError::Unavailable("loan store lock poisoned".to_string()))
    }
}

impl LoanRepository for InMemoryLoanStore {
    fn create(&self, user_id: UserId) -> Result<LoanApplication, RepositoryError> {
        let mut tables = self.tables()?;
        tables.next_loan_id += 1;
        let loan = LoanApplication::new(LoanId(tables.next_loan_id), user_id);
        tables.loans.insert(loan.id, loan.clone());
        Ok(loan)
    }

    fn get(&self, id: LoanId) -> Result<Option<LoanApplication>, RepositoryError> {
        Ok(self.tables()?.loans.get(&id).cloned())
    }

    fn update_status(&self, id: LoanId, status: LoanStatus) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        let loan = tables.loans.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        loan.status = status;
        Ok(())
    }

    fn update_fields(&self, id: LoanId, update: &LoanFieldUpdate) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        let loan = tables.loans.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if let Some(amount) = update.amount {
            loan.amount = Some(amount);
        }
        if let Some(tenure) = update.tenure_months {
            loan.tenure_months = Some(tenure);
        }
        if let Some(income) = update.monthly_income {
            loan.monthly_income = Some(income);
        }
        Ok(())
    }

    fn set_sanction_reference(&self, id: LoanId, reference: &str) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        let loan = tables.loans.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        loan.sanction_reference = Some(reference.to_string());
        Ok(())
    }
}

impl ApplicantDirectory for InMemoryLoanStore {
    fn get(&self, id: UserId) -> Result<Option<Applicant>, RepositoryError> {
        Ok(self.tables()?.applicants.get(&id).cloned())
    }

    fn update(&self, id: UserId, update: &ApplicantUpdate) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        let applicant = tables
            .applicants
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;
        if let Some(last4) = &update.aadhaar_last4 {
            applicant.aadhaar_last4 = Some(last4.clone());
        }
        if let Some(verified) = update.aadhaar_verified {
            applicant.aadhaar_verified = verified;
        }
        Ok(())
    }

    fn find_by_pan(
        &self,
        pan: &str,
        excluding: UserId,
    ) -> Result<Option<Applicant>, RepositoryError> {
        let tables = self.tables()?;
        Ok(tables
            .applicants
            .values()
            .filter(|applicant| applicant.id != excluding)
            .find(|applicant| {
                applicant
                    .pan_number
                    .as_deref()
                    .is_some_and(|held| held.trim().eq_ignore_ascii_case(pan))
            })
            .cloned())
    }
}

impl DocumentRepository for InMemoryLoanStore {
    fn create(&self, document: Document) -> Result<Document, RepositoryError> {
        let mut tables = self.tables()?;
        tables.documents.insert(
            (document.loan_id, document.document_type),
            document.clone(),
        );
        Ok(document)
    }

    fn find_by_loan_and_type(
        &self,
        loan_id: LoanId,
        document_type: DocumentType,
    ) -> Result<Option<Document>, RepositoryError> {
        Ok(self
            .tables()?
            .documents
            .get(&(loan_id, document_type))
            .cloned())
    }

    fn update_status(
        &self,
        loan_id: LoanId,
        document_type: DocumentType,
        status: DocumentStatus,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        let document = tables
            .documents
            .get_mut(&(loan_id, document_type))
            .ok_or(RepositoryError::NotFound)?;
        document.status = status;
        Ok(())
    }
}

impl VerificationRepository for InMemoryLoanStore {
    fn create(
        &self,
        result: NewVerificationResult,
    ) -> Result<VerificationResult, RepositoryError> {
        let mut tables = self.tables()?;
        tables.next_result_id += 1;
        let stored = VerificationResult {
            id: tables.next_result_id,
            loan_id: result.loan_id,
            kind: result.kind,
            status: result.status,
            findings: result.findings,
            recorded_at: Utc::now(),
        };
        tables.verifications.push(stored.clone());
        Ok(stored)
    }

    fn delete_where(
        &self,
        loan_id: LoanId,
        kind: VerificationKind,
    ) -> Result<usize, RepositoryError> {
        let mut tables = self.tables()?;
        let before = tables.verifications.len();
        tables
            .verifications
            .retain(|result| !(result.loan_id == loan_id && result.kind == kind));
        Ok(before - tables.verifications.len())
    }

    fn list_for_loan(&self, loan_id: LoanId) -> Result<Vec<VerificationResult>, RepositoryError> {
        Ok(self
            .tables()?
            .verifications
            .iter()
            .filter(|result| result.loan_id == loan_id)
            .cloned()
            .collect())
    }
}

impl UnderwritingRepository for InMemoryLoanStore {
    fn upsert(&self, record: UnderwritingRecord) -> Result<UnderwritingRecord, RepositoryError> {
        self.tables()?
            .underwriting
            .insert(record.loan_id, record.clone());
        Ok(record)
    }

    fn get(&self, loan_id: LoanId) -> Result<Option<UnderwritingRecord>, RepositoryError> {
        Ok(self.tables()?.underwriting.get(&loan_id).cloned())
    }
}

/// Object storage keyed by reference string. `store` returns a `memory://` reference.
#[derive(Default)]
pub struct InMemoryObjectStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryObjectStorage {
    pub fn put(&self, reference: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        if let Ok(mut objects) = self.objects.lock() {
            objects.insert(reference.into(), bytes.into());
        }
    }

    pub fn get(&self, reference: &str) -> Option<Vec<u8>> {
        self.objects.lock().ok()?.get(reference).cloned()
    }
}

#[async_trait]
impl ObjectStorage for InMemoryObjectStorage {
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, GatewayError> {
        let objects = self
            .objects
            .lock()
            .map_err(|_| GatewayError::Unavailable("object storage lock poisoned".to_string()))?;
        objects
            .get(reference)
            .cloned()
            .ok_or_else(|| GatewayError::MissingObject(reference.to_string()))
    }

    async fn store(&self, key: &str, bytes: Vec<u8>) -> Result<String, GatewayError> {
        let reference = format!("memory://{key}");
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| GatewayError::Unavailable("object storage lock poisoned".to_string()))?;
        objects.insert(reference.clone(), bytes);
        Ok(reference)
    }
}
