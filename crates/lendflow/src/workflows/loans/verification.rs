use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::domain::{
    ApplicantUpdate, Document, DocumentType, LoanId, NewVerificationResult, UserId,
    VerificationFindings, VerificationKind, VerificationResult, VerificationStatus,
};
use super::extraction::{self, IdentityFields};
use super::gateway::{recognize_document, ObjectStorage, RecognitionService};
use super::registry::{IdentityKind, RegistryLookup};
use super::repository::{LoanStores, RepositoryError};

pub const REASON_INCOMPLETE: &str = "incomplete or blurry document";
pub const REASON_NOT_IN_REGISTRY: &str = "not found in registry";
pub const REASON_DUPLICATE_PAN: &str = "PAN already held by another applicant";

/// Error raised when verification cannot run at all. Everything else becomes a status.
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("{0} document not found")]
    DocumentNotFound(DocumentType),
    #[error("applicant {0} not found")]
    ApplicantNotFound(UserId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Outcome of the decision table before it is persisted.
struct Assessment {
    status: VerificationStatus,
    findings: VerificationFindings,
    applicant_update: Option<(UserId, ApplicantUpdate)>,
}

impl Assessment {
    fn stop(status: VerificationStatus, findings: VerificationFindings) -> Self {
        Self {
            status,
            findings,
            applicant_update: None,
        }
    }
}

/// Extraction, registry match, identity cross-check and status assignment per document type.
pub struct VerificationPipeline {
    stores: LoanStores,
    storage: Arc<dyn ObjectStorage>,
    recognizer: Arc<dyn RecognitionService>,
    registry: Arc<dyn RegistryLookup>,
    recognition_timeout: Duration,
}

impl VerificationPipeline {
    pub fn new(
        stores: LoanStores,
        storage: Arc<dyn ObjectStorage>,
        recognizer: Arc<dyn RecognitionService>,
        registry: Arc<dyn RegistryLookup>,
        recognition_timeout: Duration,
    ) -> Self {
        Self {
            stores,
            storage,
            recognizer,
            registry,
            recognition_timeout,
        }
    }

    /// Verify the loan's document of `document_type`, replacing any earlier result for it.
    ///
    /// Callers must hold the loan's lock; the delete-then-create pair is not atomic on its own.
    pub async fn verify(
        &self,
        loan_id: LoanId,
        document_type: DocumentType,
    ) -> Result<VerificationResult, VerificationError> {
        let kind = VerificationKind::from(document_type);
        let removed = self.stores.verifications.delete_where(loan_id, kind)?;
        debug!(%loan_id, %document_type, removed, "cleared prior verification results");

        let document = self
            .stores
            .documents
            .find_by_loan_and_type(loan_id, document_type)?
            .ok_or(VerificationError::DocumentNotFound(document_type))?;

        let text = recognize_document(
            self.storage.as_ref(),
            self.recognizer.as_ref(),
            &document.storage_reference,
            self.recognition_timeout,
        )
        .await;

        let assessment = match document_type {
            DocumentType::Pan => {
                self.assess_identity(IdentityKind::Pan, extraction::extract_pan(&text), &document)?
            }
            DocumentType::Aadhaar => self.assess_identity(
                IdentityKind::Aadhaar,
                extraction::extract_aadhaar(&text),
                &document,
            )?,
            DocumentType::SalarySlip => assess_salary_slip(&text),
            DocumentType::BankStatement => assess_bank_statement(&text),
        };

        let result = self.stores.verifications.create(NewVerificationResult {
            loan_id,
            kind,
            status: assessment.status,
            findings: assessment.findings,
        })?;
        self.stores.documents.update_status(
            loan_id,
            document_type,
            assessment.status.document_status(),
        )?;

        if let Some((user_id, update)) = assessment.applicant_update {
            self.stores.applicants.update(user_id, &update)?;
        }

        info!(%loan_id, %document_type, status = %result.status, "document verified");
        Ok(result)
    }

    fn assess_identity(
        &self,
        kind: IdentityKind,
        fields: IdentityFields,
        document: &Document,
    ) -> Result<Assessment, VerificationError> {
        let IdentityFields {
            number: Some(raw_number),
            name: Some(name),
            birth_date: Some(birth_date),
            father_name,
        } = fields
        else {
            return Ok(Assessment::stop(
                VerificationStatus::ReuploadRequired,
                VerificationFindings::with_reason(REASON_INCOMPLETE),
            ));
        };

        let number = kind.normalize(&raw_number);
        let recorded_number = match kind {
            IdentityKind::Pan => number.clone(),
            IdentityKind::Aadhaar => mask(&number),
        };

        if !self.registry.contains(kind, &number) {
            debug!(?kind, "identity number missing from registry");
            return Ok(Assessment::stop(
                VerificationStatus::Rejected,
                VerificationFindings {
                    reason: Some(REASON_NOT_IN_REGISTRY.to_string()),
                    identity_number: Some(recorded_number),
                    registry_match: Some(false),
                    ..VerificationFindings::default()
                },
            ));
        }

        let applicant = self
            .stores
            .applicants
            .get(document.user_id)?
            .ok_or(VerificationError::ApplicantNotFound(document.user_id))?;

        let format_valid = kind.is_well_formed(&number);
        let name_match = same_name(&name, &applicant.name);
        let dob_match = birth_date.matches(applicant.date_of_birth);
        let duplicate = match kind {
            IdentityKind::Pan => Some(
                self.stores
                    .applicants
                    .find_by_pan(&number, applicant.id)?
                    .is_some(),
            ),
            IdentityKind::Aadhaar => None,
        };

        let mut mismatches = Vec::new();
        if !format_valid {
            mismatches.push("number format invalid");
        }
        if !name_match {
            mismatches.push("name mismatch");
        }
        if !dob_match {
            mismatches.push("date of birth mismatch");
        }

        let (status, reason) = if !mismatches.is_empty() {
            (
                VerificationStatus::ReuploadRequired,
                Some(mismatches.join(", ")),
            )
        } else if duplicate == Some(true) {
            (
                VerificationStatus::OnHold,
                Some(REASON_DUPLICATE_PAN.to_string()),
            )
        } else {
            (VerificationStatus::Verified, None)
        };

        let applicant_update = match (kind, status) {
            (IdentityKind::Aadhaar, VerificationStatus::Verified) => Some((
                applicant.id,
                ApplicantUpdate {
                    aadhaar_last4: Some(last_four(&number)),
                    aadhaar_verified: Some(true),
                },
            )),
            _ => None,
        };

        Ok(Assessment {
            status,
            findings: VerificationFindings {
                reason,
                identity_number: Some(recorded_number),
                registry_match: Some(true),
                format_valid: Some(format_valid),
                name_match: Some(name_match),
                dob_match: Some(dob_match),
                duplicate,
                father_name,
                ..VerificationFindings::default()
            },
            applicant_update,
        })
    }
}

fn assess_salary_slip(text: &str) -> Assessment {
    match extraction::extract_net_monthly_pay(text) {
        Some(income) => Assessment::stop(
            VerificationStatus::Verified,
            VerificationFindings {
                monthly_income: Some(income),
                ..VerificationFindings::default()
            },
        ),
        None => Assessment::stop(
            VerificationStatus::ReuploadRequired,
            VerificationFindings::with_reason(REASON_INCOMPLETE),
        ),
    }
}

fn assess_bank_statement(text: &str) -> Assessment {
    match extraction::extract_existing_emis(text) {
        Some(total) => Assessment::stop(
            VerificationStatus::Verified,
            VerificationFindings {
                existing_emis: Some(total),
                ..VerificationFindings::default()
            },
        ),
        None => Assessment::stop(
            VerificationStatus::ReuploadRequired,
            VerificationFindings::with_reason(REASON_INCOMPLETE),
        ),
    }
}

fn same_name(extracted: &str, stored: &str) -> bool {
    let collapse = |name: &str| name.split_whitespace().collect::<Vec<_>>().join(" ");
    collapse(extracted).to_lowercase() == collapse(stored).to_lowercase()
}

fn last_four(number: &str) -> String {
    let skip = number.chars().count().saturating_sub(4);
    number.chars().skip(skip).collect()
}

fn mask(number: &str) -> String {
    let visible = last_four(number);
    let hidden = number.chars().count().saturating_sub(visible.chars().count());
    format!("{}{}", "X".repeat(hidden), visible)
}
