use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for loan applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoanId(pub u64);

impl fmt::Display for LoanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier wrapper for applicants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a loan application. Declaration order is the only legal direction of travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanStatus {
    Initiated,
    KycPending,
    Verified,
    Approved,
    Rejected,
    Sanctioned,
}

impl LoanStatus {
    pub const fn label(self) -> &'static str {
        match self {
            LoanStatus::Initiated => "INITIATED",
            LoanStatus::KycPending => "KYC_PENDING",
            LoanStatus::Verified => "VERIFIED",
            LoanStatus::Approved => "APPROVED",
            LoanStatus::Rejected => "REJECTED",
            LoanStatus::Sanctioned => "SANCTIONED",
        }
    }

    /// Forward-only transition check. KYC_PENDING may re-enter itself on re-upload.
    pub fn can_advance_to(self, next: LoanStatus) -> bool {
        match (self, next) {
            (LoanStatus::KycPending, LoanStatus::KycPending) => true,
            (LoanStatus::Rejected, _) => false,
            (LoanStatus::Approved, LoanStatus::Rejected) => false,
            (current, next) => next > current,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LoanStatus::Rejected | LoanStatus::Sanctioned)
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Persisted loan application. Amount, tenure and income are editable only while INITIATED.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanApplication {
    pub id: LoanId,
    pub user_id: UserId,
    pub status: LoanStatus,
    pub amount: Option<f64>,
    pub tenure_months: Option<u32>,
    pub monthly_income: Option<f64>,
    pub sanction_reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LoanApplication {
    pub fn new(id: LoanId, user_id: UserId) -> Self {
        Self {
            id,
            user_id,
            status: LoanStatus::Initiated,
            amount: None,
            tenure_months: None,
            monthly_income: None,
            sanction_reference: None,
            created_at: Utc::now(),
        }
    }

    pub fn terms_complete(&self) -> bool {
        self.amount.is_some() && self.tenure_months.is_some() && self.monthly_income.is_some()
    }
}

/// Sales-stage edits to the loan terms. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoanFieldUpdate {
    pub amount: Option<f64>,
    pub tenure_months: Option<u32>,
    pub monthly_income: Option<f64>,
}

impl LoanFieldUpdate {
    pub fn is_empty(&self) -> bool {
        self.amount.is_none() && self.tenure_months.is_none() && self.monthly_income.is_none()
    }
}

/// Applicant identity shared by verification (read/write) and underwriting (read only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Applicant {
    pub id: UserId,
    pub name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub pan_number: Option<String>,
    pub aadhaar_last4: Option<String>,
    pub aadhaar_verified: bool,
}

/// Fields written back onto the applicant after a successful Aadhaar verification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicantUpdate {
    pub aadhaar_last4: Option<String>,
    pub aadhaar_verified: Option<bool>,
}

/// Uploadable document categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    Pan,
    Aadhaar,
    SalarySlip,
    BankStatement,
}

impl DocumentType {
    pub const ALL: [DocumentType; 4] = [
        DocumentType::Pan,
        DocumentType::Aadhaar,
        DocumentType::SalarySlip,
        DocumentType::BankStatement,
    ];

    /// Types that must be present before verification runs.
    pub const REQUIRED_FOR_VERIFICATION: [DocumentType; 3] = [
        DocumentType::Pan,
        DocumentType::Aadhaar,
        DocumentType::SalarySlip,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            DocumentType::Pan => "PAN",
            DocumentType::Aadhaar => "AADHAAR",
            DocumentType::SalarySlip => "SALARY_SLIP",
            DocumentType::BankStatement => "BANK_STATEMENT",
        }
    }

    pub const fn display_name(self) -> &'static str {
        match self {
            DocumentType::Pan => "PAN card",
            DocumentType::Aadhaar => "Aadhaar card",
            DocumentType::SalarySlip => "Salary slip",
            DocumentType::BankStatement => "Bank statement",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Uploaded,
    Verified,
    Rejected,
    ReuploadRequired,
    OnHold,
}

/// Uploaded document; `storage_reference` is opaque to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub loan_id: LoanId,
    pub user_id: UserId,
    pub document_type: DocumentType,
    pub storage_reference: String,
    pub status: DocumentStatus,
}

/// Kind of a verification record. Document kinds come from the pipeline; KYC records are
/// written by back-office review and only read here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationKind {
    Pan,
    Aadhaar,
    SalarySlip,
    BankStatement,
    Kyc,
}

impl From<DocumentType> for VerificationKind {
    fn from(value: DocumentType) -> Self {
        match value {
            DocumentType::Pan => VerificationKind::Pan,
            DocumentType::Aadhaar => VerificationKind::Aadhaar,
            DocumentType::SalarySlip => VerificationKind::SalarySlip,
            DocumentType::BankStatement => VerificationKind::BankStatement,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Verified,
    Rejected,
    ReuploadRequired,
    OnHold,
    /// Back-office KYC approval.
    Approved,
    Fraud,
}

impl VerificationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            VerificationStatus::Verified => "VERIFIED",
            VerificationStatus::Rejected => "REJECTED",
            VerificationStatus::ReuploadRequired => "REUPLOAD_REQUIRED",
            VerificationStatus::OnHold => "ON_HOLD",
            VerificationStatus::Approved => "APPROVED",
            VerificationStatus::Fraud => "FRAUD",
        }
    }

    pub fn document_status(self) -> DocumentStatus {
        match self {
            VerificationStatus::Verified | VerificationStatus::Approved => {
                DocumentStatus::Verified
            }
            VerificationStatus::Rejected | VerificationStatus::Fraud => DocumentStatus::Rejected,
            VerificationStatus::ReuploadRequired => DocumentStatus::ReuploadRequired,
            VerificationStatus::OnHold => DocumentStatus::OnHold,
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Audit payload of a verification run: every check performed up to the stopping point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationFindings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_match: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_valid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_match: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dob_match: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub father_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly_income: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_emis: Option<f64>,
}

impl VerificationFindings {
    pub fn with_reason(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn carries_financials(&self) -> bool {
        self.monthly_income.is_some()
    }
}

/// Verification record. Created fresh on every run; never updated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Store-assigned, monotonically increasing.
    pub id: u64,
    pub loan_id: LoanId,
    pub kind: VerificationKind,
    pub status: VerificationStatus,
    pub findings: VerificationFindings,
    pub recorded_at: DateTime<Utc>,
}

/// Verification record before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewVerificationResult {
    pub loan_id: LoanId,
    pub kind: VerificationKind,
    pub status: VerificationStatus,
    pub findings: VerificationFindings,
}

/// Latest underwriting decision for a loan. Upserted, never accumulated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnderwritingRecord {
    pub loan_id: LoanId,
    pub approved: bool,
    pub foir: f64,
    pub rejection_reason: Option<String>,
    pub score: Option<f64>,
    pub manual_override: bool,
    pub input_snapshot: serde_json::Value,
    pub decided_at: DateTime<Utc>,
}
