//! Personal-loan pipeline: sales intake, document verification, underwriting and sanction.
//!
//! [`LoanStageOrchestrator`] is the entry point. It owns a [`VerificationPipeline`] and an
//! [`UnderwritingService`] and talks to the outside world only through the traits in
//! [`gateway`], [`registry`], [`repository`] and [`sanction`].

pub mod domain;
pub mod extraction;
pub mod gateway;
pub mod memory;
pub mod orchestrator;
pub mod registry;
pub mod repository;
pub mod router;
pub mod sanction;
pub mod underwriting;
pub mod verification;

#[cfg(test)]
mod tests;

pub use domain::{
    Applicant, ApplicantUpdate, Document, DocumentStatus, DocumentType, LoanApplication,
    LoanFieldUpdate, LoanId, LoanStatus, NewVerificationResult, UnderwritingRecord, UserId,
    VerificationFindings, VerificationKind, VerificationResult, VerificationStatus,
};
pub use gateway::{recognize_document, GatewayError, ObjectStorage, RecognitionService};
pub use memory::{InMemoryLoanStore, InMemoryObjectStorage};
pub use orchestrator::{
    AgentReply, LoanSnapshot, LoanStageOrchestrator, OrchestratorDeps, OrchestratorError, Stage,
    StageAgent, StageAgents, StageContext, StageReply, StageSignal,
};
pub use registry::{CsvRegistry, IdentityKind, RegistryError, RegistryLookup};
pub use repository::{
    ApplicantDirectory, DocumentRepository, DocumentStatusView, LoanRepository, LoanStatusView,
    LoanStores, RepositoryError, UnderwritingRepository, VerificationRepository,
};
pub use router::loan_router;
pub use sanction::{SanctionError, SanctionLetterGenerator, StoredSanctionLetterGenerator};
pub use underwriting::{
    calculate_emi, calculate_foir, RejectionReason, UnderwritingConfig, UnderwritingDecision,
    UnderwritingEngine, UnderwritingError, UnderwritingInput, UnderwritingOutcome,
    UnderwritingService,
};
pub use verification::{VerificationError, VerificationPipeline};
