use crate::infra::{stage_agents, Pipeline, PlainTextRecognizer};
use chrono::NaiveDate;
use clap::Args;
use lendflow::config::{AppConfig, LendingConfig};
use lendflow::error::AppError;
use lendflow::workflows::loans::{
    Applicant, CsvRegistry, DocumentType, InMemoryLoanStore, InMemoryObjectStorage, LoanId,
    LoanStageOrchestrator, LoanStatusView, ObjectStorage, OrchestratorError, UnderwritingEngine,
    UnderwritingInput, UserId,
};
use std::io::Cursor;
use std::sync::Arc;

const DEMO_PAN: &str = "ABCDE1234F";
const DEMO_AADHAAR: &str = "4321 8765 2109";

#[derive(Args, Debug)]
pub(crate) struct EmiArgs {
    /// Requested principal
    #[arg(long)]
    pub(crate) amount: f64,
    /// Tenure in months
    #[arg(long)]
    pub(crate) tenure: u32,
    /// Net monthly income
    #[arg(long)]
    pub(crate) income: f64,
    /// Sum of EMIs the applicant already pays
    #[arg(long, default_value_t = 0.0)]
    pub(crate) existing_emis: f64,
    /// Treat PAN as unverified
    #[arg(long)]
    pub(crate) pan_unverified: bool,
    /// Raise the fraud flag
    #[arg(long)]
    pub(crate) fraud: bool,
}

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Loan amount the demo applicant asks for
    #[arg(long, default_value_t = 250_000.0)]
    pub(crate) amount: f64,
    /// Tenure in months
    #[arg(long, default_value_t = 36)]
    pub(crate) tenure: u32,
    /// Net monthly pay printed on the demo salary slip
    #[arg(long, default_value_t = 65_000.0)]
    pub(crate) income: f64,
    /// Existing EMI debited on the demo bank statement
    #[arg(long, default_value_t = 6_500.0)]
    pub(crate) existing_emi: f64,
}

pub(crate) fn run_emi(args: EmiArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let engine = UnderwritingEngine::new(config.lending.underwriting);

    let proposed_emi = engine.proposed_emi(args.amount, args.tenure);
    let decision = engine.evaluate(&UnderwritingInput {
        application_id: "cli".to_string(),
        monthly_income: args.income,
        existing_emis: args.existing_emis,
        proposed_emi,
        pan_verified: !args.pan_unverified,
        fraud_flag: args.fraud,
    });

    println!("Loan affordability");
    println!(
        "- {:.2} over {} months at {:.2}% p.a.",
        args.amount,
        args.tenure,
        engine.config().annual_interest_rate * 100.0
    );
    println!("- Proposed EMI: {proposed_emi:.2}");
    println!(
        "- FOIR: {:.2}% (limit {:.0}%)",
        decision.foir * 100.0,
        engine.config().max_foir * 100.0
    );
    match decision.rejection_reason() {
        None => println!("- Decision: approved"),
        Some(reason) => println!("- Decision: not approved ({reason})"),
    }

    Ok(())
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    println!("Loan desk demo (rule-based agents, in-memory stores)");
    let view = drive_demo(&args).await?;

    println!("\nFinal status");
    match serde_json::to_string_pretty(&view) {
        Ok(rendered) => println!("{rendered}"),
        Err(err) => println!("  (status view unavailable: {err})"),
    }
    Ok(())
}

async fn drive_demo(args: &DemoArgs) -> Result<LoanStatusView, AppError> {
    let storage = Arc::new(InMemoryObjectStorage::default());
    let registry = CsvRegistry::from_reader(Cursor::new(format!(
        "pan,aadhaar\n{DEMO_PAN},{DEMO_AADHAAR}\n"
    )))?;
    let orchestrator = Pipeline {
        store: Arc::new(InMemoryLoanStore::with_applicants([demo_applicant()])),
        storage: storage.clone(),
        recognizer: Arc::new(PlainTextRecognizer),
        registry: Arc::new(registry),
        agents: stage_agents(None, None, None),
    }
    .into_orchestrator(&LendingConfig::default());

    let loan = orchestrator.start_loan(UserId(1)).await?;
    println!("- Started loan #{} for applicant 1 -> {}", loan.id, loan.status);

    let conversation = [
        format!(
            "Hi, I need a loan of {:.0} over {} months",
            args.amount, args.tenure
        ),
        format!("My monthly salary is {:.0}", args.income),
    ];
    for message in &conversation {
        say(&orchestrator, loan.id, message).await?;
    }

    println!("\nUploading documents");
    for (document_type, text) in demo_documents(args) {
        let key = format!("uploads/loan-{}/{}.txt", loan.id, document_type.label());
        let reference = storage
            .store(&key, text.into_bytes())
            .await
            .map_err(std::io::Error::other)?;
        orchestrator
            .register_document(loan.id, document_type, reference.clone())
            .await?;
        println!("- {} -> {reference}", document_type.display_name());
    }

    println!();
    for message in [
        "I have uploaded all my documents",
        "Any update on my application?",
        "Please share the sanction letter",
    ] {
        say(&orchestrator, loan.id, message).await?;
    }

    Ok(orchestrator.status(loan.id)?)
}

async fn say(
    orchestrator: &LoanStageOrchestrator,
    loan_id: LoanId,
    message: &str,
) -> Result<(), OrchestratorError> {
    println!("> {message}");
    let reply = orchestrator.handle(loan_id, message).await?;
    let status = reply
        .status
        .map(|status| status.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    println!("< [{status}] {}", reply.message);
    Ok(())
}

fn demo_applicant() -> Applicant {
    Applicant {
        id: UserId(1),
        name: "Asha Verma".to_string(),
        date_of_birth: NaiveDate::from_ymd_opt(1990, 2, 14),
        pan_number: Some(DEMO_PAN.to_string()),
        aadhaar_last4: None,
        aadhaar_verified: false,
    }
}

fn demo_documents(args: &DemoArgs) -> Vec<(DocumentType, String)> {
    vec![
        (
            DocumentType::Pan,
            format!(
                "INCOME TAX DEPARTMENT\nName: Asha Verma\nFather's Name: Ravi Verma\n\
                 Date of Birth: 14/02/1990\nPermanent Account Number: {DEMO_PAN}\n"
            ),
        ),
        (
            DocumentType::Aadhaar,
            format!("Government of India\nName: Asha Verma\nDOB: 14/02/1990\n{DEMO_AADHAAR}\n"),
        ),
        (
            DocumentType::SalarySlip,
            format!("Payslip\nNet Pay: Rs. {:.2}\n", args.income),
        ),
        (
            DocumentType::BankStatement,
            format!(
                "01/03 SALARY CREDIT {:.2}\n05/03 CAR LOAN EMI {:.2}\n",
                args.income, args.existing_emi
            ),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn demo_runs_to_a_sanctioned_loan() {
        let args = DemoArgs {
            amount: 250_000.0,
            tenure: 36,
            income: 65_000.0,
            existing_emi: 6_500.0,
        };

        let view = drive_demo(&args).await.expect("demo completes");

        assert_eq!(view.status, "SANCTIONED");
        assert!(view.foir.expect("foir recorded") < 0.5);
        assert_eq!(
            view.sanction_reference.as_deref(),
            Some("memory://sanction-letters/loan-1.txt")
        );
    }

    #[test]
    fn demo_documents_cover_every_type() {
        let args = DemoArgs {
            amount: 100_000.0,
            tenure: 12,
            income: 40_000.0,
            existing_emi: 0.0,
        };
        let types: Vec<_> = demo_documents(&args)
            .into_iter()
            .map(|(document_type, _)| document_type)
            .collect();
        assert_eq!(types, DocumentType::ALL.to_vec());
    }
}
