use super::common::*;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::workflows::loans::orchestrator::{
    AGENT_UNAVAILABLE, DOCUMENTS_VERIFIED, REJECTED_TERMINAL, UPLOAD_PROMPT,
};
use crate::workflows::loans::{
    DocumentType, LoanId, LoanRepository, LoanStatus, OrchestratorError, StageAgents, UserId,
    VerificationKind, VerificationRepository,
};

#[tokio::test]
async fn unknown_loan_gets_a_local_not_found_reply() {
    let harness = Harness::new(default_agents());

    let reply = harness
        .orchestrator
        .handle(LoanId(404), "hello")
        .await
        .expect("handled");

    assert_eq!(reply.status, None);
    assert!(reply.message.contains("could not find"));
}

#[tokio::test]
async fn sales_free_text_passes_through_and_terms_are_captured() {
    let sales = ScriptedAgent::always("How long would you like to repay over?");
    let harness = Harness::new(StageAgents {
        sales: sales.clone(),
        ..default_agents()
    });
    let loan = harness
        .orchestrator
        .start_loan(UserId(1))
        .await
        .expect("loan starts");

    let reply = harness
        .orchestrator
        .handle(loan.id, "I need a loan of 3 lakh, my salary is 55,000")
        .await
        .expect("handled");

    assert_eq!(reply.message, "How long would you like to repay over?");
    assert_eq!(reply.status, Some(LoanStatus::Initiated));
    let stored = LoanRepository::get(harness.store.as_ref(), loan.id)
        .expect("readable")
        .expect("exists");
    assert_eq!(stored.amount, Some(300_000.0));
    assert_eq!(stored.monthly_income, Some(55_000.0));
    assert_eq!(stored.tenure_months, None);

    let seen = sales.seen.lock().expect("agent mutex poisoned");
    assert_eq!(seen[0].loan.amount, Some(300_000.0));
    assert_eq!(seen[0].loan.applicant_name.as_deref(), Some("Asha Verma"));
    assert_eq!(seen[0].loan.missing_documents.len(), 3);
}

#[tokio::test]
async fn sales_signal_moves_loan_to_document_collection() {
    let harness = Harness::new(default_agents());
    let loan_id = harness.loan_at(LoanStatus::Initiated).await;

    let reply = harness
        .orchestrator
        .handle(loan_id, "yes, 24 months works")
        .await
        .expect("handled");

    assert_eq!(reply.message, UPLOAD_PROMPT);
    assert_eq!(reply.status, Some(LoanStatus::KycPending));
    assert_eq!(harness.status_of(loan_id), LoanStatus::KycPending);
}

#[tokio::test]
async fn sales_signal_waits_for_amount_and_tenure() {
    let harness = Harness::new(default_agents());
    let loan = harness
        .orchestrator
        .start_loan(UserId(1))
        .await
        .expect("loan starts");

    let reply = harness
        .orchestrator
        .handle(loan.id, "hi")
        .await
        .expect("handled");
    assert_eq!(reply.status, Some(LoanStatus::Initiated));
    assert_eq!(
        reply.message,
        "Before we collect your documents, please share your loan amount and tenure."
    );

    let reply = harness
        .orchestrator
        .handle(loan.id, "I need 3 lakh")
        .await
        .expect("handled");
    assert_eq!(reply.status, Some(LoanStatus::Initiated));
    assert!(reply.message.ends_with("please share your tenure."));

    let reply = harness
        .orchestrator
        .handle(loan.id, "for 24 months")
        .await
        .expect("handled");
    assert_eq!(reply.message, UPLOAD_PROMPT);
    assert_eq!(harness.status_of(loan.id), LoanStatus::KycPending);
}

#[tokio::test]
async fn failing_or_stalled_agents_leave_status_untouched() {
    for sales in [
        Arc::new(FailingAgent) as Arc<dyn crate::workflows::loans::StageAgent>,
        Arc::new(StalledAgent),
    ] {
        let harness = Harness::new(StageAgents {
            sales,
            ..default_agents()
        });
        let loan_id = harness.loan_at(LoanStatus::Initiated).await;

        let reply = harness
            .orchestrator
            .handle(loan_id, "hi")
            .await
            .expect("handled");

        assert_eq!(reply.message, AGENT_UNAVAILABLE);
        assert_eq!(harness.status_of(loan_id), LoanStatus::Initiated);
    }
}

#[tokio::test]
async fn upload_check_reports_missing_documents() {
    let harness = Harness::new(default_agents());
    let loan_id = harness.loan_at(LoanStatus::KycPending).await;
    harness.upload(loan_id, DocumentType::Pan, &pan_text()).await;

    let reply = harness
        .orchestrator
        .handle(loan_id, "done uploading")
        .await
        .expect("handled");

    assert_eq!(reply.status, Some(LoanStatus::KycPending));
    assert!(reply.message.contains("Aadhaar card"));
    assert!(reply.message.contains("Salary slip"));
    assert!(!reply.message.contains("PAN card"));
    assert!(harness
        .store
        .list_for_loan(loan_id)
        .expect("readable")
        .is_empty());
}

#[tokio::test]
async fn verified_identity_documents_advance_the_loan() {
    let harness = Harness::new(default_agents());
    let loan_id = harness.loan_at(LoanStatus::KycPending).await;
    harness.upload_all(loan_id).await;

    let reply = harness
        .orchestrator
        .handle(loan_id, "all uploaded")
        .await
        .expect("handled");

    assert_eq!(reply.message, DOCUMENTS_VERIFIED);
    assert_eq!(harness.status_of(loan_id), LoanStatus::Verified);
    assert_eq!(
        harness
            .store
            .list_for_loan(loan_id)
            .expect("readable")
            .len(),
        4
    );
}

#[tokio::test]
async fn unverified_pan_keeps_loan_in_kyc_pending() {
    let harness = Harness::new(default_agents());
    let loan_id = harness.loan_at(LoanStatus::KycPending).await;
    harness.upload_all(loan_id).await;
    let blurry = pan_text().replace("Date of Birth: 14/02/1990\n", "");
    harness.upload(loan_id, DocumentType::Pan, &blurry).await;

    let reply = harness
        .orchestrator
        .handle(loan_id, "uploaded")
        .await
        .expect("handled");

    assert_eq!(harness.status_of(loan_id), LoanStatus::KycPending);
    assert!(reply.message.contains("PAN card (REUPLOAD_REQUIRED"));

    harness.upload(loan_id, DocumentType::Pan, &pan_text()).await;
    harness
        .orchestrator
        .handle(loan_id, "uploaded again")
        .await
        .expect("handled");
    assert_eq!(harness.status_of(loan_id), LoanStatus::Verified);
}

#[tokio::test]
async fn underwriting_approval_reports_foir() {
    let harness = Harness::new(default_agents());
    let loan_id = harness.loan_at(LoanStatus::KycPending).await;
    harness.upload_all(loan_id).await;
    harness
        .orchestrator
        .handle(loan_id, "uploaded")
        .await
        .expect("verified");

    let reply = harness
        .orchestrator
        .handle(loan_id, "what next?")
        .await
        .expect("handled");

    assert_eq!(reply.status, Some(LoanStatus::Approved));
    assert!(reply.message.contains("approved"));
    assert!(reply.message.contains('%'));
    let view = harness.orchestrator.status(loan_id).expect("status view");
    assert_eq!(view.status, "APPROVED");
    assert!(view.foir.expect("foir recorded") < 0.5);
}

#[tokio::test]
async fn underwriting_rejection_is_terminal() {
    let harness = Harness::new(default_agents());
    let loan_id = harness.loan_at(LoanStatus::Verified).await;

    let reply = harness
        .orchestrator
        .handle(loan_id, "any news?")
        .await
        .expect("handled");

    assert_eq!(reply.status, Some(LoanStatus::Rejected));
    assert!(reply
        .message
        .contains("Monthly income below minimum threshold"));

    let again = harness
        .orchestrator
        .handle(loan_id, "please reconsider")
        .await
        .expect("handled");
    assert_eq!(again.message, REJECTED_TERMINAL);
    assert_eq!(harness.status_of(loan_id), LoanStatus::Rejected);
}

#[tokio::test]
async fn approved_loan_gets_a_stored_sanction_letter() {
    let harness = Harness::new(default_agents());
    let loan_id = harness.loan_at(LoanStatus::KycPending).await;
    harness.upload_all(loan_id).await;
    for message in ["uploaded", "status?"] {
        harness
            .orchestrator
            .handle(loan_id, message)
            .await
            .expect("handled");
    }

    let reply = harness
        .orchestrator
        .handle(loan_id, "send the letter")
        .await
        .expect("handled");

    assert_eq!(reply.status, Some(LoanStatus::Sanctioned));
    let reference = format!("memory://sanction-letters/loan-{loan_id}.txt");
    assert!(reply.message.ends_with(&reference));
    let letter = harness.storage.get(&reference).expect("letter stored");
    let letter = String::from_utf8(letter).expect("utf8 letter");
    assert!(letter.contains("Asha Verma"));
    assert!(letter.contains(PAN_NUMBER));

    let follow_up = harness
        .orchestrator
        .handle(loan_id, "thanks")
        .await
        .expect("handled");
    assert!(follow_up.message.contains(&reference));
    assert_eq!(follow_up.status, Some(LoanStatus::Sanctioned));
}

#[tokio::test]
async fn underwriting_agent_gates_letter_generation() {
    let agent = ScriptedAgent::new([
        "Shall I prepare your sanction letter?",
        "READY_FOR_SANCTION_LETTER",
    ]);
    let harness = Harness::new(StageAgents {
        underwriting: Some(agent),
        ..default_agents()
    });
    let loan_id = harness.loan_at(LoanStatus::KycPending).await;
    harness.upload_all(loan_id).await;
    for message in ["uploaded", "next"] {
        harness
            .orchestrator
            .handle(loan_id, message)
            .await
            .expect("handled");
    }

    let offer = harness
        .orchestrator
        .handle(loan_id, "hmm")
        .await
        .expect("handled");
    assert_eq!(offer.message, "Shall I prepare your sanction letter?");
    assert_eq!(harness.status_of(loan_id), LoanStatus::Approved);

    let accepted = harness
        .orchestrator
        .handle(loan_id, "yes please")
        .await
        .expect("handled");
    assert_eq!(accepted.status, Some(LoanStatus::Sanctioned));
}

#[tokio::test]
async fn uploads_close_once_verification_passes() {
    let harness = Harness::new(default_agents());
    let loan_id = harness.loan_at(LoanStatus::Verified).await;

    let error = harness
        .orchestrator
        .register_document(loan_id, DocumentType::Pan, "memory://late".to_string())
        .await
        .expect_err("uploads closed");

    assert!(matches!(
        error,
        OrchestratorError::UploadsClosed {
            status: LoanStatus::Verified,
            ..
        }
    ));
}

#[tokio::test]
async fn starting_a_loan_requires_a_known_applicant() {
    let harness = Harness::new(default_agents());

    let error = harness
        .orchestrator
        .start_loan(UserId(77))
        .await
        .expect_err("unknown applicant");

    assert!(matches!(error, OrchestratorError::ApplicantNotFound(UserId(77))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_messages_for_one_loan_are_serialized() {
    let harness = Harness::new(default_agents());
    let loan_id = harness.loan_at(LoanStatus::KycPending).await;
    harness.upload_all(loan_id).await;

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let orchestrator = harness.orchestrator.clone();
            tokio::spawn(async move { orchestrator.handle(loan_id, "uploaded").await })
        })
        .collect();

    let mut statuses = BTreeSet::new();
    for handle in handles {
        let reply = handle.await.expect("task joins").expect("handled");
        statuses.insert(reply.status.expect("loan exists"));
    }

    assert_eq!(
        statuses,
        BTreeSet::from([LoanStatus::Verified, LoanStatus::Approved])
    );
    let pan_rows = harness
        .store
        .list_for_loan(loan_id)
        .expect("readable")
        .into_iter()
        .filter(|row| row.kind == VerificationKind::Pan)
        .count();
    assert_eq!(pan_rows, 1);
}
