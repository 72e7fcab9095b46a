//! Deterministic stand-ins for the conversational stage agents.
//!
//! They ask only for what the loan snapshot is missing and raise the stage signal once the
//! snapshot is complete, so the pipeline runs end to end without a model endpoint.

use async_trait::async_trait;
use lendflow::workflows::loans::{
    AgentReply, GatewayError, LoanSnapshot, StageAgent, StageContext, StageSignal,
};

pub(crate) struct RuleSalesAgent;

impl RuleSalesAgent {
    fn missing_terms(loan: &LoanSnapshot) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if loan.amount.is_none() {
            missing.push("the loan amount");
        }
        if loan.tenure_months.is_none() {
            missing.push("the tenure in months");
        }
        if loan.monthly_income.is_none() {
            missing.push("your monthly income");
        }
        missing
    }
}

#[async_trait]
impl StageAgent for RuleSalesAgent {
    async fn invoke(&self, context: &StageContext) -> Result<AgentReply, GatewayError> {
        let loan = &context.loan;
        if !loan.pan_on_file {
            return Ok(AgentReply::Text(
                "We need your PAN on file before we can continue. Please contact support to \
                 update your profile."
                    .to_string(),
            ));
        }

        let missing = Self::missing_terms(loan);
        if missing.is_empty() {
            return Ok(AgentReply::Signal(StageSignal::ReadyForVerification));
        }

        let greeting = loan
            .applicant_name
            .as_deref()
            .map(|name| format!("Thanks, {name}. "))
            .unwrap_or_default();
        Ok(AgentReply::Text(format!(
            "{greeting}Could you share {}?",
            missing.join(" and ")
        )))
    }
}

pub(crate) struct RuleDocumentationAgent;

#[async_trait]
impl StageAgent for RuleDocumentationAgent {
    async fn invoke(&self, context: &StageContext) -> Result<AgentReply, GatewayError> {
        let missing = &context.loan.missing_documents;
        if missing.is_empty() {
            return Ok(AgentReply::Signal(StageSignal::UploadsComplete));
        }

        let names: Vec<_> = missing.iter().map(|doc| doc.display_name()).collect();
        Ok(AgentReply::Text(format!(
            "We are still waiting for: {}. Upload them and send a message when you are done.",
            names.join(", ")
        )))
    }
}
