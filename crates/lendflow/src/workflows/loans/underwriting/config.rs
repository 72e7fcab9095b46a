use serde::{Deserialize, Serialize};

/// Policy dials for the affordability rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnderwritingConfig {
    pub annual_interest_rate: f64,
    pub min_monthly_income: f64,
    pub max_foir: f64,
    /// Treat PAN as verified when no explicit KYC record exists for the loan.
    pub pan_verified_without_kyc: bool,
}

impl UnderwritingConfig {
    pub fn monthly_rate(&self) -> f64 {
        self.annual_interest_rate / 12.0
    }
}

impl Default for UnderwritingConfig {
    fn default() -> Self {
        Self {
            annual_interest_rate: 0.14,
            min_monthly_income: 10_000.0,
            max_foir: 0.5,
            pan_verified_without_kyc: true,
        }
    }
}
