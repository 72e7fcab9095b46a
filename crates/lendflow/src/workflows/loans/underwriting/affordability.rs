/// Equated monthly instalment for `principal` over `tenure_months` at `monthly_rate`.
///
/// A non-positive tenure collapses to a single payment; a non-positive rate to straight-line
/// repayment.
pub fn calculate_emi(principal: f64, monthly_rate: f64, tenure_months: i64) -> f64 {
    if tenure_months <= 0 {
        return principal;
    }
    if monthly_rate <= 0.0 {
        return principal / tenure_months as f64;
    }

    let compound = (1.0 + monthly_rate).powf(tenure_months as f64);
    principal * monthly_rate * compound / (compound - 1.0)
}

/// Fixed obligation to income ratio. Unusable income or a non-finite ratio yields 1.0, the
/// maximal failing value.
pub fn calculate_foir(monthly_income: f64, existing_emis: f64, proposed_emi: f64) -> f64 {
    if !monthly_income.is_finite() || monthly_income <= 0.0 {
        return 1.0;
    }

    let finite_or_zero = |value: f64| if value.is_finite() { value } else { 0.0 };
    let foir = (finite_or_zero(existing_emis) + finite_or_zero(proposed_emi)) / monthly_income;

    if foir.is_finite() {
        foir
    } else {
        1.0
    }
}
