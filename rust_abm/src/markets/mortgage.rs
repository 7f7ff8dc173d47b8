//! Mortgage arithmetic shared by buyers, the government subsidy and the
//! affordability indicator.

/// Returned by [`overpay_ratio`] when the annuity factor is undefined.
pub const ZERO_RATE_OVERPAY: f64 = 1.0;

/// Monthly rate equivalent to an annual rate under monthly compounding.
pub fn monthly_rate(annual_rate: f64) -> f64 {
    (1.0 + annual_rate).powf(1.0 / 12.0) - 1.0
}

/// Annual rate produced by compounding a monthly rate twelve times.
pub fn annual_rate(monthly: f64) -> f64 {
    (1.0 + monthly).powi(12) - 1.0
}

/// Payment per period per unit of principal for an amortizing loan.
///
/// Falls back to straight-line repayment when the rate is zero or the
/// compounding denominator degenerates.
pub fn annuity_factor(monthly: f64, periods: f64) -> f64 {
    let periods = periods.max(1.0);
    let growth = (1.0 + monthly).powf(periods) - 1.0;
    if monthly.abs() < 1e-12 || !growth.is_finite() || growth <= 0.0 {
        return ZERO_RATE_OVERPAY / periods;
    }
    monthly + monthly / growth
}

/// Total amount repaid per unit of principal over the loan's life.
pub fn overpay_ratio(monthly: f64, periods: f64) -> f64 {
    let ratio = annuity_factor(monthly, periods) * periods.max(1.0);
    if ratio.is_finite() {
        ratio
    } else {
        ZERO_RATE_OVERPAY
    }
}

/// Monthly payment on `principal`.
pub fn monthly_payment(monthly: f64, periods: f64, principal: f64) -> f64 {
    annuity_factor(monthly, periods) * principal
}

/// The monthly rate a lender would charge once the subsidy `help` (an annual
/// rate) is added on top of the borrower's rate.
pub fn subsidized_monthly_rate(monthly: f64, help: f64) -> f64 {
    monthly_rate(annual_rate(monthly) + help)
}

/// Rates on offer in the current period.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MortgageRates {
    pub market: f64,
    /// Preferential rate for buyers under the youth age.
    pub youth: f64,
    /// Preferential rate for households with enough children.
    pub family: f64,
}

/// A loan being repaid by a buyer.
#[derive(Clone, Debug, PartialEq)]
pub struct Mortgage {
    pub monthly_payment: f64,
    pub remaining_periods: u32,
}

impl Mortgage {
    pub fn new(monthly_payment: f64, remaining_periods: u32) -> Self {
        Mortgage {
            monthly_payment,
            remaining_periods,
        }
    }

    /// Count one payment. Returns `true` once the loan is repaid.
    pub fn advance(&mut self) -> bool {
        self.remaining_periods = self.remaining_periods.saturating_sub(1);
        self.remaining_periods == 0
    }
}

#[cfg(test)]
mod tests {
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    use super::*;

    #[test]
    fn monthly_and_annual_rates_invert() {
        let m = monthly_rate(0.16);
        assert_relative_eq!(annual_rate(m), 0.16, max_relative = 1e-12);
    }

    #[test]
    fn zero_rate_uses_sentinel() {
        assert_eq!(overpay_ratio(0.0, 120.0), ZERO_RATE_OVERPAY);
        assert_abs_diff_eq!(monthly_payment(0.0, 100.0, 1_000.0), 10.0, epsilon = 1e-12);
    }

    #[test]
    fn overpay_exceeds_one_for_positive_rates() {
        let ratio = overpay_ratio(monthly_rate(0.1), 240.0);
        assert!(ratio > 1.0);
        // Known annuity: 10% annual, 20 years, roughly 2.24x
        assert_abs_diff_eq!(ratio, 2.2, epsilon = 0.1);
    }

    #[test]
    fn single_period_loan_repays_principal_plus_interest() {
        let m = monthly_rate(0.12);
        assert_relative_eq!(overpay_ratio(m, 1.0), 1.0 + m, max_relative = 1e-12);
        // Durations below one are floored
        assert_eq!(overpay_ratio(m, 0.0), overpay_ratio(m, 1.0));
    }

    #[test]
    fn no_help_keeps_rate_unchanged() {
        let m = monthly_rate(0.06);
        assert_relative_eq!(subsidized_monthly_rate(m, 0.0), m, max_relative = 1e-12);
        assert!(subsidized_monthly_rate(m, 0.1) > m);
    }

    #[test]
    fn mortgage_advances_to_completion() {
        let mut loan = Mortgage::new(100.0, 2);
        assert!(!loan.advance());
        assert!(loan.advance());
        assert_eq!(loan.remaining_periods, 0);
    }
}
