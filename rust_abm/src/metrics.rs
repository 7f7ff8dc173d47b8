use serde::{Deserialize, Serialize};

use crate::markets::mortgage;
use crate::state::WorldState;

/// Aggregate indicators recorded once per simulation period.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodRecord {
    pub period: u64,
    pub acquired_homes: usize,
    pub existing_homes: usize,
    pub unmet_demand: u32,
    pub sale_price: f64,
    pub listing_price: f64,
    pub reserve: u32,
    /// Houses still listed at the end of the transactions phase.
    pub alt_reserve: usize,
    pub production: u32,
    pub sales: u32,
    pub population: usize,
    pub fertility: usize,
    pub average_age: f64,
    pub average_wealth: f64,
    pub lowest_wealth: f64,
    pub highest_wealth: f64,
    pub cash_purchases: u32,
    pub mortgage_purchases: u32,
    pub births: u32,
    pub deaths: u32,
    pub hai: f64,
    pub pir: f64,
    pub government_reserve: f64,
    pub taxes: f64,
    pub transfer_spending: f64,
    pub program_spending: f64,
    pub inheritance_income: f64,
    pub average_will_to_buy: f64,
}

impl PeriodRecord {
    /// Every indicator as a named scalar, in a fixed order.
    pub fn fields(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("period", self.period as f64),
            ("acquired_homes", self.acquired_homes as f64),
            ("existing_homes", self.existing_homes as f64),
            ("unmet_demand", self.unmet_demand as f64),
            ("sale_price", self.sale_price),
            ("listing_price", self.listing_price),
            ("reserve", self.reserve as f64),
            ("alt_reserve", self.alt_reserve as f64),
            ("production", self.production as f64),
            ("sales", self.sales as f64),
            ("population", self.population as f64),
            ("fertility", self.fertility as f64),
            ("average_age", self.average_age),
            ("average_wealth", self.average_wealth),
            ("lowest_wealth", self.lowest_wealth),
            ("highest_wealth", self.highest_wealth),
            ("cash_purchases", self.cash_purchases as f64),
            ("mortgage_purchases", self.mortgage_purchases as f64),
            ("births", self.births as f64),
            ("deaths", self.deaths as f64),
            ("hai", self.hai),
            ("pir", self.pir),
            ("government_reserve", self.government_reserve),
            ("taxes", self.taxes),
            ("transfer_spending", self.transfer_spending),
            ("program_spending", self.program_spending),
            ("inheritance_income", self.inheritance_income),
            ("average_will_to_buy", self.average_will_to_buy),
        ]
    }

    /// Look up one indicator by name.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.fields()
            .into_iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value)
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn ratio_or_zero(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 || !denominator.is_finite() {
        0.0
    } else {
        numerator / denominator
    }
}

/// Mean wage plus the period's transfers spread over the population.
fn income_per_buyer(state: &WorldState) -> f64 {
    let population = state.buyers.len();
    if population == 0 {
        return 0.0;
    }
    let transfers = state.counters.transfer_spending / population as f64;
    mean(state.buyers.values().map(|b| b.wage)) + transfers
}

/// Price-to-income ratio: latest sale price over a year of income.
pub fn compute_pir(state: &WorldState) -> f64 {
    ratio_or_zero(state.seller.sale_price(), 12.0 * income_per_buyer(state))
}

/// Housing affordability index: income over the income needed to carry a
/// typical mortgage at the affordability payment share.
pub fn compute_hai(state: &WorldState) -> f64 {
    let cfg = &state.config;
    let income = income_per_buyer(state);
    let price = state.seller.sale_price();

    let rate = if state.counters.mortgage_rates.is_empty() {
        state.mortgage_rate
    } else {
        mean(state.counters.mortgage_rates.iter().copied())
    };
    let duration = if state.mortgage_durations.is_empty() {
        cfg.fallback_mortgage_duration
    } else {
        mean(state.mortgage_durations.iter().map(|&d| d as f64))
    };
    let overpay = mortgage::overpay_ratio(rate / 12.0, duration);
    let required_income =
        (1.0 / cfg.affordability_payment_share) * cfg.loan_to_value() * price * overpay / duration;
    ratio_or_zero(income, required_income)
}

/// Snapshot the indicators at the end of a period.
pub fn collect(state: &WorldState, period: u64) -> PeriodRecord {
    let buyers = || state.buyers.values();
    let population = state.buyers.len();

    let (lowest_wealth, highest_wealth) = if population == 0 {
        (0.0, 0.0)
    } else {
        buyers().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), b| {
            (lo.min(b.wealth), hi.max(b.wealth))
        })
    };

    let seller = &state.seller;
    PeriodRecord {
        period,
        acquired_homes: buyers().map(|b| b.houses.len()).sum(),
        existing_homes: state.houses.len(),
        unmet_demand: state.counters.unmet_demand,
        sale_price: seller.sale_price(),
        listing_price: seller.listing_price(),
        reserve: seller.reserve,
        alt_reserve: state.pool.len(),
        production: seller.produce_history.last().copied().unwrap_or_default(),
        sales: seller.sold_history.last().copied().unwrap_or_default(),
        population,
        fertility: buyers().map(|b| b.n_children()).sum(),
        average_age: mean(buyers().map(|b| b.age as f64)),
        average_wealth: mean(buyers().map(|b| b.wealth)),
        lowest_wealth,
        highest_wealth,
        cash_purchases: state.counters.cash_purchases,
        mortgage_purchases: state.counters.mortgage_purchases,
        births: state.counters.births,
        deaths: state.counters.deaths,
        hai: compute_hai(state),
        pir: compute_pir(state),
        government_reserve: state.government.money_reserve,
        taxes: state.government.taxes,
        transfer_spending: state.counters.transfer_spending,
        program_spending: state.government.program_spending,
        inheritance_income: state.government.inheritance_income,
        average_will_to_buy: mean(buyers().map(|b| b.will_to_buy)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_lookup_matches_fields() {
        let record = PeriodRecord {
            period: 3,
            sales: 7,
            hai: 1.25,
            ..PeriodRecord::default()
        };
        assert_eq!(record.get("period"), Some(3.0));
        assert_eq!(record.get("sales"), Some(7.0));
        assert_eq!(record.get("hai"), Some(1.25));
        assert_eq!(record.get("no_such_series"), None);
    }

    #[test]
    fn field_names_are_unique() {
        let names: Vec<&str> = PeriodRecord::default()
            .fields()
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        let mut deduped = names.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(names.len(), deduped.len());
    }

    #[test]
    fn zero_denominators_yield_zero() {
        assert_eq!(ratio_or_zero(5.0, 0.0), 0.0);
        assert_eq!(mean(std::iter::empty()), 0.0);
    }
}
