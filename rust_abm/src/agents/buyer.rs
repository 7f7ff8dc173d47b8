use std::collections::BTreeSet;
use std::fmt;

use krabmaga::engine::{agent::Agent, state::State};
use rand::distributions::WeightedIndex;
use rand::Rng;
use rand_distr::{ChiSquared, Distribution};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::agents::{HouseId, Owner};
use crate::config::{Config, ConfigError, WageBracket};
use crate::lambert::lambert_w0_ln;
use crate::markets::mortgage::{self, Mortgage, MortgageRates};
use crate::state::WorldState;

/// Stable identity of a buyer. Ids are never reused, so ordering by id is
/// ordering by creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BuyerId(pub u64);

impl fmt::Display for BuyerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buyer#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Financing {
    Cash,
    Mortgage,
}

/// Outcome of the household's utility maximisation for one listing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PurchasePlan {
    pub financing: Financing,
    /// Whole houses the household would like to own.
    pub units: usize,
    pub annual_rate: f64,
    /// Remaining lifetime in periods, also the mortgage term.
    pub duration: u32,
}

/// One heir's share of an estate.
#[derive(Clone, Debug, PartialEq)]
pub struct Bequest {
    pub heir: BuyerId,
    pub money: f64,
    pub houses: Vec<HouseId>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Data stored in WorldState::buyers
// ─────────────────────────────────────────────────────────────────────────────

/// All mutable state for a single household.
#[derive(Clone, Debug)]
pub struct BuyerData {
    pub id: BuyerId,
    pub age: u32,
    pub children: Vec<BuyerId>,
    pub houses: BTreeSet<HouseId>,
    pub wage: f64,
    pub wealth: f64,
    pub will_to_buy: f64,
    pub mortgages: Vec<Mortgage>,
    pub is_informed: bool,
    pub additional_consumption: f64,
}

impl BuyerData {
    pub fn new(id: BuyerId, age: u32, wage: f64, is_informed: bool) -> Self {
        BuyerData {
            id,
            age,
            children: Vec::new(),
            houses: BTreeSet::new(),
            wage,
            wealth: 0.0,
            will_to_buy: 0.0,
            mortgages: Vec::new(),
            is_informed,
            additional_consumption: 0.0,
        }
    }

    pub fn n_children(&self) -> usize {
        self.children.len()
    }

    pub fn mortgage_monthly_payment(&self) -> f64 {
        self.mortgages.iter().map(|m| m.monthly_payment).sum()
    }

    pub fn disposable_income(&self, cfg: &Config) -> f64 {
        self.wage * (1.0 - cfg.income_tax)
            - cfg.autonomous_consumption
            - self.mortgage_monthly_payment()
    }

    /// Periods left before the certain-death age, never less than one.
    pub fn remaining_lifetime(&self, cfg: &Config) -> u32 {
        cfg.old_age.saturating_sub(self.age).max(1)
    }

    /// Children plus the parent, boosted while the household owns nothing.
    pub fn household_size(&self, cfg: &Config) -> f64 {
        let size = self.n_children() as f64 + 1.0;
        if self.houses.is_empty() {
            size + cfg.first_home_bonus
        } else {
            size
        }
    }

    /// The cheapest rate the buyer qualifies for.
    pub fn applicable_rate(&self, rates: &MortgageRates, cfg: &Config) -> f64 {
        let mut rate = rates.market;
        if self.age < cfg.youth_age {
            rate = rate.min(rates.youth);
        }
        if self.n_children() >= cfg.family_children_threshold as usize {
            rate = rate.min(rates.family);
        }
        rate
    }

    // ─── Step sub-methods ───────────────────────────────────────────────────

    /// Earn, pay tax and the mortgage, consume. Returns the tax owed.
    ///
    /// Buyers at or below the adolescence age have no income effect.
    pub fn work_and_consume(&mut self, cfg: &Config) -> f64 {
        if self.age <= cfg.adolescence_age {
            return 0.0;
        }
        let tax = self.wage * cfg.income_tax;
        self.wealth += self.disposable_income(cfg) - self.additional_consumption;
        self.mortgages.retain_mut(|loan| !loan.advance());
        tax
    }

    pub fn can_have_children(&self, cfg: &Config) -> bool {
        self.age > cfg.adolescence_age && self.age < cfg.climax_age
    }

    pub fn accumulate_will_to_buy(&mut self) {
        self.will_to_buy += (self.n_children() as f64 + 1.0) / (self.houses.len() as f64 + 1.0);
    }

    /// Death is certain at the old age and a Bernoulli draw for adults.
    pub fn draws_death<R: Rng + ?Sized>(&self, cfg: &Config, rng: &mut R) -> bool {
        if self.age >= cfg.old_age {
            return true;
        }
        self.age > cfg.adolescence_age && rng.gen_bool(cfg.death_probability)
    }

    pub fn receive_inheritance(&mut self, money: f64, houses: impl IntoIterator<Item = HouseId>) {
        self.wealth += money;
        self.houses.extend(houses);
    }

    /// Choose financing and the number of houses worth owning at `price`.
    ///
    /// Utility is `housing^size * residual consumption`; its optimum has a
    /// closed form in the principal Lambert W branch. Cash spends current
    /// wealth; the mortgage path spends predicted lifetime wealth against a
    /// 30% down payment plus the amortized remainder. Also sets the period's
    /// discretionary consumption for adults.
    pub fn plan_purchase(
        &mut self,
        price: f64,
        rates: &MortgageRates,
        cfg: &Config,
    ) -> PurchasePlan {
        let duration = self.remaining_lifetime(cfg);
        let periods = duration as f64;
        let predicted_wealth = self.wealth + self.disposable_income(cfg) * periods;

        let annual_rate = self.applicable_rate(rates, cfg);
        let overpay = mortgage::overpay_ratio(mortgage::monthly_rate(annual_rate), periods);
        let size = self.household_size(cfg);

        let cash_units = optimal_units(self.wealth, size, price);
        let mortgage_unit_cost = price * (cfg.down_payment_share + cfg.loan_to_value() * overpay);
        let mortgage_units = optimal_units(predicted_wealth, size, mortgage_unit_cost);

        let (financing, units, home_cost) = if cash_units > mortgage_units {
            let units = cash_units.floor();
            (Financing::Cash, units, units * price)
        } else {
            let units = mortgage_units.floor();
            (Financing::Mortgage, units, units * price * overpay)
        };

        if self.age > cfg.adolescence_age {
            self.additional_consumption =
                ((predicted_wealth - home_cost) * cfg.marginal_consumption_rate / periods).max(0.0);
        }

        PurchasePlan {
            financing,
            units: units as usize,
            annual_rate,
            duration,
        }
    }
}

/// Utility-maximising number of units at `unit_cost` for a budget `wealth`:
/// `wealth * size / (unit_cost * W0(size * wealth * e^size / unit_cost))`.
///
/// A non-positive budget buys nothing.
pub fn optimal_units(wealth: f64, size: f64, unit_cost: f64) -> f64 {
    if !(wealth > 0.0) || !(unit_cost > 0.0) || !wealth.is_finite() {
        return 0.0;
    }
    let ln_argument = size.ln() + wealth.ln() - unit_cost.ln() + size;
    let w = lambert_w0_ln(ln_argument);
    if !(w > 0.0) || !w.is_finite() {
        return 0.0;
    }
    wealth * size / (unit_cost * w)
}

/// Divide an estate among heirs in order: equal money shares, `n / k` houses
/// each and one extra house to each of the first `n % k` heirs.
pub fn split_estate(wealth: f64, houses: &BTreeSet<HouseId>, heirs: &[BuyerId]) -> Vec<Bequest> {
    if heirs.is_empty() {
        return Vec::new();
    }
    let k = heirs.len();
    let per_heir = houses.len() / k;
    let remainder = houses.len() % k;
    let money = wealth / k as f64;

    let mut remaining = houses.iter().copied();
    heirs
        .iter()
        .enumerate()
        .map(|(i, &heir)| {
            let count = per_heir + usize::from(i < remainder);
            Bequest {
                heir,
                money,
                houses: remaining.by_ref().take(count).collect(),
            }
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Population sampling
// ─────────────────────────────────────────────────────────────────────────────

/// Pre-built distributions for drawing new households.
#[derive(Clone, Debug)]
pub struct HouseholdSampler {
    brackets: Vec<WageBracket>,
    bracket_index: WeightedIndex<f64>,
    tails: Vec<Option<ChiSquared<f64>>>,
    children: WeightedIndex<f64>,
    informed_share: f64,
}

impl HouseholdSampler {
    pub fn new(cfg: &Config) -> Result<Self, ConfigError> {
        let bracket_index = WeightedIndex::new(cfg.wage_brackets.iter().map(WageBracket::weight))
            .map_err(|_| ConfigError::EmptyWageBrackets)?;
        let tails = cfg
            .wage_brackets
            .iter()
            .map(|bracket| match bracket {
                WageBracket::Uniform { .. } => Ok(None),
                WageBracket::Tail { dof, .. } => ChiSquared::new(*dof)
                    .map(Some)
                    .map_err(|_| ConfigError::NonPositive { name: "wage tail dof", value: *dof }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        let children = WeightedIndex::new(cfg.children_weights.iter().copied()).map_err(|_| {
            ConfigError::Probability {
                name: "children_weights",
                value: cfg.children_weights.iter().sum(),
            }
        })?;
        Ok(HouseholdSampler {
            brackets: cfg.wage_brackets.clone(),
            bracket_index,
            tails,
            children,
            informed_share: cfg.informed_share,
        })
    }

    pub fn wage<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let i = self.bracket_index.sample(rng);
        match (&self.brackets[i], &self.tails[i]) {
            (WageBracket::Uniform { low, width, .. }, _) => low + rng.gen::<f64>() * width,
            (WageBracket::Tail { scale, .. }, Some(chi)) => (chi.sample(rng) + 1.0) * scale,
            (WageBracket::Tail { scale, .. }, None) => *scale,
        }
    }

    pub fn children_count<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        self.children.sample(rng)
    }

    /// A household of the given age with a fresh wage and information flag.
    pub fn household<R: Rng + ?Sized>(&self, id: BuyerId, age: u32, rng: &mut R) -> BuyerData {
        let wage = self.wage(rng);
        let informed = rng.gen_bool(self.informed_share);
        BuyerData::new(id, age, wage, informed)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Demographics phase
// ─────────────────────────────────────────────────────────────────────────────

/// Age every buyer by one period, in id order over the population present at
/// phase start.
///
/// Adults earn and pay tax, may have a child below the climax age and may
/// die; estates are settled immediately so later buyers see their inheritance.
pub fn run_demographics(state: &mut WorldState) {
    let birth_probability = state.config.birth_probability;

    let ids: Vec<BuyerId> = state.buyers.keys().copied().collect();
    for id in ids {
        let Some(buyer) = state.buyers.get_mut(&id) else {
            continue;
        };

        let tax = buyer.work_and_consume(&state.config);
        state.government.collect_income_tax(tax);

        let newborn =
            buyer.can_have_children(&state.config) && state.rng.gen_bool(birth_probability);
        let child_id = if newborn {
            let child_id = BuyerId(state.next_buyer_id);
            state.next_buyer_id += 1;
            buyer.children.push(child_id);
            Some(child_id)
        } else {
            None
        };
        buyer.accumulate_will_to_buy();

        let dies = buyer.draws_death(&state.config, &mut state.rng);
        if !dies {
            buyer.age += 1;
        }

        if let Some(child_id) = child_id {
            let child = state.sampler.household(child_id, 0, &mut state.rng);
            state.buyers.insert(child_id, child);
            state.counters.births += 1;
        }
        if dies {
            settle_estate(state, id);
        }
    }
}

/// Remove a buyer and pass wealth and houses to living children, or to the
/// government when there are none.
pub fn settle_estate(state: &mut WorldState, id: BuyerId) {
    let Some(deceased) = state.buyers.remove(&id) else {
        return;
    };
    state.counters.deaths += 1;

    let heirs: Vec<BuyerId> = deceased
        .children
        .iter()
        .copied()
        .filter(|child| state.buyers.contains_key(child))
        .collect();

    if heirs.is_empty() {
        for house in &deceased.houses {
            state.houses[house.0].change_owner(Owner::Government);
        }
        debug!(
            buyer = %id,
            wealth = deceased.wealth,
            houses = deceased.houses.len(),
            "unclaimed estate passed to government"
        );
        state
            .government
            .receive_lost_inheritance(deceased.wealth, deceased.houses.iter().copied());
        return;
    }

    for bequest in split_estate(deceased.wealth, &deceased.houses, &heirs) {
        for house in &bequest.houses {
            state.houses[house.0].change_owner(Owner::Buyer(bequest.heir));
        }
        if let Some(heir) = state.buyers.get_mut(&bequest.heir) {
            heir.receive_inheritance(bequest.money, bequest.houses);
        }
    }
}

/// Proxy agent that runs the demographics phase within the krabmaga schedule.
#[derive(Clone)]
pub struct DemographicsAgent;

impl fmt::Display for DemographicsAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DemographicsAgent")
    }
}

impl Agent for DemographicsAgent {
    fn step(&mut self, state: &mut dyn State) {
        let state = state
            .as_any_mut()
            .downcast_mut::<WorldState>()
            .expect("state should be WorldState");
        run_demographics(state);
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn rates(cfg: &Config) -> MortgageRates {
        MortgageRates {
            market: cfg.mortgage_rate,
            youth: cfg.youth_mortgage_rate,
            family: cfg.family_mortgage_rate,
        }
    }

    fn adult(cfg: &Config) -> BuyerData {
        BuyerData::new(BuyerId(0), cfg.adolescence_age + 120, 50_000.0, true)
    }

    #[test]
    fn estate_money_is_conserved() {
        let houses: BTreeSet<HouseId> = BTreeSet::new();
        let heirs = [BuyerId(1), BuyerId(2), BuyerId(3)];
        let shares = split_estate(1_000.0, &houses, &heirs);
        let total: f64 = shares.iter().map(|b| b.money).sum();
        assert_abs_diff_eq!(total, 1_000.0, epsilon = 1e-9);
    }

    #[test]
    fn estate_houses_use_remainder_rule() {
        let houses: BTreeSet<HouseId> = (0..7).map(HouseId).collect();
        let heirs = [BuyerId(1), BuyerId(2), BuyerId(3)];
        let shares = split_estate(0.0, &houses, &heirs);

        let counts: Vec<usize> = shares.iter().map(|b| b.houses.len()).collect();
        assert_eq!(counts, vec![3, 2, 2]);

        let mut handed_out: Vec<HouseId> = shares.iter().flat_map(|b| b.houses.clone()).collect();
        handed_out.sort();
        assert_eq!(handed_out, houses.into_iter().collect::<Vec<_>>());
    }

    #[test]
    fn fewer_houses_than_heirs() {
        let houses: BTreeSet<HouseId> = [HouseId(9)].into_iter().collect();
        let heirs = [BuyerId(1), BuyerId(2)];
        let shares = split_estate(10.0, &houses, &heirs);
        assert_eq!(shares[0].houses, vec![HouseId(9)]);
        assert!(shares[1].houses.is_empty());
        assert_eq!(shares[1].money, 5.0);
    }

    #[test]
    fn remaining_lifetime_is_floored_at_one() {
        let cfg = Config::default();
        let mut buyer = adult(&cfg);
        buyer.age = cfg.old_age;
        assert_eq!(buyer.remaining_lifetime(&cfg), 1);
        buyer.age = cfg.old_age + 5;
        assert_eq!(buyer.remaining_lifetime(&cfg), 1);
    }

    #[test]
    fn preferential_rates_apply() {
        let cfg = Config::default();
        let mut buyer = adult(&cfg);
        buyer.age = cfg.youth_age + 1;
        assert_eq!(buyer.applicable_rate(&rates(&cfg), &cfg), cfg.mortgage_rate);

        buyer.age = cfg.youth_age - 1;
        assert_eq!(buyer.applicable_rate(&rates(&cfg), &cfg), cfg.youth_mortgage_rate);

        buyer.age = cfg.youth_age + 1;
        buyer.children = vec![BuyerId(5), BuyerId(6)];
        assert_eq!(buyer.applicable_rate(&rates(&cfg), &cfg), cfg.family_mortgage_rate);
    }

    #[test]
    fn first_home_bonus_raises_household_size() {
        let cfg = Config::default();
        let mut buyer = adult(&cfg);
        assert_eq!(buyer.household_size(&cfg), 1.0 + cfg.first_home_bonus);
        buyer.houses.insert(HouseId(0));
        assert_eq!(buyer.household_size(&cfg), 1.0);
    }

    #[test]
    fn broke_buyer_wants_nothing() {
        assert_eq!(optimal_units(0.0, 3.0, 100.0), 0.0);
        assert_eq!(optimal_units(-50.0, 3.0, 100.0), 0.0);
        assert_eq!(optimal_units(50.0, 3.0, 0.0), 0.0);
    }

    #[test]
    fn wealth_equal_to_price_buys_one_unit() {
        // W0(h * e^h) = h, so the optimum is exactly one unit
        let units = optimal_units(1_000.0, 11.0, 1_000.0);
        assert_abs_diff_eq!(units, 1.0, epsilon = 1e-9);
        assert!(optimal_units(2_000.0, 11.0, 1_000.0) > units);
    }

    #[test]
    fn rich_idle_buyer_prefers_cash() {
        let cfg = Config {
            autonomous_consumption: 0.0,
            ..Config::default()
        };
        let mut buyer = adult(&cfg);
        buyer.wage = 0.0;
        buyer.wealth = 2.0 * cfg.price_start;
        let plan = buyer.plan_purchase(cfg.price_start, &rates(&cfg), &cfg);
        assert_eq!(plan.financing, Financing::Cash);
        assert_eq!(plan.units, 1);
    }

    #[test]
    fn earning_buyer_prefers_mortgage() {
        let cfg = Config::default();
        let mut buyer = adult(&cfg);
        buyer.wage = 150_000.0;
        buyer.wealth = 0.0;
        let plan = buyer.plan_purchase(cfg.price_start, &rates(&cfg), &cfg);
        assert_eq!(plan.financing, Financing::Mortgage);
        assert!(plan.units >= 1);
        assert_eq!(plan.duration, buyer.remaining_lifetime(&cfg));
        assert!(buyer.additional_consumption >= 0.0);
    }

    #[test]
    fn minors_have_no_income_effect() {
        let cfg = Config::default();
        let mut child = BuyerData::new(BuyerId(1), 3, 40_000.0, false);
        assert_eq!(child.work_and_consume(&cfg), 0.0);
        assert_eq!(child.wealth, 0.0);
    }

    #[test]
    fn mortgages_drop_out_once_repaid() {
        let cfg = Config::default();
        let mut buyer = adult(&cfg);
        buyer.mortgages.push(Mortgage::new(1_000.0, 2));
        let before = buyer.disposable_income(&cfg);
        buyer.work_and_consume(&cfg);
        buyer.work_and_consume(&cfg);
        assert!(buyer.mortgages.is_empty());
        assert_abs_diff_eq!(buyer.disposable_income(&cfg), before + 1_000.0, epsilon = 1e-9);
    }

    #[test]
    fn will_to_buy_grows_with_household_need() {
        let mut buyer = adult(&Config::default());
        buyer.children = vec![BuyerId(1)];
        buyer.accumulate_will_to_buy();
        assert_eq!(buyer.will_to_buy, 2.0);
        buyer.houses.insert(HouseId(0));
        buyer.accumulate_will_to_buy();
        assert_eq!(buyer.will_to_buy, 3.0);
    }

    #[test]
    fn death_is_certain_at_old_age() {
        let cfg = Config {
            death_probability: 0.0,
            ..Config::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        let mut buyer = adult(&cfg);
        assert!(!buyer.draws_death(&cfg, &mut rng));
        buyer.age = cfg.old_age;
        assert!(buyer.draws_death(&cfg, &mut rng));
    }

    #[test]
    fn sampled_wages_fall_in_brackets() {
        let cfg = Config::default();
        let sampler = HouseholdSampler::new(&cfg).expect("default config");
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..1_000 {
            let wage = sampler.wage(&mut rng);
            assert!(wage >= 5_000.0, "wage = {wage}");
        }
        assert!(sampler.children_count(&mut rng) <= 2);
    }
}
