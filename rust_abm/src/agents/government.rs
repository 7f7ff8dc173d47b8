use std::collections::BTreeSet;
use std::fmt;

use krabmaga::engine::{agent::Agent, state::State};
use tracing::debug;

use crate::agents::{HouseId, Owner};
use crate::config::Config;
use crate::state::WorldState;

// ─────────────────────────────────────────────────────────────────────────────
// Government data (singleton)
// ─────────────────────────────────────────────────────────────────────────────

/// Fiscal agent: collects income tax, absorbs unclaimed estates, pays
/// transfers and mortgage subsidies.
///
/// Balances may go negative. A negative reserve is an accounting signal the
/// indicators pick up, not an error.
#[derive(Clone, Debug)]
pub struct GovernmentData {
    pub money_reserve: f64,
    pub taxes: f64,
    pub inheritance_income: f64,
    pub houses: BTreeSet<HouseId>,
    pub is_spending: bool,
    pub redistribution_mode: bool,
    /// Annual rate added on top of a subsidised borrower's rate.
    pub mortgage_help: f64,
    pub program_spending: f64,
}

impl GovernmentData {
    pub fn new(cfg: &Config) -> Self {
        GovernmentData {
            money_reserve: cfg.government_reserve_start,
            taxes: 0.0,
            inheritance_income: 0.0,
            houses: BTreeSet::new(),
            is_spending: cfg.spending_program,
            redistribution_mode: cfg.redistribution_mode,
            mortgage_help: cfg.mortgage_help,
            program_spending: 0.0,
        }
    }

    pub fn collect_income_tax(&mut self, tax: f64) {
        self.taxes += tax;
    }

    /// Take in the estate of a buyer who left no living children.
    pub fn receive_lost_inheritance(
        &mut self,
        wealth: f64,
        houses: impl IntoIterator<Item = HouseId>,
    ) {
        self.inheritance_income += wealth;
        self.houses.extend(houses);
    }

    /// Hand out the lowest-id repossessed house, if any.
    pub fn take_house(&mut self) -> Option<HouseId> {
        self.houses.pop_first()
    }

    /// Pay the interest differential of a subsidised mortgage up front.
    pub fn fund_subsidy(&mut self, amount: f64) {
        self.money_reserve -= amount;
        self.program_spending += amount;
        if self.money_reserve < 0.0 {
            debug!(
                reserve = self.money_reserve,
                amount,
                "government reserve overdrawn by mortgage programme"
            );
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Welfare phase
// ─────────────────────────────────────────────────────────────────────────────

/// Grant transfers and repossessed houses to eligible buyers, in id order.
///
/// Each buyer is checked against three programmes in turn:
/// 1. a flat transfer funded from unclaimed inheritance,
/// 2. a free repossessed house for adults who own nothing,
/// 3. a tax-funded transfer when redistribution mode is on (doubled for
///    low-wage buyers).
pub fn run_welfare(state: &mut WorldState) {
    let transfer = state.config.transfer_amount;
    let low_wage = state.config.low_wage_threshold;
    let redistribution_wage = state.config.redistribution_wage_threshold;
    let adolescence = state.config.adolescence_age;

    let ids: Vec<_> = state.buyers.keys().copied().collect();
    for id in ids {
        let Some(buyer) = state.buyers.get_mut(&id) else {
            continue;
        };
        let government = &mut state.government;

        let in_need = buyer.wealth < 0.0 || buyer.wage < low_wage;
        if government.inheritance_income > transfer && in_need {
            buyer.wealth += transfer;
            government.inheritance_income -= transfer;
            state.counters.transfer_spending += transfer;
        }

        if buyer.houses.is_empty() && buyer.age > adolescence {
            if let Some(house_id) = government.take_house() {
                buyer.houses.insert(house_id);
                state.houses[house_id.0].change_owner(Owner::Buyer(id));
            }
        }

        if government.redistribution_mode
            && government.taxes > transfer
            && (buyer.wealth < 0.0 || buyer.wage < redistribution_wage)
        {
            let amount = if buyer.wage < low_wage { 2.0 * transfer } else { transfer };
            buyer.wealth += amount;
            government.taxes -= amount;
            state.counters.transfer_spending += amount;
        }
    }
}

/// Proxy agent that runs the welfare phase within the krabmaga schedule.
#[derive(Clone)]
pub struct WelfareAgent;

impl fmt::Display for WelfareAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WelfareAgent")
    }
}

impl Agent for WelfareAgent {
    fn step(&mut self, state: &mut dyn State) {
        let state = state
            .as_any_mut()
            .downcast_mut::<WorldState>()
            .expect("state should be WorldState");
        run_welfare(state);
    }
}
