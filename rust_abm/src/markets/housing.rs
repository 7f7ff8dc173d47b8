use std::fmt;

use krabmaga::engine::{agent::Agent, state::State};

use crate::agents::{BuyerId, Financing, HouseData, HouseId, Owner};
use crate::markets::mortgage::{self, Mortgage};
use crate::state::WorldState;

/// The houses listed for sale this period, in two views: registration order
/// (what an uninformed buyer stumbles on) and ascending price (what an
/// informed buyer targets). Both views always hold the same ids.
#[derive(Clone, Debug, Default)]
pub struct HousePool {
    vacant: Vec<HouseId>,
    sorted: Vec<HouseId>,
}

impl HousePool {
    /// Collect every developer-owned house. Ties in price keep id order.
    pub fn refresh(houses: &[HouseData]) -> Self {
        let vacant: Vec<HouseId> = houses
            .iter()
            .filter(|h| h.is_vacant())
            .map(|h| h.id)
            .collect();
        let mut sorted = vacant.clone();
        sorted.sort_by(|a, b| {
            houses[a.0]
                .price
                .total_cmp(&houses[b.0].price)
                .then_with(|| a.cmp(b))
        });
        HousePool { vacant, sorted }
    }

    pub fn is_empty(&self) -> bool {
        self.vacant.is_empty()
    }

    pub fn len(&self) -> usize {
        self.vacant.len()
    }

    pub fn vacant(&self) -> &[HouseId] {
        &self.vacant
    }

    pub fn sorted(&self) -> &[HouseId] {
        &self.sorted
    }

    pub fn cheapest(&self) -> Option<HouseId> {
        self.sorted.first().copied()
    }

    pub fn first_listed(&self) -> Option<HouseId> {
        self.vacant.first().copied()
    }

    /// Take a sold house off both views.
    pub fn remove(&mut self, id: HouseId) {
        self.vacant.retain(|&h| h != id);
        self.sorted.retain(|&h| h != id);
    }
}

/// Run the transactions phase: every adult buyer, in id order, looks at one
/// listing and buys it if the plan calls for more houses than owned.
///
/// Sales leave the pool at once, so later buyers see what remains.
pub fn clear_housing_market(state: &mut WorldState) {
    let rates = state.mortgage_rates();
    let adolescence = state.config.adolescence_age;
    let down_payment = state.config.down_payment_share;
    let loan_to_value = state.config.loan_to_value();
    let duration_window = state.config.duration_window;

    let ids: Vec<BuyerId> = state.buyers.keys().copied().collect();
    for id in ids {
        let Some(buyer) = state.buyers.get_mut(&id) else {
            continue;
        };
        if buyer.age < adolescence {
            continue;
        }

        let target = if buyer.is_informed {
            state.pool.cheapest()
        } else {
            state.pool.first_listed()
        };
        let Some(house_id) = target else {
            state.counters.unmet_demand += 1;
            continue;
        };

        let price = state.houses[house_id.0].price;
        let plan = buyer.plan_purchase(price, &rates, &state.config);
        if plan.units <= buyer.houses.len() {
            continue;
        }

        match plan.financing {
            Financing::Mortgage => {
                let periods = plan.duration as f64;
                let monthly = mortgage::monthly_rate(plan.annual_rate);
                let principal = price * loan_to_value;
                let payment = mortgage::monthly_payment(monthly, periods, principal);
                buyer.mortgages.push(Mortgage::new(payment, plan.duration));

                let government = &mut state.government;
                if plan.annual_rate < rates.market || government.is_spending {
                    let full_rate =
                        mortgage::subsidized_monthly_rate(monthly, government.mortgage_help);
                    let full_payment = mortgage::monthly_payment(full_rate, periods, principal);
                    government.fund_subsidy((full_payment - payment) * periods);
                }

                buyer.wealth -= price * down_payment;
                state.counters.mortgage_purchases += 1;
                state.counters.mortgage_rates.push(plan.annual_rate);
                state.mortgage_durations.push_back(plan.duration);
                while state.mortgage_durations.len() > duration_window {
                    state.mortgage_durations.pop_front();
                }
            }
            Financing::Cash => {
                buyer.wealth -= price;
                state.counters.cash_purchases += 1;
            }
        }

        buyer.houses.insert(house_id);
        state.houses[house_id.0].change_owner(Owner::Buyer(id));
        state.seller.record_sale(price);
        state.pool.remove(house_id);
    }
}

/// Proxy agent that clears the housing market within the krabmaga schedule.
#[derive(Clone)]
pub struct HousingMarketAgent;

impl fmt::Display for HousingMarketAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HousingMarketAgent")
    }
}

impl Agent for HousingMarketAgent {
    fn step(&mut self, state: &mut dyn State) {
        let state = state
            .as_any_mut()
            .downcast_mut::<WorldState>()
            .expect("state should be WorldState");
        clear_housing_market(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn houses(prices: &[f64]) -> Vec<HouseData> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &p)| HouseData::new(HouseId(i), p, Owner::Developer))
            .collect()
    }

    #[test]
    fn refresh_lists_only_developer_houses() {
        let mut stock = houses(&[300.0, 100.0, 200.0]);
        stock[0].change_owner(Owner::Government);
        let pool = HousePool::refresh(&stock);
        assert_eq!(pool.vacant(), &[HouseId(1), HouseId(2)]);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn sorted_view_ascends_by_price() {
        let pool = HousePool::refresh(&houses(&[300.0, 100.0, 200.0, 100.0]));
        assert_eq!(pool.sorted(), &[HouseId(1), HouseId(3), HouseId(2), HouseId(0)]);
        assert_eq!(pool.cheapest(), Some(HouseId(1)));
        assert_eq!(pool.first_listed(), Some(HouseId(0)));
    }

    #[test]
    fn removal_updates_both_views() {
        let mut pool = HousePool::refresh(&houses(&[300.0, 100.0]));
        pool.remove(HouseId(1));
        assert_eq!(pool.cheapest(), Some(HouseId(0)));
        assert_eq!(pool.vacant(), &[HouseId(0)]);
        assert_eq!(pool.sorted(), &[HouseId(0)]);
        pool.remove(HouseId(0));
        assert!(pool.is_empty());
        assert_eq!(pool.cheapest(), None);
        assert_eq!(pool.first_listed(), None);
    }
}
