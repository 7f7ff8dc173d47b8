use std::any::Any;
use std::collections::{BTreeMap, VecDeque};

use krabmaga::engine::{schedule::Schedule, state::State};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::agents::{
    BuyerData, BuyerId, DemographicsAgent, GovernmentData, HouseData, HouseId, HouseholdSampler,
    Owner, SellerAgent, SellerData, WelfareAgent,
};
use crate::config::{Config, ConfigError};
use crate::markets::mortgage::MortgageRates;
use crate::markets::{HousePool, HousingMarketAgent};
use crate::metrics::{self, PeriodRecord};

// ─────────────────────────────────────────────────────────────────────────────
// Period counters
// ─────────────────────────────────────────────────────────────────────────────

/// Tallies reset at the start of every period.
#[derive(Clone, Debug, Default)]
pub struct PeriodCounters {
    pub unmet_demand: u32,
    pub cash_purchases: u32,
    pub mortgage_purchases: u32,
    pub births: u32,
    pub deaths: u32,
    pub transfer_spending: f64,
    /// Annual rates of the mortgages taken out this period.
    pub mortgage_rates: Vec<f64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// World state (implements krabmaga State)
// ─────────────────────────────────────────────────────────────────────────────

/// Central state struct holding every agent and the period's shared market
/// state.
///
/// Buyers live in an arena keyed by id and are always visited in id order.
/// Houses are never destroyed, so a `HouseId` is an index into `houses`.
/// Phase proxies in the krabmaga schedule only carry a phase; all data lives
/// here.
pub struct WorldState {
    // Agent data
    pub buyers: BTreeMap<BuyerId, BuyerData>,
    pub houses: Vec<HouseData>,
    pub seller: SellerData,
    pub government: GovernmentData,

    // Market state for the current period
    pub pool: HousePool,
    pub counters: PeriodCounters,
    pub mortgage_rate: f64,
    /// Terms of the most recent mortgages, newest last.
    pub mortgage_durations: VecDeque<u32>,

    // Configuration
    pub config: Config,
    pub sampler: HouseholdSampler,

    // Random number generator
    pub rng: StdRng,

    // Simulation records
    pub records: Vec<PeriodRecord>,
    pub current_period: u64,

    pub next_buyer_id: u64,
    n_buyers: usize,
    seed: u64,
}

impl WorldState {
    /// Build the initial population, housing stock and developer reserve.
    pub fn new(
        n_buyers: usize,
        seed: u64,
        mortgage_rate: f64,
        config: Config,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let sampler = HouseholdSampler::new(&config)?;
        let rng = StdRng::seed_from_u64(seed);

        let mut state = WorldState {
            buyers: BTreeMap::new(),
            houses: Vec::new(),
            seller: SellerData::new(&config),
            government: GovernmentData::new(&config),
            pool: HousePool::default(),
            counters: PeriodCounters::default(),
            mortgage_rate,
            mortgage_durations: VecDeque::new(),
            config,
            sampler,
            rng,
            records: Vec::new(),
            current_period: 0,
            next_buyer_id: 0,
            n_buyers,
            seed,
        };
        state.populate();
        Ok(state)
    }

    /// An empty world: no buyers and no houses, only the developer's pipeline.
    pub fn empty(seed: u64, config: Config) -> Result<Self, ConfigError> {
        let config = Config {
            reserve_start: 0,
            ..config
        };
        let rate = config.mortgage_rate;
        WorldState::new(0, seed, rate, config)
    }

    // ─── Agent initialisation ───────────────────────────────────────────────

    fn populate(&mut self) {
        let adolescence = self.config.adolescence_age;
        let old_age = self.config.old_age;

        // Adults first, then their children, all drawing from the same stream
        let mut adults = Vec::with_capacity(self.n_buyers);
        for _ in 0..self.n_buyers {
            let age = self.rng.gen_range(adolescence..old_age);
            let id = self.spawn_buyer(age);
            adults.push(id);
        }
        for parent in adults {
            let n_children = self.sampler.children_count(&mut self.rng);
            for _ in 0..n_children {
                let age = self.rng.gen_range(0..adolescence);
                let child = self.spawn_buyer(age);
                if let Some(p) = self.buyers.get_mut(&parent) {
                    p.children.push(child);
                }
            }
        }

        // Initial endowment: one house per buyer while the stock lasts
        let endowment = (self.n_buyers as f64 * self.config.houses_per_person).floor() as usize;
        for _ in 0..endowment {
            self.build_house(self.config.price_start);
        }
        let ids: Vec<BuyerId> = self.buyers.keys().copied().collect();
        for (house, id) in (0..endowment).map(HouseId).zip(ids) {
            self.houses[house.0].change_owner(Owner::Buyer(id));
            if let Some(buyer) = self.buyers.get_mut(&id) {
                buyer.houses.insert(house);
            }
        }

        let multiplier = self.config.wealth_multiplier;
        let diminisher = self.config.wealth_diminisher;
        for buyer in self.buyers.values_mut() {
            buyer.wealth = self.rng.gen::<f64>() * multiplier - diminisher;
        }

        // The developer's starting reserve
        for _ in 0..self.config.reserve_start {
            self.build_house(self.config.price_start);
        }
    }

    fn spawn_buyer(&mut self, age: u32) -> BuyerId {
        let id = BuyerId(self.next_buyer_id);
        self.next_buyer_id += 1;
        let buyer = self.sampler.household(id, age, &mut self.rng);
        self.buyers.insert(id, buyer);
        id
    }

    /// Register a new developer-owned house around `base_price`.
    pub fn build_house(&mut self, base_price: f64) -> HouseId {
        let id = HouseId(self.houses.len());
        let house = HouseData::built(
            id,
            base_price,
            self.config.price_jitter,
            self.config.minimum_price,
            &mut self.rng,
        );
        self.houses.push(house);
        id
    }

    /// Put an existing buyer into the arena, e.g. a hand-built scenario.
    pub fn insert_buyer(&mut self, mut buyer: BuyerData) -> BuyerId {
        let id = BuyerId(self.next_buyer_id);
        self.next_buyer_id += 1;
        buyer.id = id;
        self.buyers.insert(id, buyer);
        id
    }

    /// Register a house at exactly `price`, bypassing the build jitter.
    /// Developer-owned houses join the seller's reserve.
    pub fn insert_house(&mut self, price: f64, owner: Owner) -> HouseId {
        let id = HouseId(self.houses.len());
        self.houses.push(HouseData::new(id, price, owner));
        match owner {
            Owner::Buyer(buyer) => {
                if let Some(b) = self.buyers.get_mut(&buyer) {
                    b.houses.insert(id);
                }
            }
            Owner::Government => {
                self.government.houses.insert(id);
            }
            Owner::Developer => {
                self.seller.reserve += 1;
            }
        }
        id
    }

    pub fn mortgage_rates(&self) -> MortgageRates {
        MortgageRates {
            market: self.mortgage_rate,
            youth: self.config.youth_mortgage_rate,
            family: self.config.family_mortgage_rate,
        }
    }

    // ─── Per-period step helpers ─────────────────────────────────────────────

    /// Re-list every developer-owned house and reset the period counters.
    pub fn refresh(&mut self) {
        self.pool = HousePool::refresh(&self.houses);
        self.counters = PeriodCounters::default();
    }

    /// Age vacant listings and apply price markdowns.
    pub fn decay_vacant(&mut self) {
        let after = self.config.markdown_after_months;
        let factor = self.config.markdown_factor;
        let floor = self.config.minimum_price;
        for house in self.houses.iter_mut().filter(|h| h.is_vacant()) {
            house.add_month_without_buyer(after, factor, floor);
        }
    }

    /// Record aggregate statistics for the completed period.
    pub fn record(&mut self) {
        self.current_period += 1;
        let record = metrics::collect(self, self.current_period);
        debug!(
            period = record.period,
            population = record.population,
            sales = record.sales,
            unmet_demand = record.unmet_demand,
            sale_price = record.sale_price,
            reserve = record.reserve,
            "period collected"
        );
        self.records.push(record);
    }

    /// One named indicator across all recorded periods.
    pub fn series(&self, name: &str) -> Option<Vec<f64>> {
        self.records.iter().map(|r| r.get(name)).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// krabmaga State implementation
// ─────────────────────────────────────────────────────────────────────────────

impl State for WorldState {
    /// Schedule the phase proxies when the simulation starts.
    ///
    /// Execution order per period (lower ordering = runs first), each phase
    /// completing over the whole population before the next:
    ///   before_step → refresh pools and counters
    ///   0 → DemographicsAgent   (ageing, births, deaths, income tax)
    ///   1 → WelfareAgent        (transfers and repossessed houses)
    ///   2 → HousingMarketAgent  (purchases against the listed pool)
    ///   3 → SellerAgent         (pricing and production)
    ///   after_step → vacant house markdown
    ///   update → record indicators
    fn init(&mut self, schedule: &mut Schedule) {
        schedule.schedule_repeating(Box::new(DemographicsAgent), 0.0, 0);
        schedule.schedule_repeating(Box::new(WelfareAgent), 0.0, 1);
        schedule.schedule_repeating(Box::new(HousingMarketAgent), 0.0, 2);
        schedule.schedule_repeating(Box::new(SellerAgent), 0.0, 3);
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_state_mut(&mut self) -> &mut dyn State {
        self
    }

    fn as_state(&self) -> &dyn State {
        self
    }

    fn reset(&mut self) {
        // Rebuild from the original seed so repetitions replay the same run
        let config = self.config.clone();
        if let Ok(fresh) = WorldState::new(self.n_buyers, self.seed, self.mortgage_rate, config) {
            *self = fresh;
        }
    }

    fn before_step(&mut self, _schedule: &mut Schedule) {
        self.refresh();
    }

    fn after_step(&mut self, _schedule: &mut Schedule) {
        self.decay_vacant();
    }

    /// Record aggregate statistics after each completed period.
    fn update(&mut self, step: u64) {
        if step > 0 {
            self.record();
        }
    }
}
