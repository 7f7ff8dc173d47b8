use std::collections::VecDeque;
use std::fmt;

use krabmaga::engine::{agent::Agent, state::State};
use rand::Rng;
use tracing::debug;

use crate::config::Config;
use crate::state::WorldState;

// ─────────────────────────────────────────────────────────────────────────────
// Seller (developer) data
// ─────────────────────────────────────────────────────────────────────────────

/// Horizon averages the developer plans with.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Forecast {
    pub unmet_demand: f64,
    pub produced: f64,
    pub sold: f64,
    pub sale_price: f64,
}

/// Houses finished this period and the price they are listed at.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProductionBatch {
    pub units: u32,
    pub listing_price: f64,
}

/// The developer: builds with a fixed lead time and prices off recent sales.
#[derive(Clone, Debug)]
pub struct SellerData {
    pub forecast_horizon: usize,
    pub reserve: u32,
    pub reserve_history: Vec<u32>,
    pub produce_history: Vec<u32>,
    pub sold_history: Vec<u32>,
    pub listing_price_history: Vec<f64>,
    pub sale_price_history: Vec<f64>,
    pub unmet_demand_history: Vec<u32>,
    /// Committed future completions; the front finishes next.
    pub pipeline: VecDeque<u32>,
    pub sold_this_period: u32,
    pub current_prices: Vec<f64>,
    pub last_forecast: Forecast,
}

impl SellerData {
    pub fn new(cfg: &Config) -> Self {
        SellerData {
            forecast_horizon: cfg.forecast_horizon,
            reserve: cfg.reserve_start,
            reserve_history: vec![cfg.reserve_start],
            produce_history: vec![cfg.produce_start],
            sold_history: vec![cfg.sold_start],
            listing_price_history: vec![cfg.price_start],
            sale_price_history: vec![cfg.price_start],
            unmet_demand_history: vec![cfg.unmet_demand_start],
            pipeline: std::iter::repeat(cfg.pipeline_start)
                .take(cfg.build_lead_time)
                .collect(),
            sold_this_period: 0,
            current_prices: Vec::new(),
            last_forecast: Forecast::default(),
        }
    }

    /// Book one sale out of the reserve. Every sold house must have been
    /// counted into the reserve when it was finished or registered.
    pub fn record_sale(&mut self, price: f64) {
        debug_assert!(self.reserve > 0, "sale recorded with an empty reserve");
        self.reserve -= 1;
        self.sold_this_period += 1;
        self.current_prices.push(price);
    }

    pub fn listing_price(&self) -> f64 {
        self.listing_price_history.last().copied().unwrap_or_default()
    }

    pub fn sale_price(&self) -> f64 {
        self.sale_price_history.last().copied().unwrap_or_default()
    }

    /// Close the period: book the realised sale price, finish the front of
    /// the pipeline, and commit a new build at the back.
    ///
    /// The build rate is a tunable policy: a population-scaled base with
    /// bounded noise, plus an adjustment for recent demand the reserve
    /// cannot cover.
    pub fn product<R: Rng + ?Sized>(
        &mut self,
        unmet_demand: u32,
        n_buyers: usize,
        cfg: &Config,
        rng: &mut R,
    ) -> ProductionBatch {
        let sale_price = if self.current_prices.is_empty() {
            self.sale_price()
        } else {
            mean(&self.current_prices)
        };
        self.sale_price_history.push(sale_price);
        self.current_prices.clear();

        let listing_price =
            cfg.first_price_multiplier * tail_mean(&self.sale_price_history, self.forecast_horizon);
        self.listing_price_history.push(listing_price);

        let finished = self.pipeline.pop_front().unwrap_or(0);
        self.reserve += finished;
        self.produce_history.push(finished);
        self.reserve_history.push(self.reserve);
        self.sold_history.push(self.sold_this_period);
        self.unmet_demand_history.push(unmet_demand);

        let horizon = self.forecast_horizon;
        self.last_forecast = Forecast {
            unmet_demand: tail_mean_u32(&self.unmet_demand_history, horizon),
            produced: tail_mean_u32(&self.produce_history, horizon),
            sold: tail_mean_u32(&self.sold_history, horizon),
            sale_price: tail_mean(&self.sale_price_history, horizon),
        };

        let build = self.build_rate(n_buyers, cfg, rng);
        self.pipeline.push_back(build);
        debug!(
            finished,
            build,
            reserve = self.reserve,
            forecast = ?self.last_forecast,
            "developer closed period"
        );

        self.sold_this_period = 0;
        ProductionBatch {
            units: finished,
            listing_price,
        }
    }

    fn build_rate<R: Rng + ?Sized>(&self, n_buyers: usize, cfg: &Config, rng: &mut R) -> u32 {
        let noise = if cfg.build_noise > 0 {
            rng.gen_range(0..cfg.build_noise) as f64
        } else {
            0.0
        };
        let population_share = n_buyers as f64 / cfg.build_population_scale;
        let baseline = ((cfg.build_base + noise) * population_share).trunc() * cfg.build_multiplier;
        let forecast = &self.last_forecast;
        let deficit = forecast.sold + forecast.unmet_demand - self.reserve as f64;
        let adjustment = (deficit / cfg.build_deficit_scale).trunc();
        (baseline + adjustment).max(0.0) as u32
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn tail_mean(values: &[f64], window: usize) -> f64 {
    mean(&values[values.len().saturating_sub(window)..])
}

fn tail_mean_u32(values: &[u32], window: usize) -> f64 {
    let tail = &values[values.len().saturating_sub(window)..];
    if tail.is_empty() {
        0.0
    } else {
        tail.iter().map(|&v| v as f64).sum::<f64>() / tail.len() as f64
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Production phase
// ─────────────────────────────────────────────────────────────────────────────

/// Let the developer close the period and put finished houses on the market.
pub fn run_production(state: &mut WorldState) {
    let unmet = state.counters.unmet_demand;
    let n_buyers = state.buyers.len();
    let batch = state.seller.product(unmet, n_buyers, &state.config, &mut state.rng);
    for _ in 0..batch.units {
        state.build_house(batch.listing_price);
    }
}

/// Proxy agent for the developer.
#[derive(Clone)]
pub struct SellerAgent;

impl fmt::Display for SellerAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SellerAgent")
    }
}

impl Agent for SellerAgent {
    fn step(&mut self, state: &mut dyn State) {
        let state = state
            .as_any_mut()
            .downcast_mut::<WorldState>()
            .expect("state should be WorldState");
        run_production(state);
    }
}
