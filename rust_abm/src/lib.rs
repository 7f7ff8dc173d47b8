/*!
# `housing_abm` — housing market & demographics ABM core

A discrete-time agent-based model of a housing market coupled to household
demographics and government fiscal policy. Households age, have children,
earn and die; a developer builds with a fixed lead time and prices off recent
sales; the government collects tax, absorbs unclaimed estates and can run
transfer and mortgage-subsidy programmes.

The model uses [krABMaga](https://github.com/krABMaga/krABMaga) (krabmaga) as
the scheduling framework. Each period runs five phases in strict order:
refresh → demographics → welfare → transactions → production & decay, and
records one [`PeriodRecord`].

## Quick start

```no_run
use housing_abm::{run_simulation, Config};

let config = Config::default();
let records = run_simulation(1_000, 120, 42, config.mortgage_rate, config)?;
for r in &records {
    println!("{} {:.0} {:.3}", r.period, r.sale_price, r.hai);
}
# Ok::<(), housing_abm::ConfigError>(())
```

With the `python` feature the same entry point is exposed to Python via
[PyO3](https://pyo3.rs).
*/

pub mod agents;
pub mod config;
pub mod lambert;
pub mod markets;
pub mod metrics;
pub mod state;

pub use config::{Config, ConfigError, WageBracket};
pub use metrics::PeriodRecord;
pub use state::WorldState;

use krabmaga::engine::schedule::Schedule;
use krabmaga::engine::state::State;
use tracing::info;

// ─────────────────────────────────────────────────────────────────────────────
// Main simulation entry point
// ─────────────────────────────────────────────────────────────────────────────

/// Step an already-built world through `periods` krabmaga-scheduled periods.
pub fn run_world(state: &mut WorldState, periods: usize) {
    let mut schedule = Schedule::new();

    // Initialise the phase schedule (calls WorldState::init)
    state.init(&mut schedule);

    for _ in 0..periods {
        schedule.step(state);
    }
}

/// Run a full housing market simulation and return per-period statistics.
///
/// Identical arguments always produce identical records.
pub fn run_simulation(
    n_buyers: usize,
    periods: usize,
    seed: u64,
    mortgage_rate: f64,
    config: Config,
) -> Result<Vec<PeriodRecord>, ConfigError> {
    info!(n_buyers, periods, seed, mortgage_rate, "starting housing market simulation");
    let mut state = WorldState::new(n_buyers, seed, mortgage_rate, config)?;
    run_world(&mut state, periods);
    info!(
        periods = state.records.len(),
        population = state.buyers.len(),
        houses = state.houses.len(),
        "simulation finished"
    );
    Ok(state.records)
}

// ─────────────────────────────────────────────────────────────────────────────
// Python bindings
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(feature = "python")]
mod python {
    use std::collections::HashMap;

    use pyo3::exceptions::PyValueError;
    use pyo3::prelude::*;

    use crate::{Config, PeriodRecord};

    /// Aggregate statistics for a single simulation period.
    ///
    /// All fields are read-only from Python.
    #[pyclass(get_all)]
    #[derive(Clone, Debug)]
    pub struct PyPeriodRecord {
        pub period: u64,
        pub sale_price: f64,
        pub listing_price: f64,
        pub sales: u32,
        pub unmet_demand: u32,
        pub population: usize,
        pub hai: f64,
        pub pir: f64,
        pub government_reserve: f64,
        record: HashMap<String, f64>,
    }

    impl From<PeriodRecord> for PyPeriodRecord {
        fn from(r: PeriodRecord) -> Self {
            let record = r
                .fields()
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect();
            PyPeriodRecord {
                period: r.period,
                sale_price: r.sale_price,
                listing_price: r.listing_price,
                sales: r.sales,
                unmet_demand: r.unmet_demand,
                population: r.population,
                hai: r.hai,
                pir: r.pir,
                government_reserve: r.government_reserve,
                record,
            }
        }
    }

    #[pymethods]
    impl PyPeriodRecord {
        fn __repr__(&self) -> String {
            format!(
                "PyPeriodRecord(period={}, sale_price={:.0}, sales={}, hai={:.3})",
                self.period, self.sale_price, self.sales, self.hai
            )
        }

        /// Every indicator as a plain dict, for pandas / polars interop.
        fn to_dict(&self) -> HashMap<String, f64> {
            self.record.clone()
        }
    }

    /// Run a full housing market simulation and return per-period statistics.
    ///
    /// Args:
    ///     n_buyers: Number of initial adult households.
    ///     periods: Number of monthly periods to run.
    ///     seed: Random seed for reproducibility.
    ///     mortgage_rate: Starting annual market mortgage rate.
    ///
    /// Returns:
    ///     A list of :class:`PyPeriodRecord` objects, one per period.
    #[pyfunction]
    #[pyo3(signature = (n_buyers=1000, periods=120, seed=42, mortgage_rate=0.16))]
    fn run_simulation(
        n_buyers: usize,
        periods: usize,
        seed: u64,
        mortgage_rate: f64,
    ) -> PyResult<Vec<PyPeriodRecord>> {
        let config = Config::default();
        let records = crate::run_simulation(n_buyers, periods, seed, mortgage_rate, config)
            .map_err(|e| PyValueError::new_err(e.to_string()))?;
        Ok(records.into_iter().map(PyPeriodRecord::from).collect())
    }

    /// Rust-backed housing market ABM.
    #[pymodule]
    fn housing_abm(m: &Bound<'_, PyModule>) -> PyResult<()> {
        m.add_class::<PyPeriodRecord>()?;
        m.add_function(wrap_pyfunction!(run_simulation, m)?)?;
        Ok(())
    }
}
