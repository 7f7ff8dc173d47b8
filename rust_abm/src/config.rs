use serde::{Deserialize, Serialize};

/// Errors reported by [`Config::validate`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// A probability or share lies outside `[0, 1]`.
    #[error("{name} must lie in [0, 1], got {value}")]
    Probability { name: &'static str, value: f64 },

    /// A quantity that must be strictly positive is not.
    #[error("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },

    /// A period count that must be at least one is zero.
    #[error("{name} must be at least one period")]
    ZeroPeriods { name: &'static str },

    /// Age thresholds are out of order.
    #[error(
        "age thresholds must satisfy 0 < adolescence < climax <= old age \
         (got {adolescence}, {climax}, {old})"
    )]
    AgeOrder { adolescence: u32, climax: u32, old: u32 },

    /// The wage distribution has no brackets or no positive weight.
    #[error("wage distribution needs at least one bracket with positive weight")]
    EmptyWageBrackets,
}

/// One bracket of the monthly wage distribution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum WageBracket {
    /// Wage drawn uniformly from `[low, low + width)`.
    Uniform { low: f64, width: f64, weight: f64 },
    /// Open-ended top bracket: `(chi_squared(dof) + 1) * scale`.
    Tail { scale: f64, dof: f64, weight: f64 },
}

impl WageBracket {
    pub fn weight(&self) -> f64 {
        match self {
            WageBracket::Uniform { weight, .. } | WageBracket::Tail { weight, .. } => *weight,
        }
    }
}

/// Configuration parameters for the housing market simulation.
///
/// Ages and durations are counted in periods (months). Rates are annual.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    // Mortgage market
    pub mortgage_rate: f64,
    pub youth_mortgage_rate: f64,
    pub family_mortgage_rate: f64,
    pub youth_age: u32,
    pub family_children_threshold: u32,
    pub down_payment_share: f64,

    // Household behaviour
    pub income_tax: f64,
    pub autonomous_consumption: f64,
    pub marginal_consumption_rate: f64,
    pub first_home_bonus: f64,
    pub informed_share: f64,
    pub children_weights: Vec<f64>,
    pub wage_brackets: Vec<WageBracket>,
    pub wealth_multiplier: f64,
    pub wealth_diminisher: f64,
    pub houses_per_person: f64,

    // Demography
    pub adolescence_age: u32,
    pub climax_age: u32,
    pub old_age: u32,
    pub birth_probability: f64,
    pub death_probability: f64,

    // Developer
    pub build_lead_time: usize,
    pub forecast_horizon: usize,
    pub reserve_start: u32,
    pub produce_start: u32,
    pub pipeline_start: u32,
    pub sold_start: u32,
    pub unmet_demand_start: u32,
    pub price_start: f64,
    pub first_price_multiplier: f64,
    pub build_base: f64,
    pub build_noise: u32,
    pub build_multiplier: f64,
    pub build_population_scale: f64,
    pub build_deficit_scale: f64,

    // Houses
    pub price_jitter: f64,
    pub minimum_price: f64,
    pub markdown_after_months: u32,
    pub markdown_factor: f64,

    // Government
    pub government_reserve_start: f64,
    pub transfer_amount: f64,
    pub low_wage_threshold: f64,
    pub redistribution_wage_threshold: f64,
    pub redistribution_mode: bool,
    pub spending_program: bool,
    pub mortgage_help: f64,

    // Indicators
    pub affordability_payment_share: f64,
    pub duration_window: usize,
    pub fallback_mortgage_duration: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mortgage_rate: 0.16,
            youth_mortgage_rate: 0.06,
            family_mortgage_rate: 0.06,
            youth_age: 35 * 12,
            family_children_threshold: 2,
            down_payment_share: 0.3,

            income_tax: 0.13,
            autonomous_consumption: 15_000.0,
            marginal_consumption_rate: 0.5,
            first_home_bonus: 10.0,
            informed_share: 0.5,
            children_weights: vec![0.7, 0.2, 0.1],
            // Monthly per-capita income groups
            wage_brackets: vec![
                WageBracket::Uniform { low: 5_000.0, width: 5_000.0, weight: 0.032 },
                WageBracket::Uniform { low: 10_000.0, width: 4_000.0, weight: 0.047 },
                WageBracket::Uniform { low: 14_000.0, width: 5_000.0, weight: 0.078 },
                WageBracket::Uniform { low: 19_000.0, width: 8_000.0, weight: 0.138 },
                WageBracket::Uniform { low: 27_000.0, width: 18_000.0, weight: 0.262 },
                WageBracket::Uniform { low: 45_000.0, width: 15_000.0, weight: 0.144 },
                WageBracket::Uniform { low: 60_000.0, width: 15_000.0, weight: 0.094 },
                WageBracket::Uniform { low: 75_000.0, width: 15_000.0, weight: 0.091 },
                WageBracket::Tail { scale: 100_000.0, dof: 2.0, weight: 0.114 },
            ],
            wealth_multiplier: 2_000_000.0,
            wealth_diminisher: 500_000.0,
            houses_per_person: 0.5,

            adolescence_age: 18 * 12,
            climax_age: 45 * 12,
            old_age: 80 * 12,
            birth_probability: 0.004,
            death_probability: 0.0005,

            build_lead_time: 24,
            forecast_horizon: 12,
            reserve_start: 100,
            produce_start: 10,
            pipeline_start: 10,
            sold_start: 0,
            unmet_demand_start: 0,
            price_start: 5_000_000.0,
            first_price_multiplier: 1.0,
            build_base: 15.0,
            build_noise: 5,
            build_multiplier: 2.0,
            build_population_scale: 14_600.0,
            build_deficit_scale: 14_600.0,

            price_jitter: 0.1,
            minimum_price: 1_000_000.0,
            markdown_after_months: 2,
            markdown_factor: 0.95,

            government_reserve_start: 0.0,
            transfer_amount: 10_000.0,
            low_wage_threshold: 100_000.0,
            redistribution_wage_threshold: 500_000.0,
            redistribution_mode: false,
            spending_program: false,
            mortgage_help: 0.0,

            affordability_payment_share: 0.35,
            duration_window: 50,
            fallback_mortgage_duration: 240.0,
        }
    }
}

impl Config {
    /// Share of the price financed by the mortgage.
    pub fn loan_to_value(&self) -> f64 {
        1.0 - self.down_payment_share
    }

    /// Check that every parameter lies in the range the model can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let shares = [
            ("down_payment_share", self.down_payment_share),
            ("income_tax", self.income_tax),
            ("informed_share", self.informed_share),
            ("houses_per_person", self.houses_per_person),
            ("birth_probability", self.birth_probability),
            ("death_probability", self.death_probability),
            ("price_jitter", self.price_jitter),
            ("markdown_factor", self.markdown_factor),
        ];
        for (name, value) in shares {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Probability { name, value });
            }
        }

        let positives = [
            ("price_start", self.price_start),
            ("minimum_price", self.minimum_price),
            ("first_price_multiplier", self.first_price_multiplier),
            ("build_population_scale", self.build_population_scale),
            ("build_deficit_scale", self.build_deficit_scale),
            ("affordability_payment_share", self.affordability_payment_share),
            ("fallback_mortgage_duration", self.fallback_mortgage_duration),
        ];
        for (name, value) in positives {
            if value <= 0.0 || !value.is_finite() {
                return Err(ConfigError::NonPositive { name, value });
            }
        }
        if self.mortgage_rate <= -1.0 {
            return Err(ConfigError::NonPositive {
                name: "mortgage_rate",
                value: self.mortgage_rate,
            });
        }

        if self.build_lead_time == 0 {
            return Err(ConfigError::ZeroPeriods { name: "build_lead_time" });
        }
        if self.forecast_horizon == 0 {
            return Err(ConfigError::ZeroPeriods { name: "forecast_horizon" });
        }
        if self.duration_window == 0 {
            return Err(ConfigError::ZeroPeriods { name: "duration_window" });
        }

        if self.adolescence_age == 0
            || self.adolescence_age >= self.climax_age
            || self.climax_age > self.old_age
        {
            return Err(ConfigError::AgeOrder {
                adolescence: self.adolescence_age,
                climax: self.climax_age,
                old: self.old_age,
            });
        }

        let wage_weight: f64 = self.wage_brackets.iter().map(WageBracket::weight).sum();
        if self.wage_brackets.is_empty()
            || wage_weight <= 0.0
            || self.wage_brackets.iter().any(|b| b.weight() < 0.0)
        {
            return Err(ConfigError::EmptyWageBrackets);
        }
        if self.children_weights.iter().sum::<f64>() <= 0.0
            || self.children_weights.iter().any(|w| *w < 0.0)
        {
            return Err(ConfigError::Probability {
                name: "children_weights",
                value: self.children_weights.iter().sum(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(Config::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_probability_out_of_range() {
        let config = Config {
            birth_probability: 1.5,
            ..Config::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::Probability {
                name: "birth_probability",
                value: 1.5
            })
        );
    }

    #[test]
    fn rejects_zero_lead_time() {
        let config = Config {
            build_lead_time: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroPeriods { name: "build_lead_time" })
        ));
    }

    #[test]
    fn rejects_unordered_ages() {
        let config = Config {
            climax_age: 10,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::AgeOrder { .. })));
    }

    #[test]
    fn rejects_empty_wage_distribution() {
        let config = Config {
            wage_brackets: Vec::new(),
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::EmptyWageBrackets));
    }
}
