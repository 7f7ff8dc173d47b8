pub mod housing;
pub mod mortgage;

pub use housing::{clear_housing_market, HousePool, HousingMarketAgent};
pub use mortgage::{Mortgage, MortgageRates};
