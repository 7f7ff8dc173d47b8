pub mod buyer;
pub mod government;
pub mod house;
pub mod seller;

pub use buyer::{
    BuyerData, BuyerId, DemographicsAgent, Financing, HouseholdSampler, PurchasePlan,
};
pub use government::{GovernmentData, WelfareAgent};
pub use house::{HouseData, HouseId, Owner};
pub use seller::{ProductionBatch, SellerAgent, SellerData};
