use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::agents::BuyerId;

/// Index of a house in `WorldState::houses`. Houses are never destroyed, so
/// the index is stable for the whole run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HouseId(pub usize);

impl fmt::Display for HouseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "house#{}", self.0)
    }
}

/// Who currently holds a house.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Owner {
    /// Built and still unsold.
    Developer,
    /// Repossessed from a childless estate.
    Government,
    Buyer(BuyerId),
}

// ─────────────────────────────────────────────────────────────────────────────
// Data stored in WorldState::houses
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct HouseData {
    pub id: HouseId,
    pub price: f64,
    pub owner: Owner,
    pub months_vacant: u32,
}

impl HouseData {
    /// A house at exactly `price`.
    pub fn new(id: HouseId, price: f64, owner: Owner) -> Self {
        HouseData {
            id,
            price,
            owner,
            months_vacant: 0,
        }
    }

    /// A freshly built house: `base_price` perturbed by up to `±jitter`,
    /// never below `minimum_price`.
    pub fn built<R: Rng + ?Sized>(
        id: HouseId,
        base_price: f64,
        jitter: f64,
        minimum_price: f64,
        rng: &mut R,
    ) -> Self {
        let shift = if jitter > 0.0 {
            rng.gen_range(-jitter..jitter)
        } else {
            0.0
        };
        let price = (base_price * (1.0 + shift)).max(minimum_price);
        HouseData::new(id, price, Owner::Developer)
    }

    pub fn is_vacant(&self) -> bool {
        self.owner == Owner::Developer
    }

    pub fn change_owner(&mut self, owner: Owner) {
        self.owner = owner;
    }

    /// Another period without a buyer. After `markdown_after` months the
    /// price is marked down by `factor` each period, floored at `minimum_price`.
    pub fn add_month_without_buyer(
        &mut self,
        markdown_after: u32,
        factor: f64,
        minimum_price: f64,
    ) {
        self.months_vacant += 1;
        if self.months_vacant > markdown_after {
            self.price = (self.price * factor).max(minimum_price);
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn markdown_starts_after_threshold() {
        let mut house = HouseData::new(HouseId(0), 100.0, Owner::Developer);
        house.add_month_without_buyer(2, 0.5, 10.0);
        house.add_month_without_buyer(2, 0.5, 10.0);
        assert_eq!(house.price, 100.0);
        house.add_month_without_buyer(2, 0.5, 10.0);
        assert_eq!(house.price, 50.0);
        assert_eq!(house.months_vacant, 3);
    }

    #[test]
    fn markdown_respects_price_floor() {
        let mut house = HouseData::new(HouseId(0), 100.0, Owner::Developer);
        for _ in 0..200 {
            house.add_month_without_buyer(2, 0.95, 40.0);
            assert!(house.price >= 40.0);
        }
        assert_eq!(house.price, 40.0);
    }

    #[test]
    fn built_price_stays_within_jitter_and_floor() {
        let mut rng = StdRng::seed_from_u64(7);
        for i in 0..500 {
            let house = HouseData::built(HouseId(i), 1_000.0, 0.1, 950.0, &mut rng);
            assert!(house.price >= 950.0 && house.price <= 1_100.0);
            assert!(house.is_vacant());
        }
    }
}
