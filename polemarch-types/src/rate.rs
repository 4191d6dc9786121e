use polemarch_math::{ray_div, ray_mul, MathError, Ray};
use serde::{Deserialize, Serialize};

/// Debt-weighted mean of the fixed rates of every open position in a reserve.
///
/// Each position contributes `weight * rate / RAY` to `weighted_sum`. Removing a position
/// subtracts exactly what it added, so the average returns to zero once every position
/// has been repaid.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WeightedAverageRate {
    weighted_sum: u128,
    total_weight: u128,
    positions: u32,
}

impl WeightedAverageRate {
    pub fn average_rate(&self) -> Result<Ray, MathError> {
        if self.total_weight == 0 {
            return Ok(0);
        }
        ray_div(self.weighted_sum, self.total_weight)
    }

    /// Interest all positions accrue per year at their checkpointed weights, in base units.
    pub fn weighted_sum(&self) -> u128 {
        self.weighted_sum
    }

    pub fn total_weight(&self) -> u128 {
        self.total_weight
    }

    pub fn positions(&self) -> u32 {
        self.positions
    }

    pub fn is_empty(&self) -> bool {
        self.positions == 0
    }

    pub fn increase(&mut self, weight: u128, rate: Ray) -> Result<(), MathError> {
        if weight == 0 {
            return Ok(());
        }
        let contribution = ray_mul(weight, rate)?;
        self.weighted_sum = self
            .weighted_sum
            .checked_add(contribution)
            .ok_or(MathError::Overflow)?;
        self.total_weight = self
            .total_weight
            .checked_add(weight)
            .ok_or(MathError::Overflow)?;
        self.positions += 1;
        Ok(())
    }

    pub fn decrease(&mut self, weight: u128, rate: Ray) -> Result<(), MathError> {
        if weight == 0 {
            return Ok(());
        }
        let contribution = ray_mul(weight, rate)?;
        self.weighted_sum = self
            .weighted_sum
            .checked_sub(contribution)
            .ok_or(MathError::Overflow)?;
        self.total_weight = self
            .total_weight
            .checked_sub(weight)
            .ok_or(MathError::Overflow)?;
        self.positions = self.positions.checked_sub(1).ok_or(MathError::Overflow)?;
        Ok(())
    }

    /// Replaces a position's weight after its debt changed.
    pub fn reweigh(&mut self, old_weight: u128, new_weight: u128, rate: Ray) -> Result<(), MathError> {
        self.decrease(old_weight, rate)?;
        self.increase(new_weight, rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polemarch_math::RAY;

    const ETHER: u128 = 1_000_000_000_000_000_000;

    #[test]
    fn average_of_two_positions_is_debt_weighted() {
        let mut tracker = WeightedAverageRate::default();
        tracker.increase(3 * ETHER, RAY / 10).unwrap();
        tracker.increase(ETHER, RAY / 50).unwrap();
        // (3 * 10% + 1 * 2%) / 4 = 8%
        assert_eq!(tracker.average_rate().unwrap(), 2 * RAY / 25);
        assert_eq!(tracker.positions(), 2);
    }

    #[test]
    fn average_returns_to_exactly_zero() {
        let mut tracker = WeightedAverageRate::default();
        let rate_a = RAY / 20 + 7;
        let rate_b = RAY / 3;
        tracker.increase(10_000_000_000_000_001, rate_a).unwrap();
        tracker.reweigh(10_000_000_000_000_001, 10_001_370_000_000_001, rate_a).unwrap();
        tracker.increase(5 * ETHER + 3, rate_b).unwrap();
        tracker.reweigh(10_001_370_000_000_001, 0, rate_a).unwrap();
        tracker.reweigh(5 * ETHER + 3, 0, rate_b).unwrap();
        assert!(tracker.is_empty());
        assert_eq!(tracker.total_weight(), 0);
        assert_eq!(tracker.average_rate().unwrap(), 0);
    }

    #[test]
    fn removing_an_unknown_weight_fails() {
        let mut tracker = WeightedAverageRate::default();
        assert_eq!(tracker.decrease(1, RAY), Err(MathError::Overflow));
    }
}
