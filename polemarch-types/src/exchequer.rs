use crate::{Address, LedgerError, ZERO_ADDRESS};
use polemarch_math::{accrue_linear, ray_mul, ray_mul_ceil, Ray, RAY};
use serde::{Deserialize, Serialize};

/// Per-asset pool: growth indices, scaled totals, caps and custody.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Exchequer {
    pub asset: Address,
    pub s_token: Address,
    pub d_token: Address,
    pub g_token: Address,
    pub decimals: u8,
    pub active: bool,
    pub borrowing_enabled: bool,
    /// Set once the exchequer is deleted; a retired record can never be switched back on.
    pub retired: bool,

    // === Growth indices ===
    pub supply_index: Ray,
    pub debt_index: Ray,
    pub last_update_timestamp: u64,

    // === Limits (0 = unlimited) ===
    pub supply_cap: u128,
    pub borrow_cap: u128,

    // === Scaled totals ===
    pub total_scaled_supply: u128,
    pub total_scaled_debt: u128,

    pub origination_fee_rate: Ray,

    // === Custody ===
    pub cash: u128,               // underlying held by the exchequer
    pub reserved_liquidity: u128, // undrawn capacity of open lines of credit
    pub growth_buffer: u128,      // backstop funds not yet drawn
}

impl Exchequer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        asset: Address,
        s_token: Address,
        d_token: Address,
        g_token: Address,
        decimals: u8,
        origination_fee_rate: Ray,
        timestamp: u64,
    ) -> Self {
        Self {
            asset,
            s_token,
            d_token,
            g_token,
            decimals,
            active: true,
            borrowing_enabled: false,
            retired: false,
            supply_index: RAY,
            debt_index: RAY,
            last_update_timestamp: timestamp,
            supply_cap: 0,
            borrow_cap: 0,
            total_scaled_supply: 0,
            total_scaled_debt: 0,
            origination_fee_rate,
            cash: 0,
            reserved_liquidity: 0,
            growth_buffer: 0,
        }
    }

    /// Clears the token references and disables every operation. The record stays registered.
    pub fn retire(&mut self) {
        self.s_token = ZERO_ADDRESS;
        self.d_token = ZERO_ADDRESS;
        self.g_token = ZERO_ADDRESS;
        self.active = false;
        self.borrowing_enabled = false;
        self.retired = true;
        self.supply_cap = 0;
        self.borrow_cap = 0;
    }

    pub fn total_supply(&self) -> Result<u128, LedgerError> {
        Ok(ray_mul(self.total_scaled_supply, self.supply_index)?)
    }

    pub fn total_debt(&self) -> Result<u128, LedgerError> {
        Ok(ray_mul_ceil(self.total_scaled_debt, self.debt_index)?)
    }

    /// Cash that is neither lent out nor promised to an open line of credit.
    pub fn available_liquidity(&self) -> u128 {
        self.cash.saturating_sub(self.reserved_liquidity)
    }
}

/// Supply-side entry: real balance is `scaled * supply_index / RAY`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScaledBalance {
    pub scaled: u128,
    pub previous_index: Ray,
}

impl ScaledBalance {
    pub fn balance(&self, index: Ray) -> Result<u128, LedgerError> {
        Ok(ray_mul(self.scaled, index)?)
    }

    /// Interest earned between the last mutation and `index`.
    pub fn balance_increase(&self, index: Ray) -> Result<u128, LedgerError> {
        if self.scaled == 0 {
            return Ok(0);
        }
        let now = ray_mul(self.scaled, index)?;
        let then = ray_mul(self.scaled, self.previous_index)?;
        Ok(now.saturating_sub(then))
    }
}

/// Debt-side entry. Each borrower accrues at the fixed rate of their line, from their own
/// checkpoint (`previous_index` at `last_update`).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebtPosition {
    pub scaled: u128,
    pub previous_index: Ray,
    pub last_update: u64,
    pub rate: Ray,
    /// Weight currently held in the reserve's average-rate tracker.
    pub weight: u128,
}

impl DebtPosition {
    pub fn new(rate: Ray, timestamp: u64) -> Self {
        Self {
            scaled: 0,
            previous_index: RAY,
            last_update: timestamp,
            rate,
            weight: 0,
        }
    }

    pub fn index_at(&self, timestamp: u64) -> Result<Ray, LedgerError> {
        let elapsed = timestamp.saturating_sub(self.last_update);
        Ok(accrue_linear(self.previous_index, self.rate, elapsed)?)
    }

    /// Debt owed at `timestamp`, rounded up.
    pub fn balance_at(&self, timestamp: u64) -> Result<u128, LedgerError> {
        if self.scaled == 0 {
            return Ok(0);
        }
        Ok(ray_mul_ceil(self.scaled, self.index_at(timestamp)?)?)
    }

    pub fn balance_increase_at(&self, timestamp: u64) -> Result<u128, LedgerError> {
        if self.scaled == 0 {
            return Ok(0);
        }
        let then = ray_mul_ceil(self.scaled, self.previous_index)?;
        Ok(self.balance_at(timestamp)?.saturating_sub(then))
    }
}

/// Holdings of the underlying asset outside the exchequer, plus the allowance granted to it.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Wallet {
    pub balance: u128,
    pub allowance: u128,
}

#[cfg(test)]
mod tests {
    use super::*;
    use polemarch_math::SECONDS_PER_YEAR;

    #[test]
    fn scaled_balance_tracks_index() {
        let entry = ScaledBalance {
            scaled: 1_000,
            previous_index: RAY,
        };
        assert_eq!(entry.balance(RAY).unwrap(), 1_000);
        assert_eq!(entry.balance(RAY + RAY / 10).unwrap(), 1_100);
        assert_eq!(entry.balance_increase(RAY + RAY / 10).unwrap(), 100);
    }

    #[test]
    fn debt_position_accrues_at_its_own_rate() {
        let mut position = DebtPosition::new(RAY / 10, 0);
        position.scaled = 1_000;
        assert_eq!(position.balance_at(0).unwrap(), 1_000);
        assert_eq!(position.balance_at(SECONDS_PER_YEAR).unwrap(), 1_100);
        assert_eq!(position.balance_increase_at(SECONDS_PER_YEAR).unwrap(), 100);
    }

    #[test]
    fn retire_clears_token_refs() {
        let mut ex = Exchequer::new([1; 32], [2; 32], [3; 32], [4; 32], 18, 0, 0);
        ex.retire();
        assert_eq!(ex.s_token, ZERO_ADDRESS);
        assert!(!ex.active);
        assert!(ex.retired);
    }
}
