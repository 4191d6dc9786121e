//! Checkpoint-on-touch index refresh.
//!
//! Every debt position accrues simple interest from its own checkpoint, so between two
//! refreshes the exchequer's debt grows by the tracker's weighted sum times the elapsed
//! fraction of a year. The debt index absorbs exactly that amount and the supply index
//! passes it on to suppliers (scaled down only when debt exceeds supply).

use polemarch_math::{mul_div, ray_div, ray_mul, Ray, RAY, SECONDS_PER_YEAR};
use polemarch_types::{Exchequer, ExchequerBook, LedgerError};
use tracing::debug;

/// Share of the supply that is lent out, in rays, never above one.
pub fn utilization(exchequer: &Exchequer) -> Result<Ray, LedgerError> {
    let supply = exchequer.total_supply()?;
    if supply == 0 {
        return Ok(0);
    }
    let debt = exchequer.total_debt()?;
    Ok(ray_div(debt, supply)?.min(RAY))
}

/// Rate the exchequer's total debt currently grows at. Below the tracker average when
/// positions carry interest accrued since their last checkpoint.
pub fn debt_rate(book: &ExchequerBook) -> Result<Ray, LedgerError> {
    let debt = book.exchequer.total_debt()?;
    if debt == 0 {
        return Ok(0);
    }
    Ok(ray_div(book.rate.weighted_sum(), debt)?)
}

/// Supply-side rate implied by the current debt rate.
pub fn supply_rate(book: &ExchequerBook) -> Result<Ray, LedgerError> {
    Ok(ray_mul(debt_rate(book)?, utilization(&book.exchequer)?)?)
}

/// Interest the open positions accrue over `elapsed` seconds.
fn accrued_interest(book: &ExchequerBook, elapsed: u64) -> Result<u128, LedgerError> {
    Ok(mul_div(
        book.rate.weighted_sum(),
        u128::from(elapsed),
        u128::from(SECONDS_PER_YEAR),
    )?)
}

/// Scales `index` so that `total` at the old index becomes `total + interest`.
fn grow_index(index: Ray, total: u128, interest: u128) -> Result<Ray, LedgerError> {
    if total == 0 || interest == 0 {
        return Ok(index);
    }
    let grown = total
        .checked_add(interest)
        .ok_or(LedgerError::ArithmeticError)?;
    Ok(mul_div(index, grown, total)?)
}

/// `(supply_index, debt_index)` as they would be after a refresh at `now`, without mutating.
pub fn projected_indexes(book: &ExchequerBook, now: u64) -> Result<(Ray, Ray), LedgerError> {
    let exchequer = &book.exchequer;
    let elapsed = now.saturating_sub(exchequer.last_update_timestamp);
    if elapsed == 0 {
        return Ok((exchequer.supply_index, exchequer.debt_index));
    }
    let interest = accrued_interest(book, elapsed)?;
    let debt = exchequer.total_debt()?;
    let supply = exchequer.total_supply()?;

    let debt_index = grow_index(exchequer.debt_index, debt, interest)?;
    // suppliers never earn more than the interest paid, nor more than their own balance's share
    let earned = if debt > supply {
        mul_div(interest, supply, debt)?
    } else {
        interest
    };
    let supply_index = grow_index(exchequer.supply_index, supply, earned)?;
    Ok((supply_index, debt_index))
}

/// Advances both indices to `now`. Must run before any balance-dependent check.
///
/// A `now` behind the last checkpoint leaves the indices untouched.
pub fn refresh(book: &mut ExchequerBook, now: u64) -> Result<(), LedgerError> {
    let (supply_index, debt_index) = projected_indexes(book, now)?;
    let exchequer = &mut book.exchequer;
    if now > exchequer.last_update_timestamp {
        debug!(
            asset = %hex::encode(exchequer.asset),
            elapsed = now - exchequer.last_update_timestamp,
            supply_index,
            debt_index,
            "exchequer indexes refreshed"
        );
        exchequer.last_update_timestamp = now;
    }
    exchequer.supply_index = supply_index;
    exchequer.debt_index = debt_index;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ETHER: u128 = 1_000_000_000_000_000_000;

    fn book() -> ExchequerBook {
        ExchequerBook::new(Exchequer::new([1; 32], [2; 32], [3; 32], [4; 32], 18, 0, 0))
    }

    #[test]
    fn idle_exchequer_does_not_grow() {
        let mut book = book();
        book.exchequer.total_scaled_supply = ETHER;
        refresh(&mut book, SECONDS_PER_YEAR).unwrap();
        assert_eq!(book.exchequer.supply_index, RAY);
        assert_eq!(book.exchequer.debt_index, RAY);
        assert_eq!(book.exchequer.last_update_timestamp, SECONDS_PER_YEAR);
    }

    #[test]
    fn supply_grows_with_utilization() {
        let mut book = book();
        book.exchequer.total_scaled_supply = 2 * ETHER;
        book.exchequer.total_scaled_debt = ETHER;
        book.rate.increase(ETHER, RAY / 10).unwrap();
        assert_eq!(supply_rate(&book).unwrap(), RAY / 20);

        refresh(&mut book, SECONDS_PER_YEAR).unwrap();
        // 10% on the debt side, 50% utilization -> 5% on the supply side
        assert_eq!(book.exchequer.debt_index, RAY + RAY / 10);
        assert_eq!(book.exchequer.supply_index, RAY + RAY / 20);
    }

    #[test]
    fn debt_grows_by_the_weighted_sum_not_the_average() {
        let mut book = book();
        book.exchequer.total_scaled_supply = 10 * ETHER;
        // one ether checkpointed a year ago at 10% now owes 1.1; the tracker still weighs 1.0
        book.exchequer.total_scaled_debt = ETHER + ETHER / 10;
        book.rate.increase(ETHER, RAY / 10).unwrap();

        refresh(&mut book, SECONDS_PER_YEAR).unwrap();
        assert_eq!(book.exchequer.total_debt().unwrap(), ETHER + ETHER / 5);
        // suppliers earn what the debt paid: 0.1 on 10
        assert_eq!(book.exchequer.total_supply().unwrap(), 10 * ETHER + ETHER / 10);
    }

    #[test]
    fn clock_going_backwards_is_ignored() {
        let mut book = book();
        book.exchequer.last_update_timestamp = 100;
        book.rate.increase(ETHER, RAY).unwrap();
        book.exchequer.total_scaled_debt = ETHER;
        refresh(&mut book, 50).unwrap();
        assert_eq!(book.exchequer.last_update_timestamp, 100);
        assert_eq!(book.exchequer.debt_index, RAY);
    }
}
