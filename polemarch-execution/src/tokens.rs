//! Scaled-balance bookkeeping for the supply, debt and growth sides of an exchequer.
//!
//! Supply amounts are scaled by the exchequer's supply index. Debt amounts are scaled by
//! the borrower's own index, which accrues at the fixed rate of their line. Rounding always
//! favours the exchequer: supply mints floor and burns ceil, debt mints ceil and burns floor.

use crate::ExecutionContext;
use polemarch_math::{ray_div, ray_div_ceil, RAY};
use polemarch_types::{Address, DebtPosition, ExchequerBook, LedgerError, LedgerEvent, TokenSide};

fn net_change_event(
    token: TokenSide,
    holder: Address,
    amount: u128,
    balance_increase: u128,
    index: u128,
    burning: bool,
) -> LedgerEvent {
    // Interest that outgrew a burn is reported as a mint of the difference.
    if burning && balance_increase <= amount {
        LedgerEvent::Burn {
            token,
            holder,
            amount: amount - balance_increase,
            balance_increase,
            index,
        }
    } else if burning {
        LedgerEvent::Mint {
            token,
            holder,
            amount: balance_increase - amount,
            balance_increase,
            index,
        }
    } else {
        LedgerEvent::Mint {
            token,
            holder,
            amount: amount.saturating_add(balance_increase),
            balance_increase,
            index,
        }
    }
}

/// Credits `amount` of supply to `holder` at the current supply index. Returns the scaled units.
pub fn mint_supply(
    book: &mut ExchequerBook,
    ctx: &mut ExecutionContext,
    holder: Address,
    amount: u128,
) -> Result<u128, LedgerError> {
    let index = book.exchequer.supply_index;
    let scaled = ray_div(amount, index)?;
    if scaled == 0 {
        return Err(LedgerError::InvalidAmount);
    }

    let entry = book.supply.entry(holder).or_default();
    let balance_increase = entry.balance_increase(index)?;
    entry.scaled = entry
        .scaled
        .checked_add(scaled)
        .ok_or(LedgerError::ArithmeticError)?;
    entry.previous_index = index;

    book.exchequer.total_scaled_supply = book
        .exchequer
        .total_scaled_supply
        .checked_add(scaled)
        .ok_or(LedgerError::ArithmeticError)?;

    ctx.emit(net_change_event(
        TokenSide::Supply,
        holder,
        amount,
        balance_increase,
        index,
        false,
    ));
    Ok(scaled)
}

/// Debits `amount` of supply from `holder`. The caller has already checked the balance.
pub fn burn_supply(
    book: &mut ExchequerBook,
    ctx: &mut ExecutionContext,
    holder: Address,
    amount: u128,
) -> Result<u128, LedgerError> {
    let index = book.exchequer.supply_index;
    let entry = book
        .supply
        .get_mut(&holder)
        .ok_or(LedgerError::UserBalanceTooLow)?;
    let balance = entry.balance(index)?;
    if amount > balance {
        return Err(LedgerError::UserBalanceTooLow);
    }

    let scaled = if amount == balance {
        entry.scaled
    } else {
        ray_div_ceil(amount, index)?.min(entry.scaled)
    };
    let balance_increase = entry.balance_increase(index)?;
    entry.scaled -= scaled;
    entry.previous_index = index;

    book.exchequer.total_scaled_supply = book
        .exchequer
        .total_scaled_supply
        .checked_sub(scaled)
        .ok_or(LedgerError::ArithmeticError)?;

    ctx.emit(net_change_event(
        TokenSide::Supply,
        holder,
        amount,
        balance_increase,
        index,
        true,
    ));
    Ok(scaled)
}

/// Moves the position's weight in the average-rate tracker to its current real debt.
fn checkpoint_weight(
    book: &mut ExchequerBook,
    borrower: &Address,
    timestamp: u64,
) -> Result<(), LedgerError> {
    let position = book
        .debt
        .get_mut(borrower)
        .ok_or(LedgerError::UserDoesNotHaveLineOfCredit)?;
    let new_weight = position.balance_at(timestamp)?;
    book.rate.reweigh(position.weight, new_weight, position.rate)?;
    position.weight = new_weight;
    if book.rate.is_empty() {
        book.exchequer.total_scaled_debt = 0;
    }
    Ok(())
}

/// Opens (or resets) the debt position of a borrower for a new line at `rate`.
pub fn open_debt_position(
    book: &mut ExchequerBook,
    borrower: Address,
    rate: u128,
    timestamp: u64,
) -> Result<(), LedgerError> {
    if let Some(existing) = book.debt.get(&borrower) {
        if existing.scaled != 0 {
            return Err(LedgerError::UserDebtBalanceIsNotZero);
        }
        // a zero position carries no weight, but clear whatever is left
        book.rate.decrease(existing.weight, existing.rate)?;
    }
    book.debt.insert(borrower, DebtPosition::new(rate, timestamp));
    Ok(())
}

/// Adds `amount` of debt to `borrower` at their line's rate.
pub fn mint_debt(
    book: &mut ExchequerBook,
    ctx: &mut ExecutionContext,
    borrower: Address,
    amount: u128,
) -> Result<u128, LedgerError> {
    let now = ctx.timestamp;
    let reserve_index = book.exchequer.debt_index;
    let position = book
        .debt
        .get_mut(&borrower)
        .ok_or(LedgerError::UserDoesNotHaveLineOfCredit)?;

    let index = position.index_at(now)?;
    let balance_increase = position.balance_increase_at(now)?;
    let scaled = ray_div_ceil(amount, index)?;
    position.scaled = position
        .scaled
        .checked_add(scaled)
        .ok_or(LedgerError::ArithmeticError)?;
    position.previous_index = index;
    position.last_update = now;

    book.exchequer.total_scaled_debt = book
        .exchequer
        .total_scaled_debt
        .checked_add(ray_div_ceil(amount, reserve_index)?)
        .ok_or(LedgerError::ArithmeticError)?;
    checkpoint_weight(book, &borrower, now)?;

    ctx.emit(net_change_event(
        TokenSide::Debt,
        borrower,
        amount,
        balance_increase,
        index,
        false,
    ));
    Ok(scaled)
}

/// Removes `amount` of debt from `borrower`. Covering the full balance clears the position.
pub fn burn_debt(
    book: &mut ExchequerBook,
    ctx: &mut ExecutionContext,
    borrower: Address,
    amount: u128,
) -> Result<u128, LedgerError> {
    let now = ctx.timestamp;
    let reserve_index = book.exchequer.debt_index;
    let position = book
        .debt
        .get_mut(&borrower)
        .ok_or(LedgerError::UserDoesNotHaveLineOfCredit)?;

    let balance = position.balance_at(now)?;
    if balance == 0 {
        return Err(LedgerError::UserDebtBalanceIsZero);
    }
    let index = position.index_at(now)?;
    let balance_increase = position.balance_increase_at(now)?;
    let amount = amount.min(balance);
    let scaled = if amount == balance {
        position.scaled
    } else {
        ray_div(amount, index)?.min(position.scaled)
    };
    position.scaled -= scaled;
    position.previous_index = index;
    position.last_update = now;

    book.exchequer.total_scaled_debt = book
        .exchequer
        .total_scaled_debt
        .saturating_sub(ray_div(amount, reserve_index)?);
    checkpoint_weight(book, &borrower, now)?;

    ctx.emit(net_change_event(
        TokenSide::Debt,
        borrower,
        amount,
        balance_increase,
        index,
        true,
    ));
    Ok(scaled)
}

/// Growth-token units are minted 1:1 with the underlying moved into the buffer.
pub fn mint_growth(
    book: &mut ExchequerBook,
    ctx: &mut ExecutionContext,
    provider: Address,
    amount: u128,
) -> Result<(), LedgerError> {
    let units = book.growth.entry(provider).or_default();
    *units = units.checked_add(amount).ok_or(LedgerError::ArithmeticError)?;
    ctx.emit(LedgerEvent::Mint {
        token: TokenSide::Growth,
        holder: provider,
        amount,
        balance_increase: 0,
        index: RAY,
    });
    Ok(())
}

/// Real debt of `borrower` at `timestamp`, zero if they never borrowed.
pub fn debt_balance(
    book: &ExchequerBook,
    borrower: &Address,
    timestamp: u64,
) -> Result<u128, LedgerError> {
    match book.debt.get(borrower) {
        Some(position) => position.balance_at(timestamp),
        None => Ok(0),
    }
}

/// Real debt of every position, summed.
pub fn total_position_debt(book: &ExchequerBook, timestamp: u64) -> Result<u128, LedgerError> {
    book.debt.values().try_fold(0u128, |acc, position| {
        acc.checked_add(position.balance_at(timestamp)?)
            .ok_or(LedgerError::ArithmeticError)
    })
}
