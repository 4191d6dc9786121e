//! Read-only views. Every figure is projected to the given timestamp without touching the
//! stored checkpoint, so reads never need the write path.

use crate::accrual::{projected_indexes, supply_rate};
use crate::tokens::{debt_balance, total_position_debt};
use polemarch_math::{ray_mul, ray_mul_ceil, Ray};
use polemarch_types::{Address, Exchequer, ExchequerBook, LedgerError, LineOfCredit};

/// Snapshot of the exchequer with both indices projected to `now`.
pub fn get_exchequer(book: &ExchequerBook, now: u64) -> Result<Exchequer, LedgerError> {
    let (supply_index, debt_index) = projected_indexes(book, now)?;
    let mut snapshot = book.exchequer.clone();
    snapshot.supply_index = supply_index;
    snapshot.debt_index = debt_index;
    if now > snapshot.last_update_timestamp {
        snapshot.last_update_timestamp = now;
    }
    Ok(snapshot)
}

/// Current supply index, i.e. what one scaled unit of supply is worth.
pub fn normalized_return(book: &ExchequerBook, now: u64) -> Result<Ray, LedgerError> {
    Ok(projected_indexes(book, now)?.0)
}

pub fn average_rate(book: &ExchequerBook) -> Result<Ray, LedgerError> {
    Ok(book.rate.average_rate()?)
}

pub fn current_supply_rate(book: &ExchequerBook) -> Result<Ray, LedgerError> {
    supply_rate(book)
}

/// Rate of the borrower's live line, else of their latest line, else zero.
pub fn user_rate(book: &ExchequerBook, borrower: &Address) -> Ray {
    book.latest_line(borrower).map(|line| line.rate).unwrap_or(0)
}

pub fn line_of_credit<'a>(book: &'a ExchequerBook, borrower: &Address) -> Option<&'a LineOfCredit> {
    book.latest_line(borrower)
}

/// The borrower's most recently created line across every exchequer.
pub fn get_line_of_credit<'a, I>(books: I, borrower: &Address) -> Option<&'a LineOfCredit>
where
    I: IntoIterator<Item = &'a ExchequerBook>,
{
    books
        .into_iter()
        .filter_map(|book| book.latest_line(borrower))
        .max_by_key(|line| line.id)
}

// ── Supply token ─────────────────────────────────────────────────────

pub fn supply_balance_of(book: &ExchequerBook, holder: &Address, now: u64) -> Result<u128, LedgerError> {
    let index = normalized_return(book, now)?;
    match book.supply.get(holder) {
        Some(entry) => entry.balance(index),
        None => Ok(0),
    }
}

pub fn supply_total(book: &ExchequerBook, now: u64) -> Result<u128, LedgerError> {
    let index = normalized_return(book, now)?;
    Ok(ray_mul(book.exchequer.total_scaled_supply, index)?)
}

pub fn scaled_balance_of(book: &ExchequerBook, holder: &Address) -> u128 {
    book.supply.get(holder).map(|entry| entry.scaled).unwrap_or(0)
}

/// Supply index at the holder's last balance change.
pub fn previous_index(book: &ExchequerBook, holder: &Address) -> Ray {
    book.supply
        .get(holder)
        .map(|entry| entry.previous_index)
        .unwrap_or(0)
}

// ── Debt token ───────────────────────────────────────────────────────

pub fn debt_balance_of(book: &ExchequerBook, borrower: &Address, now: u64) -> Result<u128, LedgerError> {
    debt_balance(book, borrower, now)
}

/// Debt of the whole exchequer at the reserve debt index.
pub fn debt_total(book: &ExchequerBook, now: u64) -> Result<u128, LedgerError> {
    let (_, debt_index) = projected_indexes(book, now)?;
    Ok(ray_mul_ceil(book.exchequer.total_scaled_debt, debt_index)?)
}

/// Sum of every borrower's own balance. Agrees with [`debt_total`] up to a few wei of rounding.
pub fn debt_total_by_position(book: &ExchequerBook, now: u64) -> Result<u128, LedgerError> {
    total_position_debt(book, now)
}

pub fn scaled_debt_of(book: &ExchequerBook, borrower: &Address) -> u128 {
    book.debt.get(borrower).map(|p| p.scaled).unwrap_or(0)
}

// ── Custody ──────────────────────────────────────────────────────────

pub fn available_liquidity(book: &ExchequerBook) -> u128 {
    book.exchequer.available_liquidity()
}

pub fn decimals(book: &ExchequerBook) -> u8 {
    book.exchequer.decimals
}

pub fn underlying_balance_of(book: &ExchequerBook, holder: &Address) -> u128 {
    book.wallets.get(holder).map(|w| w.balance).unwrap_or(0)
}

pub fn growth_balance_of(book: &ExchequerBook, provider: &Address) -> u128 {
    book.growth.get(provider).copied().unwrap_or(0)
}
