use crate::accrual::refresh;
use crate::auth::require_governance;
use crate::instructions::wallet::{pull_underlying, push_underlying};
use crate::tokens::mint_growth;
use crate::ExecutionContext;
use polemarch_math::Ray;
use polemarch_types::{Address, Exchequer, ExchequerBook, LedgerError, LedgerEvent};

pub struct NewExchequer {
    pub asset: Address,
    pub s_token: Address,
    pub d_token: Address,
    pub g_token: Address,
    pub decimals: u8,
    pub origination_fee_rate: Ray,
}

/// Builds the book of a newly registered asset. `registered` tells whether the asset
/// already has a record, live or retired.
pub fn add(
    ctx: &mut ExecutionContext,
    sender: &Address,
    registered: bool,
    params: NewExchequer,
) -> Result<ExchequerBook, LedgerError> {
    require_governance(ctx.roles, sender)?;
    if registered {
        return Err(LedgerError::ReserveAlreadyExists);
    }
    let exchequer = Exchequer::new(
        params.asset,
        params.s_token,
        params.d_token,
        params.g_token,
        params.decimals,
        params.origination_fee_rate,
        ctx.timestamp,
    );
    ctx.emit(LedgerEvent::ExchequerAdded {
        asset: params.asset,
        s_token: params.s_token,
        d_token: params.d_token,
        g_token: params.g_token,
        decimals: params.decimals,
    });
    Ok(ExchequerBook::new(exchequer))
}

fn ensure_listed(book: &ExchequerBook) -> Result<(), LedgerError> {
    if book.exchequer.retired {
        return Err(LedgerError::ExchequerRetired);
    }
    Ok(())
}

/// Retires an exchequer that no longer carries balances. The record stays registered.
///
/// Backstop funds belong to their providers and block the deletion. Cash left over once
/// every supplier and borrower is gone is rounding surplus and goes to the fee recipient.
pub fn delete(
    book: &mut ExchequerBook,
    ctx: &mut ExecutionContext,
    sender: &Address,
) -> Result<(), LedgerError> {
    require_governance(ctx.roles, sender)?;
    ensure_listed(book)?;
    let exchequer = &book.exchequer;
    if exchequer.total_scaled_supply != 0
        || exchequer.total_scaled_debt != 0
        || exchequer.growth_buffer != 0
        || book.has_live_lines()
    {
        return Err(LedgerError::ExchequerHasOutstandingBalances);
    }
    let surplus = book.exchequer.cash;
    if surplus > 0 {
        push_underlying(book, ctx.roles.fee_recipient, surplus)?;
    }
    book.exchequer.retire();
    ctx.emit(LedgerEvent::ExchequerDeleted {
        asset: book.asset(),
    });
    Ok(())
}

pub fn set_active(
    book: &mut ExchequerBook,
    ctx: &mut ExecutionContext,
    sender: &Address,
    active: bool,
) -> Result<(), LedgerError> {
    require_governance(ctx.roles, sender)?;
    ensure_listed(book)?;
    refresh(book, ctx.timestamp)?;
    book.exchequer.active = active;
    ctx.emit(LedgerEvent::ExchequerActiveSet {
        asset: book.asset(),
        active,
    });
    Ok(())
}

pub fn set_borrowing(
    book: &mut ExchequerBook,
    ctx: &mut ExecutionContext,
    sender: &Address,
    enabled: bool,
) -> Result<(), LedgerError> {
    require_governance(ctx.roles, sender)?;
    ensure_listed(book)?;
    book.exchequer.borrowing_enabled = enabled;
    ctx.emit(LedgerEvent::ExchequerBorrowingSet {
        asset: book.asset(),
        enabled,
    });
    Ok(())
}

/// `0` lifts the cap.
pub fn set_supply_cap(
    book: &mut ExchequerBook,
    ctx: &mut ExecutionContext,
    sender: &Address,
    cap: u128,
) -> Result<(), LedgerError> {
    require_governance(ctx.roles, sender)?;
    ensure_listed(book)?;
    book.exchequer.supply_cap = cap;
    ctx.emit(LedgerEvent::SupplyCapSet {
        asset: book.asset(),
        cap,
    });
    Ok(())
}

/// `0` lifts the cap.
pub fn set_borrow_cap(
    book: &mut ExchequerBook,
    ctx: &mut ExecutionContext,
    sender: &Address,
    cap: u128,
) -> Result<(), LedgerError> {
    require_governance(ctx.roles, sender)?;
    ensure_listed(book)?;
    book.exchequer.borrow_cap = cap;
    ctx.emit(LedgerEvent::BorrowCapSet {
        asset: book.asset(),
        cap,
    });
    Ok(())
}

/// Moves underlying from a backstop provider into the growth buffer that covers
/// delinquent lines, crediting growth-token units 1:1.
pub fn fund_growth_buffer(
    book: &mut ExchequerBook,
    ctx: &mut ExecutionContext,
    provider: &Address,
    amount: u128,
) -> Result<(), LedgerError> {
    if amount == 0 {
        return Err(LedgerError::InvalidAmount);
    }
    if !book.exchequer.active {
        return Err(LedgerError::ExchequerInactive);
    }
    refresh(book, ctx.timestamp)?;

    pull_underlying(book, provider, amount)?;
    // custody for the buffer is tracked apart from lendable cash
    book.exchequer.cash -= amount;
    book.exchequer.growth_buffer = book
        .exchequer
        .growth_buffer
        .checked_add(amount)
        .ok_or(LedgerError::ArithmeticError)?;
    mint_growth(book, ctx, *provider, amount)?;
    ctx.emit(LedgerEvent::GrowthBufferFunded {
        asset: book.asset(),
        provider: *provider,
        amount,
    });
    Ok(())
}
