//! Line-of-credit lifecycle: `Open -> {Delinquent, Closed}`, `Delinquent -> Closed`.

use crate::accrual::refresh;
use crate::auth::require_governance;
use crate::instructions::wallet::{pull_underlying, push_underlying};
use crate::tokens::{burn_debt, debt_balance, mint_debt, mint_supply, open_debt_position};
use crate::ExecutionContext;
use polemarch_math::{ray_div, ray_mul, Ray};
use polemarch_types::{
    Address, ExchequerBook, LedgerError, LedgerEvent, LineOfCredit, LineState, SECONDS_PER_DAY,
};

pub struct NewLine {
    pub borrower: Address,
    pub borrow_max: u128,
    pub rate: Ray,
    pub term_days: u64,
}

/// Replaces the capacity a line holds back from withdrawals.
fn set_reserved(book: &mut ExchequerBook, borrower: &Address, reserved: u128) -> Result<(), LedgerError> {
    let previous = match book.active_line_mut(borrower) {
        Some(line) => std::mem::replace(&mut line.reserved, reserved),
        None => return Err(LedgerError::UserDoesNotHaveLineOfCredit),
    };
    book.exchequer.reserved_liquidity = book
        .exchequer
        .reserved_liquidity
        .saturating_sub(previous)
        .checked_add(reserved)
        .ok_or(LedgerError::ArithmeticError)?;
    Ok(())
}

/// Total debt of the exchequer plus `extra` must stay within the borrow cap (0 = none).
fn check_borrow_cap(book: &ExchequerBook, extra: u128) -> Result<(), LedgerError> {
    let cap = book.exchequer.borrow_cap;
    if cap == 0 {
        return Ok(());
    }
    let after = book
        .exchequer
        .total_debt()?
        .checked_add(extra)
        .ok_or(LedgerError::ArithmeticError)?;
    if after > cap {
        return Err(LedgerError::ExchequerMustStayBelowBorrowCap);
    }
    Ok(())
}

pub fn create(
    book: &mut ExchequerBook,
    ctx: &mut ExecutionContext,
    sender: &Address,
    params: NewLine,
) -> Result<(), LedgerError> {
    require_governance(ctx.roles, sender)?;
    if !book.exchequer.active {
        return Err(LedgerError::ExchequerInactive);
    }
    if params.borrow_max == 0 {
        return Err(LedgerError::InvalidBorrowMax);
    }
    refresh(book, ctx.timestamp)?;

    if params.borrow_max > book.exchequer.available_liquidity() {
        return Err(LedgerError::NotEnoughUnderlyingAssetBalance);
    }
    check_borrow_cap(book, params.borrow_max)?;
    if let Some(existing) = book.active_line(&params.borrower) {
        return Err(match existing.state {
            LineState::Delinquent => LedgerError::UserHasDeliquentDebt,
            _ => LedgerError::UserAlreadyHasBorrowPosition,
        });
    }

    let expiration_timestamp = params
        .term_days
        .checked_mul(SECONDS_PER_DAY)
        .and_then(|term| ctx.timestamp.checked_add(term))
        .ok_or(LedgerError::ArithmeticError)?;
    let fee = ray_mul(params.borrow_max, book.exchequer.origination_fee_rate)?;
    let asset = book.asset();

    open_debt_position(book, params.borrower, params.rate, ctx.timestamp)?;
    let id = ctx.line_ids.next();
    book.lines.insert(
        id,
        LineOfCredit {
            id,
            borrower: params.borrower,
            asset,
            borrow_max: params.borrow_max,
            rate: params.rate,
            creation_timestamp: ctx.timestamp,
            expiration_timestamp,
            state: LineState::Open,
            reserved: 0,
            backstop_drawn: 0,
        },
    );
    book.active_lines.insert(params.borrower, id);
    set_reserved(book, &params.borrower, params.borrow_max)?;

    ctx.emit(LedgerEvent::CreateLineOfCredit {
        id,
        rate: params.rate,
        borrower: params.borrower,
        asset,
        borrow_max: params.borrow_max,
        expiration_timestamp,
    });

    // The fee is credited to the fee recipient on the supply side. It is not a deposit,
    // so the supply cap does not apply; dust that scales to zero units is dropped.
    let fee_recipient = ctx.roles.fee_recipient;
    if ray_div(fee, book.exchequer.supply_index)? > 0 {
        mint_supply(book, ctx, fee_recipient, fee)?;
    }
    ctx.emit(LedgerEvent::OriginationFee {
        id,
        asset,
        fee_recipient,
        fee,
    });
    Ok(())
}

pub fn borrow(
    book: &mut ExchequerBook,
    ctx: &mut ExecutionContext,
    borrower: &Address,
    amount: u128,
) -> Result<(), LedgerError> {
    let line = book
        .active_line(borrower)
        .ok_or(LedgerError::UserDoesNotHaveLineOfCredit)?;
    let (id, rate, borrow_max, state, expired) = (
        line.id,
        line.rate,
        line.borrow_max,
        line.state,
        line.is_expired(ctx.timestamp),
    );
    if amount == 0 {
        return Err(LedgerError::InvalidAmount);
    }
    if !book.exchequer.active {
        return Err(LedgerError::ExchequerInactive);
    }
    if !book.exchequer.borrowing_enabled {
        return Err(LedgerError::BorrowingNotEnabled);
    }
    if state == LineState::Delinquent {
        return Err(LedgerError::UserHasDeliquentDebt);
    }
    if expired {
        return Err(LedgerError::LineOfCreditExpired);
    }
    refresh(book, ctx.timestamp)?;

    let owed = debt_balance(book, borrower, ctx.timestamp)?;
    let after = owed
        .checked_add(amount)
        .ok_or(LedgerError::ArithmeticError)?;
    if after > borrow_max {
        return Err(LedgerError::UserCannotBorrowOverMaxLimit);
    }
    check_borrow_cap(book, amount)?;
    if amount > book.exchequer.cash {
        return Err(LedgerError::NotEnoughUnderlyingAssetBalance);
    }

    mint_debt(book, ctx, *borrower, amount)?;
    let owed = debt_balance(book, borrower, ctx.timestamp)?;
    set_reserved(book, borrower, borrow_max.saturating_sub(owed))?;
    push_underlying(book, *borrower, amount)?;

    ctx.emit(LedgerEvent::Borrow {
        id,
        rate,
        borrower: *borrower,
        asset: book.asset(),
        amount,
    });
    Ok(())
}

/// Repays up to `amount` of `borrower`'s debt out of `payer`'s wallet. Delinquent lines
/// stay repayable; repayments refill whatever the growth buffer advanced first.
pub fn repay(
    book: &mut ExchequerBook,
    ctx: &mut ExecutionContext,
    payer: &Address,
    borrower: &Address,
    amount: u128,
) -> Result<(), LedgerError> {
    let line = book
        .active_line(borrower)
        .ok_or(LedgerError::UserDoesNotHaveLineOfCredit)?;
    let (id, borrow_max, state, expired) = (
        line.id,
        line.borrow_max,
        line.state,
        line.is_expired(ctx.timestamp),
    );
    if amount == 0 {
        return Err(LedgerError::InvalidAmount);
    }
    if !book.exchequer.active {
        return Err(LedgerError::ExchequerInactive);
    }
    if state == LineState::Open && expired {
        return Err(LedgerError::LineOfCreditExpired);
    }
    refresh(book, ctx.timestamp)?;

    let owed = debt_balance(book, borrower, ctx.timestamp)?;
    if owed == 0 {
        return Err(LedgerError::UserDebtBalanceIsZero);
    }
    let paid = amount.min(owed);

    pull_underlying(book, payer, paid)?;
    burn_debt(book, ctx, *borrower, paid)?;

    let refill = match book.active_line_mut(borrower) {
        Some(line) => {
            let refill = paid.min(line.backstop_drawn);
            line.backstop_drawn -= refill;
            refill
        }
        None => 0,
    };
    if refill > 0 {
        book.exchequer.cash -= refill;
        book.exchequer.growth_buffer = book
            .exchequer
            .growth_buffer
            .checked_add(refill)
            .ok_or(LedgerError::ArithmeticError)?;
    }
    if state == LineState::Open {
        let owed = debt_balance(book, borrower, ctx.timestamp)?;
        set_reserved(book, borrower, borrow_max.saturating_sub(owed))?;
    }

    ctx.emit(LedgerEvent::Repay {
        id,
        borrower: *borrower,
        asset: book.asset(),
        amount: paid,
    });
    Ok(())
}

/// Flags an expired line that still carries debt. The growth buffer advances up to the
/// outstanding amount into lendable cash so suppliers are not left short.
pub fn mark_delinquent(
    book: &mut ExchequerBook,
    ctx: &mut ExecutionContext,
    sender: &Address,
    borrower: &Address,
) -> Result<(), LedgerError> {
    require_governance(ctx.roles, sender)?;
    let line = book
        .active_line(borrower)
        .ok_or(LedgerError::UserDoesNotHaveLineOfCredit)?;
    if line.state == LineState::Delinquent {
        return Err(LedgerError::UserDebtIsDeliquent);
    }
    if !line.is_expired(ctx.timestamp) {
        return Err(LedgerError::LineOfCreditHasNotExpired);
    }
    let id = line.id;
    refresh(book, ctx.timestamp)?;

    let outstanding = debt_balance(book, borrower, ctx.timestamp)?;
    if outstanding == 0 {
        return Err(LedgerError::UserDebtBalanceIsZero);
    }
    let drawn = outstanding.min(book.exchequer.growth_buffer);
    book.exchequer.growth_buffer -= drawn;
    book.exchequer.cash = book
        .exchequer
        .cash
        .checked_add(drawn)
        .ok_or(LedgerError::ArithmeticError)?;

    set_reserved(book, borrower, 0)?;
    if let Some(line) = book.active_line_mut(borrower) {
        line.state = LineState::Delinquent;
        line.backstop_drawn = drawn;
    }

    ctx.emit(LedgerEvent::Delinquent {
        id,
        borrower: *borrower,
        asset: book.asset(),
        outstanding,
        backstop_drawn: drawn,
    });
    Ok(())
}

/// Closes an expired line with no debt left, freeing the borrower's slot.
pub fn close(
    book: &mut ExchequerBook,
    ctx: &mut ExecutionContext,
    sender: &Address,
    borrower: &Address,
) -> Result<(), LedgerError> {
    require_governance(ctx.roles, sender)?;
    let line = book
        .active_line(borrower)
        .ok_or(LedgerError::UserDoesNotHaveLineOfCredit)?;
    if !line.is_expired(ctx.timestamp) {
        return Err(LedgerError::LineOfCreditHasNotExpired);
    }
    let (id, expiration_timestamp) = (line.id, line.expiration_timestamp);
    refresh(book, ctx.timestamp)?;

    if debt_balance(book, borrower, ctx.timestamp)? != 0 {
        return Err(LedgerError::UserDebtBalanceIsNotZero);
    }

    set_reserved(book, borrower, 0)?;
    if let Some(line) = book.active_line_mut(borrower) {
        line.state = LineState::Closed;
    }
    book.active_lines.remove(borrower);

    ctx.emit(LedgerEvent::CloseLineOfCredit {
        id,
        borrower: *borrower,
        asset: book.asset(),
        expiration_timestamp,
    });
    Ok(())
}
