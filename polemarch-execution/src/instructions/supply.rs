use crate::accrual::refresh;
use crate::instructions::wallet::{pull_underlying, push_underlying};
use crate::tokens::{burn_supply, mint_supply};
use crate::ExecutionContext;
use polemarch_math::ray_div;
use polemarch_types::{Address, ExchequerBook, LedgerError, LedgerEvent};

/// Deposits `amount` of underlying and credits scaled supply at the current index.
pub fn supply(
    book: &mut ExchequerBook,
    ctx: &mut ExecutionContext,
    depositor: &Address,
    amount: u128,
) -> Result<(), LedgerError> {
    if amount == 0 {
        return Err(LedgerError::InvalidAmount);
    }
    if !book.exchequer.active {
        return Err(LedgerError::ExchequerInactive);
    }
    refresh(book, ctx.timestamp)?;

    if ray_div(amount, book.exchequer.supply_index)? == 0 {
        return Err(LedgerError::InvalidAmount);
    }
    let cap = book.exchequer.supply_cap;
    if cap != 0 {
        let after = book
            .exchequer
            .total_supply()?
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticError)?;
        if after > cap {
            return Err(LedgerError::SupplyCapExceeded);
        }
    }

    pull_underlying(book, depositor, amount)?;
    mint_supply(book, ctx, *depositor, amount)?;
    ctx.emit(LedgerEvent::Supply {
        asset: book.asset(),
        depositor: *depositor,
        amount,
    });
    Ok(())
}

/// Burns supply and pays the underlying out, limited to liquidity not promised to lines.
pub fn withdraw(
    book: &mut ExchequerBook,
    ctx: &mut ExecutionContext,
    recipient: &Address,
    amount: u128,
) -> Result<(), LedgerError> {
    if amount == 0 {
        return Err(LedgerError::InvalidAmount);
    }
    if !book.exchequer.active {
        return Err(LedgerError::ExchequerInactive);
    }
    refresh(book, ctx.timestamp)?;

    let balance = match book.supply.get(recipient) {
        Some(entry) => entry.balance(book.exchequer.supply_index)?,
        None => 0,
    };
    if amount > balance {
        return Err(LedgerError::UserBalanceTooLow);
    }
    if amount > book.exchequer.available_liquidity() {
        return Err(LedgerError::WithdrawableBalanceTooLow);
    }

    burn_supply(book, ctx, *recipient, amount)?;
    push_underlying(book, *recipient, amount)?;
    ctx.emit(LedgerEvent::Withdraw {
        asset: book.asset(),
        recipient: *recipient,
        amount,
    });
    Ok(())
}
