use polemarch_types::{Address, ExchequerBook, LedgerError};

/// Moves `amount` of underlying from `owner`'s wallet into the exchequer's custody,
/// spending allowance. Nothing changes unless both balance and allowance cover it.
pub fn pull_underlying(
    book: &mut ExchequerBook,
    owner: &Address,
    amount: u128,
) -> Result<(), LedgerError> {
    let wallet = book
        .wallets
        .get_mut(owner)
        .ok_or(LedgerError::TransferFailed)?;
    if wallet.balance < amount || wallet.allowance < amount {
        return Err(LedgerError::TransferFailed);
    }
    let cash = book
        .exchequer
        .cash
        .checked_add(amount)
        .ok_or(LedgerError::ArithmeticError)?;
    wallet.balance -= amount;
    wallet.allowance -= amount;
    book.exchequer.cash = cash;
    Ok(())
}

/// Pays `amount` of custody out to `recipient`.
pub fn push_underlying(
    book: &mut ExchequerBook,
    recipient: Address,
    amount: u128,
) -> Result<(), LedgerError> {
    book.exchequer.cash = book
        .exchequer
        .cash
        .checked_sub(amount)
        .ok_or(LedgerError::NotEnoughUnderlyingAssetBalance)?;
    let wallet = book.wallets.entry(recipient).or_default();
    wallet.balance = wallet
        .balance
        .checked_add(amount)
        .ok_or(LedgerError::ArithmeticError)?;
    Ok(())
}

/// Credits a wallet with freshly wrapped underlying.
pub fn deposit(book: &mut ExchequerBook, holder: Address, amount: u128) -> Result<(), LedgerError> {
    if amount == 0 {
        return Err(LedgerError::InvalidAmount);
    }
    let wallet = book.wallets.entry(holder).or_default();
    wallet.balance = wallet
        .balance
        .checked_add(amount)
        .ok_or(LedgerError::ArithmeticError)?;
    Ok(())
}

/// Sets (not adds to) the allowance the exchequer may pull from `holder`.
pub fn approve(book: &mut ExchequerBook, holder: Address, amount: u128) {
    book.wallets.entry(holder).or_default().allowance = amount;
}
