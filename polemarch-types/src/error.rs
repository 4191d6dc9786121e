use polemarch_math::MathError;
use std::fmt;
use thiserror::Error;

/// Broad family of a [`LedgerError`], so callers can tell misconfiguration apart from
/// business-rule rejections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    BusinessRule,
    Configuration,
    Authorization,
    Transfer,
    Arithmetic,
}

/// Every rejection the ledger can produce. `Display` renders [`LedgerError::code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LedgerError {
    // ── Amounts and balances ─────────────────────────────────────────
    InvalidAmount,
    UserBalanceTooLow,
    WithdrawableBalanceTooLow,
    SupplyCapExceeded,

    // ── Exchequer state ──────────────────────────────────────────────
    ExchequerInactive,
    BorrowingNotEnabled,
    ExchequerMustStayBelowBorrowCap,
    NotEnoughUnderlyingAssetBalance,

    // ── Lines of credit ──────────────────────────────────────────────
    InvalidBorrowMax,
    UserAlreadyHasBorrowPosition,
    UserHasDeliquentDebt,
    UserDoesNotHaveLineOfCredit,
    LineOfCreditExpired,
    LineOfCreditHasNotExpired,
    UserCannotBorrowOverMaxLimit,
    UserDebtBalanceIsZero,
    UserDebtBalanceIsNotZero,
    UserDebtIsDeliquent,

    // ── Registry ─────────────────────────────────────────────────────
    ReserveNotFound,
    ReserveAlreadyExists,
    ExchequerHasOutstandingBalances,
    ExchequerRetired,

    // ── Callers and transfers ────────────────────────────────────────
    Unauthorized,
    InvalidNonce,
    TransferFailed,

    // ── Arithmetic ───────────────────────────────────────────────────
    DivByZero,
    ArithmeticError,
}

impl LedgerError {
    /// The stable upper-snake code reported to callers.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidAmount => "INVALID_AMOUNT",
            LedgerError::UserBalanceTooLow => "USER_BALANCE_TOO_LOW",
            LedgerError::WithdrawableBalanceTooLow => "WITHDRAWABLE_BALANCE_TOO_LOW",
            LedgerError::SupplyCapExceeded => "SUPPLY_CAP_EXCEEDED",
            LedgerError::ExchequerInactive => "EXCHEQUER_INACTIVE",
            LedgerError::BorrowingNotEnabled => "BORROWING_NOT_ENABLED",
            LedgerError::ExchequerMustStayBelowBorrowCap => "EXCHEQUER_MUST_STAY_BELOW_BORROW_CAP",
            LedgerError::NotEnoughUnderlyingAssetBalance => "NOT_ENOUGH_UNDERLYING_ASSET_BALANCE",
            LedgerError::InvalidBorrowMax => "INVALID_BORROW_MAX",
            LedgerError::UserAlreadyHasBorrowPosition => "USER_ALREADY_HAS_BORROW_POSITION",
            LedgerError::UserHasDeliquentDebt => "USER_HAS_DELIQUENT_DEBT",
            LedgerError::UserDoesNotHaveLineOfCredit => "USER_DOES_NOT_HAVE_LINE_OF_CREDIT",
            LedgerError::LineOfCreditExpired => "LINE_OF_CREDIT_EXPIRED",
            LedgerError::LineOfCreditHasNotExpired => "LINE_OF_CREDIT_HAS_NOT_EXPIRED",
            LedgerError::UserCannotBorrowOverMaxLimit => "USER_CANNOT_BORROW_OVER_MAX_LIMIT",
            LedgerError::UserDebtBalanceIsZero => "USER_DEBT_BALANCE_IS_ZERO",
            LedgerError::UserDebtBalanceIsNotZero => "USER_DEBT_BALANCE_IS_NOT_ZERO",
            LedgerError::UserDebtIsDeliquent => "USER_DEBT_IS_DELIQUENT",
            LedgerError::ReserveNotFound => "RESERVE_NOT_FOUND",
            LedgerError::ReserveAlreadyExists => "RESERVE_ALREADY_EXISTS",
            LedgerError::ExchequerHasOutstandingBalances => "EXCHEQUER_HAS_OUTSTANDING_BALANCES",
            LedgerError::ExchequerRetired => "EXCHEQUER_RETIRED",
            LedgerError::Unauthorized => "UNAUTHORIZED",
            LedgerError::InvalidNonce => "INVALID_NONCE",
            LedgerError::TransferFailed => "TRANSFER_FAILED",
            LedgerError::DivByZero => "DIV_BY_ZERO",
            LedgerError::ArithmeticError => "ARITHMETIC_ERROR",
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            LedgerError::ReserveNotFound
            | LedgerError::ReserveAlreadyExists
            | LedgerError::ExchequerHasOutstandingBalances
            | LedgerError::ExchequerRetired => ErrorClass::Configuration,
            LedgerError::Unauthorized | LedgerError::InvalidNonce => ErrorClass::Authorization,
            LedgerError::TransferFailed => ErrorClass::Transfer,
            LedgerError::DivByZero | LedgerError::ArithmeticError => ErrorClass::Arithmetic,
            _ => ErrorClass::BusinessRule,
        }
    }
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl From<MathError> for LedgerError {
    fn from(err: MathError) -> Self {
        match err {
            MathError::DivByZero => LedgerError::DivByZero,
            MathError::Overflow => LedgerError::ArithmeticError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_code() {
        let all = [
            LedgerError::InvalidAmount,
            LedgerError::UserHasDeliquentDebt,
            LedgerError::ExchequerMustStayBelowBorrowCap,
            LedgerError::ReserveNotFound,
            LedgerError::ArithmeticError,
        ];
        for err in all {
            assert_eq!(err.to_string(), err.code());
        }
    }

    #[test]
    fn registry_errors_are_configuration_class() {
        assert_eq!(LedgerError::ReserveNotFound.class(), ErrorClass::Configuration);
        assert_eq!(LedgerError::SupplyCapExceeded.class(), ErrorClass::BusinessRule);
        assert_eq!(LedgerError::from(MathError::Overflow).class(), ErrorClass::Arithmetic);
    }
}
