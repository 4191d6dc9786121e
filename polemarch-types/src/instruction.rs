use crate::Address;
use polemarch_math::Ray;
use serde::{Deserialize, Serialize};

/// Every operation the ledger accepts. Amounts are base units of the exchequer's asset,
/// rates are rays.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum LedgerInstruction {
    // ══════════════════════════════════════════════════════════════
    // Exchequer administration
    // ══════════════════════════════════════════════════════════════
    AddExchequer {
        asset: Address,
        s_token: Address,
        d_token: Address,
        g_token: Address,
        decimals: u8,
        origination_fee_rate: Ray,
    },
    DeleteExchequer { asset: Address },
    SetExchequerActive { asset: Address, active: bool },
    SetExchequerBorrowing { asset: Address, enabled: bool },
    SetSupplyCap { asset: Address, cap: u128 },
    SetBorrowCap { asset: Address, cap: u128 },

    // ══════════════════════════════════════════════════════════════
    // Underlying custody
    // ══════════════════════════════════════════════════════════════
    DepositUnderlying { asset: Address, amount: u128 },
    ApproveUnderlying { asset: Address, amount: u128 },

    // ══════════════════════════════════════════════════════════════
    // Supply side
    // ══════════════════════════════════════════════════════════════
    Supply { asset: Address, amount: u128 },
    Withdraw { asset: Address, amount: u128 },

    // ══════════════════════════════════════════════════════════════
    // Lines of credit
    // ══════════════════════════════════════════════════════════════
    CreateLineOfCredit {
        borrower: Address,
        asset: Address,
        borrow_max: u128,
        rate: Ray,
        term_days: u64,
    },
    Borrow { asset: Address, amount: u128 },
    Repay { asset: Address, amount: u128 },
    RepayOnBehalf { asset: Address, borrower: Address, amount: u128 },
    MarkDelinquent { asset: Address, borrower: Address },
    CloseLineOfCredit { asset: Address, borrower: Address },

    // ══════════════════════════════════════════════════════════════
    // Backstop & governance wiring
    // ══════════════════════════════════════════════════════════════
    FundGrowthBuffer { asset: Address, amount: u128 },
    SetGovernance { governance: Address },
    SetFeeRecipient { fee_recipient: Address },
}

/// What an instruction needs exclusive access to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// The exchequer registry or the protocol roles.
    Registry,
    /// A single exchequer book.
    Exchequer(Address),
}

impl LedgerInstruction {
    pub fn scope(&self) -> Scope {
        use LedgerInstruction::*;
        match self {
            AddExchequer { .. } | SetGovernance { .. } | SetFeeRecipient { .. } => Scope::Registry,
            DeleteExchequer { asset }
            | SetExchequerActive { asset, .. }
            | SetExchequerBorrowing { asset, .. }
            | SetSupplyCap { asset, .. }
            | SetBorrowCap { asset, .. }
            | DepositUnderlying { asset, .. }
            | ApproveUnderlying { asset, .. }
            | Supply { asset, .. }
            | Withdraw { asset, .. }
            | CreateLineOfCredit { asset, .. }
            | Borrow { asset, .. }
            | Repay { asset, .. }
            | RepayOnBehalf { asset, .. }
            | MarkDelinquent { asset, .. }
            | CloseLineOfCredit { asset, .. }
            | FundGrowthBuffer { asset, .. } => Scope::Exchequer(*asset),
        }
    }

    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        use LedgerInstruction::*;
        match self {
            AddExchequer { .. } => "add_exchequer",
            DeleteExchequer { .. } => "delete_exchequer",
            SetExchequerActive { .. } => "set_exchequer_active",
            SetExchequerBorrowing { .. } => "set_exchequer_borrowing",
            SetSupplyCap { .. } => "set_supply_cap",
            SetBorrowCap { .. } => "set_borrow_cap",
            DepositUnderlying { .. } => "deposit_underlying",
            ApproveUnderlying { .. } => "approve_underlying",
            Supply { .. } => "supply",
            Withdraw { .. } => "withdraw",
            CreateLineOfCredit { .. } => "create_line_of_credit",
            Borrow { .. } => "borrow",
            Repay { .. } => "repay",
            RepayOnBehalf { .. } => "repay_on_behalf",
            MarkDelinquent { .. } => "mark_delinquent",
            CloseLineOfCredit { .. } => "close_line_of_credit",
            FundGrowthBuffer { .. } => "fund_growth_buffer",
            SetGovernance { .. } => "set_governance",
            SetFeeRecipient { .. } => "set_fee_recipient",
        }
    }
}
