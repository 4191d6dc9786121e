use crate::Address;
use polemarch_math::Ray;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSide {
    Supply,
    Debt,
    Growth,
}

/// Observable effects of a committed instruction, in emission order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum LedgerEvent {
    ExchequerAdded {
        asset: Address,
        s_token: Address,
        d_token: Address,
        g_token: Address,
        decimals: u8,
    },
    ExchequerDeleted { asset: Address },
    ExchequerActiveSet { asset: Address, active: bool },
    ExchequerBorrowingSet { asset: Address, enabled: bool },
    SupplyCapSet { asset: Address, cap: u128 },
    BorrowCapSet { asset: Address, cap: u128 },

    Supply { asset: Address, depositor: Address, amount: u128 },
    Withdraw { asset: Address, recipient: Address, amount: u128 },

    /// Net growth of a holder's real balance (deposit plus accrued interest, or accrued
    /// interest exceeding a burn).
    Mint {
        token: TokenSide,
        holder: Address,
        amount: u128,
        balance_increase: u128,
        index: Ray,
    },
    Burn {
        token: TokenSide,
        holder: Address,
        amount: u128,
        balance_increase: u128,
        index: Ray,
    },

    CreateLineOfCredit {
        id: u64,
        rate: Ray,
        borrower: Address,
        asset: Address,
        borrow_max: u128,
        expiration_timestamp: u64,
    },
    OriginationFee {
        id: u64,
        asset: Address,
        fee_recipient: Address,
        fee: u128,
    },
    Borrow {
        id: u64,
        rate: Ray,
        borrower: Address,
        asset: Address,
        amount: u128,
    },
    Repay {
        id: u64,
        borrower: Address,
        asset: Address,
        amount: u128,
    },
    Delinquent {
        id: u64,
        borrower: Address,
        asset: Address,
        outstanding: u128,
        backstop_drawn: u128,
    },
    CloseLineOfCredit {
        id: u64,
        borrower: Address,
        asset: Address,
        expiration_timestamp: u64,
    },

    GrowthBufferFunded { asset: Address, provider: Address, amount: u128 },
    GovernanceSet { governance: Address },
    FeeRecipientSet { fee_recipient: Address },
}
