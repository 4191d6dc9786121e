pub mod credit;
pub mod error;
pub mod event;
pub mod exchequer;
pub mod instruction;
pub mod rate;
pub mod state;
pub mod transaction;

/// 32-byte identifier for holders, assets and token references.
pub type Address = [u8; 32];

/// Identifier used to clear token references on deleted exchequers.
pub const ZERO_ADDRESS: Address = [0u8; 32];

pub const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

pub use credit::{LineOfCredit, LineState};
pub use error::{ErrorClass, LedgerError};
pub use event::{LedgerEvent, TokenSide};
pub use exchequer::{DebtPosition, Exchequer, ScaledBalance, Wallet};
pub use instruction::{LedgerInstruction, Scope};
pub use rate::WeightedAverageRate;
pub use state::{ExchequerBook, GovernanceParams, LedgerState, Roles};
pub use transaction::Transaction;
