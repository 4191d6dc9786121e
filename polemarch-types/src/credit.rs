use crate::Address;
use polemarch_math::Ray;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineState {
    Open,
    Delinquent,
    Closed,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LineOfCredit {
    pub id: u64,
    pub borrower: Address,
    pub asset: Address,
    pub borrow_max: u128,
    pub rate: Ray,
    pub creation_timestamp: u64,
    pub expiration_timestamp: u64,
    pub state: LineState,
    /// Capacity still promised to this line and held back from withdrawals.
    pub reserved: u128,
    /// Amount the growth buffer advanced when the line went delinquent, not yet refilled.
    pub backstop_drawn: u128,
}

impl LineOfCredit {
    /// Open and Delinquent lines occupy the borrower's slot in the reserve.
    pub fn is_live(&self) -> bool {
        matches!(self.state, LineState::Open | LineState::Delinquent)
    }

    pub fn is_expired(&self, timestamp: u64) -> bool {
        timestamp > self.expiration_timestamp
    }
}
