use crate::{Address, DebtPosition, Exchequer, LineOfCredit, ScaledBalance, Wallet, WeightedAverageRate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Who may call the administrative surface.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Roles {
    pub owner: Address,
    /// Timelock executor that carries out passed proposals.
    pub governance: Address,
    /// Receives origination fees ("exchequer safe").
    pub fee_recipient: Address,
}

/// Re-initialization parameters of the governance workflow. The ledger does not vote; these are
/// carried so a restarted deployment comes back with the same settings.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GovernanceParams {
    pub voting_delay: u64,
    pub voting_period: u64,
    pub proposal_threshold: u128,
    pub timelock_min_delay: u64,
}

/// Everything that belongs to one exchequer. All mutations of a book are serialized.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ExchequerBook {
    pub exchequer: Exchequer,
    pub rate: WeightedAverageRate,
    pub supply: BTreeMap<Address, ScaledBalance>,
    pub debt: BTreeMap<Address, DebtPosition>,
    pub growth: BTreeMap<Address, u128>,
    pub wallets: BTreeMap<Address, Wallet>,
    pub lines: BTreeMap<u64, LineOfCredit>,
    /// borrower -> id of their Open or Delinquent line
    pub active_lines: BTreeMap<Address, u64>,
}

impl ExchequerBook {
    pub fn new(exchequer: Exchequer) -> Self {
        Self {
            exchequer,
            rate: WeightedAverageRate::default(),
            supply: BTreeMap::new(),
            debt: BTreeMap::new(),
            growth: BTreeMap::new(),
            wallets: BTreeMap::new(),
            lines: BTreeMap::new(),
            active_lines: BTreeMap::new(),
        }
    }

    pub fn asset(&self) -> Address {
        self.exchequer.asset
    }

    pub fn active_line(&self, borrower: &Address) -> Option<&LineOfCredit> {
        self.active_lines
            .get(borrower)
            .and_then(|id| self.lines.get(id))
    }

    pub fn active_line_mut(&mut self, borrower: &Address) -> Option<&mut LineOfCredit> {
        let id = *self.active_lines.get(borrower)?;
        self.lines.get_mut(&id)
    }

    /// The live line if there is one, otherwise the borrower's most recent line.
    pub fn latest_line(&self, borrower: &Address) -> Option<&LineOfCredit> {
        self.active_line(borrower).or_else(|| {
            self.lines
                .values()
                .rev()
                .find(|line| &line.borrower == borrower)
        })
    }

    /// Rebuilds the borrower -> live line index from the line records.
    pub fn reindex_lines(&mut self) {
        self.active_lines = self
            .lines
            .values()
            .filter(|line| line.is_live())
            .map(|line| (line.borrower, line.id))
            .collect();
    }

    pub fn has_live_lines(&self) -> bool {
        !self.active_lines.is_empty()
    }
}

/// The complete ledger: roles, every exchequer book and per-sender nonces.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct LedgerState {
    pub roles: Roles,
    pub params: GovernanceParams,
    pub books: BTreeMap<Address, ExchequerBook>,
    pub nonces: BTreeMap<Address, u64>,
    pub next_line_id: u64,
}

impl LedgerState {
    pub fn new(roles: Roles, params: GovernanceParams) -> Self {
        Self {
            roles,
            params,
            books: BTreeMap::new(),
            nonces: BTreeMap::new(),
            next_line_id: 1,
        }
    }
}
