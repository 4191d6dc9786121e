//! In-process entry point: one owned [`LedgerState`] plus a clock, with a method per
//! ledger operation. Mutations are serialized by `&mut self`.

use crate::clock::Clock;
use crate::{execute_instruction, execute_transaction, query};
use polemarch_math::Ray;
use polemarch_types::{
    Address, Exchequer, ExchequerBook, LedgerError, LedgerEvent, LedgerInstruction, LedgerState,
    LineOfCredit, Transaction,
};

pub type LedgerResult<T> = Result<T, LedgerError>;

pub struct Polemarch<C: Clock> {
    state: LedgerState,
    clock: C,
}

impl<C: Clock> Polemarch<C> {
    pub fn new(state: LedgerState, clock: C) -> Self {
        Self { state, clock }
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn into_state(self) -> LedgerState {
        self.state
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Executes a nonce-checked transaction.
    pub fn submit(&mut self, tx: &Transaction) -> LedgerResult<Vec<LedgerEvent>> {
        let now = self.clock.now();
        execute_transaction(&mut self.state, tx, now)
    }

    /// Executes an instruction on behalf of `sender` without nonce tracking.
    pub fn execute(
        &mut self,
        sender: &Address,
        instruction: LedgerInstruction,
    ) -> LedgerResult<Vec<LedgerEvent>> {
        let now = self.clock.now();
        execute_instruction(&mut self.state, sender, now, &instruction)
    }

    fn book(&self, asset: &Address) -> LedgerResult<&ExchequerBook> {
        self.state
            .books
            .get(asset)
            .ok_or(LedgerError::ReserveNotFound)
    }

    // === Administration ===

    #[allow(clippy::too_many_arguments)]
    pub fn add_exchequer(
        &mut self,
        sender: &Address,
        asset: Address,
        s_token: Address,
        d_token: Address,
        g_token: Address,
        decimals: u8,
        origination_fee_rate: Ray,
    ) -> LedgerResult<Vec<LedgerEvent>> {
        self.execute(
            sender,
            LedgerInstruction::AddExchequer {
                asset,
                s_token,
                d_token,
                g_token,
                decimals,
                origination_fee_rate,
            },
        )
    }

    pub fn delete_exchequer(&mut self, sender: &Address, asset: Address) -> LedgerResult<Vec<LedgerEvent>> {
        self.execute(sender, LedgerInstruction::DeleteExchequer { asset })
    }

    pub fn set_exchequer_active(
        &mut self,
        sender: &Address,
        asset: Address,
        active: bool,
    ) -> LedgerResult<Vec<LedgerEvent>> {
        self.execute(sender, LedgerInstruction::SetExchequerActive { asset, active })
    }

    pub fn set_exchequer_borrowing(
        &mut self,
        sender: &Address,
        asset: Address,
        enabled: bool,
    ) -> LedgerResult<Vec<LedgerEvent>> {
        self.execute(sender, LedgerInstruction::SetExchequerBorrowing { asset, enabled })
    }

    pub fn set_supply_cap(&mut self, sender: &Address, asset: Address, cap: u128) -> LedgerResult<Vec<LedgerEvent>> {
        self.execute(sender, LedgerInstruction::SetSupplyCap { asset, cap })
    }

    pub fn set_borrow_cap(&mut self, sender: &Address, asset: Address, cap: u128) -> LedgerResult<Vec<LedgerEvent>> {
        self.execute(sender, LedgerInstruction::SetBorrowCap { asset, cap })
    }

    pub fn set_governance(&mut self, sender: &Address, governance: Address) -> LedgerResult<Vec<LedgerEvent>> {
        self.execute(sender, LedgerInstruction::SetGovernance { governance })
    }

    pub fn set_fee_recipient(&mut self, sender: &Address, fee_recipient: Address) -> LedgerResult<Vec<LedgerEvent>> {
        self.execute(sender, LedgerInstruction::SetFeeRecipient { fee_recipient })
    }

    pub fn fund_growth_buffer(
        &mut self,
        provider: &Address,
        asset: Address,
        amount: u128,
    ) -> LedgerResult<Vec<LedgerEvent>> {
        self.execute(provider, LedgerInstruction::FundGrowthBuffer { asset, amount })
    }

    // === Underlying custody ===

    pub fn deposit_underlying(&mut self, holder: &Address, asset: Address, amount: u128) -> LedgerResult<Vec<LedgerEvent>> {
        self.execute(holder, LedgerInstruction::DepositUnderlying { asset, amount })
    }

    pub fn approve_underlying(&mut self, holder: &Address, asset: Address, amount: u128) -> LedgerResult<Vec<LedgerEvent>> {
        self.execute(holder, LedgerInstruction::ApproveUnderlying { asset, amount })
    }

    // === Supply side ===

    pub fn supply(&mut self, depositor: &Address, asset: Address, amount: u128) -> LedgerResult<Vec<LedgerEvent>> {
        self.execute(depositor, LedgerInstruction::Supply { asset, amount })
    }

    pub fn withdraw(&mut self, recipient: &Address, asset: Address, amount: u128) -> LedgerResult<Vec<LedgerEvent>> {
        self.execute(recipient, LedgerInstruction::Withdraw { asset, amount })
    }

    // === Lines of credit ===

    pub fn create_line_of_credit(
        &mut self,
        sender: &Address,
        borrower: Address,
        asset: Address,
        borrow_max: u128,
        rate: Ray,
        term_days: u64,
    ) -> LedgerResult<Vec<LedgerEvent>> {
        self.execute(
            sender,
            LedgerInstruction::CreateLineOfCredit {
                borrower,
                asset,
                borrow_max,
                rate,
                term_days,
            },
        )
    }

    pub fn borrow(&mut self, borrower: &Address, asset: Address, amount: u128) -> LedgerResult<Vec<LedgerEvent>> {
        self.execute(borrower, LedgerInstruction::Borrow { asset, amount })
    }

    pub fn repay(&mut self, borrower: &Address, asset: Address, amount: u128) -> LedgerResult<Vec<LedgerEvent>> {
        self.execute(borrower, LedgerInstruction::Repay { asset, amount })
    }

    pub fn repay_on_behalf(
        &mut self,
        payer: &Address,
        asset: Address,
        borrower: Address,
        amount: u128,
    ) -> LedgerResult<Vec<LedgerEvent>> {
        self.execute(
            payer,
            LedgerInstruction::RepayOnBehalf {
                asset,
                borrower,
                amount,
            },
        )
    }

    pub fn mark_delinquent(&mut self, sender: &Address, asset: Address, borrower: Address) -> LedgerResult<Vec<LedgerEvent>> {
        self.execute(sender, LedgerInstruction::MarkDelinquent { asset, borrower })
    }

    pub fn close_line_of_credit(
        &mut self,
        sender: &Address,
        asset: Address,
        borrower: Address,
    ) -> LedgerResult<Vec<LedgerEvent>> {
        self.execute(sender, LedgerInstruction::CloseLineOfCredit { asset, borrower })
    }

    // === Queries ===

    pub fn get_exchequer(&self, asset: &Address) -> LedgerResult<Exchequer> {
        query::get_exchequer(self.book(asset)?, self.now())
    }

    pub fn get_line_of_credit(&self, borrower: &Address) -> Option<&LineOfCredit> {
        query::get_line_of_credit(self.state.books.values(), borrower)
    }

    pub fn line_of_credit(&self, asset: &Address, borrower: &Address) -> LedgerResult<Option<&LineOfCredit>> {
        Ok(query::line_of_credit(self.book(asset)?, borrower))
    }

    pub fn get_normalized_return(&self, asset: &Address) -> LedgerResult<Ray> {
        query::normalized_return(self.book(asset)?, self.now())
    }

    pub fn user_rate(&self, asset: &Address, borrower: &Address) -> LedgerResult<Ray> {
        Ok(query::user_rate(self.book(asset)?, borrower))
    }

    pub fn get_average_rate(&self, asset: &Address) -> LedgerResult<Ray> {
        query::average_rate(self.book(asset)?)
    }

    pub fn supply_balance_of(&self, asset: &Address, holder: &Address) -> LedgerResult<u128> {
        query::supply_balance_of(self.book(asset)?, holder, self.now())
    }

    pub fn supply_total(&self, asset: &Address) -> LedgerResult<u128> {
        query::supply_total(self.book(asset)?, self.now())
    }

    pub fn scaled_balance_of(&self, asset: &Address, holder: &Address) -> LedgerResult<u128> {
        Ok(query::scaled_balance_of(self.book(asset)?, holder))
    }

    pub fn previous_index(&self, asset: &Address, holder: &Address) -> LedgerResult<Ray> {
        Ok(query::previous_index(self.book(asset)?, holder))
    }

    pub fn debt_balance_of(&self, asset: &Address, borrower: &Address) -> LedgerResult<u128> {
        query::debt_balance_of(self.book(asset)?, borrower, self.now())
    }

    pub fn debt_total(&self, asset: &Address) -> LedgerResult<u128> {
        query::debt_total(self.book(asset)?, self.now())
    }

    pub fn available_liquidity(&self, asset: &Address) -> LedgerResult<u128> {
        Ok(query::available_liquidity(self.book(asset)?))
    }

    pub fn decimals(&self, asset: &Address) -> LedgerResult<u8> {
        Ok(query::decimals(self.book(asset)?))
    }

    pub fn underlying_balance_of(&self, asset: &Address, holder: &Address) -> LedgerResult<u128> {
        Ok(query::underlying_balance_of(self.book(asset)?, holder))
    }

    pub fn growth_balance_of(&self, asset: &Address, provider: &Address) -> LedgerResult<u128> {
        Ok(query::growth_balance_of(self.book(asset)?, provider))
    }
}
