pub mod accrual;
pub mod auth;
pub mod clock;
pub mod facade;
pub mod instructions;
pub mod query;
pub mod tokens;


use auth::require_owner;
use instructions::credit::{self, NewLine};
use instructions::exchequer::{self, NewExchequer};
use instructions::{supply, wallet};
use polemarch_types::{
    Address, ExchequerBook, LedgerError, LedgerEvent, LedgerInstruction, LedgerState, Roles,
    Scope, Transaction,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

pub use clock::{Clock, ManualClock, SystemClock};
pub use facade::Polemarch;

/// Source of line-of-credit ids, shared by every exchequer.
#[derive(Debug, Default)]
pub struct LineIds(AtomicU64);

impl LineIds {
    pub fn starting_at(next: u64) -> Self {
        Self(AtomicU64::new(next))
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }

    pub fn peek(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct ExecutionContext<'a> {
    pub roles: &'a Roles,
    pub line_ids: &'a LineIds,
    pub timestamp: u64,
    pub events: Vec<LedgerEvent>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(roles: &'a Roles, line_ids: &'a LineIds, timestamp: u64) -> Self {
        Self {
            roles,
            line_ids,
            timestamp,
            events: Vec::new(),
        }
    }

    pub fn emit(&mut self, event: LedgerEvent) {
        self.events.push(event);
    }
}

/// Where new exchequer books are registered.
pub trait BookRegistry {
    fn is_registered(&self, asset: &Address) -> bool;
    fn register(&mut self, book: ExchequerBook);
}

impl BookRegistry for BTreeMap<Address, ExchequerBook> {
    fn is_registered(&self, asset: &Address) -> bool {
        self.contains_key(asset)
    }

    fn register(&mut self, book: ExchequerBook) {
        self.insert(book.asset(), book);
    }
}

pub fn expected_nonce(nonces: &BTreeMap<Address, u64>, sender: &Address) -> u64 {
    nonces.get(sender).copied().unwrap_or(0)
}

/// Checks the nonce, executes, and consumes the nonce only if the instruction committed.
pub fn execute_transaction(
    state: &mut LedgerState,
    tx: &Transaction,
    timestamp: u64,
) -> Result<Vec<LedgerEvent>, LedgerError> {
    let expected = expected_nonce(&state.nonces, &tx.sender);
    if tx.nonce != expected {
        return Err(LedgerError::InvalidNonce);
    }
    let events = execute_instruction(state, &tx.sender, timestamp, &tx.instruction)?;
    state.nonces.insert(tx.sender, expected + 1);
    Ok(events)
}

/// Runs one instruction against the whole ledger. Either every effect lands or none does.
pub fn execute_instruction(
    state: &mut LedgerState,
    sender: &Address,
    timestamp: u64,
    instruction: &LedgerInstruction,
) -> Result<Vec<LedgerEvent>, LedgerError> {
    let line_ids = LineIds::starting_at(state.next_line_id);
    let events = match instruction.scope() {
        Scope::Registry => execute_registry(
            &mut state.books,
            &mut state.roles,
            &line_ids,
            sender,
            timestamp,
            instruction,
        )?,
        Scope::Exchequer(asset) => {
            let book = state
                .books
                .get_mut(&asset)
                .ok_or(LedgerError::ReserveNotFound)?;
            let mut ctx = ExecutionContext::new(&state.roles, &line_ids, timestamp);
            execute_book_instruction(book, &mut ctx, sender, instruction)?;
            ctx.events
        }
    };
    state.next_line_id = line_ids.peek();
    Ok(events)
}

/// Executes against a draft copy of `book` and swaps it in only on success.
pub fn execute_book_instruction(
    book: &mut ExchequerBook,
    ctx: &mut ExecutionContext,
    sender: &Address,
    instruction: &LedgerInstruction,
) -> Result<(), LedgerError> {
    let mut draft = book.clone();
    let emitted = ctx.events.len();
    if let Err(err) = execute_on_book(&mut draft, ctx, sender, instruction) {
        ctx.events.truncate(emitted);
        return Err(err);
    }
    *book = draft;
    Ok(())
}

pub fn execute_registry<R: BookRegistry>(
    registry: &mut R,
    roles: &mut Roles,
    line_ids: &LineIds,
    sender: &Address,
    timestamp: u64,
    instruction: &LedgerInstruction,
) -> Result<Vec<LedgerEvent>, LedgerError> {
    match instruction {
        LedgerInstruction::SetGovernance { governance } => {
            require_owner(roles, sender)?;
            roles.governance = *governance;
            Ok(vec![LedgerEvent::GovernanceSet {
                governance: *governance,
            }])
        }
        LedgerInstruction::SetFeeRecipient { fee_recipient } => {
            require_owner(roles, sender)?;
            roles.fee_recipient = *fee_recipient;
            Ok(vec![LedgerEvent::FeeRecipientSet {
                fee_recipient: *fee_recipient,
            }])
        }
        LedgerInstruction::AddExchequer {
            asset,
            s_token,
            d_token,
            g_token,
            decimals,
            origination_fee_rate,
        } => {
            let mut ctx = ExecutionContext::new(roles, line_ids, timestamp);
            let book = exchequer::add(
                &mut ctx,
                sender,
                registry.is_registered(asset),
                NewExchequer {
                    asset: *asset,
                    s_token: *s_token,
                    d_token: *d_token,
                    g_token: *g_token,
                    decimals: *decimals,
                    origination_fee_rate: *origination_fee_rate,
                },
            )?;
            registry.register(book);
            Ok(ctx.events)
        }
        // exchequer-scoped instructions never reach the registry
        _ => Err(LedgerError::ReserveNotFound),
    }
}

/// Dispatches an exchequer-scoped instruction. Mutates in place; callers that need
/// all-or-nothing semantics go through [`execute_book_instruction`].
pub fn execute_on_book(
    book: &mut ExchequerBook,
    ctx: &mut ExecutionContext,
    sender: &Address,
    instruction: &LedgerInstruction,
) -> Result<(), LedgerError> {
    if let Scope::Exchequer(asset) = instruction.scope() {
        if asset != book.asset() {
            return Err(LedgerError::ReserveNotFound);
        }
    }
    match instruction {
        // === Exchequer administration ===
        LedgerInstruction::DeleteExchequer { .. } => exchequer::delete(book, ctx, sender),
        LedgerInstruction::SetExchequerActive { active, .. } => {
            exchequer::set_active(book, ctx, sender, *active)
        }
        LedgerInstruction::SetExchequerBorrowing { enabled, .. } => {
            exchequer::set_borrowing(book, ctx, sender, *enabled)
        }
        LedgerInstruction::SetSupplyCap { cap, .. } => {
            exchequer::set_supply_cap(book, ctx, sender, *cap)
        }
        LedgerInstruction::SetBorrowCap { cap, .. } => {
            exchequer::set_borrow_cap(book, ctx, sender, *cap)
        }
        LedgerInstruction::FundGrowthBuffer { amount, .. } => {
            exchequer::fund_growth_buffer(book, ctx, sender, *amount)
        }

        // === Underlying custody ===
        LedgerInstruction::DepositUnderlying { amount, .. } => {
            wallet::deposit(book, *sender, *amount)
        }
        LedgerInstruction::ApproveUnderlying { amount, .. } => {
            wallet::approve(book, *sender, *amount);
            Ok(())
        }

        // === Supply side ===
        LedgerInstruction::Supply { amount, .. } => supply::supply(book, ctx, sender, *amount),
        LedgerInstruction::Withdraw { amount, .. } => supply::withdraw(book, ctx, sender, *amount),

        // === Lines of credit ===
        LedgerInstruction::CreateLineOfCredit {
            borrower,
            borrow_max,
            rate,
            term_days,
            ..
        } => credit::create(
            book,
            ctx,
            sender,
            NewLine {
                borrower: *borrower,
                borrow_max: *borrow_max,
                rate: *rate,
                term_days: *term_days,
            },
        ),
        LedgerInstruction::Borrow { amount, .. } => credit::borrow(book, ctx, sender, *amount),
        LedgerInstruction::Repay { amount, .. } => {
            credit::repay(book, ctx, sender, sender, *amount)
        }
        LedgerInstruction::RepayOnBehalf {
            borrower, amount, ..
        } => {
            auth::require_governance(ctx.roles, sender)?;
            credit::repay(book, ctx, sender, borrower, *amount)
        }
        LedgerInstruction::MarkDelinquent { borrower, .. } => {
            credit::mark_delinquent(book, ctx, sender, borrower)
        }
        LedgerInstruction::CloseLineOfCredit { borrower, .. } => {
            credit::close(book, ctx, sender, borrower)
        }

        // registry instructions are routed by scope and never name a book
        LedgerInstruction::AddExchequer { .. }
        | LedgerInstruction::SetGovernance { .. }
        | LedgerInstruction::SetFeeRecipient { .. } => Err(LedgerError::ReserveNotFound),
    }
}
