use anyhow::{anyhow, Context, Result};
use polemarch_execution::{
    execute_on_book, execute_registry, query, BookRegistry, Clock, ExecutionContext, LineIds,
};
use polemarch_genesis::{create_genesis_state, GenesisConfig};
use polemarch_math::Ray;
use polemarch_storage::{Commit, Storage};
use polemarch_types::{
    Address, Exchequer, ExchequerBook, GovernanceParams, LedgerError, LedgerEvent, LedgerState,
    LineOfCredit, Roles, Scope, Transaction,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

type SharedBook = Arc<Mutex<ExchequerBook>>;

/// A transaction plus the channel its outcome is reported on.
pub struct Submission {
    pub tx: Transaction,
    pub reply: oneshot::Sender<Result<Vec<LedgerEvent>>>,
}

/// Client side of a running [`LedgerService::run`] loop.
#[derive(Clone)]
pub struct LedgerHandle {
    tx: mpsc::Sender<Submission>,
}

impl LedgerHandle {
    pub async fn submit(&self, tx: Transaction) -> Result<Vec<LedgerEvent>> {
        let (reply, outcome) = oneshot::channel();
        self.tx
            .send(Submission { tx, reply })
            .await
            .map_err(|_| anyhow!("ledger service stopped"))?;
        outcome.await.context("ledger service dropped the reply")?
    }
}

/// Stages an exchequer added by a registry instruction until it has been persisted.
struct StagedRegistry<'a> {
    books: &'a BTreeMap<Address, SharedBook>,
    added: Option<ExchequerBook>,
}

impl BookRegistry for StagedRegistry<'_> {
    fn is_registered(&self, asset: &Address) -> bool {
        self.books.contains_key(asset) || self.added.as_ref().map(|b| b.asset()) == Some(*asset)
    }

    fn register(&mut self, book: ExchequerBook) {
        self.added = Some(book);
    }
}

/// The ledger as a long-running service.
///
/// Every exchequer sits behind its own mutex, so instructions on different assets run in
/// parallel while instructions on one asset are strictly serialized. Each instruction runs
/// against a draft copy of its book; the draft is persisted and only then swapped in.
pub struct LedgerService<C: Clock> {
    roles: RwLock<Roles>,
    params: GovernanceParams,
    books: RwLock<BTreeMap<Address, SharedBook>>,
    // sender -> next nonce, locked for the whole of that sender's instruction
    nonces: Mutex<BTreeMap<Address, Arc<Mutex<u64>>>>,
    line_ids: LineIds,
    storage: Arc<Storage>,
    clock: C,
}

impl<C: Clock> LedgerService<C> {
    /// Recovers the ledger from `storage`, or initializes it from `genesis` on first start.
    pub fn bootstrap(storage: Arc<Storage>, genesis: &GenesisConfig, clock: C) -> Result<Self> {
        let state = match storage.load_state().context("Failed to load ledger state")? {
            Some(state) => {
                info!(
                    exchequers = state.books.len(),
                    next_line_id = state.next_line_id,
                    "Recovered ledger state from storage"
                );
                state
            }
            None => {
                let state = create_genesis_state(genesis).context("Invalid genesis config")?;
                storage
                    .save_state(&state)
                    .context("Failed to persist genesis state")?;
                info!(exchequers = state.books.len(), "Initialized ledger from genesis");
                state
            }
        };
        Ok(Self::from_state(state, storage, clock))
    }

    pub fn from_state(state: LedgerState, storage: Arc<Storage>, clock: C) -> Self {
        let books = state
            .books
            .into_iter()
            .map(|(asset, book)| (asset, Arc::new(Mutex::new(book))))
            .collect();
        let nonces = state
            .nonces
            .into_iter()
            .map(|(sender, nonce)| (sender, Arc::new(Mutex::new(nonce))))
            .collect();
        Self {
            roles: RwLock::new(state.roles),
            params: state.params,
            books: RwLock::new(books),
            nonces: Mutex::new(nonces),
            line_ids: LineIds::starting_at(state.next_line_id),
            storage,
            clock,
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    async fn sender_slot(&self, sender: &Address) -> Arc<Mutex<u64>> {
        let mut nonces = self.nonces.lock().await;
        nonces.entry(*sender).or_default().clone()
    }

    async fn book(&self, asset: &Address) -> Result<SharedBook, LedgerError> {
        self.books
            .read()
            .await
            .get(asset)
            .cloned()
            .ok_or(LedgerError::ReserveNotFound)
    }

    /// Executes one transaction atomically: either its effects are persisted and visible,
    /// or nothing changes and the nonce is not consumed.
    pub async fn submit(&self, tx: Transaction) -> Result<Vec<LedgerEvent>> {
        let slot = self.sender_slot(&tx.sender).await;
        let mut next_nonce = slot.lock().await;

        let outcome = if tx.nonce != *next_nonce {
            Err(LedgerError::InvalidNonce.into())
        } else {
            let now = self.clock.now();
            match tx.instruction.scope() {
                Scope::Registry => self.apply_registry(&tx, now, *next_nonce + 1).await,
                Scope::Exchequer(asset) => self.apply_to_book(asset, &tx, now, *next_nonce + 1).await,
            }
        };

        match outcome {
            Ok(events) => {
                *next_nonce += 1;
                info!(
                    tx = %hex::encode(&tx.id()[..8]),
                    sender = %hex::encode(tx.sender),
                    instruction = tx.instruction.name(),
                    events = events.len(),
                    "instruction committed"
                );
                Ok(events)
            }
            Err(err) => {
                match err.downcast_ref::<LedgerError>() {
                    Some(rejection) => warn!(
                        sender = %hex::encode(tx.sender),
                        instruction = tx.instruction.name(),
                        code = rejection.code(),
                        "instruction rejected"
                    ),
                    None => error!(
                        sender = %hex::encode(tx.sender),
                        instruction = tx.instruction.name(),
                        "instruction failed: {:#}",
                        err
                    ),
                }
                Err(err)
            }
        }
    }

    async fn apply_to_book(
        &self,
        asset: Address,
        tx: &Transaction,
        now: u64,
        nonce_after: u64,
    ) -> Result<Vec<LedgerEvent>> {
        let shared = self.book(&asset).await?;
        let roles = *self.roles.read().await;
        let mut book = shared.lock().await;

        let mut draft = book.clone();
        let mut ctx = ExecutionContext::new(&roles, &self.line_ids, now);
        execute_on_book(&mut draft, &mut ctx, &tx.sender, &tx.instruction)?;

        let commit = Commit::new()
            .book_changes(&book, &draft)?
            .nonce(&tx.sender, nonce_after)?
            .next_line_id(self.line_ids.peek())?;
        self.storage.write(commit).context("Failed to persist exchequer")?;
        *book = draft;
        Ok(ctx.events)
    }

    async fn apply_registry(
        &self,
        tx: &Transaction,
        now: u64,
        nonce_after: u64,
    ) -> Result<Vec<LedgerEvent>> {
        let mut roles = self.roles.write().await;
        let mut books = self.books.write().await;

        let mut draft_roles = *roles;
        let mut staged = StagedRegistry {
            books: &books,
            added: None,
        };
        let events = execute_registry(
            &mut staged,
            &mut draft_roles,
            &self.line_ids,
            &tx.sender,
            now,
            &tx.instruction,
        )?;
        let added = staged.added;

        let mut commit = Commit::new()
            .roles(&draft_roles)?
            .nonce(&tx.sender, nonce_after)?;
        if let Some(book) = &added {
            commit = commit.book(book)?;
        }
        self.storage.write(commit).context("Failed to persist registry")?;

        *roles = draft_roles;
        if let Some(book) = added {
            books.insert(book.asset(), Arc::new(Mutex::new(book)));
        }
        Ok(events)
    }

    /// Drains submissions in arrival order until every handle is dropped.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<Submission>) {
        info!("Starting ledger service loop...");
        while let Some(Submission { tx, reply }) = rx.recv().await {
            let outcome = self.submit(tx).await;
            if reply.send(outcome).is_err() {
                warn!("submitter went away before the reply");
            }
        }
        info!("Ledger service loop stopped");
    }

    pub fn spawn(self: Arc<Self>, capacity: usize) -> (LedgerHandle, JoinHandle<()>)
    where
        C: 'static,
    {
        let (tx, rx) = mpsc::channel(capacity);
        let task = tokio::spawn(self.run(rx));
        (LedgerHandle { tx }, task)
    }

    // === Queries ===

    async fn read_book<T>(
        &self,
        asset: &Address,
        read: impl FnOnce(&ExchequerBook, u64) -> Result<T, LedgerError>,
    ) -> Result<T> {
        let shared = self.book(asset).await?;
        let book = shared.lock().await;
        Ok(read(&*book, self.clock.now())?)
    }

    pub async fn expected_nonce(&self, sender: &Address) -> u64 {
        let slot = self.sender_slot(sender).await;
        let next = *slot.lock().await;
        next
    }

    pub async fn roles(&self) -> Roles {
        *self.roles.read().await
    }

    pub async fn get_exchequer(&self, asset: &Address) -> Result<Exchequer> {
        self.read_book(asset, query::get_exchequer).await
    }

    pub async fn get_line_of_credit(&self, borrower: &Address) -> Option<LineOfCredit> {
        let shared: Vec<SharedBook> = self.books.read().await.values().cloned().collect();
        let mut latest: Option<LineOfCredit> = None;
        for book in shared {
            let book = book.lock().await;
            if let Some(line) = book.latest_line(borrower) {
                if latest.as_ref().map_or(true, |l| line.id > l.id) {
                    latest = Some(line.clone());
                }
            }
        }
        latest
    }

    pub async fn line_of_credit(&self, asset: &Address, borrower: &Address) -> Result<Option<LineOfCredit>> {
        self.read_book(asset, |book, _| Ok(query::line_of_credit(book, borrower).cloned()))
            .await
    }

    pub async fn get_normalized_return(&self, asset: &Address) -> Result<Ray> {
        self.read_book(asset, query::normalized_return).await
    }

    pub async fn get_average_rate(&self, asset: &Address) -> Result<Ray> {
        self.read_book(asset, |book, _| query::average_rate(book)).await
    }

    pub async fn user_rate(&self, asset: &Address, borrower: &Address) -> Result<Ray> {
        self.read_book(asset, |book, _| Ok(query::user_rate(book, borrower)))
            .await
    }

    pub async fn supply_balance_of(&self, asset: &Address, holder: &Address) -> Result<u128> {
        self.read_book(asset, |book, now| query::supply_balance_of(book, holder, now))
            .await
    }

    pub async fn supply_total(&self, asset: &Address) -> Result<u128> {
        self.read_book(asset, query::supply_total).await
    }

    pub async fn debt_balance_of(&self, asset: &Address, borrower: &Address) -> Result<u128> {
        self.read_book(asset, |book, now| query::debt_balance_of(book, borrower, now))
            .await
    }

    pub async fn debt_total(&self, asset: &Address) -> Result<u128> {
        self.read_book(asset, query::debt_total).await
    }

    pub async fn available_liquidity(&self, asset: &Address) -> Result<u128> {
        self.read_book(asset, |book, _| Ok(query::available_liquidity(book)))
            .await
    }

    pub async fn underlying_balance_of(&self, asset: &Address, holder: &Address) -> Result<u128> {
        self.read_book(asset, |book, _| Ok(query::underlying_balance_of(book, holder)))
            .await
    }

    /// Consistent copy of the whole ledger, taken book by book.
    pub async fn snapshot(&self) -> LedgerState {
        let mut state = LedgerState::new(*self.roles.read().await, self.params);
        let shared: Vec<(Address, SharedBook)> = self
            .books
            .read()
            .await
            .iter()
            .map(|(asset, book)| (*asset, book.clone()))
            .collect();
        for (asset, book) in shared {
            state.books.insert(asset, book.lock().await.clone());
        }
        let slots: Vec<(Address, Arc<Mutex<u64>>)> = self
            .nonces
            .lock()
            .await
            .iter()
            .map(|(sender, slot)| (*sender, slot.clone()))
            .collect();
        for (sender, slot) in slots {
            let next = *slot.lock().await;
            if next > 0 {
                state.nonces.insert(sender, next);
            }
        }
        state.next_line_id = self.line_ids.peek();
        state
    }
}

#[cfg(test)]
mod tests;
