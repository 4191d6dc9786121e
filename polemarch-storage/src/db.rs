use crate::kv::{KvStore, MemoryStore, WriteOp};
use anyhow::{anyhow, bail, Context, Result};
use polemarch_types::state::{ExchequerBook, GovernanceParams, LedgerState, Roles};
use polemarch_types::{
    Address, DebtPosition, Exchequer, LineOfCredit, ScaledBalance, Wallet, WeightedAverageRate,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Layout version written under `meta/schema_version`.
pub const SCHEMA_VERSION: u32 = 1;

const SCHEMA_KEY: &str = "meta/schema_version";
const ROLES_KEY: &str = "meta/roles";
const PARAMS_KEY: &str = "meta/governance_params";
const NEXT_LINE_KEY: &str = "meta/next_line_id";

type Migration = fn(&dyn KvStore) -> Result<()>;

/// Steps that bring a store up to the version they are listed with.
const MIGRATIONS: &[(u32, Migration)] = &[(1, stamp_unversioned)];

/// Stores written before versioning carry the version-1 layout already.
fn stamp_unversioned(_kv: &dyn KvStore) -> Result<()> {
    Ok(())
}

#[derive(Serialize, Deserialize)]
struct BookHeader {
    exchequer: Exchequer,
    rate: WeightedAverageRate,
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| anyhow!("Serialization error: {}", e))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| anyhow!("Deserialization error: {}", e))
}

fn exchequer_key(asset: &Address) -> String {
    format!("exchequer/{}", hex::encode(asset))
}

fn holder_key(table: &str, asset: &Address, holder: &Address) -> String {
    format!("{}/{}/{}", table, hex::encode(asset), hex::encode(holder))
}

fn line_key(asset: &Address, id: u64) -> String {
    format!("line/{}/{:020}", hex::encode(asset), id)
}

fn nonce_key(sender: &Address) -> String {
    format!("nonce/{}", hex::encode(sender))
}

/// Last `/`-separated segment of a key, decoded as an address.
fn address_suffix(key: &[u8]) -> Result<Address> {
    let text = std::str::from_utf8(key).context("non utf-8 key")?;
    let tail = text.rsplit('/').next().unwrap_or_default();
    let bytes = hex::decode(tail).with_context(|| format!("bad address in key {}", text))?;
    bytes
        .try_into()
        .map_err(|_| anyhow!("address in key {} is not 32 bytes", text))
}

/// A set of record writes applied in one atomic batch.
#[derive(Default)]
pub struct Commit {
    ops: Vec<WriteOp>,
}

impl Commit {
    pub fn new() -> Self {
        Self::default()
    }

    fn put<T: Serialize>(mut self, key: String, value: &T) -> Result<Self> {
        self.ops.push(WriteOp::Put(key.into_bytes(), encode(value)?));
        Ok(self)
    }

    fn header(self, book: &ExchequerBook) -> Result<Self> {
        self.put(
            exchequer_key(&book.asset()),
            &BookHeader {
                exchequer: book.exchequer.clone(),
                rate: book.rate,
            },
        )
    }

    /// Puts every entry of `after` that differs from `before`, deletes the ones that are gone.
    fn diff<K, T>(
        mut self,
        before: &BTreeMap<K, T>,
        after: &BTreeMap<K, T>,
        key: impl Fn(&K) -> String,
    ) -> Result<Self>
    where
        K: Ord,
        T: Serialize + PartialEq,
    {
        for (k, value) in after {
            if before.get(k) != Some(value) {
                self = self.put(key(k), value)?;
            }
        }
        for k in before.keys().filter(|k| !after.contains_key(k)) {
            self.ops.push(WriteOp::Delete(key(k).into_bytes()));
        }
        Ok(self)
    }

    fn tables(self, before: &ExchequerBook, after: &ExchequerBook) -> Result<Self> {
        let asset = after.asset();
        self.diff(&before.supply, &after.supply, |h| holder_key("supply", &asset, h))?
            .diff(&before.debt, &after.debt, |h| holder_key("debt", &asset, h))?
            .diff(&before.growth, &after.growth, |h| holder_key("growth", &asset, h))?
            .diff(&before.wallets, &after.wallets, |h| holder_key("wallet", &asset, h))?
            .diff(&before.lines, &after.lines, |id| line_key(&asset, *id))
    }

    /// Every record of one exchequer.
    pub fn book(self, book: &ExchequerBook) -> Result<Self> {
        let empty = ExchequerBook::new(book.exchequer.clone());
        self.header(book)?.tables(&empty, book)
    }

    /// Only the records `after` changed relative to the persisted `before`.
    pub fn book_changes(self, before: &ExchequerBook, after: &ExchequerBook) -> Result<Self> {
        let commit = if before.exchequer != after.exchequer || before.rate != after.rate {
            self.header(after)?
        } else {
            self
        };
        commit.tables(before, after)
    }

    pub fn roles(self, roles: &Roles) -> Result<Self> {
        self.put(ROLES_KEY.to_string(), roles)
    }

    pub fn params(self, params: &GovernanceParams) -> Result<Self> {
        self.put(PARAMS_KEY.to_string(), params)
    }

    pub fn next_line_id(self, next: u64) -> Result<Self> {
        self.put(NEXT_LINE_KEY.to_string(), &next)
    }

    pub fn nonce(self, sender: &Address, next: u64) -> Result<Self> {
        self.put(nonce_key(sender), &next)
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

pub struct Storage {
    kv: Box<dyn KvStore>,
}

impl Storage {
    /// Wraps a backend and brings its layout to [`SCHEMA_VERSION`].
    pub fn new(kv: Box<dyn KvStore>) -> Result<Self> {
        let storage = Self { kv };
        storage.migrate()?;
        Ok(storage)
    }

    pub fn memory() -> Result<Self> {
        Self::new(Box::new(MemoryStore::new()))
    }

    #[cfg(feature = "rocksdb")]
    pub fn open(path: &str) -> Result<Self> {
        Self::new(Box::new(crate::kv::RocksStore::open(path)?))
    }

    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.kv.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn schema_version(&self) -> Result<Option<u32>> {
        self.get(SCHEMA_KEY)
    }

    fn migrate(&self) -> Result<()> {
        let found = self.schema_version()?.unwrap_or(0);
        if found > SCHEMA_VERSION {
            bail!(
                "store schema version {} is newer than supported version {}",
                found,
                SCHEMA_VERSION
            );
        }
        for (target, step) in MIGRATIONS {
            if *target > found {
                step(self.kv.as_ref()).with_context(|| format!("migration to v{}", target))?;
                self.kv
                    .write_batch(vec![WriteOp::Put(SCHEMA_KEY.as_bytes().to_vec(), encode(target)?)])?;
                info!(from = found, to = target, "storage schema migrated");
            }
        }
        Ok(())
    }

    pub fn write(&self, commit: Commit) -> Result<()> {
        if commit.is_empty() {
            return Ok(());
        }
        self.kv.write_batch(commit.ops)
    }

    pub fn save_book(&self, book: &ExchequerBook) -> Result<()> {
        self.write(Commit::new().book(book)?)
    }

    fn scan<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<(Vec<u8>, T)>> {
        self.kv
            .scan_prefix(prefix.as_bytes())?
            .into_iter()
            .map(|(key, value)| Ok((key, decode(&value)?)))
            .collect()
    }

    fn scan_holders<T: DeserializeOwned>(&self, table: &str, asset: &Address) -> Result<BTreeMap<Address, T>> {
        let prefix = format!("{}/{}/", table, hex::encode(asset));
        self.scan::<T>(&prefix)?
            .into_iter()
            .map(|(key, value)| Ok((address_suffix(&key)?, value)))
            .collect()
    }

    pub fn load_book(&self, asset: &Address) -> Result<Option<ExchequerBook>> {
        let header: BookHeader = match self.get(&exchequer_key(asset))? {
            Some(header) => header,
            None => return Ok(None),
        };
        let mut book = ExchequerBook::new(header.exchequer);
        book.rate = header.rate;
        book.supply = self.scan_holders::<ScaledBalance>("supply", asset)?;
        book.debt = self.scan_holders::<DebtPosition>("debt", asset)?;
        book.growth = self.scan_holders::<u128>("growth", asset)?;
        book.wallets = self.scan_holders::<Wallet>("wallet", asset)?;
        book.lines = self
            .scan::<LineOfCredit>(&format!("line/{}/", hex::encode(asset)))?
            .into_iter()
            .map(|(_, line)| (line.id, line))
            .collect();
        book.reindex_lines();
        Ok(Some(book))
    }

    pub fn load_books(&self) -> Result<BTreeMap<Address, ExchequerBook>> {
        let mut books = BTreeMap::new();
        for (key, _) in self.kv.scan_prefix(b"exchequer/")? {
            let asset = address_suffix(&key)?;
            if let Some(book) = self.load_book(&asset)? {
                books.insert(asset, book);
            }
        }
        Ok(books)
    }

    pub fn load_nonces(&self) -> Result<BTreeMap<Address, u64>> {
        self.scan::<u64>("nonce/")?
            .into_iter()
            .map(|(key, nonce)| Ok((address_suffix(&key)?, nonce)))
            .collect()
    }

    pub fn save_state(&self, state: &LedgerState) -> Result<()> {
        let mut commit = Commit::new()
            .roles(&state.roles)?
            .params(&state.params)?
            .next_line_id(state.next_line_id)?;
        for book in state.books.values() {
            commit = commit.book(book)?;
        }
        for (sender, nonce) in &state.nonces {
            commit = commit.nonce(sender, *nonce)?;
        }
        self.write(commit)
    }

    /// `None` for a store that was never initialized.
    pub fn load_state(&self) -> Result<Option<LedgerState>> {
        let roles: Roles = match self.get(ROLES_KEY)? {
            Some(roles) => roles,
            None => return Ok(None),
        };
        let params: GovernanceParams = self.get(PARAMS_KEY)?.unwrap_or_default();
        let mut state = LedgerState::new(roles, params);
        state.books = self.load_books()?;
        // commits on different books race for the counter; never hand out a persisted id again
        let stored: u64 = self.get(NEXT_LINE_KEY)?.unwrap_or(1);
        let after_lines = state
            .books
            .values()
            .filter_map(|book| book.lines.keys().next_back())
            .max()
            .map_or(1, |id| id + 1);
        state.next_line_id = stored.max(after_lines);
        state.nonces = self.load_nonces()?;
        Ok(Some(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polemarch_types::LineState;

    const RAY: u128 = 1_000_000_000_000_000_000_000_000_000;

    fn sample_state() -> LedgerState {
        let roles = Roles {
            owner: [1; 32],
            governance: [2; 32],
            fee_recipient: [3; 32],
        };
        let mut state = LedgerState::new(
            roles,
            GovernanceParams {
                voting_delay: 1,
                voting_period: 40,
                proposal_threshold: 0,
                timelock_min_delay: 0,
            },
        );
        let asset = [9u8; 32];
        let mut book = ExchequerBook::new(Exchequer::new(asset, [4; 32], [5; 32], [6; 32], 18, 0, 100));
        book.supply.insert(
            [10; 32],
            ScaledBalance {
                scaled: 500,
                previous_index: RAY,
            },
        );
        let mut position = DebtPosition::new(RAY / 20, 100);
        position.scaled = 40;
        position.weight = 40;
        book.debt.insert([11; 32], position);
        book.rate.increase(40, RAY / 20).unwrap();
        book.wallets.insert(
            [10; 32],
            Wallet {
                balance: 7,
                allowance: 3,
            },
        );
        book.growth.insert([12; 32], 20);
        for (id, state) in [(1u64, LineState::Closed), (2, LineState::Open)] {
            book.lines.insert(
                id,
                LineOfCredit {
                    id,
                    borrower: [11; 32],
                    asset,
                    borrow_max: 100,
                    rate: RAY / 20,
                    creation_timestamp: 100,
                    expiration_timestamp: 200,
                    state,
                    reserved: 60,
                    backstop_drawn: 0,
                },
            );
        }
        book.reindex_lines();
        state.books.insert(asset, book);
        state.next_line_id = 3;
        state.nonces.insert([10; 32], 4);
        state
    }

    #[test]
    fn state_survives_a_round_trip() {
        let storage = Storage::memory().unwrap();
        assert_eq!(storage.load_state().unwrap(), None);

        let state = sample_state();
        storage.save_state(&state).unwrap();
        let loaded = storage.load_state().unwrap().unwrap();
        assert_eq!(loaded, state);
        assert_eq!(loaded.books[&[9u8; 32]].active_lines.get(&[11u8; 32]), Some(&2));
    }

    #[test]
    fn book_changes_write_only_touched_records() {
        let storage = Storage::memory().unwrap();
        let state = sample_state();
        storage.save_state(&state).unwrap();

        let before = &state.books[&[9u8; 32]];
        let mut after = before.clone();
        after.wallets.insert(
            [13; 32],
            Wallet {
                balance: 5,
                allowance: 0,
            },
        );
        after.growth.remove(&[12; 32]);

        let commit = Commit::new().book_changes(before, &after).unwrap();
        // one new wallet and one removed growth entry; header and other tables untouched
        assert_eq!(commit.len(), 2);
        storage.write(commit).unwrap();

        let loaded = storage.load_book(&[9u8; 32]).unwrap().unwrap();
        assert_eq!(loaded, after);
        assert!(Commit::new().book_changes(&after, &after).unwrap().is_empty());
    }

    #[test]
    fn next_line_id_never_trails_persisted_lines() {
        let storage = Storage::memory().unwrap();
        let mut state = sample_state();
        // a stale counter, as left by a commit that lost the race
        state.next_line_id = 2;
        storage.save_state(&state).unwrap();
        assert_eq!(storage.load_state().unwrap().unwrap().next_line_id, 3);

        state.next_line_id = 10;
        storage.save_state(&state).unwrap();
        assert_eq!(storage.load_state().unwrap().unwrap().next_line_id, 10);
    }

    #[test]
    fn fresh_store_is_stamped_with_current_version() {
        let storage = Storage::memory().unwrap();
        assert_eq!(storage.schema_version().unwrap(), Some(SCHEMA_VERSION));
    }

    #[test]
    fn newer_schema_is_rejected() {
        let kv = MemoryStore::new();
        kv.write_batch(vec![WriteOp::Put(
            SCHEMA_KEY.as_bytes().to_vec(),
            encode(&(SCHEMA_VERSION + 1)).unwrap(),
        )])
        .unwrap();
        assert!(Storage::new(Box::new(kv)).is_err());
    }

    #[test]
    fn books_do_not_bleed_into_each_other() {
        let storage = Storage::memory().unwrap();
        let state = sample_state();
        let mut other = state.books[&[9u8; 32]].clone();
        other.exchequer.asset = [8u8; 32];
        other.supply.clear();
        storage.save_state(&state).unwrap();
        storage.save_book(&other).unwrap();

        let books = storage.load_books().unwrap();
        assert_eq!(books.len(), 2);
        assert!(books[&[8u8; 32]].supply.is_empty());
        assert_eq!(books[&[9u8; 32]].supply.len(), 1);
    }
}
