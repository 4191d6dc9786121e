use anyhow::{bail, Context, Result};
use polemarch_math::{wad_to_ray, WAD};
use polemarch_types::state::{ExchequerBook, GovernanceParams, LedgerState, Roles};
use polemarch_types::{Address, Exchequer, ZERO_ADDRESS};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Startup configuration of a ledger. Addresses are hex strings in JSON; rates are wads
/// (`0.05` = `50000000000000000`).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GenesisConfig {
    #[serde(with = "hex::serde")]
    pub owner: Address,
    /// Timelock executor that carries out passed proposals.
    #[serde(with = "hex::serde")]
    pub governance: Address,
    #[serde(with = "hex::serde")]
    pub fee_recipient: Address,
    #[serde(default)]
    pub governance_params: GovernanceParams,
    #[serde(default)]
    pub genesis_timestamp: u64,
    pub exchequers: Vec<ExchequerGenesis>,
    #[serde(default)]
    pub wallets: Vec<WalletGenesis>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ExchequerGenesis {
    #[serde(with = "hex::serde")]
    pub asset: Address,
    #[serde(with = "hex::serde")]
    pub s_token: Address,
    #[serde(with = "hex::serde")]
    pub d_token: Address,
    #[serde(with = "hex::serde")]
    pub g_token: Address,
    pub decimals: u8,
    pub origination_fee_wad: u128,
    #[serde(default)]
    pub supply_cap: u128,
    #[serde(default)]
    pub borrow_cap: u128,
    #[serde(default = "enabled")]
    pub active: bool,
    #[serde(default)]
    pub borrowing_enabled: bool,
}

/// Underlying pre-credited to a holder, e.g. a treasury or test faucet.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WalletGenesis {
    #[serde(with = "hex::serde")]
    pub asset: Address,
    #[serde(with = "hex::serde")]
    pub holder: Address,
    pub balance: u128,
}

fn enabled() -> bool {
    true
}

/// Deterministic address for a development label.
pub fn dev_address(label: &str) -> Address {
    *blake3::hash(label.as_bytes()).as_bytes()
}

impl GenesisConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read genesis config {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("Invalid genesis config {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Local development preset: one 18-decimal WETH-like exchequer with a 5% origination
    /// fee, borrowing on, and a funded owner wallet.
    pub fn development() -> Self {
        let owner = dev_address("owner");
        let weth = dev_address("weth");
        Self {
            owner,
            governance: dev_address("timelock"),
            fee_recipient: dev_address("exchequer-safe"),
            governance_params: GovernanceParams {
                voting_delay: 1,
                voting_period: 40,
                proposal_threshold: 0,
                timelock_min_delay: 0,
            },
            genesis_timestamp: 0,
            exchequers: vec![ExchequerGenesis {
                asset: weth,
                s_token: dev_address("sweth"),
                d_token: dev_address("dweth"),
                g_token: dev_address("gweth"),
                decimals: 18,
                origination_fee_wad: WAD / 20,
                supply_cap: 0,
                borrow_cap: 0,
                active: true,
                borrowing_enabled: true,
            }],
            wallets: vec![WalletGenesis {
                asset: weth,
                holder: owner,
                balance: 1_000 * WAD,
            }],
        }
    }
}

pub fn create_genesis_state(config: &GenesisConfig) -> Result<LedgerState> {
    if config.owner == ZERO_ADDRESS {
        bail!("genesis owner must be set");
    }
    let roles = Roles {
        owner: config.owner,
        governance: config.governance,
        fee_recipient: config.fee_recipient,
    };
    let mut state = LedgerState::new(roles, config.governance_params);

    for entry in &config.exchequers {
        if state.books.contains_key(&entry.asset) {
            bail!("exchequer {} listed twice", hex::encode(entry.asset));
        }
        let fee_rate = wad_to_ray(entry.origination_fee_wad)
            .with_context(|| format!("origination fee of {}", hex::encode(entry.asset)))?;
        let mut exchequer = Exchequer::new(
            entry.asset,
            entry.s_token,
            entry.d_token,
            entry.g_token,
            entry.decimals,
            fee_rate,
            config.genesis_timestamp,
        );
        exchequer.supply_cap = entry.supply_cap;
        exchequer.borrow_cap = entry.borrow_cap;
        exchequer.active = entry.active;
        exchequer.borrowing_enabled = entry.borrowing_enabled;
        state.books.insert(entry.asset, ExchequerBook::new(exchequer));
    }

    for wallet in &config.wallets {
        let Some(book) = state.books.get_mut(&wallet.asset) else {
            bail!("wallet for unknown exchequer {}", hex::encode(wallet.asset));
        };
        let entry = book.wallets.entry(wallet.holder).or_default();
        entry.balance = entry
            .balance
            .checked_add(wallet.balance)
            .context("wallet balance overflow")?;
    }

    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use polemarch_math::RAY;

    #[test]
    fn development_preset_builds_one_exchequer() {
        let config = GenesisConfig::development();
        let state = create_genesis_state(&config).unwrap();
        assert_eq!(state.books.len(), 1);

        let book = &state.books[&dev_address("weth")];
        assert_eq!(book.exchequer.decimals, 18);
        assert_eq!(book.exchequer.origination_fee_rate, RAY / 20);
        assert_eq!(book.exchequer.supply_index, RAY);
        assert!(book.exchequer.borrowing_enabled);
        assert_eq!(book.wallets[&config.owner].balance, 1_000 * WAD);
        assert_eq!(state.params.voting_period, 40);
        assert_eq!(state.next_line_id, 1);
    }

    #[test]
    fn json_round_trip() {
        let config = GenesisConfig::development();
        let json = config.to_json().unwrap();
        assert!(json.contains(&hex::encode(config.owner)));
        assert_eq!(GenesisConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn optional_fields_default() {
        let json = format!(
            r#"{{
                "owner": "{a}",
                "governance": "{a}",
                "fee_recipient": "{a}",
                "exchequers": [{{
                    "asset": "{b}", "s_token": "{b}", "d_token": "{b}", "g_token": "{b}",
                    "decimals": 6, "origination_fee_wad": 0
                }}]
            }}"#,
            a = hex::encode([1u8; 32]),
            b = hex::encode([2u8; 32]),
        );
        let config = GenesisConfig::from_json(&json).unwrap();
        let entry = &config.exchequers[0];
        assert!(entry.active);
        assert!(!entry.borrowing_enabled);
        assert_eq!(entry.supply_cap, 0);
        assert!(config.wallets.is_empty());
        assert_eq!(config.governance_params, GovernanceParams::default());
    }

    #[test]
    fn rejects_inconsistent_configs() {
        let mut duplicated = GenesisConfig::development();
        duplicated.exchequers.push(duplicated.exchequers[0].clone());
        assert!(create_genesis_state(&duplicated).is_err());

        let mut orphan = GenesisConfig::development();
        orphan.wallets[0].asset = dev_address("dai");
        assert!(create_genesis_state(&orphan).is_err());

        let mut ownerless = GenesisConfig::development();
        ownerless.owner = ZERO_ADDRESS;
        assert!(create_genesis_state(&ownerless).is_err());
    }
}
