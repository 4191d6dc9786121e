use anyhow::{Context, Result};
use clap::Parser;
use polemarch_execution::ManualClock;
use polemarch_genesis::{dev_address, GenesisConfig};
use polemarch_math::{Ray, RAY, WAD};
use polemarch_service::LedgerService;
use polemarch_storage::Storage;
use polemarch_types::{Address, LedgerError, LedgerInstruction, LineState, Transaction};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

const START: u64 = 1_700_000_000;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Polemarch credit-line ledger simulation runner")]
struct Args {
    /// Number of supplying wallets.
    #[arg(long, default_value_t = 20)]
    suppliers: usize,
    /// Number of borrowers that get a line of credit.
    #[arg(long, default_value_t = 10)]
    borrowers: usize,
    /// Simulated days.
    #[arg(long, default_value_t = 60)]
    days: u64,
    /// Term of every line of credit, in days.
    #[arg(long, default_value_t = 30)]
    term_days: u64,
    /// Largest deposit of a single supplier, in whole tokens.
    #[arg(long, default_value_t = 100)]
    max_supply: u64,
    /// Borrow limit of every line, in whole tokens.
    #[arg(long, default_value_t = 25)]
    borrow_max: u64,
    /// Percentage of borrowers that never pay back.
    #[arg(long, default_value_t = 20)]
    default_percent: u32,
    #[arg(long, default_value_t = 7)]
    seed: u64,
    /// Genesis config (JSON). The development preset is used when absent.
    #[arg(long)]
    config: Option<PathBuf>,
    /// RocksDB directory; an in-memory store is used when absent.
    #[arg(long)]
    data_dir: Option<String>,
    #[arg(long, default_value = "info")]
    log_level: Level,
}

type SimService = LedgerService<Arc<ManualClock>>;

struct Borrower {
    address: Address,
    defaults: bool,
}

#[derive(Debug, Default)]
struct Summary {
    committed: u64,
    rejected: BTreeMap<&'static str, u64>,
    supply_index: Ray,
    debt_index: Ray,
    average_rate: Ray,
    total_supply: u128,
    total_debt: u128,
    available_liquidity: u128,
    growth_buffer: u128,
    lines: BTreeMap<&'static str, u64>,
}

struct Simulation {
    service: Arc<SimService>,
    clock: Arc<ManualClock>,
    owner: Address,
    asset: Address,
    summary: Summary,
}

impl Simulation {
    /// Submits with the sender's next nonce; rejections are tallied by error code.
    async fn send(&mut self, sender: Address, instruction: LedgerInstruction) -> bool {
        let nonce = self.service.expected_nonce(&sender).await;
        match self.service.submit(Transaction::new(sender, nonce, instruction)).await {
            Ok(_) => {
                self.summary.committed += 1;
                true
            }
            Err(err) => {
                let code = err
                    .downcast_ref::<LedgerError>()
                    .map(|e| e.code())
                    .unwrap_or("INTERNAL");
                *self.summary.rejected.entry(code).or_default() += 1;
                false
            }
        }
    }
}

fn open_storage(args: &Args) -> Result<Storage> {
    match &args.data_dir {
        #[cfg(feature = "rocksdb")]
        Some(path) => Storage::open(path),
        #[cfg(not(feature = "rocksdb"))]
        Some(_) => anyhow::bail!("--data-dir needs the rocksdb feature"),
        None => Storage::memory(),
    }
}

fn build_wallets(prefix: &str, count: usize) -> Vec<Address> {
    (0..count)
        .map(|i| dev_address(&format!("{}-{}", prefix, i)))
        .collect()
}

async fn seed_simulation_money(sim: &mut Simulation, wallets: &[Address], amount: u128) {
    let asset = sim.asset;
    for wallet in wallets {
        sim.send(*wallet, LedgerInstruction::DepositUnderlying { asset, amount })
            .await;
        sim.send(*wallet, LedgerInstruction::ApproveUnderlying { asset, amount: u128::MAX })
            .await;
    }
}

async fn bootstrap(args: &Args) -> Result<Simulation> {
    let genesis = match &args.config {
        Some(path) => GenesisConfig::from_json_file(path)?,
        None => GenesisConfig::development(),
    };
    let asset = genesis
        .exchequers
        .first()
        .map(|e| e.asset)
        .context("genesis config has no exchequer")?;
    let storage = Arc::new(open_storage(args).context("Failed to initialize storage")?);
    let clock = Arc::new(ManualClock::new(START));
    let service = SimService::bootstrap(storage, &genesis, clock.clone())?;

    let mut sim = Simulation {
        service: Arc::new(service),
        clock,
        owner: genesis.owner,
        asset,
        summary: Summary::default(),
    };
    // borrowing may be off in a custom genesis
    let owner = sim.owner;
    sim.send(owner, LedgerInstruction::SetExchequerBorrowing { asset, enabled: true })
        .await;
    Ok(sim)
}

async fn run_simulation(args: &Args) -> Result<Summary> {
    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut sim = bootstrap(args).await?;
    let (owner, asset) = (sim.owner, sim.asset);
    let max_supply = u128::from(args.max_supply.max(1)) * WAD;
    let borrow_max = u128::from(args.borrow_max) * WAD;

    // Suppliers
    let suppliers = build_wallets("supplier", args.suppliers);
    seed_simulation_money(&mut sim, &suppliers, max_supply).await;
    for supplier in &suppliers {
        let amount = rng.gen_range(WAD..=max_supply);
        sim.send(*supplier, LedgerInstruction::Supply { asset, amount })
            .await;
    }

    // Backstop
    let backstop = dev_address("backstop");
    seed_simulation_money(&mut sim, &[backstop], borrow_max).await;
    sim.send(backstop, LedgerInstruction::FundGrowthBuffer { asset, amount: borrow_max })
        .await;

    // Borrowers: the starting wallet covers interest on a full draw
    let borrowers: Vec<Borrower> = build_wallets("borrower", args.borrowers)
        .into_iter()
        .map(|address| Borrower {
            address,
            defaults: rng.gen_range(0..100) < args.default_percent,
        })
        .collect();
    let addresses: Vec<Address> = borrowers.iter().map(|b| b.address).collect();
    seed_simulation_money(&mut sim, &addresses, borrow_max).await;
    for borrower in &borrowers {
        let rate = RAY / 100 * rng.gen_range(2..=15);
        sim.send(
            owner,
            LedgerInstruction::CreateLineOfCredit {
                borrower: borrower.address,
                asset,
                borrow_max,
                rate,
                term_days: args.term_days,
            },
        )
        .await;
    }

    let started = Instant::now();
    for day in 0..args.days {
        for borrower in &borrowers {
            let who = borrower.address;
            if day + 2 < args.term_days {
                if rng.gen_bool(0.3) {
                    let amount = borrow_max / 100 * rng.gen_range(5..=30);
                    sim.send(who, LedgerInstruction::Borrow { asset, amount }).await;
                } else if !borrower.defaults && rng.gen_bool(0.2) {
                    let amount = borrow_max / 100 * rng.gen_range(1..=10);
                    sim.send(who, LedgerInstruction::Repay { asset, amount }).await;
                }
            } else if day + 2 == args.term_days && !borrower.defaults {
                sim.send(who, LedgerInstruction::Repay { asset, amount: u128::MAX }).await;
            } else if day == args.term_days + 1 {
                let line = sim.service.line_of_credit(&asset, &who).await?;
                let owed = sim.service.debt_balance_of(&asset, &who).await?;
                match line.map(|l| l.state) {
                    Some(LineState::Open) if owed > 0 => {
                        sim.send(owner, LedgerInstruction::MarkDelinquent { asset, borrower: who })
                            .await;
                    }
                    Some(LineState::Open) => {
                        sim.send(owner, LedgerInstruction::CloseLineOfCredit { asset, borrower: who })
                            .await;
                    }
                    _ => {}
                }
            }
        }
        sim.clock.advance_days(1);
    }
    info!(elapsed = ?started.elapsed(), days = args.days, "simulation finished");

    let exchequer = sim.service.get_exchequer(&asset).await?;
    let mut summary = std::mem::take(&mut sim.summary);
    summary.supply_index = exchequer.supply_index;
    summary.debt_index = exchequer.debt_index;
    summary.average_rate = sim.service.get_average_rate(&asset).await?;
    summary.total_supply = sim.service.supply_total(&asset).await?;
    summary.total_debt = sim.service.debt_total(&asset).await?;
    summary.available_liquidity = sim.service.available_liquidity(&asset).await?;
    summary.growth_buffer = exchequer.growth_buffer;
    for borrower in &borrowers {
        let state = match sim.service.line_of_credit(&asset, &borrower.address).await? {
            Some(line) => match line.state {
                LineState::Open => "open",
                LineState::Delinquent => "delinquent",
                LineState::Closed => "closed",
            },
            None => "none",
        };
        *summary.lines.entry(state).or_default() += 1;
    }
    Ok(summary)
}

fn ray_percent(value: Ray) -> f64 {
    value as f64 / RAY as f64 * 100.0
}

fn tokens(value: u128) -> f64 {
    value as f64 / WAD as f64
}

fn print_summary(args: &Args, summary: &Summary) {
    println!("=== Polemarch Simulation ===");
    println!("Suppliers: {}  Borrowers: {}  Days: {}", args.suppliers, args.borrowers, args.days);
    println!("Committed instructions: {}", summary.committed);
    for (code, count) in &summary.rejected {
        println!("Rejected {}: {}", code, count);
    }
    println!("Supply index: {:.6}", summary.supply_index as f64 / RAY as f64);
    println!("Debt index: {:.6}", summary.debt_index as f64 / RAY as f64);
    println!("Average borrow rate: {:.4}%", ray_percent(summary.average_rate));
    println!("Total supply: {:.4}", tokens(summary.total_supply));
    println!("Total debt: {:.4}", tokens(summary.total_debt));
    println!("Available liquidity: {:.4}", tokens(summary.available_liquidity));
    println!("Growth buffer: {:.4}", tokens(summary.growth_buffer));
    for (state, count) in &summary.lines {
        println!("Lines {}: {}", state, count);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")?;

    let summary = run_simulation(&args).await?;
    print_summary(&args, &summary);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_args() -> Args {
        Args::parse_from([
            "polemarch-simulation",
            "--suppliers",
            "4",
            "--borrowers",
            "5",
            "--days",
            "16",
            "--term-days",
            "12",
            "--default-percent",
            "40",
        ])
    }

    #[tokio::test]
    async fn simulation_bootstraps_wallets_and_money() {
        let args = small_args();
        let mut sim = bootstrap(&args).await.unwrap();
        let wallets = build_wallets("supplier", 10);
        seed_simulation_money(&mut sim, &wallets, 1_000 * WAD).await;

        assert_eq!(wallets.len(), 10);
        for wallet in &wallets {
            let balance = sim.service.underlying_balance_of(&sim.asset, wallet).await.unwrap();
            assert_eq!(balance, 1_000 * WAD);
        }
        assert!(sim.summary.rejected.is_empty());
    }

    #[tokio::test]
    async fn every_line_is_settled_after_its_term() {
        let args = small_args();
        let summary = run_simulation(&args).await.unwrap();

        assert!(summary.committed > 0);
        assert!(summary.supply_index >= RAY);
        assert!(summary.debt_index >= RAY);
        assert_eq!(summary.lines.get("open"), None);
        assert_eq!(summary.lines.values().sum::<u64>(), 5);
    }
}
