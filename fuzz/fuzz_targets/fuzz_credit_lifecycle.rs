#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use polemarch_execution::{execute_instruction, query};
use polemarch_math::{RAY, WAD};
use polemarch_types::{LedgerInstruction, LedgerState, Roles, SECONDS_PER_DAY};

const OWNER: [u8; 32] = [1; 32];
const SUPPLIER: [u8; 32] = [9; 32];
const ASSET: [u8; 32] = [20; 32];

#[derive(Arbitrary, Debug)]
enum Step {
    Create { borrower: u8, borrow_max: u32, rate_bps: u16, term_days: u8 },
    Borrow { borrower: u8, amount: u32 },
    Repay { borrower: u8, amount: u32 },
    RepayAll { borrower: u8 },
    MarkDelinquent { borrower: u8 },
    Close { borrower: u8 },
    FundGrowthBuffer { amount: u32 },
    Withdraw { amount: u32 },
    Wait { hours: u16 },
}

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    initial_supply: u32,
    steps: Vec<Step>,
}

fn borrower(id: u8) -> [u8; 32] {
    [100 + id % 3; 32]
}

fuzz_target!(|data: FuzzInput| {
    let roles = Roles {
        owner: OWNER,
        governance: [2; 32],
        fee_recipient: [3; 32],
    };
    let mut state = LedgerState::new(roles, Default::default());
    let mut now = 1_700_000_000u64;

    let mut setup = vec![
        (
            OWNER,
            LedgerInstruction::AddExchequer {
                asset: ASSET,
                s_token: [21; 32],
                d_token: [22; 32],
                g_token: [23; 32],
                decimals: 18,
                origination_fee_rate: RAY / 20,
            },
        ),
        (OWNER, LedgerInstruction::SetExchequerBorrowing { asset: ASSET, enabled: true }),
    ];
    for who in [SUPPLIER, borrower(0), borrower(1), borrower(2)] {
        setup.push((who, LedgerInstruction::DepositUnderlying { asset: ASSET, amount: 1_000_000 * WAD }));
        setup.push((who, LedgerInstruction::ApproveUnderlying { asset: ASSET, amount: u128::MAX }));
    }
    setup.push((
        SUPPLIER,
        LedgerInstruction::Supply { asset: ASSET, amount: u128::from(data.initial_supply) * WAD / 1_000 + 1 },
    ));
    for (sender, ix) in &setup {
        if execute_instruction(&mut state, sender, now, ix).is_err() {
            return;
        }
    }

    let (mut last_supply, mut last_debt) = (RAY, RAY);
    for step in data.steps.iter().take(64) {
        let (sender, ix) = match step {
            Step::Create { borrower: b, borrow_max, rate_bps, term_days } => (
                OWNER,
                LedgerInstruction::CreateLineOfCredit {
                    borrower: borrower(*b),
                    asset: ASSET,
                    borrow_max: u128::from(*borrow_max) * WAD / 1_000,
                    rate: RAY / 10_000 * u128::from(*rate_bps % 10_000),
                    term_days: u64::from(*term_days),
                },
            ),
            Step::Borrow { borrower: b, amount } => (
                borrower(*b),
                LedgerInstruction::Borrow { asset: ASSET, amount: u128::from(*amount) * WAD / 1_000 },
            ),
            Step::Repay { borrower: b, amount } => (
                borrower(*b),
                LedgerInstruction::Repay { asset: ASSET, amount: u128::from(*amount) * WAD / 1_000 },
            ),
            Step::RepayAll { borrower: b } => (
                borrower(*b),
                LedgerInstruction::Repay { asset: ASSET, amount: u128::MAX },
            ),
            Step::MarkDelinquent { borrower: b } => (
                OWNER,
                LedgerInstruction::MarkDelinquent { asset: ASSET, borrower: borrower(*b) },
            ),
            Step::Close { borrower: b } => (
                OWNER,
                LedgerInstruction::CloseLineOfCredit { asset: ASSET, borrower: borrower(*b) },
            ),
            Step::FundGrowthBuffer { amount } => (
                SUPPLIER,
                LedgerInstruction::FundGrowthBuffer { asset: ASSET, amount: u128::from(*amount) * WAD / 1_000 },
            ),
            Step::Withdraw { amount } => (
                SUPPLIER,
                LedgerInstruction::Withdraw { asset: ASSET, amount: u128::from(*amount) * WAD / 1_000 },
            ),
            Step::Wait { hours } => {
                now += u64::from(*hours % 2_000) * SECONDS_PER_DAY / 24;
                continue;
            }
        };

        let before = state.clone();
        if execute_instruction(&mut state, &sender, now, &ix).is_err() {
            assert_eq!(state, before, "rejected instruction changed state");
        }

        let book = &state.books[&ASSET];
        if let Ok(exchequer) = query::get_exchequer(book, now) {
            assert!(exchequer.supply_index >= last_supply, "supply index went backwards");
            assert!(exchequer.debt_index >= last_debt, "debt index went backwards");
            last_supply = exchequer.supply_index;
            last_debt = exchequer.debt_index;
        }
        // the reserve debt can only be empty once every position is gone
        if book.rate.is_empty() {
            assert_eq!(book.exchequer.total_scaled_debt, 0);
        }
    }
});
