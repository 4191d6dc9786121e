#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use polemarch_execution::{execute_instruction, query};
use polemarch_math::{RAY, WAD};
use polemarch_types::{LedgerInstruction, LedgerState, Roles};

const OWNER: [u8; 32] = [1; 32];
const ASSET: [u8; 32] = [20; 32];

#[derive(Arbitrary, Debug)]
enum Step {
    Supply { holder: u8, amount: u64 },
    Withdraw { holder: u8, amount: u64 },
    WithdrawAll { holder: u8 },
    SetSupplyCap { cap: u64 },
    Wait { seconds: u32 },
}

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    steps: Vec<Step>,
}

fn holder(id: u8) -> [u8; 32] {
    [100 + id % 4; 32]
}

fuzz_target!(|data: FuzzInput| {
    let roles = Roles {
        owner: OWNER,
        governance: [2; 32],
        fee_recipient: [3; 32],
    };
    let mut state = LedgerState::new(roles, Default::default());
    let mut now = 1_700_000_000u64;

    let add = LedgerInstruction::AddExchequer {
        asset: ASSET,
        s_token: [21; 32],
        d_token: [22; 32],
        g_token: [23; 32],
        decimals: 18,
        origination_fee_rate: RAY / 20,
    };
    if execute_instruction(&mut state, &OWNER, now, &add).is_err() {
        return;
    }
    // Every holder starts with funds and an unlimited allowance.
    for id in 0..4 {
        let who = holder(id);
        let _ = execute_instruction(
            &mut state,
            &who,
            now,
            &LedgerInstruction::DepositUnderlying { asset: ASSET, amount: 1_000_000 * WAD },
        );
        let _ = execute_instruction(
            &mut state,
            &who,
            now,
            &LedgerInstruction::ApproveUnderlying { asset: ASSET, amount: u128::MAX },
        );
    }

    let mut last_index = RAY;
    for step in data.steps.iter().take(64) {
        let (sender, ix) = match step {
            Step::Supply { holder: h, amount } => (
                holder(*h),
                LedgerInstruction::Supply { asset: ASSET, amount: u128::from(*amount) },
            ),
            Step::Withdraw { holder: h, amount } => (
                holder(*h),
                LedgerInstruction::Withdraw { asset: ASSET, amount: u128::from(*amount) },
            ),
            Step::WithdrawAll { holder: h } => (
                holder(*h),
                LedgerInstruction::Withdraw { asset: ASSET, amount: u128::MAX },
            ),
            Step::SetSupplyCap { cap } => (
                OWNER,
                LedgerInstruction::SetSupplyCap { asset: ASSET, cap: u128::from(*cap) },
            ),
            Step::Wait { seconds } => {
                now += u64::from(*seconds);
                continue;
            }
        };

        let before = state.clone();
        if execute_instruction(&mut state, &sender, now, &ix).is_err() {
            assert_eq!(state, before, "rejected instruction changed state");
        }

        let book = &state.books[&ASSET];
        let index = query::normalized_return(book, now).unwrap_or(last_index);
        assert!(index >= last_index, "supply index went backwards");
        last_index = index;
    }
});
