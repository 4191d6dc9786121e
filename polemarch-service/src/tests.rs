use super::*;
use polemarch_execution::ManualClock;
use polemarch_genesis::dev_address;
use polemarch_math::{RAY, WAD};
use polemarch_types::LedgerInstruction;

type TestService = LedgerService<Arc<ManualClock>>;

const START: u64 = 1_700_000_000;

struct Fixture {
    service: Arc<TestService>,
    storage: Arc<Storage>,
    clock: Arc<ManualClock>,
    owner: Address,
    weth: Address,
}

fn fixture() -> Fixture {
    let storage = Arc::new(Storage::memory().unwrap());
    let clock = Arc::new(ManualClock::new(START));
    let genesis = GenesisConfig::development();
    let service = TestService::bootstrap(storage.clone(), &genesis, clock.clone()).unwrap();
    Fixture {
        service: Arc::new(service),
        storage,
        clock,
        owner: genesis.owner,
        weth: dev_address("weth"),
    }
}

async fn send(service: &TestService, sender: Address, instruction: LedgerInstruction) -> Result<Vec<LedgerEvent>> {
    let nonce = service.expected_nonce(&sender).await;
    service.submit(Transaction::new(sender, nonce, instruction)).await
}

fn rejection(err: &anyhow::Error) -> Option<LedgerError> {
    err.downcast_ref::<LedgerError>().copied()
}

#[tokio::test]
async fn owner_supplies_from_genesis_wallet() {
    let f = fixture();
    send(&f.service, f.owner, LedgerInstruction::ApproveUnderlying { asset: f.weth, amount: WAD })
        .await
        .unwrap();
    send(&f.service, f.owner, LedgerInstruction::Supply { asset: f.weth, amount: WAD / 2 })
        .await
        .unwrap();

    assert_eq!(f.service.supply_balance_of(&f.weth, &f.owner).await.unwrap(), WAD / 2);
    assert_eq!(f.service.expected_nonce(&f.owner).await, 2);
    assert_eq!(f.service.get_normalized_return(&f.weth).await.unwrap(), RAY);
}

#[tokio::test]
async fn rejected_instruction_changes_nothing() {
    let f = fixture();
    let before = f.service.snapshot().await;

    let err = send(&f.service, f.owner, LedgerInstruction::Supply { asset: f.weth, amount: WAD })
        .await
        .unwrap_err();
    assert_eq!(rejection(&err), Some(LedgerError::TransferFailed));
    assert_eq!(f.service.expected_nonce(&f.owner).await, 0);
    assert_eq!(f.service.snapshot().await, before);

    let stale = Transaction::new(f.owner, 5, LedgerInstruction::ApproveUnderlying { asset: f.weth, amount: 1 });
    let err = f.service.submit(stale).await.unwrap_err();
    assert_eq!(rejection(&err), Some(LedgerError::InvalidNonce));

    let err = send(&f.service, f.owner, LedgerInstruction::Supply { asset: [7; 32], amount: 1 })
        .await
        .unwrap_err();
    assert_eq!(rejection(&err), Some(LedgerError::ReserveNotFound));
}

#[tokio::test]
async fn restart_recovers_committed_state() {
    let f = fixture();
    let borrower = dev_address("borrower");
    send(&f.service, f.owner, LedgerInstruction::ApproveUnderlying { asset: f.weth, amount: u128::MAX })
        .await
        .unwrap();
    send(&f.service, f.owner, LedgerInstruction::Supply { asset: f.weth, amount: 10 * WAD })
        .await
        .unwrap();
    send(
        &f.service,
        f.owner,
        LedgerInstruction::CreateLineOfCredit {
            borrower,
            asset: f.weth,
            borrow_max: WAD,
            rate: RAY / 20,
            term_days: 14,
        },
    )
    .await
    .unwrap();
    send(&f.service, borrower, LedgerInstruction::Borrow { asset: f.weth, amount: WAD / 4 })
        .await
        .unwrap();
    f.clock.advance_days(3);

    let before = f.service.snapshot().await;
    let restarted =
        TestService::bootstrap(f.storage.clone(), &GenesisConfig::development(), f.clock.clone()).unwrap();
    assert_eq!(restarted.snapshot().await, before);
    assert_eq!(
        restarted.debt_balance_of(&f.weth, &borrower).await.unwrap(),
        f.service.debt_balance_of(&f.weth, &borrower).await.unwrap()
    );
    assert_eq!(restarted.expected_nonce(&borrower).await, 1);
    assert_eq!(restarted.get_line_of_credit(&borrower).await.unwrap().id, 1);
}

#[tokio::test]
async fn registry_changes_are_persisted() {
    let f = fixture();
    let dai = dev_address("dai");
    send(
        &f.service,
        f.owner,
        LedgerInstruction::AddExchequer {
            asset: dai,
            s_token: dev_address("sdai"),
            d_token: dev_address("ddai"),
            g_token: dev_address("gdai"),
            decimals: 18,
            origination_fee_rate: 0,
        },
    )
    .await
    .unwrap();
    send(&f.service, f.owner, LedgerInstruction::SetFeeRecipient { fee_recipient: dai })
        .await
        .unwrap();

    let err = send(
        &f.service,
        f.owner,
        LedgerInstruction::AddExchequer {
            asset: dai,
            s_token: dai,
            d_token: dai,
            g_token: dai,
            decimals: 18,
            origination_fee_rate: 0,
        },
    )
    .await
    .unwrap_err();
    assert_eq!(rejection(&err), Some(LedgerError::ReserveAlreadyExists));

    let loaded = f.storage.load_state().unwrap().unwrap();
    assert!(loaded.books.contains_key(&dai));
    assert_eq!(loaded.roles.fee_recipient, dai);
    assert_eq!(loaded.nonces[&f.owner], 2);
}

#[tokio::test]
async fn exchequers_progress_independently() {
    let f = fixture();
    let dai = dev_address("dai");
    send(
        &f.service,
        f.owner,
        LedgerInstruction::AddExchequer {
            asset: dai,
            s_token: dev_address("sdai"),
            d_token: dev_address("ddai"),
            g_token: dev_address("gdai"),
            decimals: 18,
            origination_fee_rate: 0,
        },
    )
    .await
    .unwrap();

    let alice = dev_address("alice");
    let bob = dev_address("bob");
    for (who, asset) in [(alice, f.weth), (bob, dai)] {
        send(&f.service, who, LedgerInstruction::DepositUnderlying { asset, amount: WAD })
            .await
            .unwrap();
        send(&f.service, who, LedgerInstruction::ApproveUnderlying { asset, amount: WAD })
            .await
            .unwrap();
    }

    let (a, b) = tokio::join!(
        send(&f.service, alice, LedgerInstruction::Supply { asset: f.weth, amount: WAD }),
        send(&f.service, bob, LedgerInstruction::Supply { asset: dai, amount: WAD }),
    );
    a.unwrap();
    b.unwrap();
    assert_eq!(f.service.supply_total(&f.weth).await.unwrap(), WAD);
    assert_eq!(f.service.supply_total(&dai).await.unwrap(), WAD);
}

#[tokio::test]
async fn run_loop_answers_through_the_handle() {
    let f = fixture();
    let (handle, task) = f.service.clone().spawn(16);

    handle
        .submit(Transaction::new(
            f.owner,
            0,
            LedgerInstruction::SetExchequerBorrowing { asset: f.weth, enabled: false },
        ))
        .await
        .unwrap();
    let err = handle
        .submit(Transaction::new(
            f.owner,
            0,
            LedgerInstruction::SetExchequerBorrowing { asset: f.weth, enabled: true },
        ))
        .await
        .unwrap_err();
    assert_eq!(rejection(&err), Some(LedgerError::InvalidNonce));
    assert!(!f.service.get_exchequer(&f.weth).await.unwrap().borrowing_enabled);

    drop(handle);
    task.await.unwrap();
}
