//! Integration tests for the custody ledger.

use alloy_primitives::{Address, U256};
use chest_ledger::{
    Chest, ChestConfig, InMemoryGateway, Journal, JournalOp, LedgerError, Transfer,
    TransferFailed, TransferGateway,
};
use chest_shared::{AssetId, AssetKind, BatchLeg, BatchRequest, Direction, FUNGIBLE_ITEM};
use std::sync::Arc;
use std::thread;

const OWNER: Address = Address::new([0x0e; 20]);
const PLAYER: Address = Address::new([0xa1; 20]);
const CUSTODY: Address = Address::new([0xc0; 20]);

const GOLD: AssetId = Address::new([0x0a; 20]);
const SWORD: AssetId = Address::new([0x0b; 20]);
const POTION: AssetId = Address::new([0x0c; 20]);
const UNKNOWN: AssetId = Address::new([0x0d; 20]);

fn temp_journal_path() -> std::path::PathBuf {
    let id = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("test_custody_{id}.journal"))
}

fn leg(asset: AssetId, item: u64, quantity: u64) -> BatchLeg {
    BatchLeg::new(asset, U256::from(item), U256::from(quantity))
}

fn stocked_gateway() -> InMemoryGateway {
    let mut gateway = InMemoryGateway::new(CUSTODY);
    gateway.mint(PLAYER, GOLD, FUNGIBLE_ITEM, U256::from(5000));
    gateway.mint(PLAYER, SWORD, U256::from(7), U256::from(1));
    gateway.mint(PLAYER, SWORD, U256::from(8), U256::from(1));
    gateway.mint(PLAYER, POTION, U256::from(2), U256::from(500));
    gateway.mint(PLAYER, UNKNOWN, FUNGIBLE_ITEM, U256::from(10));
    gateway
}

fn whitelisted_chest(config: ChestConfig) -> Chest {
    let chest = Chest::new(config).unwrap();
    chest
        .add_whitelist_tagged(OWNER, &[GOLD, SWORD, POTION], &[1, 2, 3])
        .unwrap();
    chest
}

fn scenario_deposit() -> Vec<BatchLeg> {
    vec![leg(GOLD, 0, 1000), leg(SWORD, 7, 1), leg(POTION, 2, 50)]
}

#[test]
fn test_scenario_deposit_then_loot() {
    let chest = whitelisted_chest(ChestConfig::new(OWNER));
    let mut gateway = stocked_gateway();

    chest
        .batch_deposit(PLAYER, scenario_deposit(), &mut gateway)
        .unwrap();

    let columns = chest.look().unwrap().columns();
    assert_eq!(columns.items, vec![GOLD, SWORD, POTION]);
    assert_eq!(
        columns.token_ids,
        vec![FUNGIBLE_ITEM, U256::from(7), U256::from(2)]
    );
    assert_eq!(
        columns.amounts,
        vec![U256::from(1000), U256::from(1), U256::from(50)]
    );
    assert_eq!(
        columns.kinds,
        vec![AssetKind::Fungible, AssetKind::NonFungible, AssetKind::SemiFungible]
    );

    let receipt = chest
        .batch_loot(OWNER, vec![leg(GOLD, 0, 400)], &mut gateway)
        .unwrap();
    assert_eq!(receipt.direction, Direction::Withdraw);
    assert_eq!(receipt.legs.len(), 1);
    assert_eq!(receipt.legs[0].asset, GOLD);
    assert_eq!(receipt.legs[0].item, FUNGIBLE_ITEM);
    assert_eq!(receipt.legs[0].quantity, U256::from(400));
    assert_eq!(receipt.legs[0].kind, AssetKind::Fungible);

    let snapshot = chest.look().unwrap();
    assert_eq!(snapshot.quantity_of(&GOLD, &FUNGIBLE_ITEM), U256::from(600));
    assert_eq!(snapshot.quantity_of(&SWORD, &U256::from(7)), U256::from(1));
    assert_eq!(snapshot.quantity_of(&POTION, &U256::from(2)), U256::from(50));
    assert_eq!(gateway.balance(OWNER, GOLD, FUNGIBLE_ITEM), U256::from(400));
    assert_eq!(gateway.balance(CUSTODY, GOLD, FUNGIBLE_ITEM), U256::from(600));
}

#[test]
fn test_whitelist_gate() {
    let chest = whitelisted_chest(ChestConfig::new(OWNER));
    let mut gateway = stocked_gateway();
    let before = gateway.balances();

    let err = chest
        .batch_deposit(PLAYER, vec![leg(UNKNOWN, 0, 1)], &mut gateway)
        .unwrap_err();

    assert_eq!(err, LedgerError::NotWhitelisted { asset: UNKNOWN }.at_leg(0));
    assert!(chest.look().unwrap().is_empty());
    assert_eq!(gateway.balances(), before);
}

#[test]
fn test_balance_floor() {
    let chest = whitelisted_chest(ChestConfig::new(OWNER));
    let mut gateway = stocked_gateway();
    chest
        .batch_deposit(PLAYER, vec![leg(POTION, 2, 10)], &mut gateway)
        .unwrap();
    let before = chest.look().unwrap();

    let err = chest
        .batch_loot(OWNER, vec![leg(POTION, 2, 11)], &mut gateway)
        .unwrap_err();

    assert!(matches!(
        err,
        LedgerError::BatchValidationFailed { leg_index: 0, ref source }
            if **source == LedgerError::InsufficientBalance {
                asset: POTION,
                item: U256::from(2),
                requested: U256::from(11),
                available: U256::from(10),
            }
    ));
    assert_eq!(chest.look().unwrap(), before);
}

#[test]
fn test_failed_transfer_leaves_everything_unchanged() {
    let chest = whitelisted_chest(ChestConfig::new(OWNER));
    let mut gateway = stocked_gateway();
    chest
        .batch_deposit(PLAYER, vec![leg(GOLD, 0, 100)], &mut gateway)
        .unwrap();

    let ledger_before = chest.look().unwrap();
    let external_before = gateway.balances();

    for failing_leg in 1..=3 {
        gateway.fail_on_call(failing_leg);
        let err = chest
            .batch_deposit(PLAYER, scenario_deposit(), &mut gateway)
            .unwrap_err();
        gateway.clear_faults();

        assert_eq!(err.leg_index(), Some(failing_leg - 1));
        assert!(matches!(err, LedgerError::BatchTransferFailed { .. }));
        assert_eq!(chest.look().unwrap(), ledger_before);
        assert_eq!(gateway.balances(), external_before);
    }
}

#[test]
fn test_failing_asset_mid_batch() {
    let chest = whitelisted_chest(ChestConfig::new(OWNER));
    let mut gateway = stocked_gateway();
    gateway.fail_asset(POTION);

    let err = chest
        .batch_deposit(PLAYER, scenario_deposit(), &mut gateway)
        .unwrap_err();

    assert!(matches!(
        err,
        LedgerError::BatchTransferFailed { leg_index: 2, asset, .. } if asset == POTION
    ));
    assert!(chest.look().unwrap().is_empty());
    assert_eq!(gateway.balance(PLAYER, GOLD, FUNGIBLE_ITEM), U256::from(5000));
    assert_eq!(gateway.balance(PLAYER, SWORD, U256::from(7)), U256::from(1));
}

#[test]
fn test_no_netting() {
    let chest = whitelisted_chest(ChestConfig::new(OWNER));
    let mut gateway = stocked_gateway();
    chest
        .batch_deposit(PLAYER, vec![leg(GOLD, 0, 10)], &mut gateway)
        .unwrap();

    let err = chest
        .batch_loot(
            OWNER,
            vec![leg(GOLD, 0, 6), leg(GOLD, 0, 6)],
            &mut gateway,
        )
        .unwrap_err();
    assert_eq!(err.leg_index(), Some(1));
    assert_eq!(chest.balance_of(&GOLD, &FUNGIBLE_ITEM), Ok(U256::from(10)));

    let receipt = chest
        .batch_deposit(
            PLAYER,
            vec![leg(GOLD, 0, 3), leg(GOLD, 0, 4)],
            &mut gateway,
        )
        .unwrap();
    assert_eq!(receipt.legs.len(), 2);
    assert_eq!(chest.balance_of(&GOLD, &FUNGIBLE_ITEM), Ok(U256::from(17)));
}

#[test]
fn test_round_trip_prunes_holding() {
    let chest = whitelisted_chest(ChestConfig::new(OWNER));
    let mut gateway = stocked_gateway();

    chest
        .batch_deposit(PLAYER, vec![leg(POTION, 2, 5)], &mut gateway)
        .unwrap();
    chest
        .batch_loot(OWNER, vec![leg(POTION, 2, 5)], &mut gateway)
        .unwrap();

    assert!(chest.look().unwrap().is_empty());
    assert_eq!(chest.balance_of(&POTION, &U256::from(2)), Ok(U256::ZERO));
}

#[test]
fn test_non_fungible_constraints() {
    let chest = whitelisted_chest(ChestConfig::new(OWNER));
    let mut gateway = stocked_gateway();

    let err = chest
        .batch_deposit(PLAYER, vec![leg(SWORD, 7, 2)], &mut gateway)
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::BatchValidationFailed { ref source, .. }
            if matches!(**source, LedgerError::InvalidQuantityForKind { .. })
    ));

    chest
        .batch_deposit(PLAYER, vec![leg(SWORD, 7, 1)], &mut gateway)
        .unwrap();
    let err = chest
        .batch_deposit(PLAYER, vec![leg(SWORD, 7, 1)], &mut gateway)
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::BatchValidationFailed { ref source, .. }
            if matches!(**source, LedgerError::InvalidQuantityForKind { .. })
    ));
    assert_eq!(chest.balance_of(&SWORD, &U256::from(7)), Ok(U256::from(1)));
}

#[test]
fn test_revoked_asset_stays_withdrawable() {
    let chest = whitelisted_chest(ChestConfig::new(OWNER));
    let mut gateway = stocked_gateway();
    chest
        .batch_deposit(PLAYER, scenario_deposit(), &mut gateway)
        .unwrap();

    assert_eq!(
        chest.remove_whitelist(OWNER, POTION),
        Ok(AssetKind::SemiFungible)
    );
    assert!(chest
        .batch_deposit(PLAYER, vec![leg(POTION, 2, 1)], &mut gateway)
        .is_err());

    // Cannot come back as another kind while still held
    let err = chest
        .add_whitelist(OWNER, &[(POTION, AssetKind::Fungible)])
        .unwrap_err();
    assert!(matches!(err, LedgerError::DuplicateEntry { .. }));

    let receipt = chest
        .batch_loot(OWNER, vec![leg(POTION, 2, 50)], &mut gateway)
        .unwrap();
    assert_eq!(receipt.legs[0].kind, AssetKind::SemiFungible);
}

#[test]
fn test_preview_loot_has_no_effect() {
    let chest = whitelisted_chest(ChestConfig::new(OWNER));
    let mut gateway = stocked_gateway();
    chest
        .batch_deposit(PLAYER, scenario_deposit(), &mut gateway)
        .unwrap();
    let calls = gateway.calls().len();
    let before = chest.look().unwrap();

    let preview = chest
        .preview_loot(OWNER, vec![leg(GOLD, 0, 400), leg(SWORD, 7, 1)])
        .unwrap();

    assert_eq!(preview.columns().amounts, vec![U256::from(400), U256::from(1)]);
    assert_eq!(chest.look().unwrap(), before);
    assert_eq!(gateway.calls().len(), calls);
}

#[test]
fn test_columnar_request() {
    let chest = whitelisted_chest(ChestConfig::new(OWNER));
    let mut gateway = stocked_gateway();

    let request = BatchRequest::from_columns(
        Direction::Deposit,
        &[GOLD, POTION],
        &[FUNGIBLE_ITEM, U256::from(2)],
        &[U256::from(250), U256::from(5)],
    )
    .unwrap();
    chest
        .batch_deposit(PLAYER, request.legs, &mut gateway)
        .unwrap();
    assert_eq!(chest.look().unwrap().len(), 2);

    let err = BatchRequest::from_columns(Direction::Deposit, &[GOLD], &[], &[U256::from(1)])
        .map_err(LedgerError::from)
        .unwrap_err();
    assert!(matches!(err, LedgerError::LengthMismatch(_)));
}

#[test]
fn test_batch_limit_from_config() {
    let config = ChestConfig::from_toml_str(&format!(
        "owner = \"{OWNER}\"\nmax_batch_legs = 2"
    ))
    .unwrap();
    let chest = whitelisted_chest(config);
    let mut gateway = stocked_gateway();

    let err = chest
        .batch_deposit(PLAYER, scenario_deposit(), &mut gateway)
        .unwrap_err();
    assert_eq!(err, LedgerError::BatchTooLarge { legs: 3, max: 2 });
}

#[test]
fn test_journal_reopen_restores_state() {
    let path = temp_journal_path();
    let config = ChestConfig::new(OWNER).with_journal(&path);
    let mut gateway = stocked_gateway();

    let (snapshot, whitelist) = {
        let chest = whitelisted_chest(config.clone());
        chest
            .batch_deposit(PLAYER, scenario_deposit(), &mut gateway)
            .unwrap();
        chest
            .batch_loot(OWNER, vec![leg(GOLD, 0, 400)], &mut gateway)
            .unwrap();
        chest.remove_whitelist(OWNER, POTION).unwrap();
        (chest.look().unwrap(), chest.whitelist().unwrap())
    };

    // Reopen without a checkpoint: full history replay
    {
        let chest = Chest::new(config.clone()).unwrap();
        assert_eq!(chest.look().unwrap(), snapshot);
        assert_eq!(chest.whitelist().unwrap(), whitelist);
        chest.close().unwrap();
    }

    // Reopen after a checkpoint: compacted tables
    let chest = Chest::new(config).unwrap();
    assert_eq!(chest.look().unwrap(), snapshot);
    assert_eq!(chest.whitelist().unwrap(), whitelist);
    assert_eq!(chest.kind_of(&POTION), Ok(None));

    std::fs::remove_file(&path).ok();
}

#[test]
fn test_uncommitted_journal_tail_is_ignored() {
    let path = temp_journal_path();
    let config = ChestConfig::new(OWNER).with_journal(&path);
    let mut gateway = stocked_gateway();

    let snapshot = {
        let chest = whitelisted_chest(config.clone());
        chest
            .batch_deposit(PLAYER, vec![leg(GOLD, 0, 100)], &mut gateway)
            .unwrap();
        chest.look().unwrap()
    };

    // Crash in the middle of a transaction: no COMMIT, no ROLLBACK
    {
        let (journal, _) = Journal::open(&path).unwrap();
        let mut txn = journal.begin_transaction().unwrap();
        txn.add_operation(JournalOp::Credit {
            asset: GOLD,
            item: FUNGIBLE_ITEM,
            quantity: U256::from(999),
            kind: AssetKind::Fungible,
        })
        .unwrap();
        std::mem::forget(txn);
    }

    let chest = Chest::new(config).unwrap();
    assert_eq!(chest.look().unwrap(), snapshot);

    std::fs::remove_file(&path).ok();
}

/// Tries to loot from inside a deposit.
struct GreedyGateway {
    chest: Arc<Chest>,
    inner: InMemoryGateway,
    nested: Option<Result<usize, LedgerError>>,
}

impl TransferGateway for GreedyGateway {
    fn pull_in(&mut self, transfer: &Transfer) -> Result<(), TransferFailed> {
        let mut side = InMemoryGateway::new(CUSTODY);
        self.nested = Some(
            self.chest
                .batch_loot(OWNER, vec![leg(GOLD, 0, 1)], &mut side)
                .map(|receipt| receipt.legs.len()),
        );
        self.inner.pull_in(transfer)
    }

    fn push_out(&mut self, transfer: &Transfer) -> Result<(), TransferFailed> {
        self.inner.push_out(transfer)
    }
}

#[test]
fn test_reentrant_loot_is_rejected() {
    let chest = Arc::new(whitelisted_chest(ChestConfig::new(OWNER)));
    let mut gateway = GreedyGateway {
        chest: Arc::clone(&chest),
        inner: stocked_gateway(),
        nested: None,
    };

    chest
        .batch_deposit(PLAYER, vec![leg(GOLD, 0, 100)], &mut gateway)
        .unwrap();

    assert_eq!(gateway.nested, Some(Err(LedgerError::Reentrant)));
    assert_eq!(chest.balance_of(&GOLD, &FUNGIBLE_ITEM), Ok(U256::from(100)));
}

#[test]
fn test_concurrent_depositors() {
    let chest = Arc::new(whitelisted_chest(ChestConfig::new(OWNER)));
    let num_threads: u64 = 8;
    let deposits_per_thread: u64 = 25;

    let handles: Vec<_> = (0..num_threads)
        .map(|t| {
            let chest = Arc::clone(&chest);
            thread::spawn(move || {
                let player = Address::new([0x40 + t as u8; 20]);
                let mut gateway = InMemoryGateway::new(CUSTODY);
                gateway.mint(player, GOLD, FUNGIBLE_ITEM, U256::from(1000));

                for _ in 0..deposits_per_thread {
                    chest
                        .batch_deposit(player, vec![leg(GOLD, 0, 2)], &mut gateway)
                        .unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(
        chest.balance_of(&GOLD, &FUNGIBLE_ITEM),
        Ok(U256::from(num_threads * deposits_per_thread * 2))
    );
}

#[test]
fn test_checkpoint_alongside_deposits_keeps_every_batch() {
    let path = temp_journal_path();
    let config = ChestConfig::new(OWNER).with_journal(&path);
    let chest = Arc::new(whitelisted_chest(config.clone()));
    let num_threads: u64 = 4;
    let deposits_per_thread: u64 = 100;

    let handles: Vec<_> = (0..num_threads)
        .map(|t| {
            let chest = Arc::clone(&chest);
            thread::spawn(move || {
                let player = Address::new([0x50 + t as u8; 20]);
                let mut gateway = InMemoryGateway::new(CUSTODY);
                gateway.mint(player, GOLD, FUNGIBLE_ITEM, U256::from(1000));

                for _ in 0..deposits_per_thread {
                    chest
                        .batch_deposit(player, vec![leg(GOLD, 0, 1)], &mut gateway)
                        .unwrap();
                }
            })
        })
        .collect();

    while !handles.iter().all(|handle| handle.is_finished()) {
        chest.checkpoint().unwrap();
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let expected = U256::from(num_threads * deposits_per_thread);
    assert_eq!(chest.balance_of(&GOLD, &FUNGIBLE_ITEM), Ok(expected));
    drop(chest);

    let reopened = Chest::new(config).unwrap();
    assert_eq!(reopened.balance_of(&GOLD, &FUNGIBLE_ITEM), Ok(expected));

    std::fs::remove_file(&path).ok();
}
