//! End-to-end ledger scenarios driven through the public API.
//!
//! Every test checks the accounting identity after it finishes:
//! custody = total allocated + unallocated, total = sum of allocations.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use hutledger::access::Role;
use hutledger::address::Address;
use hutledger::custody::{SharedToken, TokenCustody};
use hutledger::error::{ErrorKind, LedgerError};
use hutledger::fee::FeeConfig;
use hutledger::ledger::{LedgerEngine, LedgerEvent};
use hutledger::planner::{plan_distribution, prepare_batch, RecipientRecord};

const ADMIN: u64 = 1;
const HOLDER: u64 = 0x100;
const HUT_A: u64 = 0xa1;
const HUT_B: u64 = 0xb1;
const FEE_SINK: u64 = 0xfee;

fn a(n: u64) -> Address {
    Address::from_low_u64(n)
}

/// Ledger with default 1/18 fee routed to FEE_SINK, plus a funded admin.
fn setup(funds: u128) -> (LedgerEngine<SharedToken>, SharedToken) {
    let token = SharedToken::new();
    {
        let mut t = token.lock();
        t.mint(a(ADMIN), funds).unwrap();
        t.approve(a(ADMIN), a(HOLDER), funds);
    }
    let fee = FeeConfig::default_for(a(FEE_SINK)).unwrap();
    (LedgerEngine::new(a(ADMIN), a(HOLDER), token.clone(), fee), token)
}

fn assert_books_balance(engine: &LedgerEngine<SharedToken>) {
    engine.check_invariants().unwrap();
    let status = engine.status().unwrap();
    assert_eq!(status.custody_balance, status.total_allocated + status.unallocated);
}

#[test]
fn test_scenario_a_batch_with_fee_skim() {
    let (mut engine, _) = setup(10_000);
    engine.deposit(a(ADMIN), 10_000).unwrap();
    let receipt = engine
        .batch_allocate(a(ADMIN), &[a(HUT_A), a(HUT_B)], &[5_000, 3_000])
        .unwrap();

    assert_eq!(receipt.fee, 444);
    assert_eq!(engine.allocations(a(HUT_A)), 5_000);
    assert_eq!(engine.allocations(a(HUT_B)), 3_000);
    assert_eq!(engine.allocations(a(FEE_SINK)), 444);
    assert_eq!(engine.total_allocated(), 8_444);
    assert_eq!(engine.unallocated().unwrap(), 1_556);

    let names: Vec<&str> = engine.events().iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["Deposited", "Allocated", "Allocated", "FeeCollected"]);
    assert_books_balance(&engine);
}

#[test]
fn test_scenario_b_insufficient_unallocated_changes_nothing() {
    let (mut engine, _) = setup(1_000);
    engine.deposit(a(ADMIN), 1_000).unwrap();
    let hash = engine.state_hash();
    let events = engine.events().len();

    let err = engine.batch_allocate(a(ADMIN), &[a(HUT_A)], &[1_000]).unwrap_err();
    assert_eq!(err, LedgerError::InsufficientUnallocated { required: 1_055, available: 1_000 });
    assert_eq!(err.kind(), ErrorKind::State);
    assert_eq!(engine.state_hash(), hash);
    assert_eq!(engine.events().len(), events);
    assert_eq!(engine.total_allocated(), 0);
    assert_books_balance(&engine);
}

#[test]
fn test_scenario_c_single_allocate_then_withdraw() {
    let (mut engine, token) = setup(5_000);
    engine.deposit(a(ADMIN), 5_000).unwrap();
    engine.allocate(a(ADMIN), a(HUT_A), 5_000).unwrap();
    assert_eq!(engine.allocations(a(FEE_SINK)), 0);

    assert_eq!(engine.withdraw(a(HUT_A)).unwrap(), 5_000);
    assert_eq!(token.balance_of(a(HUT_A)), 5_000);
    assert_eq!(engine.allocations(a(HUT_A)), 0);
    assert_eq!(engine.total_allocated(), 0);
    assert_eq!(engine.withdraw(a(HUT_A)), Err(LedgerError::NothingToClaim));
    assert!(matches!(
        engine.events().last(),
        Some(LedgerEvent::Claimed { amount: 5_000, .. })
    ));
    assert_books_balance(&engine);
}

#[test]
fn test_revoked_operator_cannot_batch() {
    let (mut engine, _) = setup(10_000);
    engine.deposit(a(ADMIN), 10_000).unwrap();
    let operator = a(0x0e);
    engine.grant_role(a(ADMIN), Role::Operator, operator).unwrap();
    engine.batch_allocate(operator, &[a(HUT_A)], &[100]).unwrap();

    engine.revoke_role(a(ADMIN), Role::Operator, operator).unwrap();
    let err = engine.batch_allocate(operator, &[a(HUT_A)], &[100]).unwrap_err();
    assert_eq!(err, LedgerError::Unauthorized { account: operator, role: Role::Operator });
    assert_eq!(err.kind(), ErrorKind::Authorization);
}

#[test]
fn test_fee_config_is_config_gated() {
    let (mut engine, _) = setup(0);
    let stranger = a(0x55);
    assert_eq!(
        engine.set_fee_config(stranger, 1, 10, a(FEE_SINK)),
        Err(LedgerError::Unauthorized { account: stranger, role: Role::Config })
    );
    // Admin holds CONFIG from bootstrap.
    engine.set_fee_config(a(ADMIN), 1, 10, a(FEE_SINK)).unwrap();
    assert_eq!(engine.fee_numerator(), 1);
    assert_eq!(engine.fee_denominator(), 10);
}

#[test]
fn test_fee_cap_and_rounding_boundaries() {
    let (mut engine, _) = setup(100);
    assert_eq!(
        engine.set_fee_config(a(ADMIN), 1, 8, a(FEE_SINK)),
        Err(LedgerError::FeeTooHigh { numerator: 1, denominator: 8 })
    );
    engine.set_fee_config(a(ADMIN), 1, 10, a(FEE_SINK)).unwrap();
    assert_eq!(engine.fee_config().fee(9), Ok(0));
    assert_eq!(engine.fee_config().fee(10), Ok(1));

    engine.deposit(a(ADMIN), 100).unwrap();
    let receipt = engine.batch_allocate(a(ADMIN), &[a(HUT_A)], &[9]).unwrap();
    assert_eq!(receipt.fee, 0);
    assert!(!engine
        .events()
        .iter()
        .any(|e| matches!(e, LedgerEvent::FeeCollected { .. })));
    assert_books_balance(&engine);
}

#[test]
fn test_planned_batch_lands_on_ledger() {
    let (mut engine, _) = setup(100_000);
    engine.deposit(a(ADMIN), 100_000).unwrap();
    let records = vec![
        RecipientRecord::new(1, a(HUT_A), 850, 1.0),
        RecipientRecord::new(7, a(HUT_B), 500, 0.7),
    ];
    let plan = plan_distribution(&records, 100_000, engine.fee_config()).unwrap();
    let batch = prepare_batch(&plan, engine.fee_config(), engine.unallocated().unwrap()).unwrap();
    let receipt = engine
        .batch_allocate(a(ADMIN), &batch.recipients, &batch.amounts)
        .unwrap();

    assert_eq!(receipt.total_required, batch.total_required);
    assert_eq!(engine.allocations(a(HUT_B)), 27_632);
    // Rounding slack between the planner's split and the ledger's fee.
    assert_eq!(engine.unallocated().unwrap(), 1);
    assert_books_balance(&engine);
}

#[test]
fn test_random_operation_sequences_keep_books_balanced() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let huts: Vec<Address> = (0..5).map(|i| a(0xa0 + i)).collect();

    for _ in 0..20 {
        let (mut engine, token) = setup(1_000_000);
        for _ in 0..60 {
            let before = engine.state_hash();
            let result = match rng.gen_range(0..5) {
                0 => engine.deposit(a(ADMIN), rng.gen_range(0..5_000)).map(|_| ()),
                1 => {
                    let hut = huts[rng.gen_range(0..huts.len())];
                    engine.allocate(a(ADMIN), hut, rng.gen_range(0..2_000)).map(|_| ())
                }
                2 => {
                    let n = rng.gen_range(0..huts.len());
                    let amounts: Vec<u128> = (0..n).map(|_| rng.gen_range(0..1_500)).collect();
                    engine.batch_allocate(a(ADMIN), &huts[..n], &amounts).map(|_| ())
                }
                3 => engine.withdraw(huts[rng.gen_range(0..huts.len())]).map(|_| ()),
                _ => engine.withdraw(a(FEE_SINK)).map(|_| ()),
            };
            if result.is_err() {
                assert_eq!(engine.state_hash(), before, "failed call mutated state");
            }
            assert_books_balance(&engine);
        }
        assert_eq!(engine.custody_balance(), token.balance_of(a(HOLDER)));
    }
}
