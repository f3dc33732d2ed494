use crate::error::{LedgerError, LedgerResult};
use crate::ledger::state::LedgerState;

fn violation(msg: String) -> LedgerError {
    LedgerError::InvariantViolation(msg)
}

/// TotalAllocated equals the sum of every allocation entry.
pub fn assert_total_matches_allocations(state: &LedgerState) -> LedgerResult<()> {
    let mut sum: u128 = 0;
    for amount in state.allocations().values() {
        sum = sum
            .checked_add(*amount)
            .ok_or_else(|| violation("allocation sum overflows".to_string()))?;
    }
    if sum != state.total_allocated() {
        return Err(violation(format!(
            "total_allocated {} != sum of allocations {}",
            state.total_allocated(),
            sum
        )));
    }
    Ok(())
}

/// Custody covers every outstanding allocation, so unallocated is never
/// negative.
pub fn assert_custody_covers(custody_balance: u128, total_allocated: u128) -> LedgerResult<u128> {
    custody_balance.checked_sub(total_allocated).ok_or_else(|| {
        violation(format!(
            "custody balance {} below total allocated {}",
            custody_balance, total_allocated
        ))
    })
}

pub fn assert_ledger_invariants(state: &LedgerState, custody_balance: u128) -> LedgerResult<()> {
    assert_total_matches_allocations(state)?;
    assert_custody_covers(custody_balance, state.total_allocated())?;
    Ok(())
}
