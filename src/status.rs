use serde::Serialize;

use crate::address::Address;

/// Ledger readings surfaced to the status endpoint and dashboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerStatus {
    #[serde(with = "crate::amount")]
    pub custody_balance: u128,
    #[serde(with = "crate::amount")]
    pub total_allocated: u128,
    #[serde(with = "crate::amount")]
    pub unallocated: u128,
    #[serde(with = "crate::amount")]
    pub fee_numerator: u128,
    #[serde(with = "crate::amount")]
    pub fee_denominator: u128,
    pub fee_recipient: Address,
    #[serde(with = "crate::amount")]
    pub fee_allocation: u128,
}

impl LedgerStatus {
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}
