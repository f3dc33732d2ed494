//! Usage-weighted payout planning.
//!
//! Pure: the same recipients, pool and fee policy always give the same plan.
//! The planner previews a fee by splitting the pool; the ledger later
//! recomputes the authoritative fee from the submitted sum. The two can
//! differ by a few units, which stay in the unallocated balance.

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::address::Address;
use crate::error::{LedgerError, LedgerResult};
use crate::fee::FeeConfig;
use crate::ledger::credit_requirement;
use crate::logging::{log, obj, v_amount, v_num, Domain, Level};

pub const MAX_COEFFICIENT: f64 = 2.0;

/// Catalog entry as seen by the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipientRecord {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    pub address: Address,
    pub raw_count: u64,
    pub coefficient: f64,
}

impl RecipientRecord {
    pub fn new(id: u32, address: Address, raw_count: u64, coefficient: f64) -> Self {
        Self { id, name: String::new(), address, raw_count, coefficient }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionPlanItem {
    pub recipient_id: u32,
    pub address: Address,
    pub adjusted_count: u64,
    /// adjusted_count / total_count, for display. Amounts use exact integer
    /// arithmetic instead.
    pub ratio: f64,
    #[serde(with = "crate::amount")]
    pub amount: u128,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionPlan {
    pub items: Vec<DistributionPlanItem>,
    #[serde(with = "crate::amount")]
    pub pool: u128,
    #[serde(with = "crate::amount")]
    pub huts_pool: u128,
    /// Preview only; `pool - huts_pool`.
    #[serde(with = "crate::amount")]
    pub fee_preview: u128,
    pub total_count: u64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    #[error("no usage data: total adjusted count is 0 or pool is empty")]
    NoUsageData,
    #[error("recipient {id} has coefficient {coefficient} outside [0, 2.0]")]
    InvalidCoefficient { id: u32, coefficient: f64 },
    #[error("arithmetic overflow while planning")]
    ArithmeticOverflow,
}

pub fn validate_coefficient(id: u32, coefficient: f64) -> Result<(), PlanError> {
    if coefficient.is_finite() && (0.0..=MAX_COEFFICIENT).contains(&coefficient) {
        Ok(())
    } else {
        Err(PlanError::InvalidCoefficient { id, coefficient })
    }
}

/// `floor(raw_count * coefficient)`.
pub fn adjusted_count(record: &RecipientRecord) -> Result<u64, PlanError> {
    validate_coefficient(record.id, record.coefficient)?;
    Ok((record.raw_count as f64 * record.coefficient).floor() as u64)
}

/// Splits `pool` so that `huts_pool + fee == pool` exactly:
/// `huts_pool = floor(pool * den / (den + num))`, fee is the remainder.
pub fn split_pool(pool: u128, fee: &FeeConfig) -> Result<(u128, u128), PlanError> {
    let parts = fee
        .denominator()
        .checked_add(fee.numerator())
        .ok_or(PlanError::ArithmeticOverflow)?;
    let huts_pool = pool
        .checked_mul(fee.denominator())
        .ok_or(PlanError::ArithmeticOverflow)?
        / parts;
    Ok((huts_pool, pool - huts_pool))
}

/// Proportional split of the huts' share of `pool`.
///
/// Each recipient gets `floor(huts_pool * adjusted / total)`; whatever the
/// flooring leaves over goes entirely to the last recipient in input order.
pub fn plan_distribution(
    records: &[RecipientRecord],
    pool: u128,
    fee: &FeeConfig,
) -> Result<DistributionPlan, PlanError> {
    let adjusted: Vec<u64> = records.iter().map(adjusted_count).collect::<Result<_, _>>()?;
    let mut total_count: u64 = 0;
    for count in &adjusted {
        total_count = total_count.checked_add(*count).ok_or(PlanError::ArithmeticOverflow)?;
    }
    if total_count == 0 || pool == 0 {
        return Err(PlanError::NoUsageData);
    }

    let (huts_pool, fee_preview) = split_pool(pool, fee)?;

    let mut items = Vec::with_capacity(records.len());
    let mut planned: u128 = 0;
    for (record, count) in records.iter().zip(adjusted) {
        let amount = huts_pool
            .checked_mul(count as u128)
            .ok_or(PlanError::ArithmeticOverflow)?
            / total_count as u128;
        planned += amount;
        items.push(DistributionPlanItem {
            recipient_id: record.id,
            address: record.address,
            adjusted_count: count,
            ratio: count as f64 / total_count as f64,
            amount,
        });
    }

    let remainder = huts_pool - planned;
    if let Some(last) = items.last_mut() {
        last.amount += remainder;
    }

    log(
        Level::Info,
        Domain::Planner,
        "plan_computed",
        obj(&[
            ("recipients", json!(items.len())),
            ("total_count", json!(total_count)),
            ("pool", v_amount(pool)),
            ("huts_pool", v_amount(huts_pool)),
            ("fee_preview", v_amount(fee_preview)),
            ("remainder", v_amount(remainder)),
        ]),
    );
    for item in &items {
        log(
            Level::Debug,
            Domain::Planner,
            "plan_item",
            obj(&[
                ("recipient_id", json!(item.recipient_id)),
                ("adjusted_count", json!(item.adjusted_count)),
                ("ratio", v_num(item.ratio)),
                ("amount", v_amount(item.amount)),
            ]),
        );
    }

    Ok(DistributionPlan { items, pool, huts_pool, fee_preview, total_count })
}

impl DistributionPlan {
    pub fn planned_total(&self) -> u128 {
        self.items.iter().map(|i| i.amount).sum()
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            recipients: self.items.len(),
            total_count: self.total_count,
            huts_pool: self.huts_pool,
            fee_preview: self.fee_preview,
            planned_total: self.planned_total(),
        }
    }
}

/// Headline numbers for the operator's review screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    pub recipients: usize,
    pub total_count: u64,
    #[serde(with = "crate::amount")]
    pub huts_pool: u128,
    #[serde(with = "crate::amount")]
    pub fee_preview: u128,
    #[serde(with = "crate::amount")]
    pub planned_total: u128,
}

/// What the operator actually submits to `batch_allocate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchRequest {
    pub recipients: Vec<Address>,
    #[serde(serialize_with = "serialize_amounts")]
    pub amounts: Vec<u128>,
    #[serde(with = "crate::amount")]
    pub hut_total: u128,
    #[serde(with = "crate::amount")]
    pub fee: u128,
    #[serde(with = "crate::amount")]
    pub total_required: u128,
}

fn serialize_amounts<S: serde::Serializer>(amounts: &[u128], s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(amounts.iter().map(|a| a.to_string()))
}

/// Drops zero-amount items, recomputes the ledger's fee from the submitted
/// sum and refuses a batch the ledger would refuse.
pub fn prepare_batch(
    plan: &DistributionPlan,
    fee: &FeeConfig,
    unallocated: u128,
) -> LedgerResult<BatchRequest> {
    let (recipients, amounts): (Vec<Address>, Vec<u128>) = plan
        .items
        .iter()
        .filter(|item| item.amount > 0)
        .map(|item| (item.address, item.amount))
        .unzip();
    let receipt = credit_requirement(fee, &amounts)?;
    if receipt.total_required > unallocated {
        return Err(LedgerError::InsufficientUnallocated {
            required: receipt.total_required,
            available: unallocated,
        });
    }
    Ok(BatchRequest {
        recipients,
        amounts,
        hut_total: receipt.hut_total,
        fee: receipt.fee,
        total_required: receipt.total_required,
    })
}
