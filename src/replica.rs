//! Demo/test mirror of ledger state. NOT authoritative.
//!
//! Viewers share one snapshot slot in SQLite. Each action reads the slot,
//! applies the same arithmetic the ledger uses, writes the slot back and
//! broadcasts a notice so the other viewers refresh. Concurrent actions are
//! not serialized: the last write wins. Nothing here touches custody or the
//! real [`crate::ledger::LedgerEngine`].

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use crate::error::LedgerError;
use crate::fee::FeeConfig;
use crate::ledger::credit_requirement;
use crate::logging::{log, obj, ts_epoch_secs, v_amount, v_str, Domain, Level};
use crate::storage::StateStore;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaSnapshot {
    #[serde(with = "crate::amount")]
    pub custody_balance: u128,
    #[serde(with = "crate::amount")]
    pub total_allocated: u128,
    #[serde(with = "crate::amount")]
    pub unallocated_balance: u128,
    #[serde(with = "crate::amount::map")]
    pub recipient_allocations: BTreeMap<u32, u128>,
    #[serde(with = "crate::amount")]
    pub fee_allocation: u128,
    pub logs: Vec<String>,
}

impl ReplicaSnapshot {
    pub fn recipient_allocation(&self, id: u32) -> u128 {
        self.recipient_allocations.get(&id).copied().unwrap_or(0)
    }

    fn note(&mut self, line: String) {
        self.logs.push(format!("[{}] {}", Utc::now().format("%H:%M:%S"), line));
    }

    pub fn deposit(&mut self, amount: u128) -> Result<(), LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let custody = self.custody_balance.checked_add(amount).ok_or(LedgerError::ArithmeticOverflow)?;
        let unallocated = self
            .unallocated_balance
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        self.custody_balance = custody;
        self.unallocated_balance = unallocated;
        self.note(format!("deposit: {}", amount));
        Ok(())
    }

    /// Batch credit with the ledger's fee rule.
    pub fn allocate(&mut self, distribution: &[(u32, u128)], fee: &FeeConfig) -> Result<u128, LedgerError> {
        let amounts: Vec<u128> = distribution.iter().map(|(_, amount)| *amount).collect();
        let receipt = credit_requirement(fee, &amounts)?;
        if receipt.total_required > self.unallocated_balance {
            return Err(LedgerError::InsufficientUnallocated {
                required: receipt.total_required,
                available: self.unallocated_balance,
            });
        }
        let mut next = self.recipient_allocations.clone();
        for (id, amount) in distribution {
            let entry = next.entry(*id).or_insert(0);
            *entry = entry.checked_add(*amount).ok_or(LedgerError::ArithmeticOverflow)?;
        }
        let fee_allocation = self
            .fee_allocation
            .checked_add(receipt.fee)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        let total = self
            .total_allocated
            .checked_add(receipt.total_required)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        self.recipient_allocations = next;
        self.fee_allocation = fee_allocation;
        self.total_allocated = total;
        self.unallocated_balance -= receipt.total_required;
        self.note(format!(
            "allocation approved: {} (fee {})",
            receipt.total_required, receipt.fee
        ));
        Ok(receipt.total_required)
    }

    /// Zeroes the recipient's entry before paying it out of the mirror.
    pub fn withdraw_recipient(&mut self, id: u32) -> Result<u128, LedgerError> {
        let amount = self.recipient_allocation(id);
        if amount == 0 {
            return Err(LedgerError::NothingToClaim);
        }
        self.recipient_allocations.insert(id, 0);
        self.pay_out(amount)?;
        self.note(format!("withdraw (hut {}): {}", id, amount));
        Ok(amount)
    }

    pub fn withdraw_fee(&mut self) -> Result<u128, LedgerError> {
        let amount = self.fee_allocation;
        if amount == 0 {
            return Err(LedgerError::NothingToClaim);
        }
        self.fee_allocation = 0;
        self.pay_out(amount)?;
        self.note(format!("withdraw (operations): {}", amount));
        Ok(amount)
    }

    fn pay_out(&mut self, amount: u128) -> Result<(), LedgerError> {
        let (Some(custody), Some(total)) = (
            self.custody_balance.checked_sub(amount),
            self.total_allocated.checked_sub(amount),
        ) else {
            return Err(LedgerError::InvariantViolation(
                "mirror allocation exceeds custody".to_string(),
            ));
        };
        self.custody_balance = custody;
        self.total_allocated = total;
        Ok(())
    }

    pub fn reset(&mut self) {
        *self = ReplicaSnapshot::default();
        self.note("data reset".to_string());
    }
}

/// Change notice published after every write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaNotice {
    pub key: String,
    pub version: i64,
}

/// Shared pieces every viewer of one mirror needs.
#[derive(Debug, Clone)]
pub struct ReplicaHub {
    db_path: String,
    key: String,
    tx: broadcast::Sender<ReplicaNotice>,
}

impl ReplicaHub {
    pub fn new(db_path: &str, key: &str, capacity: usize) -> Result<Self> {
        let mut store = StateStore::new(db_path)?;
        store.init()?;
        let (tx, _) = broadcast::channel(capacity.max(1));
        Ok(Self { db_path: db_path.to_string(), key: key.to_string(), tx })
    }

    /// A new viewer with its own store connection and notice subscription.
    pub fn viewer(&self, name: &str) -> Result<ReplicaViewer> {
        let store = StateStore::new(&self.db_path)?;
        let mut viewer = ReplicaViewer {
            name: name.to_string(),
            key: self.key.clone(),
            store,
            tx: self.tx.clone(),
            rx: self.tx.subscribe(),
            current: ReplicaSnapshot::default(),
            version: 0,
        };
        viewer.refresh()?;
        Ok(viewer)
    }
}

pub struct ReplicaViewer {
    name: String,
    key: String,
    store: StateStore,
    tx: broadcast::Sender<ReplicaNotice>,
    rx: broadcast::Receiver<ReplicaNotice>,
    current: ReplicaSnapshot,
    version: i64,
}

impl ReplicaViewer {
    pub fn snapshot(&self) -> &ReplicaSnapshot {
        &self.current
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    fn read_slot(&self) -> Result<(ReplicaSnapshot, i64)> {
        let Some(slot) = self.store.load_slot(&self.key)? else {
            return Ok((ReplicaSnapshot::default(), 0));
        };
        match serde_json::from_str(&slot.body) {
            Ok(snapshot) => Ok((snapshot, slot.version)),
            Err(err) => {
                log(
                    Level::Warn,
                    Domain::Replica,
                    "snapshot_corrupt",
                    obj(&[("key", v_str(&self.key)), ("msg", v_str(&err.to_string()))]),
                );
                Ok((ReplicaSnapshot::default(), slot.version))
            }
        }
    }

    /// Reloads the shared slot into this viewer.
    pub fn refresh(&mut self) -> Result<&ReplicaSnapshot> {
        let (snapshot, version) = self.read_slot()?;
        self.current = snapshot;
        self.version = version;
        Ok(&self.current)
    }

    /// Drains pending notices; refreshes once if any arrived.
    pub fn poll_notices(&mut self) -> Result<bool> {
        let mut seen = false;
        loop {
            match self.rx.try_recv() {
                Ok(notice) if notice.key == self.key => seen = true,
                Ok(_) => {}
                Err(TryRecvError::Lagged(_)) => seen = true,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        if seen {
            self.refresh()?;
        }
        Ok(seen)
    }

    /// Waits for the next notice for this mirror, then refreshes.
    pub async fn changed(&mut self) -> Result<Option<ReplicaNotice>> {
        loop {
            match self.rx.recv().await {
                Ok(notice) if notice.key == self.key => {
                    self.refresh()?;
                    return Ok(Some(notice));
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(_)) => {
                    self.refresh()?;
                    return Ok(None);
                }
                Err(RecvError::Closed) => return Ok(None),
            }
        }
    }

    /// Read-modify-write of the shared slot.
    fn mutate<T>(
        &mut self,
        action: &str,
        apply: impl FnOnce(&mut ReplicaSnapshot) -> Result<T, LedgerError>,
    ) -> Result<T> {
        let (mut snapshot, _) = self.read_slot()?;
        let out = match apply(&mut snapshot) {
            Ok(out) => out,
            Err(err) => {
                log(
                    Level::Warn,
                    Domain::Replica,
                    "rejected",
                    obj(&[
                        ("op", v_str(action)),
                        ("viewer", v_str(&self.name)),
                        ("error", v_str(err.code())),
                        ("msg", v_str(&err.to_string())),
                    ]),
                );
                return Err(err.into());
            }
        };
        let body = serde_json::to_string(&snapshot)?;
        let version = self.store.store_slot(&self.key, &body, ts_epoch_secs())?;
        log(
            Level::Info,
            Domain::Replica,
            action,
            obj(&[
                ("viewer", v_str(&self.name)),
                ("version", json!(version)),
                ("total_allocated", v_amount(snapshot.total_allocated)),
                ("unallocated", v_amount(snapshot.unallocated_balance)),
            ]),
        );
        self.current = snapshot;
        self.version = version;
        // No subscribers is fine; nobody needs to refresh.
        let _ = self.tx.send(ReplicaNotice { key: self.key.clone(), version });
        Ok(out)
    }

    pub fn deposit(&mut self, amount: u128) -> Result<()> {
        self.mutate("deposit", |s| s.deposit(amount))
    }

    pub fn allocate(&mut self, distribution: &[(u32, u128)], fee: &FeeConfig) -> Result<u128> {
        self.mutate("allocate", |s| s.allocate(distribution, fee))
    }

    pub fn withdraw_recipient(&mut self, id: u32) -> Result<u128> {
        self.mutate("withdraw_recipient", |s| s.withdraw_recipient(id))
    }

    pub fn withdraw_fee(&mut self) -> Result<u128> {
        self.mutate("withdraw_fee", |s| s.withdraw_fee())
    }

    pub fn reset(&mut self) -> Result<()> {
        self.mutate("reset", |s| {
            s.reset();
            Ok(())
        })
    }
}
