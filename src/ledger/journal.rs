use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::fee::FeeConfig;
use crate::ledger::events::LedgerEvent;
use crate::logging::digest_hex;

/// Append-only JSON-lines log of committed ledger notifications.
#[derive(Debug)]
pub struct Journal {
    file: File,
    path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Commit sequence the event belongs to.
    pub seq: u64,
    #[serde(flatten)]
    pub event: LedgerEvent,
}

/// Allocation state rebuilt from a journal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveredLedger {
    pub allocations: BTreeMap<Address, u128>,
    pub total_allocated: u128,
    pub fee_config: Option<FeeConfig>,
    pub last_seq: u64,
    pub deposited: u128,
    pub claimed: u128,
    pub skipped_lines: usize,
}

impl RecoveredLedger {
    fn credit(&mut self, account: Address, amount: u128) {
        let entry = self.allocations.entry(account).or_insert(0);
        *entry = entry.saturating_add(amount);
        self.total_allocated = self.total_allocated.saturating_add(amount);
    }

    fn apply(&mut self, entry: JournalEntry) {
        self.last_seq = self.last_seq.max(entry.seq);
        match entry.event {
            LedgerEvent::Deposited { amount, .. } => {
                self.deposited = self.deposited.saturating_add(amount);
            }
            LedgerEvent::Allocated { recipient, amount, .. }
            | LedgerEvent::FeeCollected { recipient, amount, .. } => self.credit(recipient, amount),
            LedgerEvent::Claimed { recipient, amount, .. } => {
                let held = self.allocations.insert(recipient, 0).unwrap_or(0);
                self.total_allocated = self.total_allocated.saturating_sub(held);
                self.claimed = self.claimed.saturating_add(amount);
            }
            LedgerEvent::FeeConfigUpdated { numerator, denominator, recipient } => {
                if let Ok(cfg) = FeeConfig::new(numerator, denominator, recipient) {
                    self.fee_config = Some(cfg);
                }
            }
            LedgerEvent::RoleGranted { .. } | LedgerEvent::RoleRevoked { .. } => {}
        }
    }

    /// Deterministic digest of the recovered allocations.
    pub fn hash(&self) -> String {
        let mut canonical = String::new();
        for (account, amount) in &self.allocations {
            canonical.push_str(&format!("{}={};", account, amount));
        }
        canonical.push_str(&format!("total={};seq={}", self.total_allocated, self.last_seq));
        if let Some(fee) = &self.fee_config {
            canonical.push_str(&format!(
                ";fee={}/{}->{}",
                fee.numerator(),
                fee.denominator(),
                fee.recipient()
            ));
        }
        digest_hex(canonical.as_bytes())
    }
}

impl Journal {
    pub fn open(path: &str) -> std::io::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file, path: path.to_string() })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn append_entry(&mut self, entry: &JournalEntry) -> std::io::Result<()> {
        let line = serde_json::to_string(entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        self.file.write_all(line.as_bytes())?;
        self.file.write_all(b"\n")?;
        self.file.flush()
    }

    pub fn append_events(&mut self, seq: u64, events: &[LedgerEvent]) -> std::io::Result<()> {
        for event in events {
            self.append_entry(&JournalEntry { seq, event: event.clone() })?;
        }
        Ok(())
    }

    /// Read all lines from the journal file
    pub fn replay(path: &str) -> std::io::Result<Vec<String>> {
        if !Path::new(path).exists() {
            return Ok(vec![]);
        }
        let file = OpenOptions::new().read(true).open(path)?;
        let reader = BufReader::new(file);
        Ok(reader.lines().map_while(Result::ok).collect())
    }

    /// Rebuild allocations. Lines that do not parse are counted and skipped.
    pub fn recover(path: &str) -> std::io::Result<RecoveredLedger> {
        let mut state = RecoveredLedger::default();
        for line in Self::replay(path)? {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JournalEntry>(&line) {
                Ok(entry) => state.apply(entry),
                Err(_) => state.skipped_lines += 1,
            }
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    #[test]
    fn test_recover_rebuilds_allocations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.wal");
        let path = path.to_str().unwrap();
        {
            let mut j = Journal::open(path).unwrap();
            j.append_events(1, &[LedgerEvent::Deposited { from: a(1), amount: 10_000, ts: 1 }])
                .unwrap();
            j.append_events(
                2,
                &[
                    LedgerEvent::Allocated { recipient: a(5), amount: 5000, ts: 2 },
                    LedgerEvent::Allocated { recipient: a(6), amount: 3000, ts: 2 },
                    LedgerEvent::FeeCollected { recipient: a(1), amount: 444, ts: 2 },
                ],
            )
            .unwrap();
            j.append_events(3, &[LedgerEvent::Claimed { recipient: a(5), amount: 5000, ts: 3 }])
                .unwrap();
        }

        let state = Journal::recover(path).unwrap();
        assert_eq!(state.allocations.get(&a(5)), Some(&0));
        assert_eq!(state.allocations.get(&a(6)), Some(&3000));
        assert_eq!(state.allocations.get(&a(1)), Some(&444));
        assert_eq!(state.total_allocated, 3444);
        assert_eq!(state.deposited, 10_000);
        assert_eq!(state.claimed, 5000);
        assert_eq!(state.last_seq, 3);
    }

    #[test]
    fn test_recover_skips_garbage_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.wal");
        let path = path.to_str().unwrap();
        {
            let mut j = Journal::open(path).unwrap();
            j.append_events(1, &[LedgerEvent::Allocated { recipient: a(5), amount: 7, ts: 1 }])
                .unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(path).unwrap();
            writeln!(f, "{{not json").unwrap();
            writeln!(f, "{{\"seq\":2,\"event\":\"Unknown\"}}").unwrap();
        }
        let state = Journal::recover(path).unwrap();
        assert_eq!(state.skipped_lines, 2);
        assert_eq!(state.total_allocated, 7);
    }

    #[test]
    fn test_fee_config_replay_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.wal");
        let path = path.to_str().unwrap();
        {
            let mut j = Journal::open(path).unwrap();
            j.append_events(
                1,
                &[LedgerEvent::FeeConfigUpdated { numerator: 1, denominator: 20, recipient: a(2) }],
            )
            .unwrap();
            j.append_events(
                2,
                &[LedgerEvent::FeeConfigUpdated { numerator: 1, denominator: 0, recipient: a(2) }],
            )
            .unwrap();
        }
        let state = Journal::recover(path).unwrap();
        let fee = state.fee_config.unwrap();
        assert_eq!((fee.numerator(), fee.denominator()), (1, 20));
    }

    #[test]
    fn test_recovery_hash_determinism() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.wal");
        let path = path.to_str().unwrap();
        {
            let mut j = Journal::open(path).unwrap();
            j.append_events(1, &[LedgerEvent::Allocated { recipient: a(5), amount: 9, ts: 1 }])
                .unwrap();
        }
        let s1 = Journal::recover(path).unwrap();
        let s2 = Journal::recover(path).unwrap();
        assert_eq!(s1.hash(), s2.hash());
    }

    #[test]
    fn test_missing_file_recovers_empty() {
        let state = Journal::recover("/nonexistent/dir/ledger.wal").unwrap();
        assert_eq!(state, RecoveredLedger::default());
    }
}
