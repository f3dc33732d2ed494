use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::access::Role;
use crate::address::Address;
use crate::logging::{log, obj, v_amount, v_str, Domain, Level};

/// Change notifications produced by committed ledger calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum LedgerEvent {
    Deposited {
        from: Address,
        #[serde(with = "crate::amount")]
        amount: u128,
        ts: u64,
    },
    Allocated {
        recipient: Address,
        #[serde(with = "crate::amount")]
        amount: u128,
        ts: u64,
    },
    FeeCollected {
        recipient: Address,
        #[serde(with = "crate::amount")]
        amount: u128,
        ts: u64,
    },
    Claimed {
        recipient: Address,
        #[serde(with = "crate::amount")]
        amount: u128,
        ts: u64,
    },
    FeeConfigUpdated {
        #[serde(with = "crate::amount")]
        numerator: u128,
        #[serde(with = "crate::amount")]
        denominator: u128,
        recipient: Address,
    },
    RoleGranted {
        role: Role,
        account: Address,
        sender: Address,
    },
    RoleRevoked {
        role: Role,
        account: Address,
        sender: Address,
    },
}

impl LedgerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::Deposited { .. } => "Deposited",
            LedgerEvent::Allocated { .. } => "Allocated",
            LedgerEvent::FeeCollected { .. } => "FeeCollected",
            LedgerEvent::Claimed { .. } => "Claimed",
            LedgerEvent::FeeConfigUpdated { .. } => "FeeConfigUpdated",
            LedgerEvent::RoleGranted { .. } => "RoleGranted",
            LedgerEvent::RoleRevoked { .. } => "RoleRevoked",
        }
    }

    fn domain(&self) -> Domain {
        match self {
            LedgerEvent::FeeConfigUpdated { .. } => Domain::Fee,
            LedgerEvent::RoleGranted { .. } | LedgerEvent::RoleRevoked { .. } => Domain::Access,
            _ => Domain::Ledger,
        }
    }
}

pub fn log_event(seq: u64, event: &LedgerEvent) {
    let mut fields = match event {
        LedgerEvent::Deposited { from, amount, ts } => obj(&[
            ("account", v_str(&from.to_string())),
            ("amount", v_amount(*amount)),
            ("event_ts", json!(ts)),
        ]),
        LedgerEvent::Allocated { recipient, amount, ts }
        | LedgerEvent::FeeCollected { recipient, amount, ts }
        | LedgerEvent::Claimed { recipient, amount, ts } => obj(&[
            ("recipient", v_str(&recipient.to_string())),
            ("amount", v_amount(*amount)),
            ("event_ts", json!(ts)),
        ]),
        LedgerEvent::FeeConfigUpdated { numerator, denominator, recipient } => obj(&[
            ("recipient", v_str(&recipient.to_string())),
            ("numerator", v_amount(*numerator)),
            ("denominator", v_amount(*denominator)),
        ]),
        LedgerEvent::RoleGranted { role, account, sender }
        | LedgerEvent::RoleRevoked { role, account, sender } => obj(&[
            ("account", v_str(&account.to_string())),
            ("role", v_str(role.as_str())),
            ("sender", v_str(&sender.to_string())),
        ]),
    };
    fields.insert("ledger_seq".to_string(), json!(seq));
    log(Level::Info, event.domain(), event.name(), fields);
}
