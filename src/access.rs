//! Capability roles and the single authorization guard.
//!
//! Every gated ledger entry point calls [`RoleRegistry::require`] first, with
//! the capability it needs. There are no other role checks.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::error::{LedgerError, LedgerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    Operator,
    Config,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Operator, Role::Config];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Operator => "OPERATOR",
            Role::Config => "CONFIG",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleRegistry {
    grants: BTreeSet<(Address, Role)>,
}

impl RoleRegistry {
    /// Registry whose initializing account holds every capability.
    pub fn bootstrap(admin: Address) -> Self {
        let mut grants = BTreeSet::new();
        for role in Role::ALL {
            grants.insert((admin, role));
        }
        Self { grants }
    }

    pub fn has_role(&self, role: Role, account: Address) -> bool {
        self.grants.contains(&(account, role))
    }

    /// Guard invoked at the entry of every gated operation.
    pub fn require(&self, role: Role, account: Address) -> LedgerResult<()> {
        if self.has_role(role, account) {
            Ok(())
        } else {
            Err(LedgerError::Unauthorized { account, role })
        }
    }

    /// ADMIN-only. Returns whether the registry changed.
    pub fn grant_role(&mut self, caller: Address, role: Role, account: Address) -> LedgerResult<bool> {
        self.require(Role::Admin, caller)?;
        Ok(self.grants.insert((account, role)))
    }

    /// ADMIN-only. An admin may revoke its own ADMIN capability.
    pub fn revoke_role(&mut self, caller: Address, role: Role, account: Address) -> LedgerResult<bool> {
        self.require(Role::Admin, caller)?;
        Ok(self.grants.remove(&(account, role)))
    }

    /// Any account may drop a capability it holds.
    pub fn renounce_role(&mut self, caller: Address, role: Role) -> bool {
        self.grants.remove(&(caller, role))
    }

    pub fn members(&self, role: Role) -> Vec<Address> {
        self.grants
            .iter()
            .filter(|(_, r)| *r == role)
            .map(|(a, _)| *a)
            .collect()
    }
}
