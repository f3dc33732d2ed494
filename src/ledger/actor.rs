//! Single-writer boundary around [`LedgerEngine`].
//!
//! One tokio task owns the engine. Callers send commands over a bounded
//! channel and await the reply, so every call, read or write, runs to
//! completion before the next one starts.

use anyhow::{anyhow, Result};
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::access::Role;
use crate::address::Address;
use crate::custody::TokenCustody;
use crate::error::LedgerResult;
use crate::ledger::engine::{BatchReceipt, LedgerEngine};
use crate::ledger::journal::Journal;
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::status::LedgerStatus;

type Reply<T> = oneshot::Sender<LedgerResult<T>>;

#[derive(Debug)]
pub enum LedgerCommand {
    Deposit { caller: Address, amount: u128, reply: Reply<()> },
    Allocate { caller: Address, recipient: Address, amount: u128, reply: Reply<()> },
    BatchAllocate {
        caller: Address,
        recipients: Vec<Address>,
        amounts: Vec<u128>,
        reply: Reply<BatchReceipt>,
    },
    Withdraw { caller: Address, reply: Reply<u128> },
    SetFeeConfig {
        caller: Address,
        numerator: u128,
        denominator: u128,
        recipient: Address,
        reply: Reply<()>,
    },
    GrantRole { caller: Address, role: Role, account: Address, reply: Reply<()> },
    RevokeRole { caller: Address, role: Role, account: Address, reply: Reply<()> },
    RenounceRole { caller: Address, role: Role, reply: oneshot::Sender<()> },
    Allocation { account: Address, reply: oneshot::Sender<u128> },
    TotalAllocated { reply: oneshot::Sender<u128> },
    HasRole { role: Role, account: Address, reply: oneshot::Sender<bool> },
    Status { reply: Reply<LedgerStatus> },
    StateHash { reply: oneshot::Sender<String> },
}

#[derive(Debug, Clone)]
pub struct LedgerHandle {
    tx: mpsc::Sender<LedgerCommand>,
}

/// Moves `engine` onto its own task. The task ends when every handle is
/// dropped and returns the engine.
pub fn spawn<C>(
    engine: LedgerEngine<C>,
    capacity: usize,
    journal: Option<Journal>,
) -> (LedgerHandle, JoinHandle<LedgerEngine<C>>)
where
    C: TokenCustody + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let task = tokio::spawn(run(engine, rx, journal));
    (LedgerHandle { tx }, task)
}

async fn run<C: TokenCustody>(
    mut engine: LedgerEngine<C>,
    mut rx: mpsc::Receiver<LedgerCommand>,
    mut journal: Option<Journal>,
) -> LedgerEngine<C> {
    while let Some(cmd) = rx.recv().await {
        let seen = engine.events().len();
        dispatch(&mut engine, cmd);
        if let Some(j) = journal.as_mut() {
            let fresh = &engine.events()[seen..];
            if !fresh.is_empty() {
                if let Err(err) = j.append_events(engine.state().seq(), fresh) {
                    log(
                        Level::Error,
                        Domain::System,
                        "journal_write_failed",
                        obj(&[("path", v_str(j.path())), ("msg", v_str(&err.to_string()))]),
                    );
                }
            }
        }
    }
    log(
        Level::Info,
        Domain::System,
        "ledger_actor_stopped",
        obj(&[("ledger_seq", json!(engine.state().seq()))]),
    );
    engine
}

// A dropped reply receiver means the caller gave up; the command has already
// been applied either way.
fn dispatch<C: TokenCustody>(engine: &mut LedgerEngine<C>, cmd: LedgerCommand) {
    match cmd {
        LedgerCommand::Deposit { caller, amount, reply } => {
            let _ = reply.send(engine.deposit(caller, amount));
        }
        LedgerCommand::Allocate { caller, recipient, amount, reply } => {
            let _ = reply.send(engine.allocate(caller, recipient, amount));
        }
        LedgerCommand::BatchAllocate { caller, recipients, amounts, reply } => {
            let _ = reply.send(engine.batch_allocate(caller, &recipients, &amounts));
        }
        LedgerCommand::Withdraw { caller, reply } => {
            let _ = reply.send(engine.withdraw(caller));
        }
        LedgerCommand::SetFeeConfig { caller, numerator, denominator, recipient, reply } => {
            let _ = reply.send(engine.set_fee_config(caller, numerator, denominator, recipient));
        }
        LedgerCommand::GrantRole { caller, role, account, reply } => {
            let _ = reply.send(engine.grant_role(caller, role, account));
        }
        LedgerCommand::RevokeRole { caller, role, account, reply } => {
            let _ = reply.send(engine.revoke_role(caller, role, account));
        }
        LedgerCommand::RenounceRole { caller, role, reply } => {
            engine.renounce_role(caller, role);
            let _ = reply.send(());
        }
        LedgerCommand::Allocation { account, reply } => {
            let _ = reply.send(engine.allocations(account));
        }
        LedgerCommand::TotalAllocated { reply } => {
            let _ = reply.send(engine.total_allocated());
        }
        LedgerCommand::HasRole { role, account, reply } => {
            let _ = reply.send(engine.has_role(role, account));
        }
        LedgerCommand::Status { reply } => {
            let _ = reply.send(engine.status());
        }
        LedgerCommand::StateHash { reply } => {
            let _ = reply.send(engine.state_hash());
        }
    }
}

impl LedgerHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> LedgerCommand,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| anyhow!("ledger actor stopped"))?;
        rx.await.map_err(|_| anyhow!("ledger actor dropped reply"))
    }

    pub async fn deposit(&self, caller: Address, amount: u128) -> Result<LedgerResult<()>> {
        self.request(|reply| LedgerCommand::Deposit { caller, amount, reply }).await
    }

    pub async fn allocate(
        &self,
        caller: Address,
        recipient: Address,
        amount: u128,
    ) -> Result<LedgerResult<()>> {
        self.request(|reply| LedgerCommand::Allocate { caller, recipient, amount, reply }).await
    }

    pub async fn batch_allocate(
        &self,
        caller: Address,
        recipients: Vec<Address>,
        amounts: Vec<u128>,
    ) -> Result<LedgerResult<BatchReceipt>> {
        self.request(|reply| LedgerCommand::BatchAllocate { caller, recipients, amounts, reply })
            .await
    }

    pub async fn withdraw(&self, caller: Address) -> Result<LedgerResult<u128>> {
        self.request(|reply| LedgerCommand::Withdraw { caller, reply }).await
    }

    pub async fn set_fee_config(
        &self,
        caller: Address,
        numerator: u128,
        denominator: u128,
        recipient: Address,
    ) -> Result<LedgerResult<()>> {
        self.request(|reply| LedgerCommand::SetFeeConfig {
            caller,
            numerator,
            denominator,
            recipient,
            reply,
        })
        .await
    }

    pub async fn grant_role(
        &self,
        caller: Address,
        role: Role,
        account: Address,
    ) -> Result<LedgerResult<()>> {
        self.request(|reply| LedgerCommand::GrantRole { caller, role, account, reply }).await
    }

    pub async fn revoke_role(
        &self,
        caller: Address,
        role: Role,
        account: Address,
    ) -> Result<LedgerResult<()>> {
        self.request(|reply| LedgerCommand::RevokeRole { caller, role, account, reply }).await
    }

    pub async fn renounce_role(&self, caller: Address, role: Role) -> Result<()> {
        self.request(|reply| LedgerCommand::RenounceRole { caller, role, reply }).await
    }

    pub async fn allocations(&self, account: Address) -> Result<u128> {
        self.request(|reply| LedgerCommand::Allocation { account, reply }).await
    }

    pub async fn total_allocated(&self) -> Result<u128> {
        self.request(|reply| LedgerCommand::TotalAllocated { reply }).await
    }

    pub async fn has_role(&self, role: Role, account: Address) -> Result<bool> {
        self.request(|reply| LedgerCommand::HasRole { role, account, reply }).await
    }

    pub async fn status(&self) -> Result<LedgerResult<LedgerStatus>> {
        self.request(|reply| LedgerCommand::Status { reply }).await
    }

    pub async fn state_hash(&self) -> Result<String> {
        self.request(|reply| LedgerCommand::StateHash { reply }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custody::SharedToken;
    use crate::error::LedgerError;

    fn a(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    #[tokio::test]
    async fn test_concurrent_withdraws_pay_once() {
        let token = SharedToken::new();
        token.lock().mint(a(1), 1000).unwrap();
        token.lock().approve(a(1), a(100), 1000);
        let engine = LedgerEngine::with_default_fee(a(1), a(100), token.clone()).unwrap();
        let (handle, task) = spawn(engine, 8, None);

        handle.deposit(a(1), 1000).await.unwrap().unwrap();
        handle.allocate(a(1), a(7), 600).await.unwrap().unwrap();

        let mut joins = Vec::new();
        for _ in 0..8 {
            let h = handle.clone();
            joins.push(tokio::spawn(async move { h.withdraw(a(7)).await.unwrap() }));
        }
        let mut paid = 0;
        let mut refused = 0;
        for j in joins {
            match j.await.unwrap() {
                Ok(amount) => paid += amount,
                Err(LedgerError::NothingToClaim) => refused += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(paid, 600);
        assert_eq!(refused, 7);
        assert_eq!(token.balance_of(a(7)), 600);

        drop(handle);
        let engine = task.await.unwrap();
        engine.check_invariants().unwrap();
    }

    #[tokio::test]
    async fn test_reads_see_latest_commit() {
        let token = SharedToken::new();
        token.lock().mint(a(1), 50).unwrap();
        token.lock().approve(a(1), a(100), 50);
        let engine = LedgerEngine::with_default_fee(a(1), a(100), token).unwrap();
        let (handle, _task) = spawn(engine, 1, None);

        handle.deposit(a(1), 50).await.unwrap().unwrap();
        handle.allocate(a(1), a(3), 20).await.unwrap().unwrap();
        assert_eq!(handle.allocations(a(3)).await.unwrap(), 20);
        assert_eq!(handle.total_allocated().await.unwrap(), 20);
        assert!(handle.has_role(Role::Config, a(1)).await.unwrap());
        let status = handle.status().await.unwrap().unwrap();
        assert_eq!(status.unallocated, 30);
    }
}
