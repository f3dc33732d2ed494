pub mod access;
pub mod address;
pub mod amount;
pub mod catalog;
pub mod config;
pub mod custody;
pub mod error;
pub mod fee;
pub mod ledger;
pub mod logging;
pub mod planner;
pub mod replica;
pub mod status;
pub mod storage;

pub use address::Address;
pub use error::{ErrorKind, LedgerError, LedgerResult};
pub use ledger::{LedgerEngine, LedgerHandle};
