//! Authoritative balance ledger.
//!
//! ```text
//! ┌──────────────┐  commands   ┌──────────────┐  pull/push  ┌──────────────┐
//! │ LedgerHandle │────────────►│ LedgerEngine │────────────►│ TokenCustody │
//! │ (one-by-one) │◄────────────│  (state fsm) │             └──────────────┘
//! └──────────────┘   replies   └──────┬───────┘
//!                                     │ notifications
//!                                     ▼
//!                              ┌──────────────┐
//!                              │   Journal    │
//!                              └──────────────┘
//! ```

pub mod actor;
pub mod engine;
pub mod events;
pub mod invariants;
pub mod journal;
pub mod state;

pub use actor::{spawn, LedgerHandle};
pub use engine::{batch_requirement, credit_requirement, BatchReceipt, LedgerEngine};
pub use events::LedgerEvent;
pub use journal::{Journal, RecoveredLedger};
pub use state::LedgerState;
