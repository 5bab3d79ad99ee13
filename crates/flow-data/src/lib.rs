//! flow-data crate
//!
//! Loyalty-token ledger types, ledger sources (JSON file, SQLite), and the
//! shared async loader that hands one immutable snapshot to every analysis.

pub mod ledger;
pub mod source;
pub mod store;
pub mod types;

pub use ledger::{EventLedger, LedgerSnapshot};
pub use source::{JsonFileSource, LedgerLoader, LedgerSource, SqliteSource};
pub use types::{Account, Amount, Business, Event, EventKind, Leg, Role, Swap, TokenAction, Transfer};
