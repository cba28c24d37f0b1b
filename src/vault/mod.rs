//! Vault module
//!
//! Bankroll custody and position admission for a vault

mod ledger;
mod manager;
mod types;

pub use ledger::{BankrollLedger, Exposure, LedgerConflict, LedgerSnapshot};
pub use manager::VaultManager;
pub use types::{VaultError, VaultLimits};
