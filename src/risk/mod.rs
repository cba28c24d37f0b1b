//! Risk management module
//!
//! Stage approval, position admission, and the parameters behind them

mod guard;
mod limits;
mod types;

pub use guard::RiskGuard;
pub use limits::{drawdown, RiskParameters};
pub use types::RiskRejection;
