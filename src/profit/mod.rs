//! Profit-taking cascade
//!
//! MONITORING -> TAKING_PROFIT_1 -> TRAILING_1 -> TAKING_PROFIT_2 -> TRAILING_2 -> CLOSED,
//! with liquidation pre-empting every step.

mod coordinator;
mod plan;
mod trailing;

pub use coordinator::{ProfitAction, ProfitTakingCoordinator, Settlement};
pub use plan::{ProfitLevel, ProfitPlan, PARTIAL_LEVELS};
pub use trailing::TrailingStop;
