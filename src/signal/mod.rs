//! Signal Center inputs
//!
//! Read-only per-symbol scores consumed by the scaler and the risk guard

mod types;

pub use types::SignalSnapshot;
