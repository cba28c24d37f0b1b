//! scale-engine: position scaling and staged profit-taking for leveraged vaults
//!
//! This library provides the core components for:
//! - Multi-stage position building with decreasing leverage
//! - Profit threshold, take-profit trigger and liquidation price bookkeeping
//! - A per-vault bankroll ledger with compare-and-commit updates
//! - A single risk guard for every bankroll-consuming action
//! - The take-profit and trailing-stop cascade
//! - Per-position actors driving exchange adapters (paper adapter included)
//! - Structured logging and Prometheus metrics

pub mod cli;
pub mod config;
pub mod engine;
pub mod execution;
pub mod feed;
pub mod position;
pub mod profit;
pub mod risk;
pub mod signal;
pub mod telemetry;
pub mod vault;
