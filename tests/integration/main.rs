//! Integration tests

mod config_loading;
mod engine_flow;
mod invariants;
