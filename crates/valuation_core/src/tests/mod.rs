//! Integration tests for the valuation engine
//!
//! Tests are organized by topic, all against the synthetic village model in
//! `fixtures`:
//! - `mutation` - Both mutation pathways, non-leakage, derived fields
//! - `pipeline` - Evaluate, discount, salvage, compare, export
//! - `sensitivity` - One-way sweeps and base immutability
//! - `monte_carlo` - Correlated sampling, failures, reproducibility
//! - `switching` - Switching values from sensitivity tables

mod monte_carlo;

/// Route engine logs to the test harness; set `RUST_LOG` to see them
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
