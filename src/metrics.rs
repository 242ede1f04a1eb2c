// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Process-level metrics, served in Prometheus text format at `/metrics`.
//! These are operational gauges; the per-month pool aggregates live in the
//! store and are served by the JSON API.

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::sync::LazyLock;

/// Last block height the pool has processed.
pub static POOL_HEIGHT: LazyLock<Gauge> = LazyLock::new(Gauge::default);

/// Total blocks walked by the scheduler.
pub static BLOCKS_PROCESSED: LazyLock<Counter> = LazyLock::new(Counter::default);

/// Blocks the pool won.
pub static POOL_BLOCKS_FOUND: LazyLock<Counter> = LazyLock::new(Counter::default);

/// Payment runs dispatched.
pub static PAYOUT_RUNS: LazyLock<Counter> = LazyLock::new(Counter::default);

/// Failed node RPC calls.
pub static RPC_FAILURES: LazyLock<Counter> = LazyLock::new(Counter::default);

static REGISTRY: LazyLock<Registry> = LazyLock::new(|| {
    let mut registry = Registry::default();
    registry.register(
        "stakepool_height",
        "Last block height the pool has processed",
        POOL_HEIGHT.clone(),
    );
    registry.register(
        "stakepool_blocks_processed",
        "Total blocks walked by the scheduler",
        BLOCKS_PROCESSED.clone(),
    );
    registry.register(
        "stakepool_blocks_found",
        "Blocks the pool won",
        POOL_BLOCKS_FOUND.clone(),
    );
    registry.register(
        "stakepool_payout_runs",
        "Payment runs dispatched",
        PAYOUT_RUNS.clone(),
    );
    registry.register(
        "stakepool_rpc_failures",
        "Failed node RPC calls",
        RPC_FAILURES.clone(),
    );
    registry
});

/// Render the registry in Prometheus text exposition format.
pub fn encode_text() -> String {
    let mut out = String::new();
    encode(&mut out, &REGISTRY).expect("encoding metrics to a string must succeed");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_defined_and_registered() {
        BLOCKS_PROCESSED.inc();
        POOL_HEIGHT.set(42);
        let text = encode_text();
        assert!(text.contains("stakepool_blocks_processed"));
        assert!(text.contains("stakepool_height 42"));
    }
}
