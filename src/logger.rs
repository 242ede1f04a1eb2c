// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

/// Install the global subscriber: stdout always, plus a non-blocking file
/// layer writing `stakepool.log` when enabled. Returns the appender guard,
/// which must live as long as the process for the file layer to flush.
///
/// `RUST_LOG` overrides the default filter.
pub fn setup(
    data_dir: &Path,
    debug: bool,
    write_log_file: bool,
    log_time: bool,
) -> Option<WorkerGuard> {
    let default_filter = if debug { "stakepool=debug,info" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    if log_time {
        layers.push(fmt::layer().boxed());
    } else {
        layers.push(fmt::layer().without_time().boxed());
    }

    let mut guard = None;
    if write_log_file {
        let appender = tracing_appender::rolling::never(data_dir, "stakepool.log");
        let (writer, worker_guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer().with_writer(writer).with_ansi(false);
        if log_time {
            layers.push(layer.boxed());
        } else {
            layers.push(layer.without_time().boxed());
        }
        guard = Some(worker_guard);
    }

    tracing_subscriber::registry().with(layers).with(filter).init();
    guard
}
