// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Process lifecycle: wire config, store, engine, ingest and the status
//! server together, run until a signal lands, and report the exit code.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context as _;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};

use crate::chain::Chain;
use crate::cli::Cli;
use crate::config::{Mode, Settings};
use crate::db::ParityDb;
use crate::http::AppState;
use crate::pool::StakePool;
use crate::rpc::RpcClient;
use crate::{http, ingest, logger};

type Engine = StakePool<ParityDb, RpcClient>;

/// Run the pool daemon to completion. Returns the process exit code:
/// 0 on a clean shutdown, 1 when the node is unreachable at start.
pub async fn start(cli: Cli) -> anyhow::Result<i32> {
    let chain = cli.chain();
    let data_dir = cli.data_dir(chain);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;

    let settings_path = data_dir.join("stakepool.json");
    let settings = Settings::load(&settings_path)?;

    let _log_guard = logger::setup(
        &data_dir,
        settings.debug,
        settings.writelogfile,
        settings.logtime,
    );
    info!(
        version = env!("CARGO_PKG_VERSION"),
        %chain,
        data_dir = %data_dir.display(),
        "coldstakepool-run"
    );

    let auth = match &settings.rpcauth {
        Some(auth) => auth.clone(),
        None => read_cookie_auth(&settings, chain).await?,
    };
    let rpc_port = settings.rpcport.unwrap_or_else(|| chain.default_rpc_port());
    let node = Arc::new(RpcClient::new(&settings.rpchost, rpc_port, &auth)?);

    let db = ParityDb::open(data_dir.join("stakepooldb"))?;
    let engine: Arc<Engine> = Arc::new(StakePool::new(
        db,
        node,
        &settings,
        chain,
        data_dir.clone(),
    )?);

    spawn_signal_handler(engine.clone());

    if !engine.wait_for_node().await {
        return Ok(engine.fail_code());
    }
    if settings.mode == Mode::Master {
        if let Err(e) = engine.run_sanity_checks().await {
            warn!(error = %e, "sanity checks failed");
        }
    }

    let http_task = match &settings.htmlhost {
        Some(host) => {
            let state = Arc::new(AppState {
                engine: engine.clone(),
                settings_path,
                management_key_salt: settings.management_key_salt.clone(),
                management_key_hash: settings.management_key_hash.clone(),
            });
            let app = http::router(state, settings.allowcors);
            let listener = tokio::net::TcpListener::bind((host.as_str(), settings.htmlport))
                .await
                .with_context(|| format!("binding status server {host}:{}", settings.htmlport))?;
            info!(%host, port = settings.htmlport, "starting status server");
            let shutdown_engine = engine.clone();
            Some(tokio::spawn(async move {
                let shutdown = async move {
                    while shutdown_engine.is_running() {
                        tokio::time::sleep(Duration::from_millis(250)).await;
                    }
                };
                if let Err(e) = axum::serve(listener, app)
                    .with_graceful_shutdown(shutdown)
                    .await
                {
                    warn!(error = %e, "status server stopped");
                }
            }))
        }
        None => None,
    };

    let ingest_running = Arc::new(AtomicBool::new(true));
    let (block_tx, block_rx) = flume::bounded(8);
    let zmq_thread = ingest::spawn(
        &settings.zmqhost,
        settings.zmqport,
        block_tx,
        ingest_running.clone(),
    )?;

    // Catch up to tip − buffer before waiting on notifications.
    if let Err(e) = engine.advance_chain(None).await {
        warn!(error = %e, "initial catch-up failed");
    }

    while engine.is_running() {
        match tokio::time::timeout(Duration::from_millis(500), block_rx.recv_async()).await {
            Ok(Ok(_event)) => {
                if let Err(e) = engine.advance_chain(None).await {
                    // The failed block stays uncommitted and is retried on
                    // the next notification.
                    warn!(error = %e, "chain advance failed");
                }
            }
            Ok(Err(_)) => break,
            Err(_) => {} // timeout, poll the shutdown flag
        }
    }

    info!("stopping threads");
    ingest_running.store(false, Ordering::Relaxed);
    let _ = tokio::task::spawn_blocking(move || zmq_thread.join()).await;
    if let Some(task) = http_task {
        let _ = task.await;
    }
    Ok(engine.fail_code())
}

/// Authenticate via the node's cookie when `rpcauth` is not configured,
/// waiting briefly for the node to write it.
async fn read_cookie_auth(settings: &Settings, chain: Chain) -> anyhow::Result<String> {
    let node_dir = settings
        .particldatadir
        .as_ref()
        .context("either rpcauth or particldatadir must be configured")?;
    let cookie_path = chain.cookie_path(node_dir);
    for _ in 0..10 {
        if cookie_path.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    std::fs::read_to_string(&cookie_path)
        .map(|s| s.trim().to_string())
        .with_context(|| format!("reading rpc cookie {}", cookie_path.display()))
}

fn spawn_signal_handler(engine: Arc<Engine>) {
    tokio::spawn(async move {
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "could not install SIGTERM handler");
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
        info!("signal detected, ending program");
        engine.stop(0);
    });
}
