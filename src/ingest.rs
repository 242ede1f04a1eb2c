// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! ZMQ block-hash subscriber.
//!
//! The subscriber socket lives on its own OS thread (it is not `Sync`) and
//! forwards one event per `hashblock` notification over a bounded channel.
//! The scheduler drains the channel and advances the chain; a dropped event
//! is harmless because every advance reads the node tip anyway.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, warn};

/// A `hashblock` notification; the payload is the announced block hash.
#[derive(Debug, Clone)]
pub struct BlockEvent {
    pub hash: Vec<u8>,
}

const POLL_INTERVAL_MS: i64 = 500;

/// Spawn the subscriber thread. It exits when `running` clears or the
/// receiving side goes away.
pub fn spawn(
    zmq_host: &str,
    zmq_port: u32,
    tx: flume::Sender<BlockEvent>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<JoinHandle<()>> {
    let endpoint = format!("{zmq_host}:{zmq_port}");
    let context = zmq::Context::new();
    let subscriber = context.socket(zmq::SUB)?;
    subscriber.connect(&endpoint)?;
    subscriber.set_subscribe(b"hashblock")?;
    debug!(%endpoint, "subscribed to hashblock notifications");

    let handle = std::thread::Builder::new()
        .name("zmq-ingest".to_string())
        .spawn(move || {
            while running.load(Ordering::Relaxed) {
                match subscriber.poll(zmq::POLLIN, POLL_INTERVAL_MS) {
                    Ok(0) => continue,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "zmq poll failed");
                        std::thread::sleep(Duration::from_millis(POLL_INTERVAL_MS as u64));
                        continue;
                    }
                }
                let parts = match subscriber.recv_multipart(0) {
                    Ok(parts) => parts,
                    Err(e) => {
                        warn!(error = %e, "zmq recv failed");
                        continue;
                    }
                };
                // Frames: topic, block hash, sequence number.
                if parts.first().map(Vec::as_slice) != Some(b"hashblock") {
                    continue;
                }
                let hash = parts.get(1).cloned().unwrap_or_default();
                debug!(hash = %hex::encode(&hash), "new block notification");
                match tx.try_send(BlockEvent { hash }) {
                    Ok(()) => {}
                    // The scheduler reads the tip on every advance, so a
                    // coalesced notification loses nothing.
                    Err(flume::TrySendError::Full(_)) => {}
                    Err(flume::TrySendError::Disconnected(_)) => break,
                }
            }
        })?;
    Ok(handle)
}
