// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The pool engine: chain-following scheduler, reward ledger, payout and
//! withdrawal runs, and the snapshot queries the status server reads.
//!
//! All mutable state lives behind one coarse mutex. The scheduler holds it
//! for the whole of a block step; readers take it briefly for snapshots. The
//! only places it is released mid-operation are around the `sendtypeto`
//! calls, so a crash between send and record is repaired by the next
//! reconciliation pass instead of blocking the ledger.

mod ledger;
pub mod metrics;
pub mod params;
mod payout;
pub mod readapi;
mod sanity;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::chain::Chain;
use crate::codec::{
    bech32_decode, bech32_encode, decode_address, encode_address, pack_i32, pack_u64,
    parse_coin, unpack_i32,
};
use crate::config::{Mode, Settings, WithdrawalSettings};
use crate::db::schema::{self, DB_VERSION, counters, data_key};
use crate::db::{Store, WriteBatch};
use crate::rpc::NodeRpc;
use params::{ParamSchedule, PoolParameters, coin_to_sat};

/// Work this many blocks behind the tip to stay clear of forks; must exceed
/// coinbase maturity.
pub const BLOCK_BUFFER: i32 = 100;

/// Wallet holding the pool's cold-staking watch-only outputs.
pub const STAKE_WALLET: &str = "pool_stake";
/// Wallet receiving block rewards and funding payouts.
pub const REWARD_WALLET: &str = "pool_reward";

#[derive(Debug, Error)]
pub enum PoolError {
    #[error(transparent)]
    Rpc(#[from] crate::rpc::Error),

    #[error(transparent)]
    Db(#[from] crate::db::Error),

    #[error(transparent)]
    Codec(#[from] crate::codec::Error),

    #[error("invalid address {0:?}")]
    BadAddress(String),

    #[error("invalid hash {0:?}")]
    BadHash(String),
}

/// Immutable engine configuration, fixed at start.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub mode: Mode,
    pub chain: Chain,
    pub data_dir: PathBuf,
    pub block_buffer: i32,
    pub max_outputs_per_tx: usize,
    pub withdrawal: Option<WithdrawalPlan>,
}

/// Normalized owner-withdrawal schedule.
#[derive(Debug, Clone)]
pub struct WithdrawalPlan {
    pub frequency: i32,
    pub destinations: Vec<(String, u64)>,
    pub reserve_sat: u64,
    pub threshold_sat: u64,
}

impl WithdrawalPlan {
    /// Normalize and structurally validate the config. `None` disables
    /// withdrawal, with the reason logged.
    fn from_settings(w: &WithdrawalSettings, block_buffer: i32) -> Option<Self> {
        if w.frequency <= block_buffer {
            warn!(
                frequency = w.frequency,
                "withdrawal frequency must exceed the block buffer, withdrawal disabled"
            );
            return None;
        }
        if w.reserve < 0.005 {
            warn!(reserve = w.reserve, "withdrawal reserve too small, withdrawal disabled");
            return None;
        }
        let destinations = w.destination_list();
        let total_weight: u64 = destinations.iter().map(|(_, w)| *w).sum();
        if destinations.is_empty() || total_weight == 0 {
            warn!("no weighted withdrawal destinations, withdrawal disabled");
            return None;
        }
        Some(Self {
            frequency: w.frequency,
            destinations,
            reserve_sat: coin_to_sat(w.reserve),
            threshold_sat: coin_to_sat(w.threshold),
        })
    }
}

/// Mutable engine state behind the coarse mutex.
pub(crate) struct PoolState<DB> {
    pub(crate) db: DB,
    pub(crate) pool_height: i32,
    pub(crate) params: PoolParameters,
    pub(crate) schedule: ParamSchedule,
    /// Flipped off when the sanity checks reject a destination address.
    pub(crate) have_withdrawal_info: bool,
    /// Canonical bech32 pool stake address.
    pub(crate) pool_addr: String,
    /// Canonical base58-check reward address and its decoded payload.
    pub(crate) reward_addr: String,
    pub(crate) reward_addr_raw: Vec<u8>,
}

pub struct StakePool<DB, N> {
    pub(crate) node: Arc<N>,
    pub(crate) cfg: EngineConfig,
    pub(crate) state: Mutex<PoolState<DB>>,
    is_running: AtomicBool,
    fail_code: AtomicI32,
}

impl<DB: Store, N: NodeRpc> StakePool<DB, N> {
    pub fn new(
        db: DB,
        node: Arc<N>,
        settings: &Settings,
        chain: Chain,
        data_dir: PathBuf,
    ) -> Result<Self, PoolError> {
        match db.get(data_key(counters::DB_VERSION))? {
            Some(raw) => {
                let version = unpack_i32(&raw)?;
                if version > DB_VERSION {
                    return Err(crate::db::Error::UnsupportedVersion(version).into());
                }
            }
            None => db.put(data_key(counters::DB_VERSION), pack_i32(DB_VERSION))?,
        }

        let mut pool_height = settings.startheight;
        if let Some(raw) = db.get(data_key(counters::CURRENT_HEIGHT))? {
            pool_height = unpack_i32(&raw)?;
        }

        // The canonical addresses are pinned in the store on first run so a
        // later config edit cannot silently re-point an existing ledger.
        let hrp = chain.pool_address_hrp();
        let pool_addr = match db.get(data_key(counters::POOL_ADDR))? {
            Some(raw) => bech32_encode(hrp, &raw)
                .ok_or_else(|| PoolError::BadAddress(hex::encode(&raw)))?,
            None => {
                let raw = bech32_decode(hrp, &settings.pooladdress)
                    .ok_or_else(|| PoolError::BadAddress(settings.pooladdress.clone()))?;
                db.put(data_key(counters::POOL_ADDR), &raw)?;
                settings.pooladdress.clone()
            }
        };
        let (reward_addr, reward_addr_raw) = match db.get(data_key(counters::REWARD_ADDR))? {
            Some(raw) => (encode_address(&raw), raw),
            None => {
                let raw = decode_address(&settings.rewardaddress)
                    .ok_or_else(|| PoolError::BadAddress(settings.rewardaddress.clone()))?;
                db.put(data_key(counters::REWARD_ADDR), &raw)?;
                (settings.rewardaddress.clone(), raw)
            }
        };

        let withdrawal = if settings.mode == Mode::Master {
            settings
                .poolownerwithdrawal
                .as_ref()
                .and_then(|w| WithdrawalPlan::from_settings(w, BLOCK_BUFFER))
        } else {
            None
        };

        if settings.mode == Mode::Master {
            // A pool synced in observer mode tracks fees from the chain
            // rather than from its own sends; adopt the larger figure.
            let empty = WriteBatch::new();
            let detected =
                schema::get_u64(&db, &empty, &data_key(counters::POOL_FEES_DETECTED))?;
            let fees = schema::get_u64(&db, &empty, &data_key(counters::POOL_FEES))?;
            if detected > fees {
                info!(
                    pool_fees = fees,
                    pool_fees_detected = detected,
                    "replacing pool_fees with pool_fees_detected"
                );
                db.put(data_key(counters::POOL_FEES), pack_u64(detected))?;
            }
        }

        let mut params = PoolParameters::default();
        let mut schedule = ParamSchedule::new(settings.parameters.clone());
        schedule.apply_through(pool_height, &mut params);

        info!(
            height = pool_height,
            %pool_addr,
            %reward_addr,
            mode = ?settings.mode,
            "starting stake pool"
        );

        Ok(Self {
            node,
            cfg: EngineConfig {
                mode: settings.mode,
                chain,
                data_dir,
                block_buffer: BLOCK_BUFFER,
                max_outputs_per_tx: settings.maxoutputspertx,
                withdrawal: withdrawal.clone(),
            },
            state: Mutex::new(PoolState {
                db,
                pool_height,
                params,
                schedule,
                have_withdrawal_info: withdrawal.is_some(),
                pool_addr,
                reward_addr,
                reward_addr_raw,
            }),
            is_running: AtomicBool::new(true),
            fail_code: AtomicI32::new(0),
        })
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    pub fn fail_code(&self) -> i32 {
        self.fail_code.load(Ordering::Relaxed)
    }

    /// Ask every loop to wind down. A non-zero code is reported as the
    /// process exit status so a supervisor restarts us.
    pub fn stop(&self, code: i32) {
        self.fail_code.store(code, Ordering::Relaxed);
        self.is_running.store(false, Ordering::Relaxed);
    }

    pub async fn pool_height(&self) -> i32 {
        self.state.lock().await.pool_height
    }

    /// Process one block. Idempotent: a height at or below the store's
    /// `current_height` is a no-op.
    pub async fn process_block(&self, height: i32) -> Result<(), PoolError> {
        let mut guard = self.state.lock().await;
        debug!(height, "processing block");
        let st = &mut *guard;

        if let Some(raw) = st.db.get(data_key(counters::CURRENT_HEIGHT))? {
            let db_height = unpack_i32(&raw)?;
            if db_height >= height {
                info!(height, db_height, "block already processed");
                st.pool_height = db_height;
                return Ok(());
            }
        }

        if st.schedule.apply_through(height, &mut st.params) && self.cfg.mode == Mode::Master
        {
            self.check_wallet_settings(st).await?;
        }

        let reward = self.node.block_reward_at(height).await?;

        let Some(coinstake) = reward.coinstake.clone() else {
            // Not a staked block; nothing to account for.
            st.db.put(data_key(counters::CURRENT_HEIGHT), pack_i32(height))?;
            st.pool_height = height;
            crate::metrics::POOL_HEIGHT.set(height.into());
            crate::metrics::BLOCKS_PROCESSED.inc();
            return Ok(());
        };

        let mut batch = WriteBatch::new();
        batch.put(data_key(counters::CURRENT_HEIGHT), pack_i32(height).to_vec());

        // Reconcile observed payouts before crediting a win at the same
        // height, so a block that does both debits pending first.
        self.reconcile_payments(st, height, &coinstake, &reward, &mut batch)
            .await?;

        let win = reward.outputs.iter().find(|o| {
            o.script
                .as_ref()
                .and_then(|s| s.spendaddr.as_deref())
                .is_some_and(|a| a == st.reward_addr)
        });
        if let Some(out) = win {
            let block_reward = parse_coin(&reward.blockreward)?;
            if parse_coin(&out.value).ok() != Some(block_reward) {
                warn!(height, "pool reward output does not match the block reward");
            }
            self.credit_pool_block(st, height, &reward, &mut batch).await?;
        }

        st.db.commit(batch)?;
        st.pool_height = height;
        crate::metrics::POOL_HEIGHT.set(height.into());
        crate::metrics::BLOCKS_PROCESSED.inc();

        let empty = WriteBatch::new();
        let last_payment =
            schema::get_i32(&st.db, &empty, &data_key(counters::LAST_PAYMENT_RUN))?;
        let due_payments = self.cfg.mode == Mode::Master
            && last_payment + st.params.min_blocks_between_payments <= height;

        let due_withdrawal = st.have_withdrawal_info
            && match &self.cfg.withdrawal {
                Some(plan) => {
                    let last = schema::get_i32(
                        &st.db,
                        &empty,
                        &data_key(counters::LAST_WITHDRAWAL_RUN),
                    )?;
                    last + plan.frequency <= height
                }
                None => false,
            };
        drop(guard);

        // Payments and withdrawals run in their own sub-batches; a failure
        // here must not roll back the committed credit step.
        if due_payments {
            if let Err(e) = self.process_payments(height).await {
                warn!(height, error = %e, "payment run failed");
            }
        }
        if due_withdrawal {
            if let Err(e) = self.process_pool_reward_withdrawal(height).await {
                warn!(height, error = %e, "withdrawal run failed");
            }
        }
        Ok(())
    }

    /// Drive the scheduler forward until the pool is `block_buffer` blocks
    /// behind the node tip, or `limit_blocks` blocks have been stepped.
    pub async fn advance_chain(&self, limit_blocks: Option<u32>) -> Result<(), PoolError> {
        let tip = self.node.block_count().await?;
        let mut remaining = limit_blocks;
        loop {
            if !self.is_running() {
                break;
            }
            let height = self.pool_height().await;
            if tip - i64::from(self.cfg.block_buffer) <= i64::from(height) {
                break;
            }
            self.process_block(height + 1).await?;
            if let Some(r) = &mut remaining {
                *r -= 1;
                if *r == 0 {
                    break;
                }
            }
        }
        Ok(())
    }
}
