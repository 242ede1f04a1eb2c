// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Payout dispatch and owner withdrawal.
//!
//! Both operations release the engine mutex around the actual send: collect
//! and compute under the lock, send, reacquire and record. Whatever was sent
//! before a failure stays recorded; balances not yet debited retry on the
//! next cadence tick.

use tracing::{debug, info, warn};

use super::{PoolError, REWARD_WALLET, StakePool};
use crate::codec::{COIN, encode_address, format_coin, pack_i32, parse_coin};
use crate::config::Mode;
use crate::db::schema::{
    self, DBT_BAL, ParticipantBalance, PendingPayoutRecord, counters, data_key,
    pending_payout_key, pool_balance_key,
};
use crate::db::{ScanOrder, Store, WriteBatch};
use crate::rpc::{NodeRpc, SendOutput};

fn txid32(txid: &str) -> Result<[u8; 32], PoolError> {
    hex::decode(txid)
        .ok()
        .and_then(|v| <[u8; 32]>::try_from(v).ok())
        .ok_or_else(|| PoolError::BadHash(txid.to_string()))
}

impl<DB: Store, N: NodeRpc> StakePool<DB, N> {
    /// Cut payouts for every participant whose accumulated reward rounds to
    /// at least the payout threshold.
    pub(crate) async fn process_payments(&self, height: i32) -> Result<(), PoolError> {
        if self.cfg.mode != Mode::Master {
            return Ok(());
        }
        info!(height, "processing payments");
        crate::metrics::PAYOUT_RUNS.inc();

        // Record the run height first, in its own commit, so a lagging node
        // doesn't make us re-attempt every block.
        let (candidates, reward_addr, fee_rate) = {
            let st = self.state.lock().await;
            let mut run = WriteBatch::new();
            run.put(data_key(counters::LAST_PAYMENT_RUN), pack_i32(height).to_vec());
            st.db.commit(run)?;

            let node_height = self.node.block_count().await?;
            if node_height
                >= i64::from(st.pool_height) + i64::from(self.cfg.block_buffer) + 5
            {
                warn!(
                    pool_height = st.pool_height,
                    node_height, "pool height is below node height, skipping disbursement"
                );
                return Ok(());
            }

            let mut candidates: Vec<(Vec<u8>, u64)> = Vec::new();
            for (key, value) in st.db.prefix_scan(&[DBT_BAL], ScanOrder::Ascending, None)? {
                let bal = ParticipantBalance::decode(&value)?;
                let payout = (bal.accumulated / COIN as u128) as u64;
                if payout < st.params.payout_threshold {
                    continue;
                }
                candidates.push((key, payout));
            }
            (candidates, st.reward_addr.clone(), st.params.tx_fee_per_kb)
        };

        if candidates.is_empty() {
            return Ok(());
        }

        let mut cumulative_fee: u64 = 0;
        for chunk in candidates.chunks(self.cfg.max_outputs_per_tx) {
            let outputs: Vec<SendOutput> = chunk
                .iter()
                .map(|(key, payout)| SendOutput {
                    address: encode_address(&key[1..]),
                    amount: format_coin(*payout as i128),
                })
                .collect();
            let chunk_total: u64 = chunk.iter().map(|(_, payout)| *payout).sum();

            // Mutex released here: the send must not block readers, and a
            // crash after the node accepts the tx is repaired by
            // reconciliation when the payout is observed on chain.
            let sent = self
                .node
                .send_typeto(REWARD_WALLET, &outputs, &reward_addr, fee_rate)
                .await?;
            cumulative_fee += sent.fee;

            let st = self.state.lock().await;
            let mut batch = WriteBatch::new();
            for (key, payout) in chunk {
                let Some(raw) = st.db.get(key)? else {
                    warn!(txid = %sent.txid, "participant balance vanished during payout");
                    continue;
                };
                let mut bal = ParticipantBalance::decode(&raw)?;
                bal.accumulated =
                    bal.accumulated.saturating_sub(*payout as u128 * COIN as u128);
                bal.pending += payout;
                batch.put(key.clone(), bal.encode());
            }
            batch.put(
                pending_payout_key(&txid32(&sent.txid)?),
                PendingPayoutRecord {
                    disbursed: chunk_total,
                    fee: cumulative_fee,
                }
                .encode(),
            );
            schema::add_u64(&st.db, &mut batch, &data_key(counters::POOL_FEES), sent.fee)?;
            st.db.commit(batch)?;

            info!(
                txid = %sent.txid,
                outputs = outputs.len(),
                disbursed = %format_coin(chunk_total as i128),
                fee = %format_coin(sent.fee as i128),
                "dispatched payout"
            );
        }
        Ok(())
    }

    /// Send accrued operator rewards, minus the reserve, to the configured
    /// destinations split by weight.
    pub(crate) async fn process_pool_reward_withdrawal(
        &self,
        height: i32,
    ) -> Result<(), PoolError> {
        let Some(plan) = self.cfg.withdrawal.clone() else {
            return Ok(());
        };
        info!(height, "processing pool reward withdrawal");

        let (outputs, reward_addr, fee_rate) = {
            let st = self.state.lock().await;
            let mut run = WriteBatch::new();
            run.put(
                data_key(counters::LAST_WITHDRAWAL_RUN),
                pack_i32(height).to_vec(),
            );
            st.db.commit(run)?;

            if !st.have_withdrawal_info {
                return Ok(());
            }

            let wallet = self.node.wallet_info(REWARD_WALLET).await?;
            let wallet_balance = wallet
                .get("balance")
                .and_then(|v| parse_coin(v).ok())
                .unwrap_or(0);

            let empty = WriteBatch::new();
            let pool_reward = schema::get_u64(
                &st.db,
                &empty,
                &pool_balance_key(&st.reward_addr_raw),
            )?;
            let pool_fees = schema::get_u64(&st.db, &empty, &data_key(counters::POOL_FEES))?;
            let withdrawn =
                schema::get_u64(&st.db, &empty, &data_key(counters::POOL_WITHDRAWN))?;
            let pool_reward_bal = pool_reward.saturating_sub(pool_fees + withdrawn);

            debug!(
                wallet_balance = %format_coin(wallet_balance as i128),
                pool_reward = %format_coin(pool_reward as i128),
                pool_fees = %format_coin(pool_fees as i128),
                withdrawn = %format_coin(withdrawn as i128),
                available = %format_coin(pool_reward_bal as i128),
                "withdrawal balances"
            );

            if wallet_balance <= plan.reserve_sat
                || pool_reward_bal < plan.reserve_sat + plan.threshold_sat
            {
                return Ok(());
            }

            let node_height = self.node.block_count().await?;
            if node_height
                >= i64::from(st.pool_height) + i64::from(self.cfg.block_buffer) + 5
            {
                warn!(
                    pool_height = st.pool_height,
                    node_height, "pool height is below node height, skipping withdrawal"
                );
                return Ok(());
            }

            let withdraw_amount = pool_reward_bal - plan.reserve_sat;
            let total_weight: u64 = plan.destinations.iter().map(|(_, w)| *w).sum();
            let mut outputs = Vec::new();
            for (address, weight) in &plan.destinations {
                // Floor split; the residue stays pooled.
                let amount =
                    (withdraw_amount as u128 * *weight as u128 / total_weight as u128) as u64;
                if amount == 0 {
                    continue;
                }
                outputs.push(SendOutput {
                    address: address.clone(),
                    amount: format_coin(amount as i128),
                });
            }
            if outputs.is_empty() {
                return Ok(());
            }
            (outputs, st.reward_addr.clone(), st.params.tx_fee_per_kb)
        };

        let sent = self
            .node
            .send_typeto(REWARD_WALLET, &outputs, &reward_addr, fee_rate)
            .await?;
        info!(
            txid = %sent.txid,
            outputs = outputs.len(),
            fee = %format_coin(sent.fee as i128),
            "withdrew pool rewards"
        );

        let st = self.state.lock().await;
        let mut batch = WriteBatch::new();
        schema::add_u64(&st.db, &mut batch, &data_key(counters::POOL_FEES), sent.fee)?;
        st.db.commit(batch)?;
        Ok(())
    }
}
