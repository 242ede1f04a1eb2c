// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Reward apportionment and on-chain payout reconciliation.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::{PoolError, PoolState, StakePool};
use crate::codec::{COIN, decode_address, format_coin, pack_i32, parse_coin};
use crate::db::schema::{
    self, ParticipantBalance, PoolBlockRecord, balance_key, block_key, counters, data_key,
    payout_key, pending_payout_key, pool_balance_key,
};
use crate::db::{Store, WriteBatch, read_through};
use crate::pool::metrics::{bump_month, month_key_for};
use crate::pool::params::mul_frac;
use crate::rpc::{BlockRewardInfo, NodeRpc};

fn hash32(hex_str: &str) -> Result<[u8; 32], PoolError> {
    hex::decode(hex_str)
        .ok()
        .and_then(|v| <[u8; 32]>::try_from(v).ok())
        .ok_or_else(|| PoolError::BadHash(hex_str.to_string()))
}

impl<DB: Store, N: NodeRpc> StakePool<DB, N> {
    /// Credit a block the pool won: apportion the client share of the reward
    /// over the outputs that were eligible at the prior block, hand the
    /// kernel owner the stake bonus, and book the operator's cut.
    pub(crate) async fn credit_pool_block(
        &self,
        st: &mut PoolState<DB>,
        height: i32,
        reward: &BlockRewardInfo,
        batch: &mut WriteBatch,
    ) -> Result<(), PoolError> {
        info!(height, "found pool block");

        let outputs = self.node.cold_stake_unspent(&st.pool_addr, height - 1).await?;

        // Aggregate eligible value per spend address, keyed by decoded
        // payload so credit order is deterministic.
        let mut totals: BTreeMap<Vec<u8>, u64> = BTreeMap::new();
        let mut pool_coin_total: u64 = 0;
        let mut low_value_outputs = 0usize;
        for o in &outputs {
            if o.value < st.params.min_output_value {
                low_value_outputs += 1;
                continue;
            }
            let Some(raw) = decode_address(&o.addrspend) else {
                warn!(height, address = %o.addrspend, "skipping undecodable spend address");
                continue;
            };
            *totals.entry(raw).or_insert(0) += o.value;
            pool_coin_total += o.value;
        }
        if low_value_outputs > 0 {
            debug!(height, low_value_outputs, "ignoring low value outputs");
        }

        let block_reward = parse_coin(&reward.blockreward)?;
        let pool_reward = mul_frac(block_reward, st.params.pool_fee_frac);
        let mut stake_bonus = mul_frac(block_reward, st.params.stake_bonus_frac);
        let clients = block_reward.saturating_sub(pool_reward + stake_bonus);

        batch.put(
            block_key(height),
            PoolBlockRecord {
                hash: hash32(&reward.blockhash)?,
                reward: block_reward,
                pool_coin_total,
            }
            .encode(),
        );

        let blocks_found =
            schema::get_i32(&st.db, batch, &data_key(counters::BLOCKS_FOUND))? + 1;
        batch.put(data_key(counters::BLOCKS_FOUND), pack_i32(blocks_found).to_vec());

        let block_time = match reward.blocktime {
            Some(t) => t,
            None => self.node.block_time(&reward.blockhash).await?,
        };
        bump_month(
            &st.db,
            batch,
            &month_key_for(block_time),
            1,
            pool_coin_total as u128,
            0,
        )?;

        let kernel_spend = reward
            .kernelscript
            .as_ref()
            .and_then(|s| s.spendaddr.as_deref())
            .and_then(decode_address);

        for (addr_raw, v) in &totals {
            let addr_reward =
                clients as u128 * COIN as u128 * *v as u128 / pool_coin_total as u128;
            let mut addr_total = addr_reward;
            if stake_bonus > 0 && Some(addr_raw) == kernel_spend.as_ref() {
                addr_total += stake_bonus as u128 * COIN as u128;
                stake_bonus = 0;
            }

            let key = balance_key(addr_raw);
            let mut bal = match read_through(&st.db, batch, &key)? {
                Some(raw) => ParticipantBalance::decode(&raw)?,
                None => ParticipantBalance::default(),
            };
            bal.accumulated += addr_total;
            bal.last_stake_weight = *v;
            batch.put(key, bal.encode());
        }

        if stake_bonus > 0 {
            // The winning output was below the minimum value; its owner earns
            // nothing and the bonus stays with the operator.
            info!(
                height,
                bonus = %format_coin(stake_bonus as i128),
                "unassigned stake bonus"
            );
        }

        let key = pool_balance_key(&st.reward_addr_raw);
        let mut pool_reward_total = pool_reward + stake_bonus;
        if let Some(raw) = read_through(&st.db, batch, &key)? {
            pool_reward_total += crate::codec::unpack_u64(&raw)?;
        }
        batch.put(key, crate::codec::pack_u64(pool_reward_total).to_vec());

        crate::metrics::POOL_BLOCKS_FOUND.inc();
        Ok(())
    }

    /// Walk every non-coinstake transaction touching the reward address in
    /// this block and fold what actually happened on chain back into the
    /// ledger: settle pending payouts, absorb overpayments, count operator
    /// withdrawals and detect fees.
    pub(crate) async fn reconcile_payments(
        &self,
        st: &mut PoolState<DB>,
        height: i32,
        coinstake_txid: &str,
        block: &BlockRewardInfo,
        batch: &mut WriteBatch,
    ) -> Result<(), PoolError> {
        let deltas = self.node.address_deltas(&st.reward_addr, height).await?;

        let mut txids: Vec<String> = Vec::new();
        for delta in &deltas {
            if delta.txid == coinstake_txid {
                if delta.satoshis < 0 {
                    warn!(height, txid = %delta.txid, "pool reward coin spent in coinstake");
                }
                continue;
            }
            if !txids.contains(&delta.txid) {
                txids.push(delta.txid.clone());
            }
        }
        if txids.is_empty() {
            return Ok(());
        }
        txids.sort();

        let mut block_disbursed: u64 = 0;
        for txid in &txids {
            block_disbursed += self.reconcile_transaction(st, height, txid, batch).await?;
        }

        if block_disbursed > 0 {
            let block_time = match block.blocktime {
                Some(t) => t,
                None => self.node.block_time(&block.blockhash).await?,
            };
            bump_month(&st.db, batch, &month_key_for(block_time), 0, 0, block_disbursed)?;
        }
        Ok(())
    }

    async fn reconcile_transaction(
        &self,
        st: &mut PoolState<DB>,
        height: i32,
        txid: &str,
        batch: &mut WriteBatch,
    ) -> Result<u64, PoolError> {
        let tx = self.node.raw_transaction(txid).await?;

        let mut have_blinded = false;
        let mut total_input_value: u64 = 0;
        let mut total_output_value: u64 = 0;

        for (n, inp) in tx
            .get("vin")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .enumerate()
        {
            match self.prevout_value(inp).await {
                Ok(Some(v)) => total_input_value += v,
                Ok(None) => have_blinded = true,
                Err(_) => {
                    warn!(%txid, input = n, "could not get prevout value");
                }
            }
        }

        let mut disbursed: u64 = 0;
        let outs = tx.get("vout").and_then(Value::as_array).cloned().unwrap_or_default();
        for out in &outs {
            match out.get("type").and_then(Value::as_str) {
                Some("data") => continue,
                Some("blind") => {
                    warn!(%txid, "found txn paying to blinded output");
                    have_blinded = true;
                    continue;
                }
                Some("anon") => {
                    warn!(%txid, "found txn paying to anon output");
                    have_blinded = true;
                    continue;
                }
                Some(_) => {}
                None => {
                    warn!(%txid, "found txn output of unknown type");
                    continue;
                }
            }

            let v = match out.get("value").map(parse_coin) {
                Some(Ok(v)) => v,
                _ => {
                    warn!(%txid, "could not parse output value");
                    continue;
                }
            };
            total_output_value += v;

            let address = out
                .get("scriptPubKey")
                .and_then(|s| s.get("addresses"))
                .and_then(Value::as_array)
                .and_then(|a| a.first())
                .and_then(Value::as_str);
            let Some(address) = address else {
                warn!(%txid, "found txn paying to unknown address");
                continue;
            };

            if address == st.reward_addr {
                // Change back to the pool.
                continue;
            }

            let Some(addr_raw) = decode_address(address) else {
                warn!(%txid, %address, "could not decode payout address");
                continue;
            };
            let key = balance_key(&addr_raw);
            let Some(raw) = read_through(&st.db, batch, &key)? else {
                // Not a participant: an operator withdrawal reached the chain.
                info!(%txid, %address, amount = %format_coin(v as i128),
                    "withdrawal detected from pool reward balance");
                schema::add_u64(&st.db, batch, &data_key(counters::POOL_WITHDRAWN), v)?;
                continue;
            };

            let mut bal = ParticipantBalance::decode(&raw)?;
            let pending_before = bal.pending;
            bal.paid_out += v;
            disbursed += v;
            if v <= bal.pending {
                bal.pending -= v;
            } else {
                let overpay = v - pending_before;
                warn!(%txid, %address, pending = pending_before, paid = v,
                    "txn overpays address more than pending payout");
                bal.pending = 0;
                let overpay_sub = overpay as u128 * COIN as u128;
                if bal.accumulated >= overpay_sub {
                    bal.accumulated -= overpay_sub;
                } else {
                    warn!(%txid, %address, accumulated = %bal.accumulated, overpay,
                        "txn overpays address more than accumulated reward");
                    bal.accumulated = 0;
                }
            }
            batch.put(key, bal.encode());
            debug!(%txid, %address, amount = %format_coin(v as i128), "payout observed");
        }

        if disbursed > 0 {
            let txid_raw = hash32(txid)?;
            batch.put(
                payout_key(height, &txid_raw),
                crate::codec::pack_u64(disbursed).to_vec(),
            );
            batch.delete(pending_payout_key(&txid_raw));
            schema::add_u64(&st.db, batch, &data_key(counters::POOL_DISBURSED), disbursed)?;
        }

        // Fee detection: blinded transactions carry an explicit ct_fee,
        // otherwise the fee is whatever the inputs lose to the outputs.
        let fee = if have_blinded {
            match outs.first().and_then(|o| o.get("ct_fee")).map(parse_coin) {
                Some(Ok(f)) => Some(f),
                _ => {
                    warn!(%txid, "blinded txn without a readable ct_fee");
                    None
                }
            }
        } else if total_input_value >= total_output_value {
            Some(total_input_value - total_output_value)
        } else {
            warn!(%txid, "txn outputs exceed inputs, skipping fee detection");
            None
        };
        if let Some(fee) = fee {
            debug!(%txid,
                input = %format_coin(total_input_value as i128),
                output = %format_coin(total_output_value as i128),
                fee = %format_coin(fee as i128),
                "payout tx fee detected");
            schema::add_u64(&st.db, batch, &data_key(counters::POOL_FEES_DETECTED), fee)?;
        }

        Ok(disbursed)
    }

    /// Value of the prevout an input spends; `None` when the prevout is
    /// blinded.
    async fn prevout_value(&self, inp: &Value) -> Result<Option<u64>, PoolError> {
        let txid = inp
            .get("txid")
            .and_then(Value::as_str)
            .ok_or_else(|| PoolError::BadHash("missing input txid".into()))?;
        let vout = inp
            .get("vout")
            .and_then(Value::as_u64)
            .ok_or_else(|| PoolError::BadHash("missing input vout".into()))?;
        let prev = self.node.raw_transaction(txid).await?;
        let prevout = prev
            .get("vout")
            .and_then(Value::as_array)
            .and_then(|a| a.get(vout as usize))
            .ok_or_else(|| PoolError::BadHash(format!("missing prevout {txid}.{vout}")))?;
        if prevout.get("type").and_then(Value::as_str) == Some("blind") {
            return Ok(None);
        }
        let v = prevout
            .get("value")
            .map(parse_coin)
            .transpose()?
            .ok_or_else(|| PoolError::BadHash(format!("prevout {txid}.{vout} has no value")))?;
        Ok(Some(v))
    }
}
