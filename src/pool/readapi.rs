// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Snapshot queries consumed by the status server. Each call takes the
//! engine mutex only for the store reads; node RPC lookups happen outside
//! it.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use super::{PoolError, STAKE_WALLET, StakePool};
use crate::codec::{parse_coin, unpack_i32, unpack_u64};
use crate::config::Mode;
use crate::db::schema::{
    self, DBT_POOL_BLOCK, DBT_POOL_METRICS, DBT_POOL_PAYOUT, DBT_POOL_PENDING_PAYOUT,
    MonthMetricRecord, ParticipantBalance, PendingPayoutRecord, PoolBlockRecord,
    balance_key, counters, data_key, pool_balance_key,
};
use crate::db::{ScanOrder, Store, WriteBatch};
use crate::pool::metrics::month_key_for;
use crate::rpc::NodeRpc;

#[derive(Debug, Clone, Serialize)]
pub struct BlockSummary {
    pub height: i32,
    pub blockhash: String,
    pub blockreward: u64,
    pub poolcointotal: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingPaymentSummary {
    pub txid: String,
    pub disbursed: u64,
    pub fee: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentSummary {
    pub height: i32,
    pub txid: String,
    pub disbursed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub poolmode: String,
    pub poolheight: i32,
    pub blocksfound: i32,
    pub totaldisbursed: u64,
    pub poolrewardtotal: u64,
    pub poolfeestotal: u64,
    pub poolwithdrawntotal: u64,
    pub lastpaymentrunheight: i32,
    pub lastblocks: Vec<BlockSummary>,
    pub pendingpayments: Vec<PendingPaymentSummary>,
    pub lastpayments: Vec<PaymentSummary>,
    pub stakeweight: u64,
    pub watchonlytotalbalance: Value,
    pub stakedbalance: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddressSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accumulated: Option<u128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewardpending: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewardpaidout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub laststaking: Option<u64>,
    pub currenttotal: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthSummary {
    pub month: String,
    pub blocks: i32,
    pub avgpoolcoin: u128,
    pub disbursed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RebuildResult {
    pub processedblocks: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Versions {
    pub pool: String,
    pub node: String,
}

fn decode_block_row(key: &[u8], value: &[u8]) -> Result<BlockSummary, PoolError> {
    let height = unpack_i32(&key[1..])?;
    let rec = PoolBlockRecord::decode(value)?;
    Ok(BlockSummary {
        height,
        blockhash: hex::encode(rec.hash),
        blockreward: rec.reward,
        poolcointotal: rec.pool_coin_total,
    })
}

impl<DB: Store, N: NodeRpc> StakePool<DB, N> {
    pub async fn get_summary(&self) -> Result<Summary, PoolError> {
        let st = self.state.lock().await;
        let empty = WriteBatch::new();

        let fees_counter = match self.cfg.mode {
            Mode::Master => counters::POOL_FEES,
            Mode::Observer => counters::POOL_FEES_DETECTED,
        };

        let mut summary = Summary {
            poolmode: match self.cfg.mode {
                Mode::Master => "master".into(),
                Mode::Observer => "observer".into(),
            },
            poolheight: schema::get_i32(&st.db, &empty, &data_key(counters::CURRENT_HEIGHT))?,
            blocksfound: schema::get_i32(&st.db, &empty, &data_key(counters::BLOCKS_FOUND))?,
            totaldisbursed: schema::get_u64(
                &st.db,
                &empty,
                &data_key(counters::POOL_DISBURSED),
            )?,
            poolrewardtotal: schema::get_u64(
                &st.db,
                &empty,
                &pool_balance_key(&st.reward_addr_raw),
            )?,
            poolfeestotal: schema::get_u64(&st.db, &empty, &data_key(fees_counter))?,
            poolwithdrawntotal: schema::get_u64(
                &st.db,
                &empty,
                &data_key(counters::POOL_WITHDRAWN),
            )?,
            lastpaymentrunheight: schema::get_i32(
                &st.db,
                &empty,
                &data_key(counters::LAST_PAYMENT_RUN),
            )?,
            lastblocks: Vec::new(),
            pendingpayments: Vec::new(),
            lastpayments: Vec::new(),
            stakeweight: 0,
            watchonlytotalbalance: Value::from(0),
            stakedbalance: Value::from(0),
        };

        for (key, value) in
            st.db
                .prefix_scan(&[DBT_POOL_BLOCK], ScanOrder::Descending, Some(5))?
        {
            summary.lastblocks.push(decode_block_row(&key, &value)?);
        }
        for (key, value) in
            st.db
                .prefix_scan(&[DBT_POOL_PENDING_PAYOUT], ScanOrder::Descending, Some(5))?
        {
            let rec = PendingPayoutRecord::decode(&value)?;
            summary.pendingpayments.push(PendingPaymentSummary {
                txid: hex::encode(&key[1..]),
                disbursed: rec.disbursed,
                fee: rec.fee,
                detail: None,
            });
        }
        for (key, value) in
            st.db
                .prefix_scan(&[DBT_POOL_PAYOUT], ScanOrder::Descending, Some(5))?
        {
            summary.lastpayments.push(PaymentSummary {
                height: unpack_i32(&key[1..])?,
                txid: hex::encode(&key[5..]),
                disbursed: unpack_u64(&value)?,
            });
        }
        drop(st);

        // Live wallet figures are best-effort decoration.
        if let Ok(info) = self.node.staking_info(STAKE_WALLET).await {
            summary.stakeweight = info.get("weight").and_then(Value::as_u64).unwrap_or(0);
        }
        if let Ok(info) = self.node.wallet_info(STAKE_WALLET).await {
            if let Some(v) = info.get("watchonly_total_balance") {
                summary.watchonlytotalbalance = v.clone();
            }
            if let Some(v) = info.get("watchonly_staked_balance") {
                summary.stakedbalance = v.clone();
            }
        }
        Ok(summary)
    }

    pub async fn get_address_summary(
        &self,
        address: &str,
    ) -> Result<AddressSummary, PoolError> {
        let raw = crate::codec::decode_address(address)
            .filter(|r| r.len() == 33)
            .ok_or_else(|| PoolError::BadAddress(address.to_string()))?;

        let mut summary = AddressSummary {
            accumulated: None,
            rewardpending: None,
            rewardpaidout: None,
            laststaking: None,
            currenttotal: 0,
        };
        {
            let st = self.state.lock().await;
            if let Some(value) = st.db.get(balance_key(&raw))? {
                let bal = ParticipantBalance::decode(&value)?;
                summary.accumulated = Some(bal.accumulated);
                summary.rewardpending = Some(bal.pending);
                summary.rewardpaidout = Some(bal.paid_out);
                summary.laststaking = Some(bal.last_stake_weight);
            }
        }

        let utxos = self.node.unspent_for_address(STAKE_WALLET, address).await?;
        for utxo in utxos.as_array().into_iter().flatten() {
            match utxo.get("amount").map(parse_coin) {
                Some(Ok(v)) => summary.currenttotal += v,
                _ => warn!(%address, "unparseable utxo amount"),
            }
        }
        Ok(summary)
    }

    /// The last 12 month aggregates, newest first.
    pub async fn get_metrics(&self) -> Result<Vec<MonthSummary>, PoolError> {
        let st = self.state.lock().await;
        let mut months = Vec::new();
        for (key, value) in
            st.db
                .prefix_scan(&[DBT_POOL_METRICS], ScanOrder::Descending, Some(12))?
        {
            let rec = MonthMetricRecord::decode(&value)?;
            months.push(MonthSummary {
                month: String::from_utf8_lossy(&key[1..]).into_owned(),
                blocks: rec.blocks,
                avgpoolcoin: if rec.blocks > 0 {
                    rec.coin_sum / rec.blocks as u128
                } else {
                    0
                },
                disbursed: rec.disbursed_sum,
            });
        }
        Ok(months)
    }

    /// Drop all month aggregates and replay them from the found-block and
    /// settled-payout records.
    pub async fn rebuild_metrics(&self) -> Result<RebuildResult, PoolError> {
        let st = self.state.lock().await;

        let mut batch = WriteBatch::new();
        for (key, _) in st
            .db
            .prefix_scan(&[DBT_POOL_METRICS], ScanOrder::Ascending, None)?
        {
            batch.delete(key);
        }

        let mut month_of_height: HashMap<i32, String> = HashMap::new();
        let mut processed = 0usize;

        for (key, value) in st
            .db
            .prefix_scan(&[DBT_POOL_BLOCK], ScanOrder::Ascending, None)?
        {
            let height = unpack_i32(&key[1..])?;
            let rec = PoolBlockRecord::decode(&value)?;
            let time = self.node.block_time(&hex::encode(rec.hash)).await?;
            let month = month_key_for(time);
            month_of_height.insert(height, month.clone());
            crate::pool::metrics::bump_month(
                &st.db,
                &mut batch,
                &month,
                1,
                rec.pool_coin_total as u128,
                0,
            )?;
            processed += 1;
        }

        for (key, value) in st
            .db
            .prefix_scan(&[DBT_POOL_PAYOUT], ScanOrder::Ascending, None)?
        {
            let height = unpack_i32(&key[1..])?;
            let disbursed = unpack_u64(&value)?;
            let month = match month_of_height.get(&height) {
                Some(m) => m.clone(),
                None => {
                    let hash = self.node.block_hash(height).await?;
                    let time = self.node.block_time(&hash).await?;
                    let month = month_key_for(time);
                    month_of_height.insert(height, month.clone());
                    month
                }
            };
            crate::pool::metrics::bump_month(&st.db, &mut batch, &month, 0, 0, disbursed)?;
        }

        st.db.commit(batch)?;
        Ok(RebuildResult {
            processedblocks: processed,
        })
    }

    /// Outstanding payout transactions, newest first, optionally expanded
    /// with the raw transaction as the node reports it.
    pub async fn get_pending(
        &self,
        expand_detail: bool,
    ) -> Result<Vec<PendingPaymentSummary>, PoolError> {
        let mut pending = Vec::new();
        {
            let st = self.state.lock().await;
            for (key, value) in st.db.prefix_scan(
                &[DBT_POOL_PENDING_PAYOUT],
                ScanOrder::Descending,
                None,
            )? {
                let rec = PendingPayoutRecord::decode(&value)?;
                pending.push(PendingPaymentSummary {
                    txid: hex::encode(&key[1..]),
                    disbursed: rec.disbursed,
                    fee: rec.fee,
                    detail: None,
                });
            }
        }
        if expand_detail {
            for entry in &mut pending {
                match self.node.raw_transaction(&entry.txid).await {
                    Ok(tx) => entry.detail = Some(tx),
                    Err(e) => warn!(txid = %entry.txid, error = %e, "pending tx lookup failed"),
                }
            }
        }
        Ok(pending)
    }

    pub async fn get_versions(&self) -> Result<Versions, PoolError> {
        let node = self.node.node_subversion().await?;
        Ok(Versions {
            pool: env!("CARGO_PKG_VERSION").to_string(),
            node,
        })
    }

    /// The stake wallet's current vote settings as the node reports them.
    pub async fn get_voting_info(&self) -> Result<Value, PoolError> {
        Ok(self.node.vote_history(STAKE_WALLET).await?)
    }

    /// Live parameters plus identity, for page headers.
    pub async fn display_info(&self) -> DisplayInfo {
        let st = self.state.lock().await;
        DisplayInfo {
            pool_addr: st.pool_addr.clone(),
            pool_fee_percent: st.params.pool_fee_percent(),
            stake_bonus_percent: st.params.stake_bonus_percent(),
            payout_threshold: st.params.payout_threshold,
            min_blocks_between_payments: st.params.min_blocks_between_payments,
            min_output_value: st.params.min_output_value,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DisplayInfo {
    pub pool_addr: String,
    pub pool_fee_percent: f64,
    pub stake_bonus_percent: f64,
    pub payout_threshold: u64,
    pub min_blocks_between_payments: i32,
    pub min_output_value: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_row_decodes_key_and_value() {
        let rec = PoolBlockRecord {
            hash: [1u8; 32],
            reward: 9,
            pool_coin_total: 11,
        };
        let key = schema::block_key(400);
        let row = decode_block_row(&key, &rec.encode()).unwrap();
        assert_eq!(row.height, 400);
        assert_eq!(row.blockreward, 9);
        assert_eq!(row.blockhash, hex::encode([1u8; 32]));
    }
}
