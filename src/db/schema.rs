// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Persisted layout of the pool ledger.
//!
//! Every key is a single tag byte followed by its payload. Values are
//! fixed-width big-endian fields in the order documented on each record.

use super::{Error, Store, WriteBatch, read_through};
use crate::codec::{
    pack_i32, pack_u64, pack_u128, unpack_i32, unpack_u64, unpack_u128,
};

pub const DBT_DATA: u8 = b'd';
pub const DBT_BAL: u8 = b'b';
pub const DBT_POOL_BAL: u8 = b'p';
pub const DBT_POOL_BLOCK: u8 = b'B';
pub const DBT_POOL_PAYOUT: u8 = b'P';
pub const DBT_POOL_PENDING_PAYOUT: u8 = b'Q';
pub const DBT_POOL_METRICS: u8 = b'M';

/// Current on-disk schema version, stored under `d/db_version`.
pub const DB_VERSION: i32 = 1;

/// Singleton counter names under the `d` tag.
pub mod counters {
    pub const CURRENT_HEIGHT: &[u8] = b"current_height";
    pub const DB_VERSION: &[u8] = b"db_version";
    pub const BLOCKS_FOUND: &[u8] = b"blocks_found";
    pub const LAST_PAYMENT_RUN: &[u8] = b"last_payment_run";
    pub const LAST_WITHDRAWAL_RUN: &[u8] = b"last_withdrawal_run";
    pub const POOL_ADDR: &[u8] = b"pool_addr";
    pub const REWARD_ADDR: &[u8] = b"reward_addr";
    pub const POOL_FEES: &[u8] = b"pool_fees";
    pub const POOL_FEES_DETECTED: &[u8] = b"pool_fees_detected";
    pub const POOL_WITHDRAWN: &[u8] = b"pool_withdrawn";
    pub const POOL_DISBURSED: &[u8] = b"pool_disbursed";
}

fn tagged(tag: u8, payload: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + payload.len());
    key.push(tag);
    key.extend_from_slice(payload);
    key
}

pub fn data_key(name: &[u8]) -> Vec<u8> {
    tagged(DBT_DATA, name)
}

/// Balance record key: `b || spend-address payload`.
pub fn balance_key(addr: &[u8]) -> Vec<u8> {
    tagged(DBT_BAL, addr)
}

/// Pool reward balance key: `p || reward-address payload`.
pub fn pool_balance_key(addr: &[u8]) -> Vec<u8> {
    tagged(DBT_POOL_BAL, addr)
}

/// Found-block key: `B || i32 height`.
pub fn block_key(height: i32) -> Vec<u8> {
    tagged(DBT_POOL_BLOCK, &pack_i32(height))
}

/// Settled payout key: `P || i32 height || txid`.
pub fn payout_key(height: i32, txid: &[u8; 32]) -> Vec<u8> {
    let mut key = tagged(DBT_POOL_PAYOUT, &pack_i32(height));
    key.extend_from_slice(txid);
    key
}

/// Outstanding payout key: `Q || txid`.
pub fn pending_payout_key(txid: &[u8; 32]) -> Vec<u8> {
    tagged(DBT_POOL_PENDING_PAYOUT, txid)
}

/// Month aggregate key: `M || "YYYY-MM"`.
pub fn metric_key(month: &str) -> Vec<u8> {
    tagged(DBT_POOL_METRICS, month.as_bytes())
}

/// Per-participant ledger entry, `u128 accumulated || u64 pending ||
/// u64 paid_out || u64 last_stake_weight`. `accumulated` carries
/// satoshi×10^8 sub-satoshi precision; the other fields are satoshi.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParticipantBalance {
    pub accumulated: u128,
    pub pending: u64,
    pub paid_out: u64,
    pub last_stake_weight: u64,
}

impl ParticipantBalance {
    pub fn encode(&self) -> Vec<u8> {
        let mut v = Vec::with_capacity(40);
        v.extend_from_slice(&pack_u128(self.accumulated));
        v.extend_from_slice(&pack_u64(self.pending));
        v.extend_from_slice(&pack_u64(self.paid_out));
        v.extend_from_slice(&pack_u64(self.last_stake_weight));
        v
    }

    pub fn decode(b: &[u8]) -> Result<Self, Error> {
        Ok(Self {
            accumulated: unpack_u128(b)?,
            pending: unpack_u64(b.get(16..).unwrap_or_default())?,
            paid_out: unpack_u64(b.get(24..).unwrap_or_default())?,
            last_stake_weight: unpack_u64(b.get(32..).unwrap_or_default())?,
        })
    }
}

/// A block the pool won: `hash(32) || u64 block_reward || u64 pool_coin_total`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolBlockRecord {
    pub hash: [u8; 32],
    pub reward: u64,
    pub pool_coin_total: u64,
}

impl PoolBlockRecord {
    pub fn encode(&self) -> Vec<u8> {
        let mut v = Vec::with_capacity(48);
        v.extend_from_slice(&self.hash);
        v.extend_from_slice(&pack_u64(self.reward));
        v.extend_from_slice(&pack_u64(self.pool_coin_total));
        v
    }

    pub fn decode(b: &[u8]) -> Result<Self, Error> {
        let hash: [u8; 32] = b
            .get(..32)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| Error::Corrupt("short pool block record".into()))?;
        Ok(Self {
            hash,
            reward: unpack_u64(b.get(32..).unwrap_or_default())?,
            pool_coin_total: unpack_u64(b.get(40..).unwrap_or_default())?,
        })
    }
}

/// Payout transaction awaiting on-chain observation:
/// `u64 disbursed || u64 fee` (fee is cumulative over the payment run).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingPayoutRecord {
    pub disbursed: u64,
    pub fee: u64,
}

impl PendingPayoutRecord {
    pub fn encode(&self) -> Vec<u8> {
        let mut v = Vec::with_capacity(16);
        v.extend_from_slice(&pack_u64(self.disbursed));
        v.extend_from_slice(&pack_u64(self.fee));
        v
    }

    pub fn decode(b: &[u8]) -> Result<Self, Error> {
        Ok(Self {
            disbursed: unpack_u64(b)?,
            fee: unpack_u64(b.get(8..).unwrap_or_default())?,
        })
    }
}

/// Month aggregate: `i32 blocks || u128 pool_coin_total_sum || u64 disbursed_sum`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MonthMetricRecord {
    pub blocks: i32,
    pub coin_sum: u128,
    pub disbursed_sum: u64,
}

impl MonthMetricRecord {
    pub fn encode(&self) -> Vec<u8> {
        let mut v = Vec::with_capacity(28);
        v.extend_from_slice(&pack_i32(self.blocks));
        v.extend_from_slice(&pack_u128(self.coin_sum));
        v.extend_from_slice(&pack_u64(self.disbursed_sum));
        v
    }

    pub fn decode(b: &[u8]) -> Result<Self, Error> {
        Ok(Self {
            blocks: unpack_i32(b)?,
            coin_sum: unpack_u128(b.get(4..).unwrap_or_default())?,
            disbursed_sum: unpack_u64(b.get(20..).unwrap_or_default())?,
        })
    }
}

/// Read a u64 counter through the batch mirror; missing means 0.
pub fn get_u64<DB: Store>(db: &DB, batch: &WriteBatch, key: &[u8]) -> Result<u64, Error> {
    match read_through(db, batch, key)? {
        Some(v) => Ok(unpack_u64(&v)?),
        None => Ok(0),
    }
}

/// Read an i32 counter through the batch mirror; missing means 0.
pub fn get_i32<DB: Store>(db: &DB, batch: &WriteBatch, key: &[u8]) -> Result<i32, Error> {
    match read_through(db, batch, key)? {
        Some(v) => Ok(unpack_i32(&v)?),
        None => Ok(0),
    }
}

/// Add `delta` to a u64 counter inside the batch, returning the new total.
pub fn add_u64<DB: Store>(
    db: &DB,
    batch: &mut WriteBatch,
    key: &[u8],
    delta: u64,
) -> Result<u64, Error> {
    let total = get_u64(db, batch, key)?.saturating_add(delta);
    batch.put(key.to_vec(), pack_u64(total));
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryDb;

    #[test]
    fn participant_balance_layout() {
        let bal = ParticipantBalance {
            accumulated: 97 * 10u128.pow(10),
            pending: 5,
            paid_out: 11,
            last_stake_weight: 70,
        };
        let raw = bal.encode();
        assert_eq!(raw.len(), 40);
        assert_eq!(ParticipantBalance::decode(&raw).unwrap(), bal);
        assert!(ParticipantBalance::decode(&raw[..39]).is_err());
    }

    #[test]
    fn pool_block_layout() {
        let rec = PoolBlockRecord {
            hash: [0xab; 32],
            reward: 100_000,
            pool_coin_total: 1_000_000,
        };
        let raw = rec.encode();
        assert_eq!(raw.len(), 48);
        assert_eq!(PoolBlockRecord::decode(&raw).unwrap(), rec);
    }

    #[test]
    fn month_metric_layout() {
        let rec = MonthMetricRecord {
            blocks: 3,
            coin_sum: 12_345,
            disbursed_sum: 678,
        };
        let raw = rec.encode();
        assert_eq!(raw.len(), 28);
        assert_eq!(MonthMetricRecord::decode(&raw).unwrap(), rec);
    }

    #[test]
    fn counters_default_to_zero_and_accumulate() {
        let db = MemoryDb::default();
        let mut batch = WriteBatch::new();
        let key = data_key(counters::POOL_FEES);
        assert_eq!(get_u64(&db, &batch, &key).unwrap(), 0);
        add_u64(&db, &mut batch, &key, 7).unwrap();
        // Visible through the mirror before commit, invisible without it.
        assert_eq!(get_u64(&db, &batch, &key).unwrap(), 7);
        assert_eq!(get_u64(&db, &WriteBatch::new(), &key).unwrap(), 0);
        add_u64(&db, &mut batch, &key, 3).unwrap();
        db.commit(batch).unwrap();
        assert_eq!(get_u64(&db, &WriteBatch::new(), &key).unwrap(), 10);
    }

    #[test]
    fn keys_are_tag_prefixed() {
        assert_eq!(data_key(b"x")[0], DBT_DATA);
        assert_eq!(balance_key(&[1, 2])[0], DBT_BAL);
        assert_eq!(block_key(5), vec![DBT_POOL_BLOCK, 0, 0, 0, 5]);
        let txid = [9u8; 32];
        assert_eq!(payout_key(5, &txid).len(), 37);
        assert_eq!(pending_payout_key(&txid).len(), 33);
    }
}
