// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Per-month pool aggregates, rebuildable from the found-block and settled
//! payout records.

use crate::db::schema::{MonthMetricRecord, metric_key};
use crate::db::{Error, Store, WriteBatch, read_through};
use chrono::{DateTime, Utc};

/// `"YYYY-MM"` month key for a block timestamp, in UTC.
pub fn month_key_for(timestamp: i64) -> String {
    let dt = DateTime::<Utc>::from_timestamp(timestamp, 0).unwrap_or_default();
    dt.format("%Y-%m").to_string()
}

/// Fold a block's contribution into its month aggregate inside the batch.
pub fn bump_month<DB: Store>(
    db: &DB,
    batch: &mut WriteBatch,
    month: &str,
    blocks: i32,
    coin: u128,
    disbursed: u64,
) -> Result<(), Error> {
    let key = metric_key(month);
    let mut metric = match read_through(db, batch, &key)? {
        Some(raw) => MonthMetricRecord::decode(&raw)?,
        None => MonthMetricRecord::default(),
    };
    metric.blocks += blocks;
    metric.coin_sum += coin;
    metric.disbursed_sum = metric.disbursed_sum.saturating_add(disbursed);
    batch.put(key, metric.encode());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryDb;

    #[test]
    fn month_key_is_utc() {
        // 2019-07-01T00:30:00Z
        assert_eq!(month_key_for(1_561_941_000), "2019-07");
        assert_eq!(month_key_for(0), "1970-01");
    }

    #[test]
    fn bump_accumulates_within_a_batch() {
        let db = MemoryDb::default();
        let mut batch = WriteBatch::new();
        bump_month(&db, &mut batch, "2019-07", 1, 100, 0).unwrap();
        bump_month(&db, &mut batch, "2019-07", 1, 250, 40).unwrap();
        db.commit(batch).unwrap();

        let raw = db.get(metric_key("2019-07")).unwrap().unwrap();
        let metric = MonthMetricRecord::decode(&raw).unwrap();
        assert_eq!(metric.blocks, 2);
        assert_eq!(metric.coin_sum, 350);
        assert_eq!(metric.disbursed_sum, 40);
    }
}
