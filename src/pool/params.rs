// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Height-indexed parameter activation.

use crate::codec::COIN;
use crate::config::ParameterRecord;
use tracing::info;

/// The live parameter set.
///
/// Percentages from the config are held as integer fractions per 10^8 of the
/// block reward so that apportionment stays integral end to end.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolParameters {
    pub pool_fee_frac: u64,
    pub stake_bonus_frac: u64,
    /// Satoshi a participant must have accumulated before a payout is cut.
    pub payout_threshold: u64,
    pub min_blocks_between_payments: i32,
    /// Pooled outputs below this value are ignored when apportioning.
    pub min_output_value: u64,
    pub tx_fee_per_kb: Option<f64>,
    pub smsg_fee_rate_target: Option<f64>,
}

impl Default for PoolParameters {
    fn default() -> Self {
        Self {
            pool_fee_frac: percent_to_frac(2.0),
            stake_bonus_frac: percent_to_frac(5.0),
            payout_threshold: COIN / 2,
            min_blocks_between_payments: 100,
            min_output_value: COIN / 10,
            tx_fee_per_kb: None,
            smsg_fee_rate_target: None,
        }
    }
}

impl PoolParameters {
    pub fn pool_fee_percent(&self) -> f64 {
        self.pool_fee_frac as f64 / 1_000_000.0
    }

    pub fn stake_bonus_percent(&self) -> f64 {
        self.stake_bonus_frac as f64 / 1_000_000.0
    }
}

/// Convert a percentage into a fraction per 10^8.
pub fn percent_to_frac(percent: f64) -> u64 {
    (percent * 1_000_000.0).round() as u64
}

/// Convert a coin amount from the config into satoshi.
pub fn coin_to_sat(coin: f64) -> u64 {
    (coin * COIN as f64).round() as u64
}

/// `⌊v · frac / 10^8⌋`
pub fn mul_frac(v: u64, frac: u64) -> u64 {
    (v as u128 * frac as u128 / COIN as u128) as u64
}

/// The config's parameter records, sorted by activation height. Records are
/// applied at most once and never replayed.
#[derive(Debug, Clone)]
pub struct ParamSchedule {
    records: Vec<ParameterRecord>,
    last_applied: i32,
}

impl ParamSchedule {
    pub fn new(mut records: Vec<ParameterRecord>) -> Self {
        records.sort_by_key(|p| p.height);
        Self {
            records,
            last_applied: -1,
        }
    }

    /// Activate every record with `last_applied < record.height <= height`,
    /// mutating `live`. Returns whether anything changed.
    pub fn apply_through(&mut self, height: i32, live: &mut PoolParameters) -> bool {
        let mut changed = false;
        for p in &self.records {
            if p.height <= self.last_applied {
                continue;
            }
            if p.height > height {
                break;
            }
            info!(height, activates_at = p.height, "setting parameters");
            if let Some(v) = p.poolfeepercent {
                live.pool_fee_frac = percent_to_frac(v);
            }
            if let Some(v) = p.stakebonuspercent {
                live.stake_bonus_frac = percent_to_frac(v);
            }
            if let Some(v) = p.payoutthreshold {
                live.payout_threshold = coin_to_sat(v);
            }
            if let Some(v) = p.minblocksbetweenpayments {
                live.min_blocks_between_payments = v;
            }
            if let Some(v) = p.minoutputvalue {
                live.min_output_value = coin_to_sat(v);
            }
            if let Some(v) = p.txfeerate {
                live.tx_fee_per_kb = Some(v);
            }
            if let Some(v) = p.smsgfeeratetarget {
                live.smsg_fee_rate_target = Some(v);
            }
            self.last_applied = p.height;
            changed = true;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(height: i32, fee: f64) -> ParameterRecord {
        ParameterRecord {
            height,
            poolfeepercent: Some(fee),
            stakebonuspercent: None,
            payoutthreshold: None,
            minblocksbetweenpayments: None,
            minoutputvalue: None,
            txfeerate: None,
            smsgfeeratetarget: None,
        }
    }

    #[test]
    fn applies_largest_height_at_or_below() {
        // Deliberately unsorted input.
        let mut schedule = ParamSchedule::new(vec![record(100, 4.0), record(0, 3.0)]);
        let mut live = PoolParameters::default();

        assert!(schedule.apply_through(50, &mut live));
        assert_eq!(live.pool_fee_frac, percent_to_frac(3.0));

        // Nothing new between activations.
        assert!(!schedule.apply_through(99, &mut live));

        assert!(schedule.apply_through(150, &mut live));
        assert_eq!(live.pool_fee_frac, percent_to_frac(4.0));
    }

    #[test]
    fn activation_is_not_retroactive() {
        let mut schedule = ParamSchedule::new(vec![record(0, 3.0), record(10, 4.0)]);
        let mut live = PoolParameters::default();
        // Jumping straight past both applies both, in order, once.
        assert!(schedule.apply_through(20, &mut live));
        assert_eq!(live.pool_fee_frac, percent_to_frac(4.0));
        assert!(!schedule.apply_through(20, &mut live));
    }

    #[test]
    fn partial_records_keep_previous_values() {
        let mut schedule = ParamSchedule::new(vec![
            ParameterRecord {
                height: 0,
                poolfeepercent: Some(3.0),
                stakebonuspercent: Some(1.0),
                payoutthreshold: Some(0.5),
                minblocksbetweenpayments: Some(50),
                minoutputvalue: Some(0.1),
                txfeerate: None,
                smsgfeeratetarget: None,
            },
            record(10, 4.0),
        ]);
        let mut live = PoolParameters::default();
        schedule.apply_through(10, &mut live);
        assert_eq!(live.pool_fee_frac, percent_to_frac(4.0));
        // untouched by the second record
        assert_eq!(live.stake_bonus_frac, percent_to_frac(1.0));
        assert_eq!(live.payout_threshold, COIN / 2);
        assert_eq!(live.min_blocks_between_payments, 50);
    }

    #[test]
    fn fraction_arithmetic_is_floor() {
        // 3% of 100_000 sat
        assert_eq!(mul_frac(100_000, percent_to_frac(3.0)), 3_000);
        // floor on an inexact split
        assert_eq!(mul_frac(99, percent_to_frac(3.0)), 2);
        assert_eq!(coin_to_sat(0.1), 10_000_000);
        assert_eq!(coin_to_sat(0.5), 50_000_000);
    }
}
