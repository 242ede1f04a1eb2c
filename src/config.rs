// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Settings consumed from `dataDir/stakepool.json`, supplied once at start.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("settings file not found: {0}")]
    NotFound(PathBuf),

    #[error("could not parse settings: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    #[error("invalid setting: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Master,
    Observer,
}

/// A parameter set activating at `height`. Absent fields leave the previous
/// value in force.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRecord {
    pub height: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poolfeepercent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stakebonuspercent: Option<f64>,
    /// Coin units, converted to satoshi at activation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payoutthreshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minblocksbetweenpayments: Option<i32>,
    /// Coin units, converted to satoshi at activation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minoutputvalue: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txfeerate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smsgfeeratetarget: Option<f64>,
}

/// Owner withdrawal schedule. Destinations are either the single `address`
/// (weight 1) or a weighted map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalSettings {
    pub frequency: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destinations: Option<BTreeMap<String, u64>>,
    /// Coin units left in the wallet after a withdrawal.
    pub reserve: f64,
    /// Extra coin that must have accrued beyond the reserve before a
    /// withdrawal triggers.
    pub threshold: f64,
}

impl WithdrawalSettings {
    /// Normalized `(address, weight)` list, in deterministic order.
    pub fn destination_list(&self) -> Vec<(String, u64)> {
        if let Some(map) = &self.destinations {
            map.iter().map(|(a, w)| (a.clone(), *w)).collect()
        } else if let Some(addr) = &self.address {
            vec![(addr.clone(), 1)]
        } else {
            Vec::new()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub mode: Mode,
    pub pooladdress: String,
    pub rewardaddress: String,
    pub startheight: i32,
    pub maxoutputspertx: usize,
    pub zmqhost: String,
    pub zmqport: u32,
    pub rpchost: String,
    pub rpcport: Option<u16>,
    pub rpcauth: Option<String>,
    pub particldatadir: Option<PathBuf>,
    pub htmlhost: Option<String>,
    pub htmlport: u16,
    pub allowcors: bool,
    pub management_key_salt: Option<String>,
    pub management_key_hash: Option<String>,
    pub configurl: Option<String>,
    pub parameters: Vec<ParameterRecord>,
    pub poolownerwithdrawal: Option<WithdrawalSettings>,
    pub debug: bool,
    pub writelogfile: bool,
    pub logtime: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: Mode::Master,
            pooladdress: String::new(),
            rewardaddress: String::new(),
            startheight: 0,
            maxoutputspertx: 48,
            zmqhost: "tcp://127.0.0.1".to_string(),
            zmqport: 207922,
            rpchost: "127.0.0.1".to_string(),
            rpcport: None,
            rpcauth: None,
            particldatadir: None,
            htmlhost: None,
            htmlport: 9000,
            allowcors: true,
            management_key_salt: None,
            management_key_hash: None,
            configurl: None,
            parameters: Vec::new(),
            poolownerwithdrawal: None,
            debug: false,
            writelogfile: true,
            logtime: true,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::NotFound(path.to_path_buf()))?;
        let settings: Settings = serde_json::from_str(&raw)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pooladdress.is_empty() {
            return Err(ConfigError::Missing("pooladdress"));
        }
        if self.rewardaddress.is_empty() {
            return Err(ConfigError::Missing("rewardaddress"));
        }
        if self.mode == Mode::Observer && self.configurl.is_none() {
            return Err(ConfigError::Missing("configurl"));
        }
        if self.maxoutputspertx == 0 {
            return Err(ConfigError::Invalid(
                "maxoutputspertx must be positive".into(),
            ));
        }
        for w in windows_of_heights(&self.parameters) {
            if w[0] == w[1] {
                return Err(ConfigError::Invalid(format!(
                    "duplicate parameter activation height {}",
                    w[0]
                )));
            }
        }
        if let Some(w) = &self.poolownerwithdrawal {
            if w.reserve < 0.0 || w.threshold < 0.0 {
                return Err(ConfigError::Invalid(
                    "withdrawal reserve and threshold must be non-negative".into(),
                ));
            }
            if w.address.is_some() && w.destinations.is_some() {
                return Err(ConfigError::Invalid(
                    "withdrawal takes either address or destinations, not both".into(),
                ));
            }
        }
        Ok(())
    }
}

fn windows_of_heights(params: &[ParameterRecord]) -> Vec<[i32; 2]> {
    let mut heights: Vec<i32> = params.iter().map(|p| p.height).collect();
    heights.sort_unstable();
    heights.windows(2).map(|w| [w[0], w[1]]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_settings() -> serde_json::Value {
        json!({
            "mode": "master",
            "pooladdress": "tpcs1qqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqq",
            "rewardaddress": "rTvwXzVtqVKvJHx4Vh2eTgpdGbJmQhFsxU",
            "startheight": 200000,
            "zmqport": 208922
        })
    }

    #[test]
    fn defaults_fill_optional_settings() {
        let s: Settings = serde_json::from_value(base_settings()).unwrap();
        assert_eq!(s.maxoutputspertx, 48);
        assert!(s.allowcors);
        assert!(s.writelogfile);
        assert!(s.parameters.is_empty());
        s.validate().unwrap();
    }

    #[test]
    fn observer_requires_configurl() {
        let mut v = base_settings();
        v["mode"] = json!("observer");
        let s: Settings = serde_json::from_value(v.clone()).unwrap();
        assert!(matches!(s.validate(), Err(ConfigError::Missing("configurl"))));

        v["configurl"] = json!("https://pool.example/config");
        let s: Settings = serde_json::from_value(v).unwrap();
        s.validate().unwrap();
    }

    #[test]
    fn duplicate_parameter_heights_rejected() {
        let mut v = base_settings();
        v["parameters"] = json!([
            { "height": 0, "poolfeepercent": 2.0 },
            { "height": 0, "poolfeepercent": 3.0 }
        ]);
        let s: Settings = serde_json::from_value(v).unwrap();
        assert!(s.validate().is_err());
    }

    #[test]
    fn withdrawal_destination_list() {
        let single = WithdrawalSettings {
            frequency: 10000,
            address: Some("addr1".into()),
            destinations: None,
            reserve: 10.0,
            threshold: 5.0,
        };
        assert_eq!(single.destination_list(), vec![("addr1".to_string(), 1)]);

        let weighted = WithdrawalSettings {
            frequency: 10000,
            address: None,
            destinations: Some(BTreeMap::from([
                ("addr2".to_string(), 3),
                ("addr1".to_string(), 1),
            ])),
            reserve: 10.0,
            threshold: 5.0,
        };
        // deterministic, sorted by address
        assert_eq!(
            weighted.destination_list(),
            vec![("addr1".to_string(), 1), ("addr2".to_string(), 3)]
        );
    }
}
