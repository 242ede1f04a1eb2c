// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::fmt;
use std::path::{Path, PathBuf};

/// Which Particl network the pool follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Chain {
    #[default]
    Mainnet,
    Testnet,
    Regtest,
}

impl Chain {
    /// Human-readable part of the pool's cold-staking bech32 address.
    pub fn pool_address_hrp(self) -> &'static str {
        match self {
            Chain::Mainnet => "pcs",
            Chain::Testnet | Chain::Regtest => "tpcs",
        }
    }

    pub fn default_rpc_port(self) -> u16 {
        match self {
            Chain::Mainnet => 51735,
            Chain::Testnet => 51935,
            Chain::Regtest => 51936,
        }
    }

    /// Where the node drops its RPC auth cookie.
    pub fn cookie_path(self, node_data_dir: &Path) -> PathBuf {
        match self {
            Chain::Mainnet => node_data_dir.join(".cookie"),
            Chain::Testnet => node_data_dir.join("testnet").join(".cookie"),
            Chain::Regtest => node_data_dir.join("regtest").join(".cookie"),
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Chain::Mainnet => "mainnet",
            Chain::Testnet => "testnet",
            Chain::Regtest => "regtest",
        };
        write!(f, "{name}")
    }
}
