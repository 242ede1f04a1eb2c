// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::path::PathBuf;

use clap::Parser;
use directories::BaseDirs;

use crate::chain::Chain;

#[derive(Debug, Parser)]
#[command(
    name = "coldstakepool-run",
    version,
    about = "Particl cold-staking pool daemon"
)]
pub struct Cli {
    /// Pool data directory holding stakepool.json and the ledger database.
    /// Defaults to ~/.particl[/<chain>]/stakepool.
    #[arg(long)]
    pub datadir: Option<PathBuf>,

    /// Follow the test network.
    #[arg(long, conflicts_with = "regtest")]
    pub testnet: bool,

    /// Follow a local regression-test network.
    #[arg(long)]
    pub regtest: bool,
}

impl Cli {
    pub fn chain(&self) -> Chain {
        if self.testnet {
            Chain::Testnet
        } else if self.regtest {
            Chain::Regtest
        } else {
            Chain::Mainnet
        }
    }

    pub fn data_dir(&self, chain: Chain) -> PathBuf {
        if let Some(dir) = &self.datadir {
            return dir.clone();
        }
        let home = BaseDirs::new()
            .map(|d| d.home_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        let base = home.join(".particl");
        match chain {
            Chain::Mainnet => base.join("stakepool"),
            Chain::Testnet => base.join("testnet").join("stakepool"),
            Chain::Regtest => base.join("regtest").join("stakepool"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_flags() {
        let cli = Cli::parse_from(["coldstakepool-run"]);
        assert_eq!(cli.chain(), Chain::Mainnet);
        let cli = Cli::parse_from(["coldstakepool-run", "--testnet"]);
        assert_eq!(cli.chain(), Chain::Testnet);
        let cli = Cli::parse_from(["coldstakepool-run", "--regtest"]);
        assert_eq!(cli.chain(), Chain::Regtest);
    }

    #[test]
    fn default_data_dir_nests_non_mainnet_chains() {
        let cli = Cli::parse_from(["coldstakepool-run"]);
        let mainnet = cli.data_dir(Chain::Mainnet);
        let testnet = cli.data_dir(Chain::Testnet);
        assert!(mainnet.ends_with(".particl/stakepool"));
        assert!(testnet.ends_with(".particl/testnet/stakepool"));
    }

    #[test]
    fn explicit_data_dir_wins() {
        let cli = Cli::parse_from(["coldstakepool-run", "--datadir", "/srv/pool"]);
        assert_eq!(cli.data_dir(Chain::Testnet), PathBuf::from("/srv/pool"));
    }
}
