// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Start-up and parameter-change validation of the node's wallet settings.

use serde_json::{Value, json};
use tracing::{error, info, warn};

use super::{PoolError, PoolState, REWARD_WALLET, STAKE_WALLET, StakePool};
use crate::db::Store;
use crate::rpc::NodeRpc;

impl<DB: Store, N: NodeRpc> StakePool<DB, N> {
    /// Wait for the node RPC to come up, with linear backoff. Returns false
    /// and arms exit code 1 when it never does.
    pub async fn wait_for_node(&self) -> bool {
        for i in 0..20u64 {
            if !self.is_running() {
                return false;
            }
            match self.node.staking_options(STAKE_WALLET).await {
                Ok(_) => return true,
                Err(e) => {
                    warn!(error = %e, retry_in = i + 1, "can't connect to daemon RPC");
                    tokio::time::sleep(std::time::Duration::from_secs(i + 1)).await;
                }
            }
        }
        error!("can't connect to daemon RPC, exiting");
        self.stop(1);
        false
    }

    /// Full sanity pass: wallet settings plus withdrawal destinations.
    pub async fn run_sanity_checks(&self) -> Result<(), PoolError> {
        {
            let st = self.state.lock().await;
            self.check_wallet_settings(&st).await?;
        }

        if let Some(plan) = &self.cfg.withdrawal {
            let mut valid = true;
            for (address, weight) in &plan.destinations {
                if !self.node.validate_address(address).await.unwrap_or(false) {
                    warn!(%address, "invalid withdrawal destination");
                    valid = false;
                } else {
                    info!(%address, weight = *weight, "withdraw pool rewards to address");
                }
            }
            if !valid {
                let mut st = self.state.lock().await;
                st.have_withdrawal_info = false;
            }
        }
        {
            let st = self.state.lock().await;
            if st.have_withdrawal_info {
                if let Some(plan) = &self.cfg.withdrawal {
                    info!(
                        min_blocks_between_withdrawals = plan.frequency,
                        "pool reward withdrawal enabled"
                    );
                }
            } else {
                info!("pool reward withdrawal disabled");
            }
        }
        Ok(())
    }

    /// The stake wallet must stake to our reward address (pushed when it
    /// doesn't) and the reward wallet must not stake at all.
    pub(crate) async fn check_wallet_settings(
        &self,
        st: &PoolState<DB>,
    ) -> Result<(), PoolError> {
        let r = self.node.staking_options(STAKE_WALLET).await?;
        let configured = r
            .get("stakingoptions")
            .and_then(|o| o.get("rewardaddress"))
            .and_then(Value::as_str);
        if configured != Some(st.reward_addr.as_str()) {
            warn!(
                configured = configured.unwrap_or("unset"),
                expected = %st.reward_addr,
                "mismatched stake wallet reward address, updating staking options"
            );
            let mut options = json!({ "rewardaddress": st.reward_addr });
            if let Some(target) = st.params.smsg_fee_rate_target {
                options["smsgfeeratetarget"] = json!(target);
            }
            self.node.set_staking_options(STAKE_WALLET, options).await?;
        }

        let r = self.node.staking_options(REWARD_WALLET).await?;
        let enabled = r.get("stakingoptions").and_then(|o| o.get("enabled"));
        let disabled = match enabled {
            Some(Value::Bool(b)) => !b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("false"),
            _ => false,
        };
        if !disabled {
            warn!("staking is not disabled on the reward wallet");
        }
        Ok(())
    }
}
