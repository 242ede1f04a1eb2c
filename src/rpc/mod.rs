// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Typed wrapper over the node's JSON-RPC interface.
//!
//! [`NodeRpc`] is the seam the engine is generic over: the concrete
//! [`RpcClient`] talks JSON-RPC 1.0 over HTTP basic auth, tests substitute a
//! scripted node. Every call is single-flight, exactly one HTTP round-trip
//! with no retries; retry policy belongs to callers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use url::Url;

use crate::codec::parse_coin;

#[derive(Debug, Error)]
pub enum Error {
    #[error("rpc {method}: connect: {reason}")]
    Connect { method: String, reason: String },

    #[error("rpc {method}: http status {status}")]
    Http { method: String, status: u16 },

    #[error("rpc {method}: invalid response: {reason}")]
    Parse { method: String, reason: String },

    #[error("rpc {method}: node error: {message}")]
    Node { method: String, message: String },
}

impl Error {
    fn parse(method: &str, reason: impl ToString) -> Self {
        Error::Parse {
            method: method.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// The node's description of a block's coinstake and reward.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockRewardInfo {
    pub blockhash: String,
    pub blockreward: Value,
    #[serde(default)]
    pub blocktime: Option<i64>,
    #[serde(default)]
    pub coinstake: Option<String>,
    #[serde(default)]
    pub kernelscript: Option<ScriptInfo>,
    #[serde(default)]
    pub outputs: Vec<RewardOutput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptInfo {
    #[serde(default)]
    pub spendaddr: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RewardOutput {
    pub value: Value,
    #[serde(default)]
    pub script: Option<ScriptInfo>,
}

/// One pooled output eligible for reward apportionment. The node reports
/// `value` in satoshi.
#[derive(Debug, Clone, Deserialize)]
pub struct StakedOutput {
    pub addrspend: String,
    pub value: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddressDelta {
    pub txid: String,
    pub satoshis: i64,
}

/// A payout destination handed to `sendtypeto`; amounts are formatted coin
/// strings so the node never sees floats from us.
#[derive(Debug, Clone, Serialize)]
pub struct SendOutput {
    pub address: String,
    pub amount: String,
}

#[derive(Debug, Clone)]
pub struct SendResult {
    pub txid: String,
    pub fee: u64,
}

#[async_trait]
pub trait NodeRpc: Send + Sync {
    /// Raw JSON-RPC call. `wallet` routes the request to
    /// `/wallet/<name>` when non-empty.
    async fn call(
        &self,
        method: &str,
        params: Value,
        wallet: Option<&str>,
    ) -> Result<Value, Error>;

    async fn block_count(&self) -> Result<i64, Error> {
        let v = self.call("getblockchaininfo", json!([]), None).await?;
        v.get("blocks")
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::parse("getblockchaininfo", "missing blocks"))
    }

    async fn block_reward_at(&self, height: i32) -> Result<BlockRewardInfo, Error> {
        let v = self.call("getblockreward", json!([height]), None).await?;
        serde_json::from_value(v).map_err(|e| Error::parse("getblockreward", e))
    }

    async fn block_hash(&self, height: i32) -> Result<String, Error> {
        let v = self.call("getblockhash", json!([height]), None).await?;
        v.as_str()
            .map(str::to_owned)
            .ok_or_else(|| Error::parse("getblockhash", "expected string"))
    }

    async fn block_time(&self, hash: &str) -> Result<i64, Error> {
        let v = self.call("getblockheader", json!([hash]), None).await?;
        v.get("time")
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::parse("getblockheader", "missing time"))
    }

    async fn node_subversion(&self) -> Result<String, Error> {
        let v = self.call("getnetworkinfo", json!([]), None).await?;
        v.get("subversion")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| Error::parse("getnetworkinfo", "missing subversion"))
    }

    /// Pooled outputs that were eligible at `height` (mature, including
    /// currently staking ones).
    async fn cold_stake_unspent(
        &self,
        pool_addr: &str,
        height: i32,
    ) -> Result<Vec<StakedOutput>, Error> {
        let opts = json!({ "mature_only": true, "all_staked": true });
        let v = self
            .call("listcoldstakeunspent", json!([pool_addr, height, opts]), None)
            .await?;
        serde_json::from_value(v).map_err(|e| Error::parse("listcoldstakeunspent", e))
    }

    async fn address_deltas(
        &self,
        address: &str,
        height: i32,
    ) -> Result<Vec<AddressDelta>, Error> {
        let opts = json!({ "addresses": [address], "start": height, "end": height });
        let v = self.call("getaddressdeltas", json!([opts]), None).await?;
        serde_json::from_value(v).map_err(|e| Error::parse("getaddressdeltas", e))
    }

    async fn raw_transaction(&self, txid: &str) -> Result<Value, Error> {
        self.call("getrawtransaction", json!([txid, true]), None).await
    }

    async fn send_typeto(
        &self,
        wallet: &str,
        outputs: &[SendOutput],
        change_address: &str,
        fee_rate: Option<f64>,
    ) -> Result<SendResult, Error> {
        let mut opts = json!({ "show_fee": true, "changeaddress": change_address });
        if let Some(rate) = fee_rate {
            opts["feeRate"] = json!(rate);
        }
        let params = json!(["part", "part", outputs, "", "", 4, 64, false, opts]);
        let v = self.call("sendtypeto", params, Some(wallet)).await?;
        let txid = v
            .get("txid")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::parse("sendtypeto", "missing txid"))?
            .to_owned();
        let fee = v
            .get("fee")
            .ok_or_else(|| Error::parse("sendtypeto", "missing fee"))
            .and_then(|f| parse_coin(f).map_err(|e| Error::parse("sendtypeto", e)))?;
        Ok(SendResult { txid, fee })
    }

    async fn validate_address(&self, address: &str) -> Result<bool, Error> {
        let v = self.call("validateaddress", json!([address]), None).await?;
        Ok(v.get("isvalid").and_then(Value::as_bool).unwrap_or(false))
    }

    async fn wallet_info(&self, wallet: &str) -> Result<Value, Error> {
        self.call("getwalletinfo", json!([]), Some(wallet)).await
    }

    async fn staking_info(&self, wallet: &str) -> Result<Value, Error> {
        self.call("getstakinginfo", json!([]), Some(wallet)).await
    }

    async fn staking_options(&self, wallet: &str) -> Result<Value, Error> {
        self.call("walletsettings", json!(["stakingoptions"]), Some(wallet))
            .await
    }

    async fn set_staking_options(
        &self,
        wallet: &str,
        options: Value,
    ) -> Result<Value, Error> {
        self.call("walletsettings", json!(["stakingoptions", options]), Some(wallet))
            .await
    }

    async fn unspent_for_address(
        &self,
        wallet: &str,
        address: &str,
    ) -> Result<Value, Error> {
        let params = json!([1, 9_999_999, [address], true, { "include_immature": true }]);
        self.call("listunspent", params, Some(wallet)).await
    }

    async fn vote_history(&self, wallet: &str) -> Result<Value, Error> {
        self.call("votehistory", json!([true]), Some(wallet)).await
    }
}

/// JSON-RPC 1.0 client for the node.
#[derive(Debug, Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    base: Url,
    user: String,
    password: Option<String>,
}

impl RpcClient {
    /// `auth` is `user:password`, either from the `rpcauth` setting or the
    /// node's cookie file.
    pub fn new(host: &str, port: u16, auth: &str) -> anyhow::Result<Self> {
        let base = Url::parse(&format!("http://{host}:{port}/"))?;
        let (user, password) = match auth.trim().split_once(':') {
            Some((u, p)) => (u.to_owned(), Some(p.to_owned())),
            None => (auth.trim().to_owned(), None),
        };
        Ok(Self {
            http: reqwest::Client::new(),
            base,
            user,
            password,
        })
    }

    fn url_for(&self, method: &str, wallet: Option<&str>) -> Result<Url, Error> {
        let mut url = self.base.clone();
        if let Some(wallet) = wallet.filter(|w| !w.is_empty()) {
            url.path_segments_mut()
                .map_err(|_| Error::parse(method, "rpc url cannot be a base"))?
                .push("wallet")
                .push(wallet); // Url percent-encodes the segment
        }
        Ok(url)
    }
}

#[async_trait]
impl NodeRpc for RpcClient {
    async fn call(
        &self,
        method: &str,
        params: Value,
        wallet: Option<&str>,
    ) -> Result<Value, Error> {
        let url = self.url_for(method, wallet)?;
        let body = json!({ "method": method, "params": params, "id": 2 });
        let resp = self
            .http
            .post(url)
            .basic_auth(&self.user, self.password.as_deref())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                crate::metrics::RPC_FAILURES.inc();
                Error::Connect {
                    method: method.to_string(),
                    reason: e.to_string(),
                }
            })?;

        // The node answers some errors with a 500 that still carries a JSON
        // body; prefer the node's message over the bare status.
        let status = resp.status();
        let text = resp.text().await.map_err(|e| {
            crate::metrics::RPC_FAILURES.inc();
            Error::Connect {
                method: method.to_string(),
                reason: e.to_string(),
            }
        })?;
        let parsed: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => {
                crate::metrics::RPC_FAILURES.inc();
                if !status.is_success() {
                    return Err(Error::Http {
                        method: method.to_string(),
                        status: status.as_u16(),
                    });
                }
                return Err(Error::parse(method, e));
            }
        };

        match parsed.get("error") {
            Some(e) if !e.is_null() => {
                crate::metrics::RPC_FAILURES.inc();
                Err(Error::Node {
                    method: method.to_string(),
                    message: e.to_string(),
                })
            }
            _ => Ok(parsed.get("result").cloned().unwrap_or(Value::Null)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wallet_name_is_url_encoded() {
        let client = RpcClient::new("127.0.0.1", 51735, "user:pass").unwrap();
        let url = client.url_for("getwalletinfo", Some("pool reward")).unwrap();
        assert_eq!(url.path(), "/wallet/pool%20reward");
        let url = client.url_for("getblockchaininfo", None).unwrap();
        assert_eq!(url.path(), "/");
        let url = client.url_for("getblockchaininfo", Some("")).unwrap();
        assert_eq!(url.path(), "/");
    }

    #[test]
    fn auth_splits_on_first_colon() {
        let client = RpcClient::new("localhost", 1, "u:p:q").unwrap();
        assert_eq!(client.user, "u");
        assert_eq!(client.password.as_deref(), Some("p:q"));
    }
}
