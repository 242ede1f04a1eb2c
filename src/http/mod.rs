// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The HTML/JSON status server.
//!
//! Read-only: every route renders a ReadAPI snapshot. The management code,
//! when configured, gates the expensive endpoints (metrics rebuild, pending
//! detail expansion).

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::codec::{format_coin, format_coin16};
use crate::db::Store;
use crate::pool::StakePool;
use crate::pool::readapi::Summary;
use crate::rpc::NodeRpc;

pub struct AppState<DB, N> {
    pub engine: Arc<StakePool<DB, N>>,
    pub settings_path: PathBuf,
    pub management_key_salt: Option<String>,
    pub management_key_hash: Option<String>,
}

impl<DB, N> AppState<DB, N> {
    /// `hex(sha256(code || salt)) == hash`
    fn management_code_ok(&self, code: &str) -> bool {
        let (Some(salt), Some(hash)) =
            (&self.management_key_salt, &self.management_key_hash)
        else {
            return false;
        };
        let digest = Sha256::digest(format!("{code}{salt}").as_bytes());
        hex::encode(digest) == hash.to_lowercase()
    }
}

pub fn router<DB, N>(state: Arc<AppState<DB, N>>, allow_cors: bool) -> Router
where
    DB: Store + 'static,
    N: NodeRpc + 'static,
{
    let router = Router::new()
        .route("/", get(page_index))
        .route("/config", get(page_config))
        .route("/address/{addr}", get(page_address))
        .route("/version", get(page_version))
        .route("/voting", get(page_voting))
        .route("/json", get(json_index))
        .route("/json/address/{addr}", get(json_address))
        .route("/json/metrics", get(json_metrics))
        .route("/json/metrics/{code}", get(json_metrics_mgmt))
        .route("/json/pending", get(json_pending))
        .route("/json/pending/{code}", get(json_pending_mgmt))
        .route("/json/version", get(json_version))
        .route("/json/voting", get(json_voting))
        .route("/metrics", get(prometheus_metrics))
        .with_state(state);
    if allow_cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

fn page_error(error: &str) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html><html lang=\"en\">\n<head><meta charset=\"UTF-8\">\
         <title>Stake Pool Error</title></head><body>\
         <p>Error: {error}</p><p><a href='/'>home</a></p></body></html>"
    ))
}

fn js_error(error: impl ToString) -> Json<Value> {
    Json(json!({ "error": error.to_string() }))
}

async fn page_index<DB: Store, N: NodeRpc>(
    State(state): State<Arc<AppState<DB, N>>>,
) -> Html<String> {
    let summary = match state.engine.get_summary().await {
        Ok(s) => s,
        Err(e) => return page_error(&e.to_string()),
    };
    let info = state.engine.display_info().await;

    let mut content = format!(
        "<!DOCTYPE html><html lang=\"en\">\n<head><meta charset=\"UTF-8\">\
         <title>Particl Stake Pool</title></head><body>\
         <h2>Particl Stake Pool</h2><p>\
         Mode: {}<br/>\
         Pool Address: {}<br/>\
         Pool Fee: {}%<br/>\
         Stake Bonus: {}%<br/>\
         Payout Threshold: {}<br/>\
         Blocks Between Payment Runs: {}<br/>\
         Minimum output value: {}<br/>\
         </p><p>\
         Synced Height: {}<br/>\
         Blocks Found: {}<br/>\
         Total Disbursed: {}<br/>\
         Last Payment Run: {}<br/><br/>\
         Total Pool Rewards: {}<br/>\
         Total Pool Fees: {}<br/>\
         Total Pool Rewards Withdrawn: {}<br/><br/>\
         Total Pooled Coin: {}<br/>\
         Currently Staking: {}<br/></p>",
        summary.poolmode,
        info.pool_addr,
        info.pool_fee_percent,
        info.stake_bonus_percent,
        format_coin(info.payout_threshold as i128),
        info.min_blocks_between_payments,
        format_coin(info.min_output_value as i128),
        summary.poolheight,
        summary.blocksfound,
        format_coin(summary.totaldisbursed as i128),
        summary.lastpaymentrunheight,
        format_coin(summary.poolrewardtotal as i128),
        format_coin(summary.poolfeestotal as i128),
        format_coin(summary.poolwithdrawntotal as i128),
        summary.watchonlytotalbalance,
        format_coin(summary.stakeweight as i128),
    );

    content.push_str(
        "<br/><h3>Recent Blocks</h3><table><tr><th>Height</th><th>Block Hash</th>\
         <th>Block Reward</th><th>Total Coin Staking</th></tr>",
    );
    for b in &summary.lastblocks {
        content.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            b.height,
            b.blockhash,
            format_coin(b.blockreward as i128),
            format_coin(b.poolcointotal as i128)
        ));
    }
    content.push_str("</table>");

    content.push_str(
        "<br/><h3>Pending Payments</h3><table><tr><th>Txid</th><th>Disbursed</th></tr>",
    );
    for p in &summary.pendingpayments {
        content.push_str(&format!(
            "<tr><td>{}</td><td>{}</td></tr>",
            p.txid,
            format_coin(p.disbursed as i128)
        ));
    }
    content.push_str("</table>");

    content.push_str(
        "<br/><h3>Last Payments</h3><table><tr><th>Height</th><th>Txid</th>\
         <th>Disbursed</th></tr>",
    );
    for p in &summary.lastpayments {
        content.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
            p.height,
            p.txid,
            format_coin(p.disbursed as i128)
        ));
    }
    content.push_str("</table></body></html>");
    Html(content)
}

async fn page_address<DB: Store, N: NodeRpc>(
    State(state): State<Arc<AppState<DB, N>>>,
    Path(addr): Path<String>,
) -> Html<String> {
    let info = state.engine.display_info().await;
    let summary = match state.engine.get_address_summary(&addr).await {
        Ok(s) => s,
        Err(e) => return page_error(&e.to_string()),
    };

    let mut content = format!(
        "<!DOCTYPE html><html lang=\"en\">\n<head><meta charset=\"UTF-8\">\
         <title>Particl Stake Pool Address</title></head><body>\
         <h2>Spend Address {addr}</h2><h4>Pool Address {}</h4>",
        info.pool_addr
    );
    content.push_str("<table>");
    if let Some(accumulated) = summary.accumulated {
        content.push_str(&format!(
            "<tr><td>Accumulated:</td><td>{}</td></tr>\
             <tr><td>Payout Pending:</td><td>{}</td></tr>\
             <tr><td>Paid Out:</td><td>{}</td></tr>\
             <tr><td>Last Total Staking:</td><td>{}</td></tr>",
            format_coin16(accumulated as i128),
            format_coin(summary.rewardpending.unwrap_or(0) as i128),
            format_coin(summary.rewardpaidout.unwrap_or(0) as i128),
            format_coin(summary.laststaking.unwrap_or(0) as i128),
        ));
    }
    content.push_str(&format!(
        "<tr><td>Current Total in Pool:</td><td>{}</td></tr></table>",
        format_coin(summary.currenttotal as i128)
    ));
    content.push_str("<p><a href='/'>home</a></p></body></html>");
    Html(content)
}

async fn page_version<DB: Store, N: NodeRpc>(
    State(state): State<Arc<AppState<DB, N>>>,
) -> Html<String> {
    match state.engine.get_versions().await {
        Ok(v) => Html(format!(
            "<!DOCTYPE html><html lang=\"en\">\n<head><meta charset=\"UTF-8\">\
             <title>Particl Stake Pool Version</title></head><body>\
             <table><tr><td>Pool:</td><td>{}</td></tr>\
             <tr><td>Node:</td><td>{}</td></tr></table>\
             <p><a href='/'>home</a></p></body></html>",
            v.pool, v.node
        )),
        Err(e) => page_error(&e.to_string()),
    }
}

async fn page_voting<DB: Store, N: NodeRpc>(
    State(state): State<Arc<AppState<DB, N>>>,
) -> Html<String> {
    match state.engine.get_voting_info().await {
        Ok(v) => Html(format!(
            "<!DOCTYPE html><html lang=\"en\">\n<head><meta charset=\"UTF-8\">\
             <title>Particl Stake Pool Voting</title></head><body>\
             <h3>Vote Settings</h3><pre>{}</pre>\
             <p><a href='/'>home</a></p></body></html>",
            serde_json::to_string_pretty(&v).unwrap_or_default()
        )),
        Err(e) => page_error(&e.to_string()),
    }
}

/// The settings file with node paths, withdrawal details, auth and
/// management key material redacted.
async fn page_config<DB: Store, N: NodeRpc>(
    State(state): State<Arc<AppState<DB, N>>>,
) -> Response {
    let raw = match std::fs::read_to_string(&state.settings_path) {
        Ok(raw) => raw,
        Err(_) => return page_error("Settings file not found.").into_response(),
    };
    let mut settings: Value = match serde_json::from_str(&raw) {
        Ok(v) => v,
        Err(e) => return page_error(&e.to_string()).into_response(),
    };
    if let Some(map) = settings.as_object_mut() {
        for redacted in ["particldatadir", "poolownerwithdrawal", "rpcauth"] {
            if map.contains_key(redacted) {
                map.insert(redacted.to_string(), json!("..."));
            }
        }
        map.remove("management_key_salt");
        map.remove("management_key_hash");
    }
    Json(settings).into_response()
}

async fn json_index<DB: Store, N: NodeRpc>(
    State(state): State<Arc<AppState<DB, N>>>,
) -> Response {
    match state.engine.get_summary().await {
        Ok(summary) => Json::<Summary>(summary).into_response(),
        Err(e) => js_error(e).into_response(),
    }
}

async fn json_address<DB: Store, N: NodeRpc>(
    State(state): State<Arc<AppState<DB, N>>>,
    Path(addr): Path<String>,
) -> Response {
    match state.engine.get_address_summary(&addr).await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => js_error(e).into_response(),
    }
}

async fn json_metrics<DB: Store, N: NodeRpc>(
    State(state): State<Arc<AppState<DB, N>>>,
) -> Response {
    match state.engine.get_metrics().await {
        Ok(months) => Json(months).into_response(),
        Err(e) => js_error(e).into_response(),
    }
}

/// With a valid management code, rebuild the month aggregates.
async fn json_metrics_mgmt<DB: Store, N: NodeRpc>(
    State(state): State<Arc<AppState<DB, N>>>,
    Path(code): Path<String>,
) -> Response {
    if !state.management_code_ok(&code) {
        return js_error("Unknown argument").into_response();
    }
    match state.engine.rebuild_metrics().await {
        Ok(result) => Json(result).into_response(),
        Err(e) => {
            warn!(error = %e, "metrics rebuild failed");
            js_error(e).into_response()
        }
    }
}

async fn json_pending<DB: Store, N: NodeRpc>(
    State(state): State<Arc<AppState<DB, N>>>,
) -> Response {
    match state.engine.get_pending(false).await {
        Ok(pending) => Json(pending).into_response(),
        Err(e) => js_error(e).into_response(),
    }
}

/// With a valid management code, expand each pending payout with the raw
/// transaction.
async fn json_pending_mgmt<DB: Store, N: NodeRpc>(
    State(state): State<Arc<AppState<DB, N>>>,
    Path(code): Path<String>,
) -> Response {
    if !state.management_code_ok(&code) {
        return js_error("Unknown argument").into_response();
    }
    match state.engine.get_pending(true).await {
        Ok(pending) => Json(pending).into_response(),
        Err(e) => js_error(e).into_response(),
    }
}

async fn json_version<DB: Store, N: NodeRpc>(
    State(state): State<Arc<AppState<DB, N>>>,
) -> Response {
    match state.engine.get_versions().await {
        Ok(v) => Json(v).into_response(),
        Err(e) => js_error(e).into_response(),
    }
}

async fn json_voting<DB: Store, N: NodeRpc>(
    State(state): State<Arc<AppState<DB, N>>>,
) -> Response {
    match state.engine.get_voting_info().await {
        Ok(v) => Json(v).into_response(),
        Err(e) => js_error(e).into_response(),
    }
}

async fn prometheus_metrics() -> String {
    crate::metrics::encode_text()
}
