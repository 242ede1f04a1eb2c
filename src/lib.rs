// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Ledger and payout engine for a Particl cold-staking pool.
//!
//! Participants stake to a shared pool address while keeping their coin
//! spendable only by themselves; the pool signs the stake proofs. This crate
//! follows the chain a safe distance behind the tip, credits each block
//! reward across participants in proportion to their pooled coin at the
//! moment of the win, and periodically disburses the accumulated credit as
//! on-chain payouts, reconciling everything it sends (and anything the
//! operator sends) by observing the chain.

pub mod chain;
pub mod cli;
pub mod codec;
pub mod config;
pub mod daemon;
pub mod db;
pub mod http;
pub mod ingest;
pub mod logger;
pub mod metrics;
pub mod pool;
pub mod rpc;
