// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Boundary encodings: satoshi amounts as fixed-point decimal strings, the
//! chain's base58-check and bech32 address forms, and the big-endian
//! fixed-width packers used for database keys and values.

mod address;
mod format;
mod pack;

pub use address::{bech32_decode, bech32_encode, decode_address, encode_address};
pub use format::{format_coin, format_coin16, parse_coin};
pub use pack::{
    pack_i32, pack_u64, pack_u128, unpack_i32, unpack_u64, unpack_u128,
};

use thiserror::Error;

/// Number of satoshi in one coin.
pub const COIN: u64 = 100_000_000;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid amount {0:?}")]
    BadAmount(String),

    #[error("amount {0:?} has more than 8 decimal places")]
    TooPrecise(String),

    #[error("error decoding base58 value")]
    BadBase58,

    #[error("error converting from/to bech32: {0}")]
    BadBech32(#[from] bech32::Error),

    #[error("truncated field, expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },
}
