// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use thiserror::Error;

/// Database error
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Database(#[from] parity_db::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("unsupported database version {0}")]
    UnsupportedVersion(i32),

    #[error("{0}")]
    Other(String),
}

impl From<crate::codec::Error> for Error {
    fn from(e: crate::codec::Error) -> Self {
        Error::Corrupt(e.to_string())
    }
}

impl From<Error> for String {
    fn from(e: Error) -> Self {
        e.to_string()
    }
}
