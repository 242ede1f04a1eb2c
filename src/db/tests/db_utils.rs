// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::ops::Deref;

use crate::db::ParityDb;

/// Temporary, self-cleaning parity-db
pub struct TempParityDb {
    db: Option<ParityDb>,
    _dir: tempfile::TempDir, // kept for cleaning up during Drop
}

impl TempParityDb {
    /// Creates a new DB in a temporary path that gets wiped out when the
    /// variable gets out of scope.
    pub fn new() -> TempParityDb {
        let dir = tempfile::Builder::new()
            .tempdir()
            .expect("Failed to create temporary path for db.");
        let path = dir.path().join("stakepooldb");

        TempParityDb {
            db: Some(ParityDb::open(path).unwrap()),
            _dir: dir,
        }
    }
}

impl Deref for TempParityDb {
    type Target = ParityDb;

    fn deref(&self) -> &Self::Target {
        self.db.as_ref().unwrap()
    }
}
