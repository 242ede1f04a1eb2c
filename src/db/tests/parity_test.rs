// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::{db_utils::TempParityDb, subtests};

#[test]
fn db_write() {
    let db = TempParityDb::new();
    subtests::write(&*db);
}

#[test]
fn db_read() {
    let db = TempParityDb::new();
    subtests::read(&*db);
}

#[test]
fn db_overwrite() {
    let db = TempParityDb::new();
    subtests::overwrite(&*db);
}

#[test]
fn db_delete() {
    let db = TempParityDb::new();
    subtests::delete(&*db);
}

#[test]
fn db_batch() {
    let db = TempParityDb::new();
    subtests::batch_commit_is_atomic_view(&*db);
}

#[test]
fn db_prefix_scan() {
    let db = TempParityDb::new();
    subtests::prefix_scan_orders(&*db);
}
