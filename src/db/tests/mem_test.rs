// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::subtests;
use crate::db::MemoryDb;

#[test]
fn mem_db_write() {
    let db = MemoryDb::default();
    subtests::write(&db);
}

#[test]
fn mem_db_read() {
    let db = MemoryDb::default();
    subtests::read(&db);
}

#[test]
fn mem_db_overwrite() {
    let db = MemoryDb::default();
    subtests::overwrite(&db);
}

#[test]
fn mem_db_delete() {
    let db = MemoryDb::default();
    subtests::delete(&db);
}

#[test]
fn mem_db_batch() {
    let db = MemoryDb::default();
    subtests::batch_commit_is_atomic_view(&db);
}

#[test]
fn mem_db_prefix_scan() {
    let db = MemoryDb::default();
    subtests::prefix_scan_orders(&db);
}
