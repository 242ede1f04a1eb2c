// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::db::{ScanOrder, Store, WriteBatch, read_through};

pub fn write<DB: Store>(db: &DB) {
    db.put([0x41u8, 1], [1u8]).unwrap();
}

pub fn read<DB: Store>(db: &DB) {
    db.put([0x41u8, 2], [7u8]).unwrap();
    assert_eq!(db.get([0x41u8, 2]).unwrap().unwrap(), vec![7]);
    assert!(db.get([0x41u8, 99]).unwrap().is_none());
}

pub fn overwrite<DB: Store>(db: &DB) {
    db.put([0x41u8, 3], [1u8]).unwrap();
    db.put([0x41u8, 3], [2u8]).unwrap();
    assert_eq!(db.get([0x41u8, 3]).unwrap().unwrap(), vec![2]);
}

pub fn delete<DB: Store>(db: &DB) {
    db.put([0x41u8, 4], [1u8]).unwrap();
    db.delete([0x41u8, 4]).unwrap();
    assert!(db.get([0x41u8, 4]).unwrap().is_none());
    // deleting a missing key is fine
    db.delete([0x41u8, 4]).unwrap();
}

pub fn batch_commit_is_atomic_view<DB: Store>(db: &DB) {
    let mut batch = WriteBatch::new();
    batch.put(vec![0x42u8, 1], vec![1u8]);
    batch.put(vec![0x42u8, 2], vec![2u8]);
    batch.delete(vec![0x42u8, 1]);
    // the mirror reflects the final state of the batch
    assert_eq!(batch.get(&[0x42, 1]), Some(None));
    assert_eq!(batch.get(&[0x42, 2]), Some(Some(&[2u8][..])));
    assert_eq!(
        read_through(db, &batch, &[0x42, 2]).unwrap().unwrap(),
        vec![2]
    );
    db.commit(batch).unwrap();
    assert!(db.get([0x42u8, 1]).unwrap().is_none());
    assert_eq!(db.get([0x42u8, 2]).unwrap().unwrap(), vec![2]);
}

pub fn prefix_scan_orders<DB: Store>(db: &DB) {
    db.put([0x43u8, 1], [1u8]).unwrap();
    db.put([0x43u8, 2], [2u8]).unwrap();
    db.put([0x43u8, 3], [3u8]).unwrap();
    db.put([0x44u8, 0], [9u8]).unwrap(); // outside the prefix

    let asc = db.prefix_scan(&[0x43], ScanOrder::Ascending, None).unwrap();
    assert_eq!(
        asc.iter().map(|(k, _)| k[1]).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );

    let desc = db
        .prefix_scan(&[0x43], ScanOrder::Descending, Some(2))
        .unwrap();
    assert_eq!(
        desc.iter().map(|(k, _)| k[1]).collect::<Vec<_>>(),
        vec![3, 2]
    );

    let none = db.prefix_scan(&[0x45], ScanOrder::Ascending, None).unwrap();
    assert!(none.is_empty());
}
