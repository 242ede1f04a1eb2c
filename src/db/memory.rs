// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::{Error, ScanOrder, Store, WriteBatch};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

/// A thread-safe ordered in-memory store, used by tests and tooling.
#[derive(Debug, Default, Clone)]
pub struct MemoryDb {
    db: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl Store for MemoryDb {
    fn get<K>(&self, key: K) -> Result<Option<Vec<u8>>, Error>
    where
        K: AsRef<[u8]>,
    {
        Ok(self.db.read().get(key.as_ref()).cloned())
    }

    fn put<K, V>(&self, key: K, value: V) -> Result<(), Error>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        self.db
            .write()
            .insert(key.as_ref().to_vec(), value.as_ref().to_vec());
        Ok(())
    }

    fn delete<K>(&self, key: K) -> Result<(), Error>
    where
        K: AsRef<[u8]>,
    {
        self.db.write().remove(key.as_ref());
        Ok(())
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), Error> {
        let mut db = self.db.write();
        for (key, value) in batch.into_ops() {
            match value {
                Some(v) => {
                    db.insert(key, v);
                }
                None => {
                    db.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn prefix_scan(
        &self,
        prefix: &[u8],
        order: ScanOrder,
        limit: Option<usize>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error> {
        let db = self.db.read();
        let range = db.range::<Vec<u8>, _>((
            Bound::Included(prefix.to_vec()),
            Bound::Unbounded,
        ));
        let matching = range.take_while(|(k, _)| k.starts_with(prefix));
        let limit = limit.unwrap_or(usize::MAX);
        let out = match order {
            ScanOrder::Ascending => matching
                .take(limit)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            ScanOrder::Descending => {
                let mut all: Vec<_> =
                    matching.map(|(k, v)| (k.clone(), v.clone())).collect();
                all.reverse();
                all.truncate(limit);
                all
            }
        };
        Ok(out)
    }
}
