// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::{Error, ScanOrder, Store, WriteBatch, prefix_upper_bound};
use parity_db::{CompressionType, Db, Options};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The single btree-indexed column holding the whole pool ledger. The btree
/// index is what gives us ordered prefix iteration.
const LEDGER_COLUMN: u8 = 0;

#[derive(Clone)]
pub struct ParityDb {
    db: Arc<Db>,
}

impl ParityDb {
    fn to_options(path: PathBuf) -> Options {
        Options {
            path,
            sync_wal: true,
            sync_data: true,
            stats: false,
            salt: None,
            columns: vec![parity_db::ColumnOptions {
                btree_index: true,
                compression: CompressionType::Lz4,
                ..Default::default()
            }],
            compression_threshold: HashMap::new(),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let opts = Self::to_options(path.as_ref().to_path_buf());
        Ok(Self {
            db: Arc::new(Db::open_or_create(&opts)?),
        })
    }
}

impl Store for ParityDb {
    fn get<K>(&self, key: K) -> Result<Option<Vec<u8>>, Error>
    where
        K: AsRef<[u8]>,
    {
        self.db
            .get(LEDGER_COLUMN, key.as_ref())
            .map_err(Error::from)
    }

    fn put<K, V>(&self, key: K, value: V) -> Result<(), Error>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let tx = [(LEDGER_COLUMN, key.as_ref(), Some(value.as_ref().to_owned()))];
        self.db.commit(tx).map_err(Error::from)
    }

    fn delete<K>(&self, key: K) -> Result<(), Error>
    where
        K: AsRef<[u8]>,
    {
        let tx = [(LEDGER_COLUMN, key.as_ref(), None)];
        self.db.commit(tx).map_err(Error::from)
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), Error> {
        let tx: Vec<_> = batch
            .into_ops()
            .map(|(k, v)| (LEDGER_COLUMN, k, v))
            .collect();
        self.db.commit(tx).map_err(Error::from)
    }

    fn prefix_scan(
        &self,
        prefix: &[u8],
        order: ScanOrder,
        limit: Option<usize>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error> {
        let mut it = self.db.iter(LEDGER_COLUMN)?;
        let mut out = Vec::new();
        let limit = limit.unwrap_or(usize::MAX);
        match order {
            ScanOrder::Ascending => {
                it.seek(prefix)?;
                while out.len() < limit {
                    match it.next()? {
                        Some((k, v)) if k.starts_with(prefix) => out.push((k, v)),
                        _ => break,
                    }
                }
            }
            ScanOrder::Descending => {
                match prefix_upper_bound(prefix) {
                    Some(ub) => it.seek(&ub)?,
                    None => it.seek_to_last()?,
                }
                while out.len() < limit {
                    match it.prev()? {
                        Some((k, v)) if k.starts_with(prefix) => out.push((k, v)),
                        _ => break,
                    }
                }
            }
        }
        Ok(out)
    }
}
