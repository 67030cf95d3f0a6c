use std::collections::HashMap;

use crate::storage::models::{Expiry, RedisMeta, RedisString, RedisType};
use crate::storage::Storage;

/// A single-process, lock-free-inside-its-own-mutex key/value store: a string, list, and hash
/// table keyed by the same namespace, plus a side table of type/expiry metadata consulted lazily
/// on every read rather than swept by a background thread.
#[derive(Default)]
pub struct InMemoryStorage {
    strings: HashMap<RedisString, RedisString>,
    lists: HashMap<RedisString, Vec<RedisString>>,
    hashes: HashMap<RedisString, HashMap<RedisString, RedisString>>,
    meta: HashMap<RedisString, RedisMeta>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evicts `key` from every store if its metadata says it has expired. Returns whether the key
    /// is gone afterwards (either because it just expired, or because it never existed).
    fn evict_if_expired(&mut self, key: &[u8]) -> bool {
        let expired = match self.meta.get(key) {
            Some(meta) => meta.is_expired(),
            None => return true,
        };
        if expired {
            self.strings.remove(key);
            self.lists.remove(key);
            self.hashes.remove(key);
            self.meta.remove(key);
        }
        expired
    }
}

impl Storage for InMemoryStorage {
    fn write(&mut self, key: &[u8], value: &[u8]) {
        self.strings.insert(key.to_vec(), value.to_vec());
        self.lists.remove(key);
        self.hashes.remove(key);
        self.meta
            .insert(key.to_vec(), RedisMeta::new(RedisType::String, None));
    }

    fn expire(&mut self, key: &[u8], expiry: Expiry) -> u32 {
        if self.evict_if_expired(key) {
            return 0;
        }
        match self.meta.get_mut(key) {
            Some(meta) => {
                meta.expiry = Some(expiry);
                1
            }
            None => 0,
        }
    }

    fn read(&mut self, key: &[u8]) -> Option<&[u8]> {
        if self.evict_if_expired(key) {
            return None;
        }
        self.strings.get(key).map(|v| &v[..])
    }

    fn remove(&mut self, key: &[u8]) -> u32 {
        let existed =
            self.strings.remove(key).is_some() | self.lists.remove(key).is_some() | self.hashes.remove(key).is_some();
        self.meta.remove(key);
        existed as u32
    }

    fn contains(&mut self, key: &[u8]) -> bool {
        !self.evict_if_expired(key)
    }

    fn hwrite(&mut self, key: &[u8], value: HashMap<RedisString, RedisString>) {
        self.hashes.insert(key.to_vec(), value);
        self.strings.remove(key);
        self.lists.remove(key);
        self.meta
            .insert(key.to_vec(), RedisMeta::new(RedisType::Hash, None));
    }

    fn hread(&mut self, key: &[u8], field_key: &[u8]) -> Option<&[u8]> {
        if self.evict_if_expired(key) {
            return None;
        }
        self.hashes
            .get(key)
            .and_then(|fields| fields.get(field_key))
            .map(|v| &v[..])
    }

    fn size(&self) -> u64 {
        self.meta.len() as u64
    }

    fn meta(&self, key: &[u8]) -> Option<&RedisMeta> {
        self.meta.get(key)
    }

    fn extend(&mut self, key: &[u8], value: &[u8]) -> usize {
        if self.evict_if_expired(key) {
            self.strings.insert(key.to_vec(), value.to_vec());
            self.meta
                .insert(key.to_vec(), RedisMeta::new(RedisType::String, None));
            return value.len();
        }
        let entry = self.strings.entry(key.to_vec()).or_insert_with(Vec::new);
        entry.extend_from_slice(value);
        self.meta
            .entry(key.to_vec())
            .or_insert_with(|| RedisMeta::new(RedisType::String, None));
        entry.len()
    }

    fn lwrite(&mut self, key: &[u8], values: Vec<RedisString>) {
        self.lists.insert(key.to_vec(), values);
        self.strings.remove(key);
        self.hashes.remove(key);
        self.meta
            .insert(key.to_vec(), RedisMeta::new(RedisType::List, None));
    }

    fn lread(&mut self, key: &[u8]) -> Option<&[RedisString]> {
        if self.evict_if_expired(key) {
            return None;
        }
        self.lists.get(key).map(|v| &v[..])
    }

    fn type_of(&mut self, key: &[u8]) -> &'static [u8] {
        if self.evict_if_expired(key) {
            return b"none";
        }
        match self.meta.get(key) {
            Some(meta) => meta.data_type.as_bytes(),
            None => b"none",
        }
    }
}
