use crate::delta::Signature;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// (item id, version, block size)
type CacheKey = (String, u64, usize);

#[derive(Default)]
struct Entries {
    map: HashMap<CacheKey, Arc<Signature>>,
    order: VecDeque<CacheKey>,
}

/// Bounded cache of generated signatures
///
/// Signatures never change for a given version, so entries are only
/// evicted for space (oldest insert first), never invalidated.
#[derive(Clone)]
pub struct SignatureCache {
    capacity: usize,
    entries: Arc<Mutex<Entries>>,
}

impl SignatureCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Arc::new(Mutex::new(Entries::default())),
        }
    }

    pub fn get(&self, item_id: &str, version: u64, block_size: usize) -> Option<Arc<Signature>> {
        let key = (item_id.to_string(), version, block_size);
        let entries = self.entries.lock().ok()?;
        entries.map.get(&key).cloned()
    }

    pub fn insert(&self, item_id: &str, version: u64, block_size: usize, signature: Arc<Signature>) {
        if self.capacity == 0 {
            return;
        }
        // A poisoned cache only costs recomputation
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };

        let key = (item_id.to_string(), version, block_size);
        if entries.map.insert(key.clone(), signature).is_none() {
            entries.order.push_back(key);
        }
        while entries.map.len() > self.capacity {
            match entries.order.pop_front() {
                Some(oldest) => {
                    entries.map.remove(&oldest);
                }
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
