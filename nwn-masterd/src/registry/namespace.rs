use std::collections::HashMap;
use std::sync::Arc;
use chrono::{DateTime, Duration, Utc};
use master_shared::types::GameServer;
use super::index::ProductIndex;

/// Everything the registry knows about one product.
///
/// `last_known` holds the latest record for every address ever heartbeated
/// (until pruned), online or not. `online` indexes the subset that is still
/// live. An online record is the same `Arc` in both maps.
#[derive(Debug, Default)]
pub struct Namespace {
    pub(crate) online: ProductIndex,
    pub(crate) last_known: HashMap<String, Arc<GameServer>>,
}

impl Namespace {
    pub fn upsert(&mut self, record: GameServer) {
        let record = Arc::new(record);
        self.last_known
            .insert(record.server_address.clone(), Arc::clone(&record));
        self.online.upsert(record);
    }

    /// Take every online server whose last heartbeat is older than `timeout`
    /// out of the online index and keep an offline copy for address lookups.
    /// Returns the expired addresses.
    pub fn expire(&mut self, now: DateTime<Utc>, timeout: Duration) -> Vec<String> {
        let expired: Vec<String> = self
            .online
            .iter()
            .filter(|(_, record)| now - record.last_heartbeat > timeout)
            .map(|(address, _)| address.clone())
            .collect();

        for address in &expired {
            if let Some(record) = self.online.remove(address) {
                let mut offline = (*record).clone();
                offline.online = false;
                self.last_known.insert(address.clone(), Arc::new(offline));
            }
        }

        expired
    }

    /// Drop offline servers not heard from within `retention`.
    pub fn prune(&mut self, now: DateTime<Utc>, retention: Duration) -> usize {
        let before = self.last_known.len();
        self.last_known
            .retain(|_, record| record.online || now - record.last_heartbeat <= retention);
        before - self.last_known.len()
    }

    /// Check that the online index is exactly the set of online records in
    /// `last_known`.
    pub fn is_consistent(&self) -> bool {
        let online_known = self.last_known.values().filter(|r| r.online).count();

        online_known == self.online.len()
            && self.online.names_consistent()
            && self.online.iter().all(|(address, record)| {
                record.online
                    && self
                        .last_known
                        .get(address)
                        .is_some_and(|known| Arc::ptr_eq(known, record))
            })
    }

    /// Rebuild the online index from `last_known`.
    pub fn rebuild_index(&mut self) {
        self.online.clear();
        for record in self.last_known.values().filter(|r| r.online) {
            self.online.upsert(Arc::clone(record));
        }
    }

    pub fn online_count(&self) -> usize {
        self.online.len()
    }
}
