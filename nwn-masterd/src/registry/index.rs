use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use master_shared::types::GameServer;
use crate::config::NameMatch;

/// Online servers of one product, indexed by address and by normalized name.
///
/// `by_address` is authoritative. `by_name` maps a normalized server name to
/// the addresses currently announcing it, so several servers may share a name.
/// Both maps are ordered so every listing comes back sorted by address.
#[derive(Debug, Default)]
pub struct ProductIndex {
    by_address: BTreeMap<String, Arc<GameServer>>,
    by_name: HashMap<String, BTreeSet<String>>,
}

/// Case-insensitive key used for name lookups
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

impl ProductIndex {
    pub fn upsert(&mut self, record: Arc<GameServer>) {
        let address = record.server_address.clone();
        let name_key = normalize_name(&record.server_name);

        // The server may have been renamed since its last heartbeat
        if let Some(previous) = self.by_address.get(&address) {
            let previous_key = normalize_name(&previous.server_name);
            if previous_key != name_key {
                self.unlink_name(&previous_key, &address);
            }
        }

        self.by_name
            .entry(name_key)
            .or_default()
            .insert(address.clone());
        self.by_address.insert(address, record);
    }

    pub fn remove(&mut self, address: &str) -> Option<Arc<GameServer>> {
        let removed = self.by_address.remove(address)?;
        self.unlink_name(&normalize_name(&removed.server_name), address);
        Some(removed)
    }

    pub fn get_by_address(&self, address: &str) -> Option<&Arc<GameServer>> {
        self.by_address.get(address)
    }

    pub fn get_by_name(&self, pattern: &str, mode: NameMatch) -> Vec<Arc<GameServer>> {
        let key = normalize_name(pattern);

        let addresses: BTreeSet<&String> = match mode {
            NameMatch::Exact => self
                .by_name
                .get(&key)
                .map(|set| set.iter().collect())
                .unwrap_or_default(),
            // An empty pattern would match every server; treat it as no match
            NameMatch::Substring if key.is_empty() => BTreeSet::new(),
            NameMatch::Substring => self
                .by_name
                .iter()
                .filter(|(name, _)| name.contains(key.as_str()))
                .flat_map(|(_, set)| set.iter())
                .collect(),
        };

        addresses
            .into_iter()
            .filter_map(|address| self.by_address.get(address).cloned())
            .collect()
    }

    pub fn list_online(&self) -> Vec<Arc<GameServer>> {
        self.by_address.values().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<GameServer>)> {
        self.by_address.iter()
    }

    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn clear(&mut self) {
        self.by_address.clear();
        self.by_name.clear();
    }

    /// Every name entry points at an indexed address filed under that name,
    /// and every indexed address appears under its own name.
    pub fn names_consistent(&self) -> bool {
        let linked: usize = self.by_name.values().map(BTreeSet::len).sum();
        linked == self.by_address.len()
            && self.by_name.iter().all(|(name, addresses)| {
                !addresses.is_empty()
                    && addresses.iter().all(|address| {
                        self.by_address
                            .get(address)
                            .is_some_and(|record| normalize_name(&record.server_name) == *name)
                    })
            })
    }

    fn unlink_name(&mut self, name_key: &str, address: &str) {
        if let Some(set) = self.by_name.get_mut(name_key) {
            set.remove(address);
            if set.is_empty() {
                self.by_name.remove(name_key);
            }
        }
    }
}
