//! The in-memory game server directory.
//!
//! Products are independent namespaces, each behind its own lock, so ingest
//! for one product never blocks readers of another. Records are immutable
//! `Arc<GameServer>` values replaced wholesale on every accepted heartbeat;
//! readers see either the previous or the new record, never a mix.

pub mod hash;
pub mod index;
pub mod namespace;
pub mod validate;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use master_shared::types::Heartbeat;
use crate::config::RegistryConfig;
use self::namespace::Namespace;
pub use self::validate::IngestError;

/// What an accepted heartbeat did to the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IngestOutcome {
    /// First heartbeat for this address
    Created,
    /// Refreshed an online server
    Updated,
    /// Brought an offline server back online
    Revived,
    /// Not newer than the stored heartbeat; ignored
    Stale,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub pruned: usize,
    pub repaired: usize,
}

#[derive(Debug, Default)]
struct RegistryStats {
    created: AtomicU64,
    updated: AtomicU64,
    revived: AtomicU64,
    stale: AtomicU64,
    rejected: AtomicU64,
    expired: AtomicU64,
    pruned: AtomicU64,
}

/// Point-in-time copy of the registry's counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub products: usize,
    pub online: usize,
    pub created: u64,
    pub updated: u64,
    pub revived: u64,
    pub stale: u64,
    pub rejected: u64,
    pub expired: u64,
    pub pruned: u64,
}

pub struct Registry {
    config: RegistryConfig,
    products: DashMap<String, Arc<RwLock<Namespace>>>,
    stats: RegistryStats,
}

impl Registry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            products: DashMap::new(),
            stats: RegistryStats::default(),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Apply one heartbeat received at `received_at`.
    ///
    /// A heartbeat that is not strictly newer than the stored one is ignored
    /// and reported as `IngestOutcome::Stale`.
    pub fn ingest(
        &self,
        heartbeat: Heartbeat,
        received_at: DateTime<Utc>,
    ) -> Result<IngestOutcome, IngestError> {
        let heartbeat = validate::validate(heartbeat).inspect_err(|e| {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Rejected heartbeat: {}", e);
        })?;

        let namespace = self.namespace_or_insert(&heartbeat.product);
        let mut ns = namespace.write();

        let outcome = match ns.last_known.get(&heartbeat.server_address) {
            Some(existing) if received_at <= existing.last_heartbeat => {
                self.stats.stale.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    "Ignoring stale heartbeat from {}/{} ({} <= {})",
                    heartbeat.product,
                    heartbeat.server_address,
                    received_at,
                    existing.last_heartbeat
                );
                return Ok(IngestOutcome::Stale);
            }
            Some(existing) if existing.online => IngestOutcome::Updated,
            Some(_) => IngestOutcome::Revived,
            None => IngestOutcome::Created,
        };

        match outcome {
            IngestOutcome::Created => {
                self.stats.created.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    "Registered {} server {} ({:?})",
                    heartbeat.product,
                    heartbeat.server_address,
                    heartbeat.server_name
                );
            }
            IngestOutcome::Revived => {
                self.stats.revived.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    "{} server {} is back online",
                    heartbeat.product,
                    heartbeat.server_address
                );
            }
            _ => {
                self.stats.updated.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(
                    "Heartbeat from {} server {}",
                    heartbeat.product,
                    heartbeat.server_address
                );
            }
        }

        ns.upsert(heartbeat.into_record(received_at));
        Ok(outcome)
    }

    /// Expire servers that missed the heartbeat timeout and prune offline
    /// servers past retention, across every product.
    pub fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let timeout = self.config.heartbeat_timeout();
        let retention = self.config.offline_retention();
        let mut report = SweepReport::default();

        for (product, namespace) in self.snapshot_namespaces() {
            let mut ns = namespace.write();

            for address in ns.expire(now, timeout) {
                tracing::info!("{} server {} went offline", product, address);
                report.expired += 1;
            }
            if let Some(retention) = retention {
                report.pruned += ns.prune(now, retention);
            }

            if !ns.is_consistent() {
                if cfg!(debug_assertions) {
                    panic!("Online index for {} diverged from the last-known store", product);
                }
                tracing::error!(
                    "Online index for {} diverged from the last-known store, rebuilding",
                    product
                );
                ns.rebuild_index();
                report.repaired += 1;
            }
        }

        self.stats.expired.fetch_add(report.expired as u64, Ordering::Relaxed);
        self.stats.pruned.fetch_add(report.pruned as u64, Ordering::Relaxed);
        report
    }

    pub fn stats(&self) -> StatsSnapshot {
        let namespaces = self.snapshot_namespaces();
        StatsSnapshot {
            products: namespaces.len(),
            online: namespaces
                .iter()
                .map(|(_, ns)| ns.read().online_count())
                .sum(),
            created: self.stats.created.load(Ordering::Relaxed),
            updated: self.stats.updated.load(Ordering::Relaxed),
            revived: self.stats.revived.load(Ordering::Relaxed),
            stale: self.stats.stale.load(Ordering::Relaxed),
            rejected: self.stats.rejected.load(Ordering::Relaxed),
            expired: self.stats.expired.load(Ordering::Relaxed),
            pruned: self.stats.pruned.load(Ordering::Relaxed),
        }
    }

    /// Run `f` against a product's namespace under its read lock. `None` for
    /// a product that never heartbeated. The product is trimmed the same way
    /// ingest trims it.
    pub(crate) fn with_namespace<R>(&self, product: &str, f: impl FnOnce(&Namespace) -> R) -> Option<R> {
        let namespace = self
            .products
            .get(product.trim())
            .map(|entry| Arc::clone(entry.value()))?;
        let ns = namespace.read();
        Some(f(&ns))
    }

    fn namespace_or_insert(&self, product: &str) -> Arc<RwLock<Namespace>> {
        if let Some(entry) = self.products.get(product) {
            return Arc::clone(entry.value());
        }
        Arc::clone(self.products.entry(product.to_string()).or_default().value())
    }

    // Clone the handles out so no map shard stays locked while a namespace is locked
    fn snapshot_namespaces(&self) -> Vec<(String, Arc<RwLock<Namespace>>)> {
        self.products
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use chrono::{Duration, TimeZone};
    use master_shared::types::GameServer;
    use crate::query::MasterServerApi;

    fn test_heartbeat(address: &str, name: &str, players: u32) -> Heartbeat {
        Heartbeat {
            product: "NWN2".to_string(),
            server_address: address.to_string(),
            server_name: name.to_string(),
            module_name: "Module".to_string(),
            build_number: 1765,
            expansions_mask: 0x01,
            active_player_count: players,
            maximum_player_count: 32,
            local_vault: false,
            private_server: false,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 20, 0, 0).unwrap()
    }

    fn test_registry() -> Registry {
        Registry::new(RegistryConfig {
            heartbeat_timeout_secs: 60,
            ..RegistryConfig::default()
        })
    }

    #[test]
    fn test_newer_heartbeat_replaces_record() {
        let registry = test_registry();
        let h1 = test_heartbeat("10.0.0.5:5121", "Test Haven", 3);
        let mut h2 = test_heartbeat("10.0.0.5:5121", "Test Haven II", 7);
        h2.module_name = "Other Module".to_string();
        h2.private_server = true;

        assert_eq!(registry.ingest(h1, t0()), Ok(IngestOutcome::Created));
        let later = t0() + Duration::seconds(30);
        assert_eq!(registry.ingest(h2.clone(), later), Ok(IngestOutcome::Updated));

        let stored = registry
            .lookup_server_by_address("NWN2", "10.0.0.5:5121")
            .unwrap();
        assert_eq!(stored, h2.into_record(later));
    }

    #[test]
    fn test_stale_heartbeat_leaves_record_unchanged() {
        let registry = test_registry();
        registry
            .ingest(test_heartbeat("10.0.0.5:5121", "Test Haven", 3), t0())
            .unwrap();
        let before = registry.lookup_server_by_address("NWN2", "10.0.0.5:5121");

        let older = t0() - Duration::seconds(5);
        assert_eq!(
            registry.ingest(test_heartbeat("10.0.0.5:5121", "Impostor", 9), older),
            Ok(IngestOutcome::Stale)
        );
        // Same timestamp counts as a duplicate delivery
        assert_eq!(
            registry.ingest(test_heartbeat("10.0.0.5:5121", "Duplicate", 9), t0()),
            Ok(IngestOutcome::Stale)
        );

        assert_eq!(registry.lookup_server_by_address("NWN2", "10.0.0.5:5121"), before);
        assert_eq!(registry.stats().stale, 2);
    }

    #[test]
    fn test_rejected_heartbeat_creates_nothing() {
        let registry = test_registry();
        let result = registry.ingest(test_heartbeat("not-an-address", "Broken", 0), t0());

        assert!(matches!(result, Err(IngestError::MalformedAddress(_))));
        assert!(registry.get_online_server_list("NWN2").is_empty());
        assert_eq!(registry.stats().rejected, 1);
        assert_eq!(registry.stats().products, 0);
    }

    #[test]
    fn test_addresses_do_not_interfere() {
        let registry = test_registry();
        registry
            .ingest(test_heartbeat("10.0.0.1:5121", "Alpha", 1), t0())
            .unwrap();
        registry
            .ingest(test_heartbeat("10.0.0.2:5121", "Beta", 2), t0())
            .unwrap();
        registry
            .ingest(test_heartbeat("10.0.0.2:5121", "Beta", 5), t0() + Duration::seconds(10))
            .unwrap();

        let alpha = registry.lookup_server_by_address("NWN2", "10.0.0.1:5121").unwrap();
        assert_eq!(alpha.active_player_count, 1);
        assert_eq!(alpha.last_heartbeat, t0());
        assert_eq!(registry.lookup_server_by_name("NWN2", "alpha").len(), 1);
        assert_eq!(registry.get_online_server_list("NWN2").len(), 2);
    }

    #[test]
    fn test_products_are_separate_namespaces() {
        let registry = test_registry();
        let mut nwn1 = test_heartbeat("10.0.0.5:5121", "Shared Address", 1);
        nwn1.product = "NWN1".to_string();
        registry.ingest(nwn1, t0()).unwrap();
        registry
            .ingest(test_heartbeat("10.0.0.5:5121", "Shared Address", 2), t0())
            .unwrap();

        assert_eq!(
            registry
                .lookup_server_by_address("NWN1", "10.0.0.5:5121")
                .unwrap()
                .active_player_count,
            1
        );
        assert_eq!(registry.get_online_server_list("NWN2").len(), 1);
        assert!(registry.get_online_server_list("NWN3").is_empty());
    }

    #[test]
    fn test_expired_server_resolves_offline() {
        let registry = test_registry();
        registry
            .ingest(test_heartbeat("10.0.0.5:5121", "Test Haven", 3), t0())
            .unwrap();

        let online = registry.lookup_server_by_address("NWN2", "10.0.0.5:5121").unwrap();
        assert!(online.online);

        let report = registry.sweep(t0() + Duration::seconds(61));
        assert_eq!(report.expired, 1);

        let offline = registry.lookup_server_by_address("NWN2", "10.0.0.5:5121").unwrap();
        assert!(!offline.online);
        assert_eq!(offline.server_name, "Test Haven");
        assert_eq!(offline.active_player_count, 3);
        assert_eq!(offline.last_heartbeat, t0());
        assert!(registry.get_online_server_list("NWN2").is_empty());
        assert!(registry.lookup_server_by_name("NWN2", "Test Haven").is_empty());
    }

    #[test]
    fn test_heartbeat_revives_offline_server() {
        let registry = test_registry();
        registry
            .ingest(test_heartbeat("10.0.0.5:5121", "Test Haven", 3), t0())
            .unwrap();
        registry.sweep(t0() + Duration::seconds(120));

        let outcome = registry
            .ingest(test_heartbeat("10.0.0.5:5121", "Test Haven", 1), t0() + Duration::seconds(130))
            .unwrap();

        assert_eq!(outcome, IngestOutcome::Revived);
        assert_eq!(registry.get_online_server_list("NWN2").len(), 1);
        assert!(registry.lookup_server_by_address("NWN2", "10.0.0.5:5121").unwrap().online);
    }

    #[test]
    fn test_sweep_prunes_after_retention() {
        let registry = Registry::new(RegistryConfig {
            heartbeat_timeout_secs: 60,
            offline_retention_secs: 3600,
            ..RegistryConfig::default()
        });
        registry
            .ingest(test_heartbeat("10.0.0.5:5121", "Test Haven", 3), t0())
            .unwrap();

        registry.sweep(t0() + Duration::seconds(61));
        assert!(registry.lookup_server_by_address("NWN2", "10.0.0.5:5121").is_some());

        let report = registry.sweep(t0() + Duration::seconds(3601));
        assert_eq!(report.pruned, 1);
        assert!(registry.lookup_server_by_address("NWN2", "10.0.0.5:5121").is_none());
        assert_eq!(registry.stats().pruned, 1);
    }

    #[test]
    fn test_concurrent_ingest_loses_nothing() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 50;

        let registry = test_registry();
        std::thread::scope(|scope| {
            for t in 0..THREADS {
                let registry = &registry;
                scope.spawn(move || {
                    for i in 0..PER_THREAD {
                        let address = format!("10.{}.{}.1:5121", t, i);
                        for round in 0..3u32 {
                            let heartbeat = test_heartbeat(&address, &format!("Server {}-{}", t, i), round);
                            let at = t0() + Duration::seconds(round as i64);
                            registry.ingest(heartbeat, at).unwrap();
                        }
                    }
                });
            }
        });

        let servers = registry.get_online_server_list("NWN2");
        assert_eq!(servers.len(), THREADS * PER_THREAD);
        for server in &servers {
            assert_eq!(server.active_player_count, 2);
            assert_eq!(server.last_heartbeat, t0() + Duration::seconds(2));
        }

        let stats = registry.stats();
        assert_eq!(stats.created, (THREADS * PER_THREAD) as u64);
        assert_eq!(stats.updated, (THREADS * PER_THREAD * 2) as u64);
    }

    #[test]
    fn test_readers_and_sweeper_during_ingest() {
        const WRITERS: usize = 4;
        const PER_WRITER: usize = 25;
        const ROUNDS: u32 = 20;

        let registry = test_registry();

        // These go offline under the concurrent sweeps
        for i in 0..PER_WRITER {
            let mut heartbeat = test_heartbeat(&format!("10.200.0.{}:5121", i), "Old", 0);
            heartbeat.product = "NWN1".to_string();
            registry.ingest(heartbeat, t0() - Duration::minutes(10)).unwrap();
        }

        // Every field of a round's record is derived from the round number
        let round_heartbeat = |address: &str, round: u32| {
            let mut heartbeat = test_heartbeat(address, &format!("Round {}", round), round);
            heartbeat.module_name = format!("module-{}", round);
            heartbeat.build_number = round;
            heartbeat
        };
        let check_record = |server: &GameServer| {
            let round = server.active_player_count;
            assert_eq!(server.server_name, format!("Round {}", round));
            assert_eq!(server.module_name, format!("module-{}", round));
            assert_eq!(server.build_number, round);
            assert_eq!(server.last_heartbeat, t0() + Duration::seconds(round as i64));
        };

        let done = AtomicBool::new(false);
        std::thread::scope(|scope| {
            let writers: Vec<_> = (0..WRITERS)
                .map(|w| {
                    let registry = &registry;
                    scope.spawn(move || {
                        for round in 0..ROUNDS {
                            for i in 0..PER_WRITER {
                                let address = format!("10.{}.{}.1:5121", w, i);
                                let at = t0() + Duration::seconds(round as i64);
                                registry.ingest(round_heartbeat(&address, round), at).unwrap();
                            }
                        }
                    })
                })
                .collect();

            for _ in 0..2 {
                scope.spawn(|| {
                    while !done.load(Ordering::Acquire) {
                        for server in registry.get_online_server_list("NWN2") {
                            assert!(server.online);
                            check_record(&server);
                        }
                        for server in registry.get_online_server_list("NWN1") {
                            assert!(server.online);
                        }
                        if let Some(server) = registry.lookup_server_by_address("NWN2", "10.0.0.1:5121") {
                            assert!(server.online);
                            check_record(&server);
                        }
                        for server in registry.lookup_server_by_name("NWN2", "Round 3") {
                            assert!(server.online);
                            check_record(&server);
                        }
                    }
                });
            }

            scope.spawn(|| {
                while !done.load(Ordering::Acquire) {
                    // Recent enough that no NWN2 server expires
                    registry.sweep(t0() + Duration::seconds(30));
                }
            });

            for writer in writers {
                writer.join().unwrap();
            }
            done.store(true, Ordering::Release);
        });

        let servers = registry.get_online_server_list("NWN2");
        assert_eq!(servers.len(), WRITERS * PER_WRITER);
        for server in &servers {
            assert_eq!(server.active_player_count, ROUNDS - 1);
            check_record(server);
        }

        registry.sweep(t0() + Duration::seconds(30));
        assert!(registry.get_online_server_list("NWN1").is_empty());
        let old = registry.lookup_server_by_address("NWN1", "10.200.0.0:5121").unwrap();
        assert!(!old.online);
    }

    #[test]
    fn test_sweep_with_huge_timeout_does_not_panic() {
        let registry = Registry::new(RegistryConfig {
            heartbeat_timeout_secs: 100_000_000_000_000_000,
            offline_retention_secs: u64::MAX,
            ..RegistryConfig::default()
        });
        registry
            .ingest(test_heartbeat("10.0.0.5:5121", "Test Haven", 3), t0())
            .unwrap();

        let report = registry.sweep(t0() + Duration::days(365));
        assert_eq!(report, SweepReport::default());
        assert_eq!(registry.get_online_server_list("NWN2").len(), 1);
    }

    #[test]
    fn test_test_haven_scenario() {
        let registry = Registry::new(RegistryConfig::default());
        let now = t0();
        registry
            .ingest(test_heartbeat("10.0.0.5:5121", "Test Haven", 3), now)
            .unwrap();

        let found = registry.lookup_server_by_address("NWN2", "10.0.0.5:5121").unwrap();
        assert!(found.online);
        assert_eq!(found.server_name, "Test Haven");
        assert_eq!(found.active_player_count, 3);

        let after_timeout = now + registry.config().heartbeat_timeout() + Duration::seconds(1);
        registry.sweep(after_timeout);

        let found = registry.lookup_server_by_address("NWN2", "10.0.0.5:5121").unwrap();
        assert!(!found.online);
        assert_eq!(found.server_name, "Test Haven");
        assert_eq!(found.active_player_count, 3);
        assert!(registry.get_online_server_list("NWN2").is_empty());
    }
}
