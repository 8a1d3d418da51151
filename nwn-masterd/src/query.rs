use master_shared::types::GameServer;
use crate::registry::Registry;

/// The master server's read operations.
///
/// Every method is a pure read: an unknown product, address or name yields an
/// empty result, and nothing here expires or otherwise mutates records.
pub trait MasterServerApi {
    /// Online servers in `product` whose name matches `name`
    fn lookup_server_by_name(&self, product: &str, name: &str) -> Vec<GameServer>;

    /// Stored information for the server at `address`, which may be offline
    fn lookup_server_by_address(&self, product: &str, address: &str) -> Option<GameServer>;

    /// All online servers in `product`, ordered by address
    fn get_online_server_list(&self, product: &str) -> Vec<GameServer>;
}

impl MasterServerApi for Registry {
    fn lookup_server_by_name(&self, product: &str, name: &str) -> Vec<GameServer> {
        let mode = self.config().name_match;
        self.with_namespace(product, |ns| {
            ns.online
                .get_by_name(name, mode)
                .iter()
                .map(|record| GameServer::clone(record))
                .collect()
        })
        .unwrap_or_default()
    }

    fn lookup_server_by_address(&self, product: &str, address: &str) -> Option<GameServer> {
        let address = address.trim();
        let include_offline = self.config().offline_lookup;
        self.with_namespace(product, |ns| {
            let record = if include_offline {
                ns.last_known.get(address)
            } else {
                ns.online.get_by_address(address)
            };
            record.map(|record| GameServer::clone(record))
        })
        .flatten()
    }

    fn get_online_server_list(&self, product: &str) -> Vec<GameServer> {
        self.with_namespace(product, |ns| {
            ns.online
                .list_online()
                .iter()
                .map(|record| GameServer::clone(record))
                .collect()
        })
        .unwrap_or_default()
    }
}
